use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use serde_json::{json, Value};
use std::any::Any;
use tracing::error;

use crate::error::{ApiError, ErrorDetail, INTERNAL_ERROR_MESSAGE};

#[derive(Debug, Clone, Copy)]
pub struct ErrorPolicy {
    pub expose_detail: bool,
}

/// Turn any response carrying an [`ErrorDetail`] into the uniform 500 body.
/// The detail is logged always and sent to the client only when the
/// deployment allows it.
pub async fn format_errors(State(policy): State<ErrorPolicy>, req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();

    let response = next.run(req).await;
    let Some(ErrorDetail(detail)) = response.extensions().get::<ErrorDetail>().cloned() else {
        return response;
    };

    error!(%method, %uri, error = %detail, "Unhandled error");

    let error = if policy.expose_detail {
        Value::String(detail)
    } else {
        json!({})
    };

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "message": INTERNAL_ERROR_MESSAGE,
            "error": error
        })),
    )
        .into_response()
}

/// Convert a handler panic into an internal error for [`format_errors`].
pub fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "handler panicked".to_string()
    };
    ApiError::internal(detail).into_response()
}
