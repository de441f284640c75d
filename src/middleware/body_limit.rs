use axum::{
    extract::Request,
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::warn;

use crate::error::ApiError;

/// Cap request bodies at `max_bytes`. A declared `Content-Length` over the cap
/// is refused before dispatch; undeclared bodies fail once a handler reads
/// past the cap.
pub fn body_limit_layer(max_bytes: usize) -> RequestBodyLimitLayer {
    RequestBodyLimitLayer::new(max_bytes)
}

/// Give body-limit rejections the uniform JSON shape. Handlers that answer
/// 413 with their own JSON body are left alone.
pub async fn uniform_payload_too_large(req: Request, next: Next) -> Response {
    let path = req.uri().path().to_string();
    let response = next.run(req).await;

    if response.status() != StatusCode::PAYLOAD_TOO_LARGE || is_json(&response) {
        return response;
    }

    warn!(path = %path, "Request body too large");
    ApiError::payload_too_large("Request entity too large").into_response()
}

fn is_json(response: &Response) -> bool {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/json"))
}
