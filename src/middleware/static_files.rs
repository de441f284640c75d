use axum::{
    extract::Request,
    handler::HandlerWithoutStateExt,
    http::{header, HeaderValue},
    middleware::{self, Next},
    response::Response,
    Router,
};
use std::path::Path;
use tower_http::services::ServeDir;

use crate::error::ApiError;

async fn missing_asset() -> ApiError {
    ApiError::route_not_found()
}

/// `/uploads/*` serves the upload directory, `/images/*` its `images`
/// subdirectory with SVG content types corrected.
pub fn static_routes(upload_dir: &Path) -> Router {
    let uploads = Router::new().nest_service(
        "/uploads",
        ServeDir::new(upload_dir).not_found_service(missing_asset.into_service()),
    );

    let images = Router::new()
        .nest_service(
            "/images",
            ServeDir::new(upload_dir.join("images")).not_found_service(missing_asset.into_service()),
        )
        .layer(middleware::from_fn(correct_svg_content_type));

    uploads.merge(images)
}

pub async fn correct_svg_content_type(req: Request, next: Next) -> Response {
    let is_svg = has_svg_extension(req.uri().path());
    let mut response = next.run(req).await;
    if is_svg && response.status().is_success() {
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static("image/svg+xml"));
    }
    response
}

fn has_svg_extension(path: &str) -> bool {
    Path::new(path)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("svg"))
}
