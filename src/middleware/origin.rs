use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tracing::warn;

use crate::error::ApiError;

/// Cross-origin allow-list for the current deployment.
#[derive(Debug, Clone)]
pub struct OriginPolicy {
    allowed: Arc<Vec<HeaderValue>>,
}

impl OriginPolicy {
    pub fn new(origins: &[String]) -> Self {
        let allowed = origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(%origin, "Ignoring invalid allowed origin");
                    None
                }
            })
            .collect();
        Self {
            allowed: Arc::new(allowed),
        }
    }

    pub fn allows(&self, origin: &HeaderValue) -> bool {
        self.allowed.iter().any(|allowed| allowed == origin)
    }

    /// CORS headers for allowed origins, with credentials permitted.
    pub fn cors_layer(&self) -> CorsLayer {
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(self.allowed.iter().cloned()))
            .allow_credentials(true)
            .allow_methods([
                Method::GET,
                Method::HEAD,
                Method::PUT,
                Method::PATCH,
                Method::POST,
                Method::DELETE,
            ])
            .allow_headers(AllowHeaders::mirror_request())
    }
}

/// Reject requests whose `Origin` is not on the allow-list. Requests without
/// an `Origin` header (same-origin navigations, server-to-server calls) pass.
pub async fn reject_disallowed_origin(
    State(policy): State<OriginPolicy>,
    req: Request,
    next: Next,
) -> Response {
    if let Some(origin) = req.headers().get(header::ORIGIN) {
        if !policy.allows(origin) {
            warn!(origin = ?origin, path = %req.uri().path(), "Rejected request from disallowed origin");
            return ApiError::forbidden("Origin not allowed").into_response();
        }
    }
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_exact_origins_only() {
        let policy = OriginPolicy::new(&["http://localhost:3000".to_string()]);
        assert!(policy.allows(&HeaderValue::from_static("http://localhost:3000")));
        assert!(!policy.allows(&HeaderValue::from_static("http://localhost:3001")));
        assert!(!policy.allows(&HeaderValue::from_static("http://evil.example")));
    }

    #[test]
    fn invalid_origins_are_skipped() {
        let policy = OriginPolicy::new(&["bad\norigin".to_string(), "https://ok.example".to_string()]);
        assert!(policy.allows(&HeaderValue::from_static("https://ok.example")));
    }
}
