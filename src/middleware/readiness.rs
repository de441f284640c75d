use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::rate_limit::under_prefix;
use crate::error::ApiError;

/// Flipped once the startup bootstrap attempt has finished.
#[derive(Debug, Clone, Default)]
pub struct Readiness(Arc<AtomicBool>);

impl Readiness {
    pub fn new() -> Self {
        Self::default()
    }

    /// A flag that is already set, for routers that do not bootstrap.
    pub fn ready() -> Self {
        let readiness = Self::new();
        readiness.mark_ready();
        readiness
    }

    pub fn mark_ready(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_ready(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Hold back API dispatch until the database bootstrap has run. The liveness
/// endpoint and static assets are always served.
pub async fn require_ready(State(readiness): State<Readiness>, req: Request, next: Next) -> Response {
    let path = req.uri().path();
    if readiness.is_ready() || !under_prefix(path, "/api") || path == "/api/health" {
        return next.run(req).await;
    }
    ApiError::service_unavailable("Service is starting up").into_response()
}
