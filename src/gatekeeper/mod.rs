//! The ordered request pipeline every inbound call passes through.
//!
//! Outermost first: tracing, security headers, origin policy, tiered rate
//! limiting, body limit, error formatting (with panic recovery), readiness
//! gate, then dispatch to the liveness endpoint, the mounted API groups and
//! the static asset mounts. Anything unmatched gets the uniform 404.

pub mod routes;

use anyhow::Context;
use axum::{
    extract::DefaultBodyLimit,
    middleware::{from_fn, from_fn_with_state},
    response::Json,
    routing::get,
    Router,
};
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::database;
use crate::error::ApiError;
use crate::middleware::{
    body_limit_layer, format_errors, handle_panic, rate_limit, reject_disallowed_origin,
    require_ready, security_headers, static_routes, uniform_payload_too_large, ErrorPolicy,
    MemoryRateLimitStore, OriginPolicy, RateLimitStore, RateLimiter, Readiness,
};

pub use routes::{ApiGroup, ApiRoutes};

/// Assemble the full gatekeeper around the mounted route groups.
pub fn router(
    config: &AppConfig,
    routes: ApiRoutes,
    limiter: Arc<dyn RateLimitStore>,
    readiness: Readiness,
) -> Router {
    let origins = OriginPolicy::new(&config.security.allowed_origins);
    let rate = RateLimiter::new(limiter, config.security.trusted_proxy_hops);
    let errors = ErrorPolicy {
        expose_detail: config.security.expose_error_detail,
    };
    let max_body = config.api.max_request_size_bytes;

    let mut app = Router::new().route("/api/health", get(health));
    for (group, group_router) in routes.into_groups() {
        app = app.nest(group.prefix(), group_router);
    }

    app.merge(static_routes(&config.server.upload_dir))
        .fallback(not_found)
        .layer(from_fn_with_state(readiness, require_ready))
        // The tower-http limit below replaces axum's per-extractor default
        .layer(DefaultBodyLimit::disable())
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(from_fn_with_state(errors, format_errors))
        .layer(body_limit_layer(max_body))
        .layer(from_fn(uniform_payload_too_large))
        .layer(from_fn_with_state(rate, rate_limit))
        .layer(origins.cors_layer())
        .layer(from_fn_with_state(origins, reject_disallowed_origin))
        .layer(from_fn(security_headers))
        .layer(TraceLayer::new_for_http())
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "OK",
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
    }))
}

async fn not_found() -> ApiError {
    ApiError::route_not_found()
}

/// Bind, start the bootstrap and window purge in the background, and serve
/// until interrupted. API dispatch stays gated until the bootstrap attempt
/// has finished.
pub async fn serve(config: AppConfig, routes: ApiRoutes) -> anyhow::Result<()> {
    let store = Arc::new(MemoryRateLimitStore::from_config(&config));
    let readiness = Readiness::new();
    let app = router(&config, routes, store.clone(), readiness.clone());

    let bind_addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    info!("Server running on port {}", config.server.port);
    info!("Environment: {:?}", config.environment);

    spawn_bootstrap(&config, readiness);
    spawn_window_purge(store, config.rate_limit_window());

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Server stopped");
    Ok(())
}

fn spawn_bootstrap(config: &AppConfig, readiness: Readiness) {
    let database = config.database.clone();
    let scripts = config.bootstrap.clone();
    tokio::spawn(async move {
        database::ensure_initialized(&database, &scripts.schema_path, &scripts.seed_path).await;
        readiness.mark_ready();
        info!("Accepting API traffic");
    });
}

fn spawn_window_purge(store: Arc<MemoryRateLimitStore>, window: Duration) {
    let period = window.max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // First tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let purged = store.purge_expired();
            if purged > 0 {
                debug!(purged, remaining = store.tracked(), "Purged expired rate limit windows");
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
