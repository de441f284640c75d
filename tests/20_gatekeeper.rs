mod common;

use anyhow::Result;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::routing::{get, post};
use axum::Router;
use serde_json::json;

use common::{assert_status, body_json, body_text, TestApp};
use storefront_api::config::AppConfig;
use storefront_api::error::ApiError;
use storefront_api::gatekeeper::{ApiGroup, ApiRoutes};
use storefront_api::middleware::Readiness;

fn catalog_routes() -> ApiRoutes {
    ApiRoutes::new()
        .mount(
            ApiGroup::Products,
            Router::new()
                .route("/", get(|| async { axum::Json(json!([{ "id": 1 }])) }))
                .route("/broken", get(|| async { Err::<(), _>(ApiError::internal("pool exhausted")) }))
                .route("/panics", get(panicking_handler)),
        )
        .mount(ApiGroup::Auth, Router::new().route("/login", post(|body: String| async move { body })))
}

async fn panicking_handler() -> &'static str {
    panic!("inventory index out of range")
}

fn small_limits() -> AppConfig {
    let mut config = AppConfig::development();
    config.api.api_rate_limit = 3;
    config.api.image_rate_limit = 5;
    config
}

#[tokio::test]
async fn mounted_group_receives_requests_under_its_prefix() -> Result<()> {
    let app = TestApp::new(AppConfig::development(), catalog_routes())?;

    let res = app.get("/api/products").await?;
    assert_status(&res, StatusCode::OK);
    assert_eq!(body_json(res).await?, json!([{ "id": 1 }]));
    Ok(())
}

#[tokio::test]
async fn unmounted_group_and_unknown_paths_get_404() -> Result<()> {
    let app = TestApp::new(AppConfig::development(), catalog_routes())?;

    for uri in ["/api/orders", "/api/nonexistent", "/nowhere", "/uploads/missing.png"] {
        let res = app.get(uri).await?;
        assert_status(&res, StatusCode::NOT_FOUND);
        assert_eq!(body_json(res).await?, json!({ "message": "Route not found" }));
    }
    Ok(())
}

#[tokio::test]
async fn api_tier_returns_429_after_cap() -> Result<()> {
    let app = TestApp::new(small_limits(), catalog_routes())?;

    for expected_remaining in ["2", "1", "0"] {
        let res = app.get("/api/health").await?;
        assert_status(&res, StatusCode::OK);
        assert_eq!(res.headers()["x-ratelimit-limit"], "3");
        assert_eq!(res.headers()["x-ratelimit-remaining"], expected_remaining);
    }

    let res = app.get("/api/products").await?;
    assert_status(&res, StatusCode::TOO_MANY_REQUESTS);
    assert!(res.headers().contains_key(header::RETRY_AFTER));
    assert_eq!(
        body_text(res).await?,
        "Too many API requests from this IP, please try again later."
    );

    // Image tier keeps its own budget
    let res = app.get("/images/logo.svg").await?;
    assert_status(&res, StatusCode::OK);
    assert_eq!(res.headers()["x-ratelimit-limit"], "5");
    Ok(())
}

#[tokio::test]
async fn forwarded_clients_are_limited_separately() -> Result<()> {
    let app = TestApp::new(small_limits(), catalog_routes())?;

    let request = |client: &str| {
        Request::builder()
            .uri("/api/health")
            .header("x-forwarded-for", client)
            .body(Body::empty())
    };

    for _ in 0..3 {
        assert_status(&app.send(request("203.0.113.7")?).await?, StatusCode::OK);
    }
    assert_status(&app.send(request("203.0.113.7")?).await?, StatusCode::TOO_MANY_REQUESTS);
    assert_status(&app.send(request("198.51.100.2")?).await?, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn paths_outside_both_tiers_are_not_counted() -> Result<()> {
    let app = TestApp::new(small_limits(), catalog_routes())?;

    for _ in 0..10 {
        let res = app.get("/").await?;
        assert_status(&res, StatusCode::NOT_FOUND);
        assert!(res.headers().get("x-ratelimit-limit").is_none());
    }
    Ok(())
}

#[tokio::test]
async fn disallowed_origin_is_rejected() -> Result<()> {
    let app = TestApp::new(AppConfig::development(), catalog_routes())?;

    let res = app
        .send(
            Request::builder()
                .uri("/api/products")
                .header(header::ORIGIN, "http://evil.example")
                .body(Body::empty())?,
        )
        .await?;
    assert_status(&res, StatusCode::FORBIDDEN);
    assert!(res.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
    assert_eq!(body_json(res).await?, json!({ "message": "Origin not allowed" }));
    Ok(())
}

#[tokio::test]
async fn allowed_origin_gets_credentialed_cors() -> Result<()> {
    let app = TestApp::new(AppConfig::development(), catalog_routes())?;

    let res = app
        .send(
            Request::builder()
                .uri("/api/products")
                .header(header::ORIGIN, "http://localhost:3000")
                .body(Body::empty())?,
        )
        .await?;
    assert_status(&res, StatusCode::OK);
    assert_eq!(res.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "http://localhost:3000");
    assert_eq!(res.headers()[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");

    let preflight = app
        .send(
            Request::builder()
                .method(Method::OPTIONS)
                .uri("/api/auth/login")
                .header(header::ORIGIN, "http://localhost:3000")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type,authorization")
                .body(Body::empty())?,
        )
        .await?;
    assert!(preflight.status().is_success());
    assert_eq!(preflight.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "http://localhost:3000");
    Ok(())
}

#[tokio::test]
async fn production_origin_list_excludes_localhost() -> Result<()> {
    let app = TestApp::new(AppConfig::production(), catalog_routes())?;

    let res = app
        .send(
            Request::builder()
                .uri("/api/health")
                .header(header::ORIGIN, "http://localhost:3000")
                .body(Body::empty())?,
        )
        .await?;
    assert_status(&res, StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn oversized_body_is_rejected_before_dispatch() -> Result<()> {
    let mut config = AppConfig::development();
    config.api.max_request_size_bytes = 16;
    let app = TestApp::new(config, catalog_routes())?;

    let res = app
        .send(
            Request::builder()
                .method(Method::POST)
                .uri("/api/auth/login")
                .header(header::CONTENT_LENGTH, "64")
                .body(Body::from(vec![b'a'; 64]))?,
        )
        .await?;
    assert_status(&res, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body_json(res).await?, json!({ "message": "Request entity too large" }));

    let res = app
        .send(
            Request::builder()
                .method(Method::POST)
                .uri("/api/auth/login")
                .header(header::CONTENT_LENGTH, "5")
                .body(Body::from("hello"))?,
        )
        .await?;
    assert_status(&res, StatusCode::OK);
    assert_eq!(body_text(res).await?, "hello");
    Ok(())
}

#[tokio::test]
async fn undeclared_body_over_limit_is_rejected() -> Result<()> {
    let mut config = AppConfig::development();
    config.api.max_request_size_bytes = 16;
    let app = TestApp::new(config, catalog_routes())?;

    // No Content-Length: the limit trips while the handler reads the body
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/auth/login")
        .header(header::TRANSFER_ENCODING, "chunked")
        .body(Body::from(vec![b'a'; 64]))?;
    assert!(request.headers().get(header::CONTENT_LENGTH).is_none());

    let res = app.send(request).await?;
    assert_status(&res, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body_json(res).await?, json!({ "message": "Request entity too large" }));
    Ok(())
}

#[tokio::test]
async fn internal_errors_expose_detail_in_development() -> Result<()> {
    let app = TestApp::new(AppConfig::development(), catalog_routes())?;

    let res = app.get("/api/products/broken").await?;
    assert_status(&res, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body_json(res).await?,
        json!({ "message": "Something went wrong!", "error": "pool exhausted" })
    );
    Ok(())
}

#[tokio::test]
async fn internal_errors_withhold_detail_in_production() -> Result<()> {
    let mut config = AppConfig::production();
    config.security.allowed_origins = vec!["https://shop.example".to_string()];
    let app = TestApp::new(config, catalog_routes())?;

    let res = app.get("/api/products/broken").await?;
    assert_status(&res, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body_json(res).await?,
        json!({ "message": "Something went wrong!", "error": {} })
    );
    Ok(())
}

#[tokio::test]
async fn handler_panic_becomes_formatted_500() -> Result<()> {
    let app = TestApp::new(AppConfig::development(), catalog_routes())?;

    let res = app.get("/api/products/panics").await?;
    assert_status(&res, StatusCode::INTERNAL_SERVER_ERROR);
    // Security headers still wrap the recovered response
    assert_eq!(res.headers()["x-frame-options"], "DENY");
    let body = body_json(res).await?;
    assert_eq!(body["message"], "Something went wrong!");
    assert_eq!(body["error"], "inventory index out of range");

    // The server keeps serving afterwards
    assert_status(&app.get("/api/products").await?, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn api_is_gated_until_bootstrap_finishes() -> Result<()> {
    let app = TestApp::with_readiness(AppConfig::development(), catalog_routes(), Readiness::new())?;

    let res = app.get("/api/products").await?;
    assert_status(&res, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(res).await?, json!({ "message": "Service is starting up" }));

    // Liveness and static assets are never gated
    assert_status(&app.get("/api/health").await?, StatusCode::OK);
    assert_status(&app.get("/images/logo.svg").await?, StatusCode::OK);

    app.readiness.mark_ready();
    assert_status(&app.get("/api/products").await?, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn uploads_are_served_from_the_upload_directory() -> Result<()> {
    let app = TestApp::new(AppConfig::development(), catalog_routes())?;

    let res = app.get("/uploads/banner.txt").await?;
    assert_status(&res, StatusCode::OK);
    assert_eq!(body_text(res).await?, "welcome");

    let res = app.get("/images/logo.svg").await?;
    assert_status(&res, StatusCode::OK);
    assert_eq!(res.headers()[header::CONTENT_TYPE], "image/svg+xml");

    std::fs::write(app.upload_path().join("images").join("new.svg"), common::SVG)?;
    assert_status(&app.get("/images/new.svg").await?, StatusCode::OK);
    Ok(())
}
