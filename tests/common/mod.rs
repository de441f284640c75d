#![allow(dead_code)]

use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use storefront_api::config::AppConfig;
use storefront_api::gatekeeper::{self, ApiRoutes};
use storefront_api::middleware::{MemoryRateLimitStore, Readiness};

static SERVER: OnceLock<TestServer> = OnceLock::new();

pub const SVG: &str = r#"<svg xmlns="http://www.w3.org/2000/svg" width="1" height="1"/>"#;

pub struct TestServer {
    pub port: u16,
    pub base_url: String,
    _uploads: TempDir,
    child: Child,
}

impl TestServer {
    fn spawn() -> Result<Self> {
        // Pick an unused port for isolation
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        // Nothing listens here, so the startup bootstrap fails fast and is logged
        let db_port = portpicker::pick_unused_port().context("failed to pick free db port")?;
        let base_url = format!("http://127.0.0.1:{}", port);
        let uploads = upload_dir()?;

        let child = Command::new(env!("CARGO_BIN_EXE_storefront-api"))
            .env("PORT", port.to_string())
            .env("APP_ENV", "development")
            .env("DB_HOST", "127.0.0.1")
            .env("DB_PORT", db_port.to_string())
            .env("UPLOAD_DIR", uploads.path())
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .context("failed to spawn server binary")?;

        Ok(Self {
            port,
            base_url,
            _uploads: uploads,
            child,
        })
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let client = reqwest::Client::new();
        let deadline = Instant::now() + timeout;
        loop {
            if Instant::now() > deadline {
                break;
            }
            let url = format!("{}/api/health", self.base_url);
            if let Ok(resp) = client.get(&url).send().await {
                if resp.status() == reqwest::StatusCode::OK {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(150)).await;
        }
        anyhow::bail!("server did not become ready on {} within {:?}", self.base_url, timeout)
    }
}

impl TestServer {
    /// Poll `path` until the API gate opens, returning the first response
    /// that is not 503.
    pub async fn get_when_ready(&self, path: &str, timeout: Duration) -> Result<reqwest::Response> {
        let client = reqwest::Client::new();
        let url = format!("{}{}", self.base_url, path);
        let deadline = Instant::now() + timeout;
        loop {
            let resp = client.get(&url).send().await?;
            if resp.status() != reqwest::StatusCode::SERVICE_UNAVAILABLE {
                return Ok(resp);
            }
            if Instant::now() > deadline {
                anyhow::bail!("{} still gated after {:?}", url, timeout);
            }
            tokio::time::sleep(Duration::from_millis(150)).await;
        }
    }
}

pub async fn ensure_server() -> Result<&'static TestServer> {
    let server = SERVER.get_or_init(|| TestServer::spawn().expect("failed to spawn server binary"));
    server.wait_ready(Duration::from_secs(10)).await?;
    Ok(server)
}

/// Temporary upload directory with `images/logo.svg` and `banner.txt`.
pub fn upload_dir() -> Result<TempDir> {
    let dir = tempfile::tempdir()?;
    std::fs::create_dir_all(dir.path().join("images"))?;
    std::fs::write(dir.path().join("images").join("logo.svg"), SVG)?;
    std::fs::write(dir.path().join("banner.txt"), "welcome")?;
    Ok(dir)
}

/// An in-process gatekeeper with its own upload directory and rate limiter.
pub struct TestApp {
    pub router: Router,
    pub readiness: Readiness,
    _uploads: TempDir,
}

impl TestApp {
    pub fn new(config: AppConfig, routes: ApiRoutes) -> Result<Self> {
        Self::with_readiness(config, routes, Readiness::ready())
    }

    pub fn with_readiness(mut config: AppConfig, routes: ApiRoutes, readiness: Readiness) -> Result<Self> {
        let uploads = upload_dir()?;
        config.server.upload_dir = uploads.path().to_path_buf();
        let store = Arc::new(MemoryRateLimitStore::from_config(&config));
        let router = gatekeeper::router(&config, routes, store, readiness.clone());
        Ok(Self {
            router,
            readiness,
            _uploads: uploads,
        })
    }

    pub fn upload_path(&self) -> &Path {
        self._uploads.path()
    }

    pub async fn send(&self, request: Request<Body>) -> Result<Response> {
        Ok(self.router.clone().oneshot(request).await?)
    }

    pub async fn get(&self, uri: &str) -> Result<Response> {
        self.send(Request::builder().uri(uri).body(Body::empty())?).await
    }
}

pub async fn body_text(response: Response) -> Result<String> {
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    Ok(String::from_utf8(bytes.to_vec())?)
}

pub async fn body_json(response: Response) -> Result<Value> {
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

pub fn assert_status(response: &Response, expected: StatusCode) {
    assert_eq!(response.status(), expected, "unexpected status, headers: {:?}", response.headers());
}
