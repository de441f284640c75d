//! Session Guard: an HTTP client that attaches the held bearer credential to
//! every outbound request and applies the expired-session policy to every
//! 401 response.

pub mod credentials;
pub mod navigation;

use reqwest::{header, Method, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::ClientConfig;

pub use credentials::{CredentialError, CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use navigation::{Location, Navigator, RouteClass, RouteTable};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Invalid URL {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error("Held credential is not a valid header value")]
    InvalidCredential,

    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Request failed with status {status}: {message}")]
    Status { status: StatusCode, message: String },
}

impl ClientError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::Status { status, .. } => Some(*status),
            ClientError::Transport(e) => e.status(),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(StatusCode::UNAUTHORIZED)
    }
}

/// What the guard does about a 401 at a given location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction {
    /// Leave credential and location alone.
    Keep,
    /// Drop the credential and force navigation to the login surface.
    EvictAndRedirect,
}

/// Only protected surfaces lose their session; auth and public surfaces keep
/// it, so the login page never redirects to itself.
pub fn session_expired_action(routes: &RouteTable, location: &str) -> SessionAction {
    match routes.classify(location) {
        RouteClass::Protected => SessionAction::EvictAndRedirect,
        RouteClass::Auth | RouteClass::Public => SessionAction::Keep,
    }
}

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    credentials: Arc<dyn CredentialStore>,
    navigator: Arc<dyn Navigator>,
    routes: Arc<RouteTable>,
}

impl ApiClient {
    pub fn new(
        config: &ClientConfig,
        credentials: Arc<dyn CredentialStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self, ClientError> {
        Url::parse(&config.base_url).map_err(|source| ClientError::InvalidUrl {
            url: config.base_url.clone(),
            source,
        })?;

        let http = reqwest::Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            credentials,
            navigator,
            routes: Arc::new(RouteTable::default()),
        })
    }

    pub fn with_routes(mut self, routes: RouteTable) -> Self {
        self.routes = Arc::new(routes);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Resolve `path` against the base URL. Absolute URLs are used as given.
    pub fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        if let Ok(url) = Url::parse(path) {
            if matches!(url.scheme(), "http" | "https") {
                return Ok(url);
            }
        }
        let joined = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        Url::parse(&joined).map_err(|source| ClientError::InvalidUrl { url: joined, source })
    }

    /// Build a request with the held credential attached. Fails without
    /// building anything if the credential cannot be read or sent.
    pub fn prepare(&self, method: Method, path: &str) -> Result<RequestBuilder, ClientError> {
        let url = self.endpoint(path)?;
        let builder = self.http.request(method, url);

        match self.credentials.load()? {
            Some(token) => {
                let mut value = header::HeaderValue::from_str(&format!("Bearer {}", token))
                    .map_err(|_| ClientError::InvalidCredential)?;
                value.set_sensitive(true);
                Ok(builder.header(header::AUTHORIZATION, value))
            }
            None => Ok(builder),
        }
    }

    /// Send a prepared request and apply the response policy. Non-2xx
    /// responses are returned as [`ClientError::Status`] after the policy ran.
    pub async fn send(&self, request: RequestBuilder) -> Result<Response, ClientError> {
        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED {
            self.handle_unauthorized();
        }

        if status.is_success() {
            return Ok(response);
        }

        let message = error_message(response).await;
        Err(ClientError::Status { status, message })
    }

    pub async fn get(&self, path: &str) -> Result<Response, ClientError> {
        self.send(self.prepare(Method::GET, path)?).await
    }

    pub async fn delete(&self, path: &str) -> Result<Response, ClientError> {
        self.send(self.prepare(Method::DELETE, path)?).await
    }

    pub async fn post_json<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Response, ClientError> {
        self.send(self.prepare(Method::POST, path)?.json(body)).await
    }

    pub async fn put_json<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Response, ClientError> {
        self.send(self.prepare(Method::PUT, path)?.json(body)).await
    }

    pub async fn patch_json<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Response, ClientError> {
        self.send(self.prepare(Method::PATCH, path)?.json(body)).await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        Ok(self.get(path).await?.json::<T>().await?)
    }

    /// Remember a credential obtained from a successful login.
    pub fn remember(&self, token: &str) -> Result<(), ClientError> {
        self.credentials.store(token)?;
        Ok(())
    }

    pub fn forget(&self) -> Result<(), ClientError> {
        self.credentials.clear()?;
        Ok(())
    }

    fn handle_unauthorized(&self) -> SessionAction {
        let location = self.navigator.current_path();
        let action = session_expired_action(&self.routes, &location);

        match action {
            SessionAction::Keep => {
                debug!(location = %location, "Unauthorized response outside a protected route");
            }
            SessionAction::EvictAndRedirect => {
                if let Err(e) = self.credentials.clear() {
                    warn!(error = %e, "Failed to clear held credential");
                }
                info!(location = %location, "Session expired, redirecting to login");
                self.navigator.replace(self.routes.login_path());
            }
        }

        action
    }
}

/// Best-effort human-readable message from an error response body.
async fn error_message(response: Response) -> String {
    let fallback = response
        .status()
        .canonical_reason()
        .unwrap_or("Request failed")
        .to_string();

    match response.text().await {
        Ok(body) if !body.trim().is_empty() => match serde_json::from_str::<Value>(&body) {
            Ok(json) => json
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or(body),
            Err(_) => body,
        },
        _ => fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(store: Arc<dyn CredentialStore>) -> ApiClient {
        ApiClient::new(&ClientConfig::default(), store, Arc::new(Location::new("/"))).unwrap()
    }

    #[test]
    fn attaches_bearer_credential_when_held() {
        let client = client(Arc::new(MemoryCredentialStore::with_token("tok-123")));
        let request = client.prepare(Method::GET, "/products").unwrap().build().unwrap();

        assert_eq!(request.url().as_str(), "http://localhost:5001/api/products");
        assert_eq!(request.headers()[header::AUTHORIZATION], "Bearer tok-123");
    }

    #[test]
    fn no_authorization_header_without_credential() {
        let client = client(Arc::new(MemoryCredentialStore::new()));
        let request = client.prepare(Method::POST, "cart").unwrap().build().unwrap();

        assert!(request.headers().get(header::AUTHORIZATION).is_none());
    }

    #[test]
    fn unsendable_credential_fails_before_sending() {
        let client = client(Arc::new(MemoryCredentialStore::with_token("bad\ntoken")));
        let err = client.prepare(Method::GET, "/products").unwrap_err();
        assert!(matches!(err, ClientError::InvalidCredential));
    }

    #[test]
    fn absolute_urls_bypass_base() {
        let client = client(Arc::new(MemoryCredentialStore::new()));
        let url = client.endpoint("https://cdn.example/img.png").unwrap();
        assert_eq!(url.as_str(), "https://cdn.example/img.png");
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let config = ClientConfig {
            base_url: "not a url".to_string(),
            ..ClientConfig::default()
        };
        let result = ApiClient::new(
            &config,
            Arc::new(MemoryCredentialStore::new()),
            Arc::new(Location::default()),
        );
        assert!(matches!(result, Err(ClientError::InvalidUrl { .. })));
    }

    #[test]
    fn policy_only_redirects_from_protected_routes() {
        let routes = RouteTable::default();
        assert_eq!(
            session_expired_action(&routes, "/admin/dashboard"),
            SessionAction::EvictAndRedirect
        );
        assert_eq!(session_expired_action(&routes, "/login"), SessionAction::Keep);
        assert_eq!(session_expired_action(&routes, "/products"), SessionAction::Keep);
    }
}
