use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    pub security: SecurityConfig,
    pub bootstrap: BootstrapConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Production,
    /// Unset or any other value (staging, test, ...). Local origins apply but
    /// error detail stays private.
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub upload_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    pub user: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub port: u16,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub rate_limit_window_secs: u64,
    pub api_rate_limit: u32,
    pub image_rate_limit: u32,
    pub max_request_size_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
    pub expose_error_detail: bool,
    pub trusted_proxy_hops: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapConfig {
    pub schema_path: PathBuf,
    pub seed_path: PathBuf,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Resolve configuration from an arbitrary variable source.
    ///
    /// The environment preset is chosen first (`APP_ENV`, falling back to
    /// `NODE_ENV`), then individual variables override preset values. Only an
    /// explicit development environment exposes error detail.
    /// Values that fail to parse leave the preset untouched.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = match lookup("APP_ENV").or_else(|| lookup("NODE_ENV")).as_deref() {
            Some("development") | Some("dev") => Environment::Development,
            Some("production") | Some("prod") => Environment::Production,
            _ => Environment::Other,
        };

        match environment {
            Environment::Production => Self::production(),
            Environment::Development => Self::development(),
            Environment::Other => Self::other(),
        }
        .with_overrides(lookup)
    }

    fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        // Server overrides
        if let Some(v) = lookup("PORT") {
            self.server.port = v.parse().unwrap_or(self.server.port);
        }
        if let Some(v) = lookup("UPLOAD_DIR") {
            self.server.upload_dir = PathBuf::from(v);
        }

        // Database overrides
        if let Some(v) = lookup("DB_HOST") {
            self.database.host = v;
        }
        if let Some(v) = lookup("DB_USER") {
            self.database.user = v;
        }
        if let Some(v) = lookup("DB_PASSWORD") {
            self.database.password = v;
        }
        if let Some(v) = lookup("DB_PORT") {
            self.database.port = v.parse().unwrap_or(self.database.port);
        }
        if let Some(v) = lookup("DB_NAME") {
            self.database.name = v;
        }

        // API overrides
        if let Some(v) = lookup("RATE_LIMIT_WINDOW_SECS") {
            self.api.rate_limit_window_secs = v.parse().unwrap_or(self.api.rate_limit_window_secs);
        }
        if let Some(v) = lookup("API_RATE_LIMIT") {
            self.api.api_rate_limit = v.parse().unwrap_or(self.api.api_rate_limit);
        }
        if let Some(v) = lookup("IMAGE_RATE_LIMIT") {
            self.api.image_rate_limit = v.parse().unwrap_or(self.api.image_rate_limit);
        }
        if let Some(v) = lookup("MAX_BODY_BYTES") {
            self.api.max_request_size_bytes = v.parse().unwrap_or(self.api.max_request_size_bytes);
        }

        // Security overrides
        if let Some(v) = lookup("CORS_ORIGINS") {
            self.security.allowed_origins = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(v) = lookup("EXPOSE_ERROR_DETAIL") {
            self.security.expose_error_detail = v.parse().unwrap_or(self.security.expose_error_detail);
        }
        if let Some(v) = lookup("TRUST_PROXY_HOPS") {
            self.security.trusted_proxy_hops = v.parse().unwrap_or(self.security.trusted_proxy_hops);
        }

        // Bootstrap overrides
        if let Some(v) = lookup("SCHEMA_PATH") {
            self.bootstrap.schema_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("SEED_PATH") {
            self.bootstrap.seed_path = PathBuf::from(v);
        }

        self
    }

    pub fn development() -> Self {
        Self {
            environment: Environment::Development,
            security: SecurityConfig {
                allowed_origins: vec!["http://localhost:3000".to_string()],
                expose_error_detail: true,
                trusted_proxy_hops: 1,
            },
            ..Self::base()
        }
    }

    pub fn production() -> Self {
        Self {
            environment: Environment::Production,
            security: SecurityConfig {
                allowed_origins: vec!["https://yourdomain.com".to_string()],
                expose_error_detail: false,
                trusted_proxy_hops: 1,
            },
            ..Self::base()
        }
    }

    /// Non-production origins without development error detail.
    pub fn other() -> Self {
        Self {
            environment: Environment::Other,
            security: SecurityConfig {
                allowed_origins: vec!["http://localhost:3000".to_string()],
                expose_error_detail: false,
                trusted_proxy_hops: 1,
            },
            ..Self::base()
        }
    }

    // Settings shared by every environment
    fn base() -> Self {
        Self {
            environment: Environment::Development,
            server: ServerConfig {
                port: 5000,
                upload_dir: PathBuf::from("uploads"),
            },
            database: DatabaseConfig {
                host: "localhost".to_string(),
                user: "root".to_string(),
                password: String::new(),
                port: 3306,
                name: "storefront".to_string(),
            },
            api: ApiConfig {
                rate_limit_window_secs: 15 * 60,
                api_rate_limit: 200,
                image_rate_limit: 500,
                max_request_size_bytes: 10 * 1024 * 1024, // 10MB
            },
            security: SecurityConfig {
                allowed_origins: Vec::new(),
                expose_error_detail: false,
                trusted_proxy_hops: 1,
            },
            bootstrap: BootstrapConfig {
                schema_path: PathBuf::from("database/schema.sql"),
                seed_path: PathBuf::from("database/seeds.sql"),
            },
        }
    }

    pub fn is_development(&self) -> bool {
        self.environment == Environment::Development
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.api.rate_limit_window_secs)
    }
}

/// Settings for the outbound API client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub credential_dir: Option<PathBuf>,
}

impl ClientConfig {
    pub const DEFAULT_BASE_URL: &'static str = "http://localhost:5001/api";

    pub fn from_env() -> Self {
        Self {
            base_url: env::var("STOREFRONT_API_URL").unwrap_or_else(|_| Self::DEFAULT_BASE_URL.to_string()),
            timeout: Duration::from_secs(10),
            credential_dir: env::var("STOREFRONT_CONFIG_DIR").ok().map(PathBuf::from),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: Self::DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(10),
            credential_dir: None,
        }
    }
}
