use storefront_api::config::AppConfig;
use storefront_api::gatekeeper::{self, ApiRoutes};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DB_* and PORT
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::from_env();
    tracing::info!("Starting storefront API in {:?} mode", config.environment);

    // Business route groups are mounted by the deployment; none ship with the core
    gatekeeper::serve(config, ApiRoutes::new()).await
}
