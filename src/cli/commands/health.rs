use serde_json::Value;
use std::sync::Arc;

use crate::cli::utils::output_details;
use crate::cli::OutputFormat;
use crate::client::{ApiClient, FileCredentialStore, Location};
use crate::config::ClientConfig;

pub async fn handle(output_format: OutputFormat) -> anyhow::Result<()> {
    let config = ClientConfig::from_env();
    let store = FileCredentialStore::from_config(&config)?;
    let client = ApiClient::new(&config, Arc::new(store), Arc::new(Location::default()))?;

    let body: Value = client.get_json("/health").await?;
    output_details(&output_format, &format!("Server {}", client.base_url()), body)
}
