use clap::Subcommand;
use serde_json::json;

use crate::cli::utils::{output_details, output_success};
use crate::cli::OutputFormat;
use crate::client::{CredentialStore, FileCredentialStore};
use crate::config::ClientConfig;

#[derive(Subcommand)]
pub enum AuthCommands {
    #[command(about = "Show whether a credential is held")]
    Status,

    #[command(about = "Store a bearer token obtained from a login")]
    SetToken {
        #[arg(help = "Bearer token")]
        token: String,
    },

    #[command(about = "Discard the held credential")]
    Logout,
}

pub async fn handle(cmd: AuthCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    let store = FileCredentialStore::from_config(&ClientConfig::from_env())?;

    match cmd {
        AuthCommands::Status => {
            let held = store.load()?.is_some();
            output_details(
                &output_format,
                "Authentication",
                json!({
                    "authenticated": held,
                    "credential_path": store.path().display().to_string(),
                }),
            )
        }
        AuthCommands::SetToken { token } => {
            let token = token.trim();
            if token.is_empty() {
                anyhow::bail!("Token must not be empty");
            }
            store.store(token)?;
            output_success(&output_format, "Credential stored", None)
        }
        AuthCommands::Logout => {
            store.clear()?;
            output_success(&output_format, "Logged out", None)
        }
    }
}
