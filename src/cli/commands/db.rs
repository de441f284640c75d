use clap::Subcommand;
use serde_json::json;
use std::path::PathBuf;

use crate::cli::utils::{output_details, output_success};
use crate::cli::OutputFormat;
use crate::config::AppConfig;
use crate::database::{self, BootstrapOutcome, MySqlTarget, SchemaTarget};

#[derive(Subcommand)]
pub enum DbCommands {
    #[command(about = "Run schema and seed scripts against the server (one-shot maintenance)")]
    Init {
        #[arg(long, help = "Schema script (defaults to SCHEMA_PATH)")]
        schema: Option<PathBuf>,
        #[arg(long, help = "Seed script (defaults to SEED_PATH)")]
        seed: Option<PathBuf>,
    },

    #[command(about = "Initialize the configured database only if it has no tables")]
    Ensure,

    #[command(about = "Show whether the configured database is initialized")]
    Status,
}

pub async fn handle(cmd: DbCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    let config = AppConfig::from_env();

    match cmd {
        DbCommands::Init { schema, seed } => {
            let schema = schema.unwrap_or(config.bootstrap.schema_path);
            let seed = seed.unwrap_or(config.bootstrap.seed_path);

            database::initialize_server(&config.database, &schema, &seed)
                .await
                .map_err(|e| anyhow::anyhow!("Database initialization failed: {}", e))?;

            output_success(&output_format, "Database initialization complete!", None)
        }
        DbCommands::Ensure => {
            let outcome = database::try_ensure_initialized(
                &config.database,
                &config.bootstrap.schema_path,
                &config.bootstrap.seed_path,
            )
            .await?;

            let message = match outcome {
                BootstrapOutcome::Initialized => "Database initialized",
                BootstrapOutcome::AlreadyInitialized => "Database already initialized",
            };
            output_success(
                &output_format,
                message,
                Some(json!({ "initialized_now": outcome == BootstrapOutcome::Initialized })),
            )
        }
        DbCommands::Status => {
            let mut target = MySqlTarget::connect(&config.database).await?;
            let tables = target.table_count().await;
            target.close().await?;
            let tables = tables?;

            output_details(
                &output_format,
                &format!("Database '{}'", config.database.name),
                json!({
                    "database": config.database.name,
                    "host": format!("{}:{}", config.database.host, config.database.port),
                    "tables": tables,
                    "initialized": tables > 0,
                }),
            )
        }
    }
}
