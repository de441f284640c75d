//! Idempotent database bootstrap.
//!
//! On server start the configured schema is inspected; only when it holds no
//! tables at all are the schema and seed scripts applied. A schema left
//! half-created by an earlier crash is not detected and needs manual repair.
//! Two processes bootstrapping the same empty database at the same time are
//! not excluded from each other here; run a single bootstrap process.

use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::{ConnectOptions, Connection, Executor};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{error, info, warn};

use super::script;
use crate::config::DatabaseConfig;

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("Failed to connect to database server: {0}")]
    Connect(#[source] sqlx::Error),

    #[error("Failed to inspect table catalog: {0}")]
    Inspect(#[source] sqlx::Error),

    #[error("Failed to read script {path}: {source}")]
    ScriptRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{phase} script failed: {source}")]
    Execute {
        phase: Phase,
        #[source]
        source: sqlx::Error,
    },

    #[error("Failed to close connection: {0}")]
    Close(#[source] sqlx::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Schema,
    Seed,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Schema => write!(f, "Schema"),
            Phase::Seed => write!(f, "Seed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapOutcome {
    Initialized,
    AlreadyInitialized,
}

/// A database the bootstrapper can inspect and write to.
#[async_trait]
pub trait SchemaTarget: Send {
    /// Number of tables in the target schema.
    async fn table_count(&mut self) -> Result<i64, BootstrapError>;

    /// Execute a script of semicolon-delimited statements in one call.
    async fn execute_batch(&mut self, phase: Phase, sql: &str) -> Result<(), BootstrapError>;

    async fn close(&mut self) -> Result<(), BootstrapError>;
}

/// Locations of the schema and seed scripts.
#[derive(Debug, Clone)]
pub struct Bootstrapper {
    schema_path: PathBuf,
    seed_path: PathBuf,
}

impl Bootstrapper {
    pub fn new(schema_path: impl Into<PathBuf>, seed_path: impl Into<PathBuf>) -> Self {
        Self {
            schema_path: schema_path.into(),
            seed_path: seed_path.into(),
        }
    }

    /// Apply schema and seed once, if and only if the target has no tables.
    pub async fn ensure_initialized<T>(&self, target: &mut T) -> Result<BootstrapOutcome, BootstrapError>
    where
        T: SchemaTarget + ?Sized,
    {
        let tables = target.table_count().await?;
        if tables > 0 {
            info!(tables, "Database already initialized");
            return Ok(BootstrapOutcome::AlreadyInitialized);
        }

        info!("No tables found. Initializing database...");

        let schema = script::read_script(&self.schema_path).await?;
        self.run(target, Phase::Schema, &script::prepare_schema_script(&schema)).await?;
        info!(path = %self.schema_path.display(), "Schema created");

        let seeds = script::read_script(&self.seed_path).await?;
        self.run(target, Phase::Seed, &script::prepare_seed_script(&seeds)).await?;
        info!(path = %self.seed_path.display(), "Sample data inserted");

        info!("Database initialization complete");
        Ok(BootstrapOutcome::Initialized)
    }

    /// Run both scripts verbatim. Used by the standalone maintenance command,
    /// whose scripts create and select the database themselves.
    pub async fn initialize<T>(&self, target: &mut T) -> Result<(), BootstrapError>
    where
        T: SchemaTarget + ?Sized,
    {
        let schema = script::read_script(&self.schema_path).await?;
        info!("Executing schema...");
        self.run(target, Phase::Schema, &schema).await?;
        info!("Schema created successfully");

        let seeds = script::read_script(&self.seed_path).await?;
        info!("Executing seeds...");
        self.run(target, Phase::Seed, &seeds).await?;
        info!("Seeds inserted successfully");

        Ok(())
    }

    async fn run<T>(&self, target: &mut T, phase: Phase, sql: &str) -> Result<(), BootstrapError>
    where
        T: SchemaTarget + ?Sized,
    {
        if script::is_effectively_empty(sql) {
            warn!(%phase, "Script has no statements, skipping");
            return Ok(());
        }
        target.execute_batch(phase, sql).await
    }
}

/// A single MySQL connection with multi-statement support.
pub struct MySqlTarget {
    conn: Option<MySqlConnection>,
}

impl MySqlTarget {
    /// Connect to the configured database.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, BootstrapError> {
        Self::connect_with(Self::options(config).database(&config.name)).await
    }

    /// Connect to the server without selecting a database.
    pub async fn connect_server(config: &DatabaseConfig) -> Result<Self, BootstrapError> {
        Self::connect_with(Self::options(config)).await
    }

    async fn connect_with(options: MySqlConnectOptions) -> Result<Self, BootstrapError> {
        let conn = options.connect().await.map_err(BootstrapError::Connect)?;
        Ok(Self { conn: Some(conn) })
    }

    fn options(config: &DatabaseConfig) -> MySqlConnectOptions {
        MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
    }

    fn conn(&mut self) -> Result<&mut MySqlConnection, BootstrapError> {
        self.conn
            .as_mut()
            .ok_or(BootstrapError::Connect(sqlx::Error::PoolClosed))
    }
}

#[async_trait]
impl SchemaTarget for MySqlTarget {
    async fn table_count(&mut self) -> Result<i64, BootstrapError> {
        let conn = self.conn()?;
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM information_schema.tables WHERE table_schema = DATABASE()",
        )
        .fetch_one(conn)
        .await
        .map_err(BootstrapError::Inspect)
    }

    async fn execute_batch(&mut self, phase: Phase, sql: &str) -> Result<(), BootstrapError> {
        let conn = self.conn()?;
        // Unprepared text-protocol query, so multiple statements are accepted
        conn.execute(sql)
            .await
            .map(|_| ())
            .map_err(|source| BootstrapError::Execute { phase, source })
    }

    async fn close(&mut self) -> Result<(), BootstrapError> {
        if let Some(conn) = self.conn.take() {
            conn.close().await.map_err(BootstrapError::Close)?;
        }
        Ok(())
    }
}

/// Close `target` after a bootstrap attempt, keeping the attempt's error
/// when both fail.
async fn finish<T, R>(target: &mut T, result: Result<R, BootstrapError>) -> Result<R, BootstrapError>
where
    T: SchemaTarget + ?Sized,
{
    let closed = target.close().await;
    match (result, closed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(close_err)) => Err(close_err),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(close_err)) => {
            warn!(error = %close_err, "Failed to close connection after bootstrap error");
            Err(err)
        }
    }
}

/// Bootstrap the configured database, surfacing any error.
pub async fn try_ensure_initialized(
    config: &DatabaseConfig,
    schema_path: &Path,
    seed_path: &Path,
) -> Result<BootstrapOutcome, BootstrapError> {
    let bootstrapper = Bootstrapper::new(schema_path, seed_path);
    let mut target = MySqlTarget::connect(config).await?;
    let result = bootstrapper.ensure_initialized(&mut target).await;
    finish(&mut target, result).await
}

/// Bootstrap the configured database on server start. Errors are logged and
/// swallowed so the server keeps running in a degraded state.
pub async fn ensure_initialized(config: &DatabaseConfig, schema_path: &Path, seed_path: &Path) {
    if let Err(e) = try_ensure_initialized(config, schema_path, seed_path).await {
        error!(error = %e, "Database initialization check failed");
    }
}

/// Standalone maintenance bootstrap: connect to the server without selecting
/// a database and run both scripts as written.
pub async fn initialize_server(
    config: &DatabaseConfig,
    schema_path: &Path,
    seed_path: &Path,
) -> Result<(), BootstrapError> {
    let bootstrapper = Bootstrapper::new(schema_path, seed_path);
    let mut target = MySqlTarget::connect_server(config).await?;
    info!(host = %config.host, port = config.port, "Connected to MySQL server");
    let result = bootstrapper.initialize(&mut target).await;
    finish(&mut target, result).await?;
    info!("Database initialization complete!");
    Ok(())
}
