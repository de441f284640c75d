//! SQL script loading and sanitization for the bootstrapper.
//!
//! The bootstrap connection already targets the configured database, so
//! directives in the scripts that create or select a database are removed
//! before execution.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

use super::bootstrap::BootstrapError;

static CREATE_DATABASE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^[ \t]*CREATE[ \t]+(?:DATABASE|SCHEMA)\b[^;]*;[ \t]*\r?\n?")
        .expect("valid CREATE DATABASE pattern")
});

static USE_DATABASE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^[ \t]*USE[ \t]+[^;]*;[ \t]*\r?\n?").expect("valid USE pattern")
});

/// Remove `CREATE DATABASE ...;` (and `CREATE SCHEMA ...;`) statements.
pub fn strip_create_database(sql: &str) -> String {
    CREATE_DATABASE.replace_all(sql, "").into_owned()
}

/// Remove `USE <db>;` statements.
pub fn strip_use(sql: &str) -> String {
    USE_DATABASE.replace_all(sql, "").into_owned()
}

pub fn prepare_schema_script(sql: &str) -> String {
    strip_use(&strip_create_database(sql))
}

pub fn prepare_seed_script(sql: &str) -> String {
    strip_use(sql)
}

/// True when the script has nothing left to execute once comments and
/// whitespace are ignored.
pub fn is_effectively_empty(sql: &str) -> bool {
    sql.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("--") && !line.starts_with('#'))
        .all(|line| line == ";")
}

pub async fn read_script(path: &Path) -> Result<String, BootstrapError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|source| BootstrapError::ScriptRead {
            path: path.to_path_buf(),
            source,
        })
}
