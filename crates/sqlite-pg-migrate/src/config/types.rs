//! Configuration type definitions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source database configuration (SQLite file).
    pub source: SourceConfig,

    /// Target database configuration (PostgreSQL).
    pub target: TargetConfig,

    /// Migration behavior configuration.
    #[serde(default)]
    pub migration: MigrationConfig,
}

/// Source database (SQLite) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Path to the SQLite database file.
    pub path: PathBuf,
}

/// Target database (PostgreSQL) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 5432).
    #[serde(default = "default_pg_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Target schema (default: "content").
    #[serde(default = "default_content_schema")]
    pub schema: String,

    /// SSL mode (default: "disable").
    #[serde(default = "default_disable")]
    pub ssl_mode: String,
}

impl fmt::Debug for TargetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("schema", &self.schema)
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

/// Migration behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Rows per source read and per insert statement (default: 100).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Whether timestamps are copied or stamped at load time (default: backfill).
    #[serde(default)]
    pub load_mode: LoadMode,

    /// Empty all five target tables before loading (default: false).
    #[serde(default)]
    pub truncate_first: bool,

    /// Transaction granularity (default: per_table).
    #[serde(default)]
    pub commit_mode: CommitMode,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            load_mode: LoadMode::default(),
            truncate_first: false,
            commit_mode: CommitMode::default(),
        }
    }
}

/// How record timestamps are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadMode {
    /// Parse and copy `created`/`modified` from the source.
    #[default]
    Backfill,

    /// Stamp `created`/`modified` with the current UTC time.
    Fresh,
}

impl std::str::FromStr for LoadMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "backfill" => Ok(LoadMode::Backfill),
            "fresh" => Ok(LoadMode::Fresh),
            other => Err(format!(
                "invalid load mode '{}', expected 'fresh' or 'backfill'",
                other
            )),
        }
    }
}

/// When the target transaction is committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitMode {
    /// Commit after every insert batch.
    PerBatch,

    /// Commit once each table is fully loaded.
    #[default]
    PerTable,

    /// One transaction around the truncate and all five tables.
    Run,
}

// Default value functions for serde
fn default_pg_port() -> u16 {
    5432
}

fn default_content_schema() -> String {
    "content".to_string()
}

fn default_disable() -> String {
    "disable".to_string()
}

fn default_batch_size() -> usize {
    100
}
