//! # sqlite-pg-migrate
//!
//! Copies the movies catalogue (people, genres, film works and the links
//! between them) from a SQLite file into an existing PostgreSQL schema.
//!
//! - **Batched streaming**: each table is read, mapped and inserted one
//!   batch at a time
//! - **Idempotent loads**: rows whose `id` already exists are skipped
//! - **Fresh or backfill** timestamps, with optional truncate-first
//!
//! ## Example
//!
//! ```rust,no_run
//! use sqlite_pg_migrate::{Config, Orchestrator};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> sqlite_pg_migrate::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let mut orchestrator = Orchestrator::new(config).await?;
//!     let result = orchestrator.run().await?;
//!     println!("Inserted {} rows", result.rows_inserted);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod mapper;
pub mod model;
pub mod orchestrator;
pub mod source;
pub mod target;

// Re-exports for convenient access
pub use config::{CommitMode, Config, LoadMode, MigrationConfig, SourceConfig, TargetConfig};
pub use error::{MigrateError, Result};
pub use orchestrator::{
    ensure_valid, HealthCheckResult, MigrationResult, Orchestrator, TableStats, ValidationReport,
};
pub use source::{SourceReader, SqliteReader};
pub use target::{PgWriter, SqlValue, TargetWriter};
