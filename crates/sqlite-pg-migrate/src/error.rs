//! Error types for the migration library.

use thiserror::Error;
use tokio_postgres::error::SqlState;

/// Exit code for configuration errors.
pub const EXIT_CONFIG_ERROR: u8 = 1;
/// Exit code for unreachable source or target.
pub const EXIT_CONNECTION_ERROR: u8 = 2;
/// Exit code for malformed source values.
pub const EXIT_PARSE_ERROR: u8 = 3;
/// Exit code for integrity violations raised while loading.
pub const EXIT_CONSTRAINT_ERROR: u8 = 4;
/// Exit code for any other runtime failure.
pub const EXIT_RUNTIME_ERROR: u8 = 5;
/// Exit code for row-count mismatches found by `validate`.
pub const EXIT_VALIDATION_ERROR: u8 = 6;
/// Exit code for file I/O errors.
pub const EXIT_IO_ERROR: u8 = 7;

/// Which end of the pipeline a connection error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Source,
    Target,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Source => f.write_str("source"),
            Side::Target => f.write_str("target"),
        }
    }
}

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Source or target store could not be opened.
    #[error("Cannot connect to {side} database: {message}")]
    Connection { side: Side, message: String },

    /// Table is absent from the source store.
    #[error("Source table '{0}' does not exist")]
    MissingTable(String),

    /// A source value could not be converted into its typed field.
    #[error("Cannot parse {table}.{column} for row {row_id}: {message}")]
    Parse {
        table: String,
        row_id: String,
        column: String,
        message: String,
    },

    /// Integrity rule rejected a row (bounds, FK, uniqueness).
    #[error("Constraint violation in {table}: {message}")]
    ConstraintViolation { table: String, message: String },

    /// Source database query error
    #[error("Source database error: {0}")]
    Source(#[from] rusqlite::Error),

    /// Target database query error
    #[error("Target database error: {0}")]
    Target(#[from] tokio_postgres::Error),

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// Any failure attributed to the table that was loading when it happened.
    #[error("Migration failed at table {table}")]
    Table {
        table: String,
        #[source]
        source: Box<MigrateError>,
    },

    /// Row count validation failed
    #[error("Validation failed: {0}")]
    Validation(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MigrateError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl std::fmt::Display, context: impl Into<String>) -> Self {
        MigrateError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a Connection error.
    pub fn connection(side: Side, message: impl std::fmt::Display) -> Self {
        MigrateError::Connection {
            side,
            message: message.to_string(),
        }
    }

    /// Create a Parse error for one column of one row.
    pub fn parse(
        table: impl Into<String>,
        row_id: impl Into<String>,
        column: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        MigrateError::Parse {
            table: table.into(),
            row_id: row_id.into(),
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a ConstraintViolation error.
    pub fn constraint(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::ConstraintViolation {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Classify a PostgreSQL error raised while writing `table`.
    ///
    /// Integrity-class SQLSTATEs become [`MigrateError::ConstraintViolation`];
    /// everything else stays a plain target error.
    pub fn from_target(table: &str, err: tokio_postgres::Error) -> Self {
        let integrity = [
            SqlState::FOREIGN_KEY_VIOLATION,
            SqlState::UNIQUE_VIOLATION,
            SqlState::CHECK_VIOLATION,
            SqlState::NOT_NULL_VIOLATION,
            SqlState::INTEGRITY_CONSTRAINT_VIOLATION,
        ];
        match err.code() {
            Some(code) if integrity.contains(code) => {
                let message = err
                    .as_db_error()
                    .map(|db| db.message().to_string())
                    .unwrap_or_else(|| err.to_string());
                MigrateError::constraint(table, message)
            }
            _ => MigrateError::Target(err),
        }
    }

    /// Attach the failing table to an error, unless it already names one.
    pub fn in_table(self, table: impl Into<String>) -> Self {
        match self {
            e @ MigrateError::Table { .. } => e,
            e => MigrateError::Table {
                table: table.into(),
                source: Box::new(e),
            },
        }
    }

    /// The innermost error, looking through [`MigrateError::Table`] wrappers.
    pub fn root(&self) -> &MigrateError {
        match self {
            MigrateError::Table { source, .. } => source.root(),
            e => e,
        }
    }

    /// Process exit code for this error category.
    pub fn exit_code(&self) -> u8 {
        match self.root() {
            MigrateError::Config(_) | MigrateError::Yaml(_) => EXIT_CONFIG_ERROR,
            MigrateError::Connection { .. } | MigrateError::Pool { .. } => EXIT_CONNECTION_ERROR,
            MigrateError::Parse { .. } => EXIT_PARSE_ERROR,
            MigrateError::ConstraintViolation { .. } => EXIT_CONSTRAINT_ERROR,
            MigrateError::Validation(_) => EXIT_VALIDATION_ERROR,
            MigrateError::Io(_) => EXIT_IO_ERROR,
            _ => EXIT_RUNTIME_ERROR,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
