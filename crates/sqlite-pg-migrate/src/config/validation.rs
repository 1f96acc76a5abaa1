//! Configuration validation.

use super::Config;
use crate::error::{MigrateError, Result};
use crate::model::MAX_COLUMNS;

/// PostgreSQL caps bind parameters per statement at 65535.
const MAX_BIND_PARAMS: usize = u16::MAX as usize;

const SSL_MODES: [&str; 4] = ["disable", "require", "verify-ca", "verify-full"];

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Source validation
    if config.source.path.as_os_str().is_empty() {
        return Err(MigrateError::Config("source.path is required".into()));
    }

    // Target validation
    if config.target.host.is_empty() {
        return Err(MigrateError::Config("target.host is required".into()));
    }
    if config.target.database.is_empty() {
        return Err(MigrateError::Config("target.database is required".into()));
    }
    if config.target.user.is_empty() {
        return Err(MigrateError::Config("target.user is required".into()));
    }
    if config.target.schema.is_empty() {
        return Err(MigrateError::Config("target.schema is required".into()));
    }
    if !SSL_MODES.contains(&config.target.ssl_mode.to_lowercase().as_str()) {
        return Err(MigrateError::Config(format!(
            "target.ssl_mode must be one of {}, got '{}'",
            SSL_MODES.join(", "),
            config.target.ssl_mode
        )));
    }

    // Migration config validation
    let batch_size = config.migration.batch_size;
    if batch_size == 0 {
        return Err(MigrateError::Config(
            "migration.batch_size must be at least 1".into(),
        ));
    }
    if batch_size
        .checked_mul(MAX_COLUMNS)
        .map_or(true, |params| params > MAX_BIND_PARAMS)
    {
        return Err(MigrateError::Config(format!(
            "migration.batch_size must be at most {} (one insert binds {} parameters per row)",
            MAX_BIND_PARAMS / MAX_COLUMNS,
            MAX_COLUMNS
        )));
    }

    Ok(())
}
