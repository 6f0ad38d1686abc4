//! Logging bootstrap on top of `tracing-subscriber`.

use tracing_subscriber::EnvFilter;

use crate::{ConfigError, LogFormat, LoggingConfig};

/// Parses the configured filter directives.
///
/// `RUST_LOG`, when set, takes precedence over the configured filter.
pub fn logging_filter(config: &LoggingConfig) -> Result<EnvFilter, ConfigError> {
    if let Ok(from_env) = EnvFilter::try_from_default_env() {
        return Ok(from_env);
    }
    EnvFilter::try_new(&config.filter).map_err(|e| ConfigError::LogFilterError {
        filter: config.filter.clone(),
        reason: e.to_string(),
    })
}

/// Installs the global subscriber.
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<(), ConfigError> {
    let filter = logging_filter(config)?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let result = match config.format {
        LogFormat::Plain => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    result.map_err(|e| ConfigError::LoggingInitError(e.to_string()))?;

    tracing::debug!(format = ?config.format, filter = %config.filter, "logging initialized");
    Ok(())
}
