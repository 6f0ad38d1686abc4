//! Configuration management for Causeway
//!
//! Provides hierarchical configuration loading from multiple sources:
//! 1. Environment variables (CAUSEWAY_* prefix, highest precedence)
//! 2. causeway.local.toml (gitignored, local overrides)
//! 3. causeway.toml (application config)
//! 4. ~/.config/causeway/config.toml (user defaults)
//! 5. Built-in defaults (lowest precedence)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

mod error;
mod loader;
mod logging;
mod paths;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use logging::{init_logging, logging_filter};
pub use paths::Paths;

pub use causeway_session::DEFAULT_END_SESSIONS_BATCH_SIZE;

/// Main Causeway configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CausewayConfig {
    pub client: ClientConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Identifies this application in client log events.
    pub app_name: String,
    pub end_sessions_batch_size: usize,
    /// Causal consistency of implicit sessions and of
    /// `Client::start_default_session`.
    pub causal_consistency: bool,
    /// Wrap session-less commands in a single-use session.
    pub implicit_sessions: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            app_name: "causeway".to_string(),
            end_sessions_batch_size: DEFAULT_END_SESSIONS_BATCH_SIZE,
            causal_consistency: true,
            implicit_sessions: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directives, e.g. `"info,causeway_session=debug"`.
    pub filter: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            format: LogFormat::Plain,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    Plain,
    Json,
}

impl CausewayConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        ConfigLoader::new().load()
    }

    /// Load configuration from a specific application directory
    pub fn load_from_dir(project_dir: impl AsRef<Path>) -> Result<Self> {
        ConfigLoader::new().with_project_dir(project_dir).load()
    }

    /// Read a single TOML file, without merging other sources
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&contents).map_err(|source| ConfigError::ParseError {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Configuration suited to tests: verbose logs, small teardown batches
    pub fn development() -> Self {
        Self {
            client: ClientConfig {
                end_sessions_batch_size: 100,
                ..Default::default()
            },
            logging: LoggingConfig {
                filter: "debug".to_string(),
                format: LogFormat::Plain,
            },
        }
    }

    /// Check invariants that deserialization cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.client.end_sessions_batch_size == 0 {
            return Err(ConfigError::ValidationError(
                "client.end_sessions_batch_size must be positive".to_string(),
            ));
        }
        logging_filter(&self.logging)?;
        Ok(())
    }
}
