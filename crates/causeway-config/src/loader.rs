//! Configuration loader with multi-source merging

use crate::{CausewayConfig, Paths};
use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};

/// Configuration loader with builder pattern
pub struct ConfigLoader {
    project_dir: PathBuf,
    env_prefix: String,
    include_user_config: bool,
}

impl ConfigLoader {
    /// Create a new config loader rooted at the current directory
    pub fn new() -> Self {
        Self {
            project_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            env_prefix: "CAUSEWAY".to_string(),
            include_user_config: true,
        }
    }

    /// Set the directory searched for causeway.toml and causeway.local.toml
    pub fn with_project_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.project_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Set the environment variable prefix (default: "CAUSEWAY")
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Skip ~/.config/causeway/config.toml
    pub fn without_user_config(mut self) -> Self {
        self.include_user_config = false;
        self
    }

    /// Load configuration from all sources with proper precedence
    pub fn load(self) -> Result<CausewayConfig> {
        let mut builder = config::Config::builder();

        // 1. Built-in defaults
        let defaults = CausewayConfig::default();
        builder = builder.add_source(config::Config::try_from(&defaults)?);

        // 2-4. User, project and local files, lowest precedence first
        let paths = Paths::new();
        let user_file = paths.user_config_file().ok();
        for file in paths.existing_config_files(&self.project_dir) {
            if !self.include_user_config && Some(&file) == user_file.as_ref() {
                continue;
            }
            builder = builder.add_source(
                config::File::from(file)
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        // 5. Environment variables (CAUSEWAY_CLIENT__END_SESSIONS_BATCH_SIZE=...)
        builder = builder.add_source(
            config::Environment::with_prefix(&self.env_prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build configuration")?;

        let causeway_config: CausewayConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        causeway_config
            .validate()
            .context("Configuration failed validation")?;

        Ok(causeway_config)
    }

    /// Load configuration or fall back to defaults
    pub fn load_or_default(self) -> CausewayConfig {
        self.load().unwrap_or_default()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn loader(dir: &Path) -> ConfigLoader {
        // A prefix nobody sets keeps the host environment out of the tests.
        ConfigLoader::new()
            .with_project_dir(dir)
            .with_env_prefix("CAUSEWAY_LOADER_TEST")
            .without_user_config()
    }

    #[test]
    fn test_load_defaults() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let config = loader(temp_dir.path()).load().expect("Failed to load config");

        assert_eq!(config, CausewayConfig::default());
    }

    #[test]
    fn test_load_project_config() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();

        let config_content = r#"
[client]
app_name = "inventory-service"
end_sessions_batch_size = 500
implicit_sessions = false

[logging]
filter = "warn,causeway_session=debug"
"#;
        fs::write(project_dir.join("causeway.toml"), config_content)
            .expect("Failed to write config");

        let config = loader(project_dir).load().expect("Failed to load config");

        assert_eq!(config.client.app_name, "inventory-service");
        assert_eq!(config.client.end_sessions_batch_size, 500);
        assert!(!config.client.implicit_sessions);
        assert!(config.client.causal_consistency);
        assert_eq!(config.logging.filter, "warn,causeway_session=debug");
    }

    #[test]
    fn test_local_overrides() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();

        fs::write(
            project_dir.join("causeway.toml"),
            "[client]\nend_sessions_batch_size = 500\n",
        )
        .expect("Failed to write project config");

        fs::write(
            project_dir.join("causeway.local.toml"),
            "[client]\nend_sessions_batch_size = 7\n",
        )
        .expect("Failed to write local config");

        let config = loader(project_dir).load().expect("Failed to load config");

        assert_eq!(config.client.end_sessions_batch_size, 7);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();

        fs::write(
            project_dir.join("causeway.toml"),
            "[client]\nend_sessions_batch_size = 0\n",
        )
        .expect("Failed to write project config");

        assert!(loader(project_dir).load().is_err());
        assert_eq!(
            loader(project_dir).load_or_default(),
            CausewayConfig::default()
        );
    }

    // Environment overrides use a double underscore between nesting levels:
    //
    // CAUSEWAY_CLIENT__END_SESSIONS_BATCH_SIZE=2000
    // CAUSEWAY_LOGGING__FORMAT=json
    //
    // They are not exercised here because the process environment is shared
    // between concurrently running tests.
}
