//! Layered configuration for the batch control plane.
//!
//! Settings are loaded from, in increasing priority:
//! 1. Defaults (embedded in struct `Default` impls)
//! 2. A TOML configuration file
//! 3. Environment variables with the pattern `BATCH__<SECTION>__<KEY>`
//!
//! # Usage
//!
//! ```no_run
//! use batchd::config::Config;
//!
//! let config = Config::load().expect("failed to load configuration");
//! println!("listening on: {}", config.server.bind_addr);
//! ```
//!
//! # Environment variables
//!
//! - `BATCH__SERVER__BIND_ADDR=0.0.0.0:9000`
//! - `BATCH__SCHEDULER__CHUNK_SIZE=2000`
//! - `BATCH_CONFIG=/etc/batchd/batch.toml` overrides the config file path.
//! - `BATCH_WEBHOOK_DEFAULT_SECRET` is read directly, never via the `BATCH__`
//!   prefix, so it never round-trips through the TOML file.

mod models;
mod sources;
mod validation;

pub use models::{
    ApiLimits, Config, ModelConfig, RetentionConfig, SchedulerConfig, ServerConfig,
    StorageConfig, StorageProvider, WebhookConfig,
};
pub use validation::ValidationError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("configuration validation failed: {0}")]
    Validation(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (defaults, file, environment).
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific TOML file, useful for tests.
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn load_minimal_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[[models]]
name = "gemma-3-4b"
endpoint_url = "http://localhost:11434/v1/chat/completions"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = Config::load_from_path(config_path).unwrap();
        assert_eq!(config.models.len(), 1);
    }

    #[test]
    fn validation_catches_invalid_scheduler_section() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[scheduler]
chunk_size = 0
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let result = Config::load_from_path(config_path);
        assert!(matches!(
            result,
            Err(ConfigError::Validation(ValidationError::InvalidChunkSize))
        ));
    }
}
