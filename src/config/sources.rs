use std::env;
use std::path::PathBuf;

use config::{ConfigError, Environment, File};

use super::models::Config;

const CONFIG_ENV_VAR: &str = "BATCH_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/batch.toml";
const ENV_PREFIX: &str = "BATCH";
const ENV_SEPARATOR: &str = "__";

/// Load configuration from all sources with priority (lowest to highest):
/// 1. Defaults (struct `Default` impls)
/// 2. TOML file (`BATCH_CONFIG` or `config/batch.toml`)
/// 3. `.env` file (via dotenvy)
/// 4. System environment variables (`BATCH__SECTION__KEY`)
pub fn load() -> Result<Config, ConfigError> {
    let _ = dotenvy::dotenv();

    let config_path = env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

    let mut config = load_from_sources(config_path)?;
    load_secrets(&mut config);
    Ok(config)
}

/// Secrets never live in the TOML file's on-disk representation; they are
/// read from the environment only (spec §6.5 "Configuration loading").
fn load_secrets(config: &mut Config) {
    if let Ok(access_key) = env::var("S3_ACCESS_KEY") {
        config.storage.access_key = Some(access_key);
    }
    if let Ok(secret_key) = env::var("S3_SECRET_KEY") {
        config.storage.secret_key = Some(secret_key);
    }
    if config.storage.access_key.is_none() {
        if let Ok(access_key) = env::var("AWS_ACCESS_KEY_ID") {
            config.storage.access_key = Some(access_key);
        }
    }
    if config.storage.secret_key.is_none() {
        if let Ok(secret_key) = env::var("AWS_SECRET_ACCESS_KEY") {
            config.storage.secret_key = Some(secret_key);
        }
    }
    if let Ok(secret) = env::var("BATCH_WEBHOOK_DEFAULT_SECRET") {
        config.webhook.default_secret = Some(secret);
    }
}

pub fn load_from_sources(config_path: PathBuf) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if config_path.exists() {
        tracing::info!(path = %config_path.display(), "loading configuration file");
        builder = builder.add_source(File::from(config_path).required(false));
    } else {
        tracing::warn!(
            path = %config_path.display(),
            "configuration file not found, using defaults and environment overrides"
        );
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    let config = builder.build()?;
    config.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn load_defaults_only() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nonexistent.toml");

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.server.bind_addr.to_string(), "0.0.0.0:8080");
        assert_eq!(config.scheduler.chunk_size, 5_000);
    }

    #[test]
    fn load_from_toml_overrides_scheduler_section() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[server]
bind_addr = "127.0.0.1:9000"

[scheduler]
chunk_size = 100
max_queue_depth = 3

[[models]]
name = "gemma-3-4b"
endpoint_url = "http://localhost:11434/v1/chat/completions"
max_context_tokens = 8192
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.server.bind_addr.to_string(), "127.0.0.1:9000");
        assert_eq!(config.scheduler.chunk_size, 100);
        assert_eq!(config.scheduler.max_queue_depth, 3);
        assert_eq!(config.models.len(), 1);
        assert_eq!(config.models[0].name, "gemma-3-4b");
    }
}
