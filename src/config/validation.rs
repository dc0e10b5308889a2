use thiserror::Error;

use super::models::{Config, StorageProvider};

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("max_queue_depth must be > 0")]
    InvalidMaxQueueDepth,

    #[error("chunk_size must be > 0")]
    InvalidChunkSize,

    #[error("max_requests_per_job must be > 0")]
    InvalidMaxRequestsPerJob,

    #[error("webhook max_backoff_secs ({max_backoff}) must be >= base_backoff_secs ({base})")]
    WebhookBackoffCapTooLow { base: u64, max_backoff: u64 },

    #[error("webhook max_attempts must be >= 1")]
    InvalidWebhookMaxAttempts,

    #[error("gpu_memory_abort_fraction ({abort}) must be >= gpu_memory_max_fraction ({max})")]
    GpuAbortBelowMax { max: f32, abort: f32 },

    #[error("error_rate_abort must be in (0.0, 1.0]")]
    InvalidErrorRateAbort,

    #[error("storage provider is S3 but missing credentials (access_key or secret_key)")]
    MissingS3Credentials,

    #[error("duplicate model name in configuration: {0}")]
    DuplicateModelName(String),
}

/// Validate the entire configuration once at startup (spec §6.5).
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_scheduler(config)?;
    validate_webhook(config)?;
    validate_storage(config)?;
    validate_models(config)?;
    Ok(())
}

fn validate_scheduler(config: &Config) -> Result<(), ValidationError> {
    let s = &config.scheduler;
    if s.max_queue_depth == 0 {
        return Err(ValidationError::InvalidMaxQueueDepth);
    }
    if s.chunk_size == 0 {
        return Err(ValidationError::InvalidChunkSize);
    }
    if s.max_requests_per_job == 0 {
        return Err(ValidationError::InvalidMaxRequestsPerJob);
    }
    if s.gpu_memory_abort_fraction < s.gpu_memory_max_fraction {
        return Err(ValidationError::GpuAbortBelowMax {
            max: s.gpu_memory_max_fraction,
            abort: s.gpu_memory_abort_fraction,
        });
    }
    if !(0.0..=1.0).contains(&s.error_rate_abort) || s.error_rate_abort == 0.0 {
        return Err(ValidationError::InvalidErrorRateAbort);
    }
    Ok(())
}

fn validate_webhook(config: &Config) -> Result<(), ValidationError> {
    let w = &config.webhook;
    if w.max_attempts == 0 {
        return Err(ValidationError::InvalidWebhookMaxAttempts);
    }
    if w.max_backoff_secs < w.base_backoff_secs {
        return Err(ValidationError::WebhookBackoffCapTooLow {
            base: w.base_backoff_secs,
            max_backoff: w.max_backoff_secs,
        });
    }
    Ok(())
}

fn validate_storage(config: &Config) -> Result<(), ValidationError> {
    if config.storage.provider == StorageProvider::S3
        && (config.storage.access_key.is_none() || config.storage.secret_key.is_none())
    {
        return Err(ValidationError::MissingS3Credentials);
    }
    Ok(())
}

fn validate_models(config: &Config) -> Result<(), ValidationError> {
    let mut seen = std::collections::HashSet::new();
    for model in &config.models {
        if !seen.insert(model.name.clone()) {
            return Err(ValidationError::DuplicateModelName(model.name.clone()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::models::{ModelConfig, SchedulerConfig, WebhookConfig};

    fn base_config() -> Config {
        Config {
            server: Default::default(),
            storage: Default::default(),
            scheduler: SchedulerConfig::default(),
            webhook: WebhookConfig::default(),
            retention: Default::default(),
            models: vec![],
        }
    }

    #[test]
    fn default_config_is_valid() {
        assert!(validate(&base_config()).is_ok());
    }

    #[test]
    fn zero_queue_depth_rejected() {
        let mut config = base_config();
        config.scheduler.max_queue_depth = 0;
        assert!(matches!(
            validate(&config),
            Err(ValidationError::InvalidMaxQueueDepth)
        ));
    }

    #[test]
    fn gpu_abort_below_max_rejected() {
        let mut config = base_config();
        config.scheduler.gpu_memory_max_fraction = 0.98;
        config.scheduler.gpu_memory_abort_fraction = 0.95;
        assert!(matches!(
            validate(&config),
            Err(ValidationError::GpuAbortBelowMax { .. })
        ));
    }

    #[test]
    fn webhook_backoff_cap_too_low_rejected() {
        let mut config = base_config();
        config.webhook.base_backoff_secs = 10;
        config.webhook.max_backoff_secs = 5;
        assert!(matches!(
            validate(&config),
            Err(ValidationError::WebhookBackoffCapTooLow { .. })
        ));
    }

    #[test]
    fn duplicate_model_name_rejected() {
        let mut config = base_config();
        let model = ModelConfig {
            name: "gemma-3-4b".to_string(),
            endpoint_url: "http://localhost:11434".to_string(),
            max_context_tokens: 8192,
            canonical_id: None,
            chat_template_hint: None,
            default_sampling: serde_json::json!({}),
            estimated_vram_gb: 8.0,
        };
        config.models = vec![model.clone(), model];
        assert!(matches!(
            validate(&config),
            Err(ValidationError::DuplicateModelName(_))
        ));
    }
}
