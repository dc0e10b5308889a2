use std::net::SocketAddr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::humanize::ByteSize;

/// Top-level configuration, loaded once at startup and threaded immutably
/// through every component (spec §9 "Global configuration").
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub models: Vec<ModelConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
    #[serde(default)]
    pub api: ApiLimits,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            store_path: default_store_path(),
            api: ApiLimits::default(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    "0.0.0.0:8080".parse().unwrap()
}

fn default_store_path() -> PathBuf {
    PathBuf::from("data/ledger")
}

/// Upload/transport limits (not part of the scheduling model proper).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiLimits {
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: ByteSize,
}

impl Default for ApiLimits {
    fn default() -> Self {
        Self {
            max_payload_bytes: default_max_payload_bytes(),
        }
    }
}

fn default_max_payload_bytes() -> ByteSize {
    ByteSize(256 * 1024 * 1024) // 256 MB, large JSONL input files
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageProvider {
    S3,
    Local,
}

impl Default for StorageProvider {
    fn default() -> Self {
        StorageProvider::Local
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub provider: StorageProvider,
    #[serde(default = "default_bucket")]
    pub bucket: String,
    pub endpoint: Option<String>,
    #[serde(skip)]
    pub access_key: Option<String>,
    #[serde(skip)]
    pub secret_key: Option<String>,
    pub region: Option<String>,
    #[serde(default = "default_local_root")]
    pub local_root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            provider: StorageProvider::Local,
            bucket: default_bucket(),
            endpoint: None,
            access_key: None,
            secret_key: None,
            region: None,
            local_root: default_local_root(),
        }
    }
}

fn default_bucket() -> String {
    "batchd".to_string()
}

fn default_local_root() -> PathBuf {
    PathBuf::from("data/blobs")
}

/// Scheduler and admission-controller limits (spec §6.5).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_max_requests_per_job")]
    pub max_requests_per_job: u64,
    #[serde(default = "default_max_queue_depth")]
    pub max_queue_depth: usize,
    #[serde(default = "default_max_total_queued_requests")]
    pub max_total_queued_requests: u64,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,
    #[serde(default = "default_gpu_memory_max_fraction")]
    pub gpu_memory_max_fraction: f32,
    #[serde(default = "default_gpu_memory_abort_fraction")]
    pub gpu_memory_abort_fraction: f32,
    #[serde(default = "default_gpu_temp_max_c")]
    pub gpu_temp_max_c: f32,
    #[serde(default = "default_heartbeat_period_secs")]
    pub heartbeat_period_secs: u64,
    #[serde(default = "default_heartbeat_dead_threshold_secs")]
    pub heartbeat_dead_threshold_secs: u64,
    #[serde(default = "default_chunk_retry_max")]
    pub chunk_retry_max: u32,
    #[serde(default = "default_error_rate_abort")]
    pub error_rate_abort: f64,
    #[serde(default = "default_health_backoff_secs")]
    pub health_backoff_secs: u64,
    #[serde(default = "default_health_backoff_max")]
    pub health_backoff_max: u32,
    #[serde(default = "default_completion_window_default_secs")]
    pub completion_window_default_secs: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_requests_per_job: default_max_requests_per_job(),
            max_queue_depth: default_max_queue_depth(),
            max_total_queued_requests: default_max_total_queued_requests(),
            chunk_size: default_chunk_size(),
            gpu_memory_max_fraction: default_gpu_memory_max_fraction(),
            gpu_memory_abort_fraction: default_gpu_memory_abort_fraction(),
            gpu_temp_max_c: default_gpu_temp_max_c(),
            heartbeat_period_secs: default_heartbeat_period_secs(),
            heartbeat_dead_threshold_secs: default_heartbeat_dead_threshold_secs(),
            chunk_retry_max: default_chunk_retry_max(),
            error_rate_abort: default_error_rate_abort(),
            health_backoff_secs: default_health_backoff_secs(),
            health_backoff_max: default_health_backoff_max(),
            completion_window_default_secs: default_completion_window_default_secs(),
        }
    }
}

fn default_max_requests_per_job() -> u64 {
    50_000
}
fn default_max_queue_depth() -> usize {
    20
}
fn default_max_total_queued_requests() -> u64 {
    1_000_000
}
fn default_chunk_size() -> u64 {
    5_000
}
fn default_gpu_memory_max_fraction() -> f32 {
    0.95
}
fn default_gpu_memory_abort_fraction() -> f32 {
    0.98
}
fn default_gpu_temp_max_c() -> f32 {
    85.0
}
fn default_heartbeat_period_secs() -> u64 {
    10
}
fn default_heartbeat_dead_threshold_secs() -> u64 {
    60
}
fn default_chunk_retry_max() -> u32 {
    2
}
fn default_error_rate_abort() -> f64 {
    0.5
}
fn default_health_backoff_secs() -> u64 {
    15
}
fn default_health_backoff_max() -> u32 {
    4
}
fn default_completion_window_default_secs() -> i64 {
    24 * 3600
}

/// Webhook dispatcher retry/backoff policy (spec §4.6).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebhookConfig {
    #[serde(default = "default_webhook_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_webhook_base_backoff_secs")]
    pub base_backoff_secs: u64,
    #[serde(default = "default_webhook_max_backoff_secs")]
    pub max_backoff_secs: u64,
    #[serde(default = "default_webhook_attempt_timeout_secs")]
    pub attempt_timeout_secs: u64,
    /// Default HMAC secret applied when a job has no per-job `webhook_secret`.
    /// Loaded from the `BATCH_WEBHOOK_DEFAULT_SECRET` environment variable
    /// only — never persisted to the TOML file.
    #[serde(skip)]
    pub default_secret: Option<String>,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_webhook_max_attempts(),
            base_backoff_secs: default_webhook_base_backoff_secs(),
            max_backoff_secs: default_webhook_max_backoff_secs(),
            attempt_timeout_secs: default_webhook_attempt_timeout_secs(),
            default_secret: None,
        }
    }
}

fn default_webhook_max_attempts() -> u32 {
    5
}
fn default_webhook_base_backoff_secs() -> u64 {
    1
}
fn default_webhook_max_backoff_secs() -> u64 {
    60
}
fn default_webhook_attempt_timeout_secs() -> u64 {
    30
}

/// Retention policy for terminal jobs (ambient; grounds [`crate::ledger::pruning`]).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetentionConfig {
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
        }
    }
}

fn default_retention_days() -> u32 {
    30
}

/// A model the scheduler is willing to load, configured at startup
/// (spec §3 "Model Registry entity", supplementing built-ins into the
/// Durable Store's `models` partition on first boot).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelConfig {
    pub name: String,
    pub endpoint_url: String,
    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: u32,
    #[serde(default)]
    pub canonical_id: Option<String>,
    #[serde(default)]
    pub chat_template_hint: Option<String>,
    #[serde(default = "default_sampling")]
    pub default_sampling: Value,
    #[serde(default)]
    pub estimated_vram_gb: f32,
}

fn default_max_context_tokens() -> u32 {
    8192
}

fn default_sampling() -> Value {
    serde_json::json!({ "temperature": 0.7, "top_p": 1.0 })
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            endpoint_url: String::new(),
            max_context_tokens: default_max_context_tokens(),
            canonical_id: None,
            chat_template_hint: None,
            default_sampling: default_sampling(),
            estimated_vram_gb: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            scheduler: SchedulerConfig::default(),
            webhook: WebhookConfig::default(),
            retention: RetentionConfig::default(),
            models: Vec::new(),
        };

        assert_eq!(config.server.bind_addr.to_string(), "0.0.0.0:8080");
        assert_eq!(config.scheduler.max_requests_per_job, 50_000);
        assert_eq!(config.scheduler.chunk_size, 5_000);
        assert_eq!(config.webhook.max_attempts, 5);
    }
}
