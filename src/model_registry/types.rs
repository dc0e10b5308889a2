use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ModelConfig;

/// What the scheduler and admission controller know about a model name:
/// where to reach the inference adapter serving it, the context window to
/// validate `max_tokens` requests against, and sampling/VRAM hints (spec
/// §3 Model Registry entity / §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub model_name: String,
    pub canonical_id: String,
    pub endpoint_url: String,
    pub max_context_tokens: u32,
    pub chat_template_hint: Option<String>,
    pub default_sampling: Value,
    pub estimated_vram_gb: f32,
}

impl ModelInfo {
    pub fn from_config(cfg: &ModelConfig) -> Self {
        Self {
            model_name: cfg.name.clone(),
            canonical_id: cfg.canonical_id.clone().unwrap_or_else(|| cfg.name.clone()),
            endpoint_url: cfg.endpoint_url.clone(),
            max_context_tokens: cfg.max_context_tokens,
            chat_template_hint: cfg.chat_template_hint.clone(),
            default_sampling: cfg.default_sampling.clone(),
            estimated_vram_gb: cfg.estimated_vram_gb,
        }
    }
}
