//! Inference Adapter (spec §4.5): the uniform boundary between the
//! scheduler and the external engine that actually loads models and runs
//! prompts. Two bindings ship: [`http::HttpInferenceAdapter`] for a
//! locally-reachable OpenAI-compatible completions endpoint, and
//! [`stub::StubInferenceAdapter`] for tests and GPU-less operation.

pub mod http;
pub mod stub;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::ChatMessage;

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("model load failed: {0}")]
    ModelLoadFailed(String),

    #[error("transient inference error: {0}")]
    Transient(String),

    #[error("fatal inference error: {0}")]
    Fatal(String),
}

pub type Result<T> = std::result::Result<T, InferenceError>;

/// One prompt to generate a completion for, correlated back to its line
/// in the input file by `custom_id`.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub custom_id: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub stop: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct Sampling {
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageStats {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Per-request result. `Err` outcomes never propagate as a Rust `Result`
/// error out of `generate` — they are data, written to the output file
/// and the DLQ (spec §4.8 "per-request failure").
#[derive(Debug, Clone)]
pub enum Outcome {
    Ok {
        completion_text: String,
        usage: UsageStats,
        finish_reason: String,
    },
    Err {
        code: String,
        message: String,
    },
}

/// One correlated `(custom_id, outcome)` pair, returned in input order.
#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub custom_id: String,
    pub outcome: Outcome,
}

#[async_trait]
pub trait InferenceAdapter: Send + Sync {
    /// Run a chunk of prompts against `loaded_model_name`. Returns one
    /// `GenerationResult` per input prompt in the same order, or a single
    /// batch-level `InferenceError` if the whole chunk could not be
    /// attempted (the scheduler treats that as a chunk-retry candidate,
    /// spec §4.8 "chunk failure").
    async fn generate(
        &self,
        loaded_model_name: &str,
        prompts: &[ChatRequest],
        sampling: &Sampling,
    ) -> Result<Vec<GenerationResult>>;
}
