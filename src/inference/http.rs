//! HTTP-based adapter targeting a locally-reachable OpenAI-compatible
//! completions endpoint — the shape both vLLM and Ollama's OpenAI-compat
//! servers expose (spec §9 Open Questions, inference backend decision).
//!
//! Built the way the corpus builds outbound HTTP clients: bounded
//! retries with exponential backoff for transient failures, distinct
//! connect/request timeouts, and per-request errors wherever a failure can
//! be attributed to one prompt rather than the whole chunk.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{
    ChatRequest, GenerationResult, InferenceAdapter, InferenceError, Outcome, Result, Sampling,
    UsageStats,
};

#[derive(Debug, Clone)]
pub struct HttpAdapterConfig {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub max_retries: u32,
}

impl Default for HttpAdapterConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(120),
            max_retries: 2,
        }
    }
}

/// Adapter that POSTs one request per prompt to `endpoint_url`, the way an
/// OpenAI-compatible `/v1/chat/completions` server expects. Concurrency
/// across prompts in a chunk is the adapter's job, not the scheduler's
/// (spec §5 "the Inference Adapter may execute many prompts concurrently").
pub struct HttpInferenceAdapter {
    client: Client,
    endpoint_url: String,
    config: HttpAdapterConfig,
}

impl HttpInferenceAdapter {
    pub fn new(endpoint_url: impl Into<String>, config: HttpAdapterConfig) -> Self {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .expect("reqwest client configuration is valid");

        Self {
            client,
            endpoint_url: endpoint_url.into(),
            config,
        }
    }

    async fn generate_one(
        &self,
        model: &str,
        request: &ChatRequest,
        sampling: &Sampling,
    ) -> GenerationResult {
        let body = OutboundChatRequest {
            model: model.to_string(),
            messages: request
                .messages
                .iter()
                .map(|m| OutboundMessage {
                    role: m.role.clone(),
                    content: m.content.clone(),
                })
                .collect(),
            max_tokens: request.max_tokens,
            temperature: request.temperature.or(sampling.temperature),
            top_p: request.top_p.or(sampling.top_p),
            stop: request.stop.clone(),
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.send_once(&body).await {
                Ok(outcome) => {
                    return GenerationResult {
                        custom_id: request.custom_id.clone(),
                        outcome,
                    }
                }
                Err(err) if attempt <= self.config.max_retries && err.is_transient => {
                    let backoff = Duration::from_millis(250 * 2u64.pow(attempt - 1));
                    warn!(
                        custom_id = %request.custom_id,
                        attempt,
                        error = %err.message,
                        "retrying single request"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(err) => {
                    return GenerationResult {
                        custom_id: request.custom_id.clone(),
                        outcome: Outcome::Err {
                            code: err.code,
                            message: err.message,
                        },
                    }
                }
            }
        }
    }

    async fn send_once(&self, body: &OutboundChatRequest) -> std::result::Result<Outcome, SendError> {
        let response = self
            .client
            .post(&self.endpoint_url)
            .json(body)
            .send()
            .await
            .map_err(|e| SendError {
                code: "InferenceTransient".to_string(),
                message: e.to_string(),
                is_transient: true,
            })?;

        let status = response.status();
        if !status.is_success() {
            let is_transient = status.is_server_error() || status.as_u16() == 429;
            let text = response.text().await.unwrap_or_default();
            return Err(SendError {
                code: if is_transient {
                    "InferenceTransient".to_string()
                } else {
                    "GenerationError".to_string()
                },
                message: format!("HTTP {status}: {text}"),
                is_transient,
            });
        }

        let parsed: InboundChatResponse = response.json().await.map_err(|e| SendError {
            code: "GenerationError".to_string(),
            message: format!("malformed response body: {e}"),
            is_transient: false,
        })?;

        let choice = parsed.choices.into_iter().next().ok_or_else(|| SendError {
            code: "GenerationError".to_string(),
            message: "response had no choices".to_string(),
            is_transient: false,
        })?;

        Ok(Outcome::Ok {
            completion_text: choice.message.content,
            usage: UsageStats {
                prompt_tokens: parsed.usage.prompt_tokens,
                completion_tokens: parsed.usage.completion_tokens,
                total_tokens: parsed.usage.total_tokens,
            },
            finish_reason: choice.finish_reason,
        })
    }
}

struct SendError {
    code: String,
    message: String,
    is_transient: bool,
}

#[derive(Debug, Serialize)]
struct OutboundMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct OutboundChatRequest {
    model: String,
    messages: Vec<OutboundMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct InboundChatResponse {
    choices: Vec<InboundChoice>,
    usage: InboundUsage,
}

#[derive(Debug, Deserialize)]
struct InboundChoice {
    message: InboundMessage,
    finish_reason: String,
}

#[derive(Debug, Deserialize)]
struct InboundMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct InboundUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[async_trait]
impl InferenceAdapter for HttpInferenceAdapter {
    async fn generate(
        &self,
        loaded_model_name: &str,
        prompts: &[ChatRequest],
        sampling: &Sampling,
    ) -> Result<Vec<GenerationResult>> {
        if prompts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(model = loaded_model_name, count = prompts.len(), "dispatching chunk");

        let futures = prompts
            .iter()
            .map(|p| self.generate_one(loaded_model_name, p, sampling));
        let results = futures::future::join_all(futures).await;

        Ok(results)
    }
}
