//! Deterministic in-process adapter for tests and GPU-less operation. Not
//! a substitute for the real engine in the Non-goals sense — it implements
//! the same [`InferenceAdapter`] trait every caller depends on (spec
//! §4.5 "Inference Adapter binding").

use async_trait::async_trait;

use super::{ChatRequest, GenerationResult, InferenceAdapter, Outcome, Result, Sampling, UsageStats};

/// Always succeeds, echoing a fixed completion derived from the prompt so
/// tests can assert on ordering and counts without a real model. A
/// `custom_id` ending in `-fail` produces an `Outcome::Err`, letting tests
/// exercise the DLQ/error-rate paths deterministically.
#[derive(Debug, Default)]
pub struct StubInferenceAdapter;

impl StubInferenceAdapter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl InferenceAdapter for StubInferenceAdapter {
    async fn generate(
        &self,
        _loaded_model_name: &str,
        prompts: &[ChatRequest],
        _sampling: &Sampling,
    ) -> Result<Vec<GenerationResult>> {
        let results = prompts
            .iter()
            .map(|prompt| {
                if prompt.custom_id.ends_with("-fail") {
                    GenerationResult {
                        custom_id: prompt.custom_id.clone(),
                        outcome: Outcome::Err {
                            code: "GenerationError".to_string(),
                            message: "stub forced failure".to_string(),
                        },
                    }
                } else {
                    let prompt_tokens = prompt
                        .messages
                        .iter()
                        .map(|m| m.content.split_whitespace().count() as u32)
                        .sum::<u32>()
                        .max(1);
                    let completion_text = "stub response".to_string();
                    let completion_tokens = completion_text.split_whitespace().count() as u32;

                    GenerationResult {
                        custom_id: prompt.custom_id.clone(),
                        outcome: Outcome::Ok {
                            completion_text,
                            usage: UsageStats {
                                prompt_tokens,
                                completion_tokens,
                                total_tokens: prompt_tokens + completion_tokens,
                            },
                            finish_reason: "stop".to_string(),
                        },
                    }
                }
            })
            .collect();

        Ok(results)
    }
}
