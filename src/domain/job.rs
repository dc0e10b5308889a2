use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One line of an input file: a single chat-completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequestLine {
    pub custom_id: String,
    pub method: String,
    pub url: String,
    pub body: ChatRequestBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// The request body of a chat-completion line. Unknown fields are
/// preserved verbatim and forwarded to the inference adapter rather than
/// rejected — §9 of the spec calls for tagged-variant handling, not a
/// closed schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequestBody {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub stop: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// One line of an output file: the result (success or error) for a
/// request, keyed back to the input by `custom_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResultLine {
    pub custom_id: String,
    pub response: Option<ChatResponse>,
    pub error: Option<ResultError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub status_code: u16,
    pub request_id: String,
    pub body: ChatResponseBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponseBody {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChatChoice>,
    pub usage: Usage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChoice {
    pub index: u32,
    pub message: ChatMessage,
    pub finish_reason: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultError {
    pub code: String,
    pub message: String,
}

/// A convenience alias kept distinct from [`ChatResponseBody`] so the
/// webhook payload code doesn't have to reach into result-line internals.
pub type ResponseBody = ChatResponseBody;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Validating,
    InProgress,
    Finalizing,
    Completed,
    Failed,
    Expired,
    Cancelling,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Expired | JobStatus::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Validating => "validating",
            JobStatus::InProgress => "in_progress",
            JobStatus::Finalizing => "finalizing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Expired => "expired",
            JobStatus::Cancelling => "cancelling",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RequestCounts {
    pub total: u64,
    pub completed: u64,
    pub failed: u64,
}

/// The durable job record. See spec §3.1 for field semantics; §3.2 for the
/// invariants every mutation must preserve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub input_file_id: String,
    pub output_file_id: Option<String>,
    pub error_file_id: Option<String>,
    pub endpoint: String,
    /// Completion window in seconds. Stored as a scalar rather than
    /// `chrono::Duration` because `chrono::Duration` has no serde impl.
    pub completion_window: Option<i64>,
    pub model_name: String,
    pub status: JobStatus,
    pub request_counts: RequestCounts,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Last-committed request index; see invariant 4 (monotonic until terminal).
    pub checkpoint: u64,
    pub metadata: BTreeMap<String, Value>,
    pub webhook_url: Option<String>,
    pub webhook_secret: Option<String>,
    pub priority: i32,
    pub attempt_count: u32,
    pub last_error: Option<String>,
    pub cancel_requested: bool,
}

impl Job {
    pub fn status_label(&self) -> String {
        self.status.as_str().to_string()
    }

    pub fn progress_percent(&self) -> f64 {
        if self.request_counts.total == 0 {
            return 100.0;
        }
        (self.checkpoint as f64 / self.request_counts.total as f64) * 100.0
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.completion_window {
            Some(window_secs) => {
                !self.status.is_terminal() && now > self.created_at + Duration::seconds(window_secs)
            }
            None => false,
        }
    }
}

/// A dead-letter record for a single failed request within a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedRequest {
    pub id: String,
    pub job_id: String,
    pub custom_id: String,
    pub request_index: u64,
    pub error_code: String,
    pub error_message: String,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
}

impl FailedRequest {
    pub fn new(
        job_id: &str,
        custom_id: &str,
        request_index: u64,
        error_code: impl Into<String>,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            job_id: job_id.to_string(),
            custom_id: custom_id.to_string(),
            request_index,
            error_code: error_code.into(),
            error_message: error_message.into(),
            retry_count: 0,
            created_at: Utc::now(),
        }
    }
}
