//! Wire-level DTOs for the OpenAI-compatible batch surface (spec §6.1).
//!
//! These types are deliberately distinct from [`crate::domain::Job`] and
//! [`crate::domain::File`]: the durable record carries internal state
//! (`checkpoint`, `webhook_secret`, storage keys) that never needs to
//! leave the process, while `Batch` and friends are the shape a client
//! actually sees over HTTP.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{File, FilePurpose, Job, JobStatus};
use crate::model_registry::ModelInfo;

#[derive(Debug, Serialize)]
pub struct FileResponse {
    pub id: String,
    pub bytes: u64,
    pub purpose: &'static str,
    pub created_at: i64,
}

impl From<&File> for FileResponse {
    fn from(file: &File) -> Self {
        Self {
            id: file.id.clone(),
            bytes: file.size_bytes,
            purpose: purpose_label(file.purpose),
            created_at: file.created_at.timestamp(),
        }
    }
}

fn purpose_label(purpose: FilePurpose) -> &'static str {
    match purpose {
        FilePurpose::Input => "input",
        FilePurpose::Output => "output",
        FilePurpose::Error => "error",
    }
}

/// `POST /v1/batches` body.
#[derive(Debug, Deserialize)]
pub struct CreateBatchRequest {
    pub input_file_id: String,
    pub endpoint: String,
    pub model: String,
    #[serde(default)]
    pub completion_window: Option<i64>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default)]
    pub webhook_secret: Option<String>,
    #[serde(default)]
    pub priority: i32,
}

#[derive(Debug, Serialize)]
pub struct RequestCountsResponse {
    pub total: u64,
    pub completed: u64,
    pub failed: u64,
}

/// A job as seen over HTTP, including the computed progress percentage
/// the spec asks `GET /batches/{id}` to surface alongside raw counters.
#[derive(Debug, Serialize)]
pub struct Batch {
    pub id: String,
    pub object: &'static str,
    pub endpoint: String,
    pub input_file_id: String,
    pub output_file_id: Option<String>,
    pub error_file_id: Option<String>,
    pub model: String,
    pub status: &'static str,
    pub request_counts: RequestCountsResponse,
    pub progress_percent: f64,
    pub created_at: i64,
    pub completion_window_secs: Option<i64>,
    pub in_progress_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub metadata: BTreeMap<String, Value>,
    pub webhook_url: Option<String>,
    pub priority: i32,
    pub last_error: Option<String>,
}

impl From<&Job> for Batch {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id.clone(),
            object: "batch",
            endpoint: job.endpoint.clone(),
            input_file_id: job.input_file_id.clone(),
            output_file_id: job.output_file_id.clone(),
            error_file_id: job.error_file_id.clone(),
            model: job.model_name.clone(),
            status: job.status.as_str(),
            request_counts: RequestCountsResponse {
                total: job.request_counts.total,
                completed: job.request_counts.completed,
                failed: job.request_counts.failed,
            },
            progress_percent: job.progress_percent(),
            created_at: job.created_at.timestamp(),
            completion_window_secs: job.completion_window,
            in_progress_at: job.started_at.map(|t| t.timestamp()),
            completed_at: job.finished_at.map(|t| t.timestamp()),
            metadata: job.metadata.clone(),
            webhook_url: job.webhook_url.clone(),
            priority: job.priority,
            last_error: job.last_error.clone(),
        }
    }
}

/// `GET /v1/batches` query parameters.
#[derive(Debug, Deserialize, Default)]
pub struct ListBatchesQuery {
    pub status: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

pub fn parse_status_filter(raw: &str) -> Option<JobStatus> {
    match raw {
        "validating" => Some(JobStatus::Validating),
        "in_progress" => Some(JobStatus::InProgress),
        "finalizing" => Some(JobStatus::Finalizing),
        "completed" => Some(JobStatus::Completed),
        "failed" => Some(JobStatus::Failed),
        "expired" => Some(JobStatus::Expired),
        "cancelling" => Some(JobStatus::Cancelling),
        "cancelled" => Some(JobStatus::Cancelled),
        _ => None,
    }
}

#[derive(Debug, Serialize)]
pub struct ListBatchesResponse {
    pub object: &'static str,
    pub data: Vec<Batch>,
    pub has_more: bool,
}

#[derive(Debug, Serialize)]
pub struct ModelSummary {
    pub id: String,
    pub endpoint_url: String,
    pub max_context_tokens: u32,
    pub estimated_vram_gb: f32,
}

impl From<&ModelInfo> for ModelSummary {
    fn from(info: &ModelInfo) -> Self {
        Self {
            id: info.model_name.clone(),
            endpoint_url: info.endpoint_url.clone(),
            max_context_tokens: info.max_context_tokens,
            estimated_vram_gb: info.estimated_vram_gb,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub object: &'static str,
    pub data: Vec<ModelSummary>,
}

#[derive(Debug, Serialize)]
pub struct GpuHealth {
    pub memory_fraction: Option<f32>,
    pub temperature_c: Option<f32>,
}

#[derive(Debug, Serialize)]
pub struct WorkerHealth {
    pub status: &'static str,
    pub current_job_id: Option<String>,
    pub loaded_model_name: Option<String>,
    pub last_seen_at: Option<i64>,
    pub alive: bool,
}

#[derive(Debug, Serialize)]
pub struct QueueHealth {
    pub non_terminal_jobs: usize,
    pub max_queue_depth: usize,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub gpu: GpuHealth,
    pub worker: WorkerHealth,
    pub queue: QueueHealth,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}
