use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Idle,
    Loading,
    Processing,
    Unloading,
    Dead,
}

impl WorkerStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkerStatus::Idle => "idle",
            WorkerStatus::Loading => "loading",
            WorkerStatus::Processing => "processing",
            WorkerStatus::Unloading => "unloading",
            WorkerStatus::Dead => "dead",
        }
    }
}

/// Singleton liveness record for the scheduler. There is at most one of
/// these per `worker_id`; it is an *observation* of the scheduler's
/// process-local model handle, never the source of truth for it (§9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerHeartbeat {
    pub worker_id: String,
    pub last_seen_at: DateTime<Utc>,
    pub status: WorkerStatus,
    pub current_job_id: Option<String>,
    pub gpu_memory_fraction: Option<f32>,
    pub gpu_temperature: Option<f32>,
    pub loaded_model_name: Option<String>,
}

impl WorkerHeartbeat {
    pub fn new(worker_id: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.into(),
            last_seen_at: Utc::now(),
            status: WorkerStatus::Idle,
            current_job_id: None,
            gpu_memory_fraction: None,
            gpu_temperature: None,
            loaded_model_name: None,
        }
    }

    pub fn is_dead(&self, now: DateTime<Utc>, dead_threshold: chrono::Duration) -> bool {
        now - self.last_seen_at > dead_threshold
    }
}
