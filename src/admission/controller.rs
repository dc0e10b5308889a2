//! Admission Controller (spec §4.1): validates a job submission and
//! protects the GPU and the queue before a job ever reaches `validating`.

use std::collections::BTreeMap;
use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use serde_json::Value;
use tracing::warn;

use crate::config::SchedulerConfig;
use crate::domain::{File, FilePurpose, Job, JobStatus, RequestCounts};
use crate::gpu::GpuProbe;
use crate::handlers::HandlerRegistry;
use crate::ledger::Store;
use crate::model_registry::ModelRegistry;
use crate::storage::StorageClient;

use super::error::{AdmissionError, Result};

pub struct SubmitRequest {
    pub input_file_id: String,
    pub model_name: String,
    pub endpoint: String,
    pub completion_window: Option<ChronoDuration>,
    pub metadata: BTreeMap<String, Value>,
    pub webhook_url: Option<String>,
    pub webhook_secret: Option<String>,
    pub priority: i32,
}

pub struct AdmissionController {
    store: Arc<Store>,
    storage: StorageClient,
    model_registry: ModelRegistry,
    handlers: Arc<HandlerRegistry>,
    gpu_probe: Arc<dyn GpuProbe>,
    config: SchedulerConfig,
}

impl AdmissionController {
    pub fn new(
        store: Arc<Store>,
        storage: StorageClient,
        model_registry: ModelRegistry,
        handlers: Arc<HandlerRegistry>,
        gpu_probe: Arc<dyn GpuProbe>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            storage,
            model_registry,
            handlers,
            gpu_probe,
            config,
        }
    }

    pub async fn submit(&self, req: SubmitRequest) -> Result<Job> {
        let file = self.validate_file(&req.input_file_id)?;
        let total = self.count_and_validate_lines(&file, &req.endpoint).await?;

        if total > self.config.max_requests_per_job {
            return Err(AdmissionError::RequestCountExceeded {
                count: total,
                limit: self.config.max_requests_per_job,
            });
        }

        self.model_registry.lookup(&req.model_name)?;

        self.check_queue_admission(total)?;
        self.check_gpu_health().await?;

        let completion_window_secs = req
            .completion_window
            .map(|d| d.num_seconds())
            .unwrap_or(self.config.completion_window_default_secs);

        let job = Job {
            id: format!("batch_{}", uuid::Uuid::now_v7()),
            input_file_id: req.input_file_id,
            output_file_id: None,
            error_file_id: None,
            endpoint: req.endpoint,
            completion_window: Some(completion_window_secs),
            model_name: req.model_name,
            status: JobStatus::Validating,
            request_counts: RequestCounts {
                total,
                completed: 0,
                failed: 0,
            },
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            checkpoint: 0,
            metadata: req.metadata,
            webhook_url: req.webhook_url,
            webhook_secret: req.webhook_secret,
            priority: req.priority,
            attempt_count: 0,
            last_error: None,
            cancel_requested: false,
        };

        self.store.upsert_job(&job).await?;
        Ok(job)
    }

    fn validate_file(&self, file_id: &str) -> Result<File> {
        let file = self
            .store
            .get_file(file_id)?
            .ok_or_else(|| AdmissionError::FileNotFound(file_id.to_string()))?;

        if file.purpose != FilePurpose::Input {
            return Err(AdmissionError::WrongPurpose);
        }
        if file.size_bytes == 0 {
            return Err(AdmissionError::EmptyFile);
        }
        Ok(file)
    }

    /// Streaming validation pass: parses every line, enforces `custom_id`
    /// uniqueness, and counts requests. Spec §4.1 calls for a single pass
    /// that never loads the whole file at once; our blob store's
    /// `download` returns the full buffer, so we stream over its lines
    /// rather than materializing a parsed vector.
    async fn count_and_validate_lines(&self, file: &File, endpoint: &str) -> Result<u64> {
        let handler = self
            .handlers
            .get(endpoint)
            .map_err(|e| AdmissionError::MalformedInputFile(e.to_string()))?;

        let bytes = self.storage.download(&file.storage_key).await?;
        let text = std::str::from_utf8(&bytes)
            .map_err(|e| AdmissionError::MalformedInputFile(e.to_string()))?;

        let mut seen = HashSet::new();
        let mut count: u64 = 0;

        for raw_line in text.lines() {
            if raw_line.trim().is_empty() {
                continue;
            }
            let line = handler
                .parse_line(raw_line)
                .map_err(|e| AdmissionError::MalformedInputFile(e.to_string()))?;
            handler
                .validate(&line)
                .map_err(|e| AdmissionError::MalformedInputFile(e.to_string()))?;

            if !seen.insert(line.custom_id.clone()) {
                return Err(AdmissionError::MalformedInputFile(format!(
                    "duplicate custom_id: {}",
                    line.custom_id
                )));
            }
            count += 1;
        }

        Ok(count)
    }

    fn check_queue_admission(&self, incoming: u64) -> Result<()> {
        let jobs = self.store.list_jobs()?;
        let non_terminal: Vec<_> = jobs
            .iter()
            .filter(|j| matches!(j.status, JobStatus::Validating | JobStatus::InProgress))
            .collect();

        if non_terminal.len() >= self.config.max_queue_depth {
            return Err(AdmissionError::QueueFull);
        }

        let queued: u64 = non_terminal
            .iter()
            .map(|j| j.request_counts.total.saturating_sub(j.checkpoint))
            .sum();

        if queued + incoming > self.config.max_total_queued_requests {
            return Err(AdmissionError::QueueFull);
        }

        Ok(())
    }

    async fn check_gpu_health(&self) -> Result<()> {
        let reading = self.gpu_probe.probe().await;
        match (reading.memory_fraction(), reading.temperature_c()) {
            (Some(mem), _) if mem > self.config.gpu_memory_max_fraction => {
                Err(AdmissionError::ServiceUnavailable)
            }
            (_, Some(temp)) if temp > self.config.gpu_temp_max_c => {
                Err(AdmissionError::ServiceUnavailable)
            }
            (None, None) => {
                warn!("gpu health unknown at admission, allowing submission");
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FilePurpose;
    use crate::gpu::{Reading, StubGpuProbe};
    use std::sync::Arc;
    use tempfile::TempDir;

    struct Harness {
        controller: AdmissionController,
        store: Arc<Store>,
        storage: StorageClient,
        gpu_probe: Arc<StubGpuProbe>,
        max_queue_depth: usize,
        _dir: TempDir,
    }

    fn harness() -> Harness {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(Store::open(dir.path().join("store")).unwrap());
        let storage = StorageClient::in_memory();
        let model_registry = ModelRegistry::new(store.clone());
        model_registry
            .bootstrap(&[crate::config::ModelConfig {
                name: "gemma-3-4b".to_string(),
                endpoint_url: "http://localhost/v1/chat/completions".to_string(),
                ..Default::default()
            }])
            .unwrap();
        let handlers = Arc::new(HandlerRegistry::with_defaults());
        let gpu_probe = Arc::new(StubGpuProbe::healthy());
        let config = SchedulerConfig::default();
        let max_queue_depth = config.max_queue_depth;

        let controller = AdmissionController::new(
            store.clone(),
            storage.clone(),
            model_registry,
            handlers,
            gpu_probe.clone(),
            config,
        );
        Harness {
            controller,
            store,
            storage,
            gpu_probe,
            max_queue_depth,
            _dir: dir,
        }
    }

    async fn upload_input(storage: &StorageClient, store: &Store, lines: &[&str]) -> String {
        let body = lines.join("\n") + "\n";
        let key = "input/test.jsonl".to_string();
        storage.upload(&key, body.clone().into_bytes()).await.unwrap();

        let file = File::new(FilePurpose::Input, body.len() as u64, key);
        store.upsert_file(&file).unwrap();
        file.id
    }

    fn line(custom_id: &str) -> String {
        serde_json::json!({
            "custom_id": custom_id,
            "method": "POST",
            "url": "/v1/chat/completions",
            "body": {"model": "gemma-3-4b", "messages": [{"role":"user","content":"hi"}]}
        })
        .to_string()
    }

    #[tokio::test]
    async fn accepts_well_formed_submission() {
        let h = harness();
        let lines = vec![line("req-1"), line("req-2")];
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        let file_id = upload_input(&h.storage, &h.store, &refs).await;

        let job = h
            .controller
            .submit(SubmitRequest {
                input_file_id: file_id,
                model_name: "gemma-3-4b".to_string(),
                endpoint: "/v1/chat/completions".to_string(),
                completion_window: None,
                metadata: Default::default(),
                webhook_url: None,
                webhook_secret: None,
                priority: 0,
            })
            .await
            .unwrap();

        assert_eq!(job.request_counts.total, 2);
        assert_eq!(job.status, JobStatus::Validating);
    }

    #[tokio::test]
    async fn rejects_duplicate_custom_id() {
        let h = harness();
        let lines = vec![line("req-1"), line("req-1")];
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        let file_id = upload_input(&h.storage, &h.store, &refs).await;

        let err = h
            .controller
            .submit(SubmitRequest {
                input_file_id: file_id,
                model_name: "gemma-3-4b".to_string(),
                endpoint: "/v1/chat/completions".to_string(),
                completion_window: None,
                metadata: Default::default(),
                webhook_url: None,
                webhook_secret: None,
                priority: 0,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, AdmissionError::MalformedInputFile(_)));
    }

    #[tokio::test]
    async fn rejects_unknown_model() {
        let h = harness();
        let file_id = upload_input(&h.storage, &h.store, &[&line("req-1")]).await;

        let err = h
            .controller
            .submit(SubmitRequest {
                input_file_id: file_id,
                model_name: "nope".to_string(),
                endpoint: "/v1/chat/completions".to_string(),
                completion_window: None,
                metadata: Default::default(),
                webhook_url: None,
                webhook_secret: None,
                priority: 0,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, AdmissionError::UnknownModel(_)));
    }

    #[tokio::test]
    async fn rejects_when_queue_depth_exhausted() {
        let h = harness();
        let file_id = upload_input(&h.storage, &h.store, &[&line("req-1")]).await;

        // fill the queue to max_queue_depth with validating jobs directly
        for i in 0..h.max_queue_depth {
            let mut job = sample_job(&format!("filler-{i}"));
            job.status = JobStatus::Validating;
            h.store.upsert_job(&job).await.unwrap();
        }

        let err = h
            .controller
            .submit(SubmitRequest {
                input_file_id: file_id,
                model_name: "gemma-3-4b".to_string(),
                endpoint: "/v1/chat/completions".to_string(),
                completion_window: None,
                metadata: Default::default(),
                webhook_url: None,
                webhook_secret: None,
                priority: 0,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, AdmissionError::QueueFull));
    }

    #[tokio::test]
    async fn rejects_when_gpu_overheated() {
        let h = harness();
        let file_id = upload_input(&h.storage, &h.store, &[&line("req-1")]).await;

        h.gpu_probe.set(Reading::Known {
            memory_used_bytes: 1,
            memory_total_bytes: 16 * 1024 * 1024 * 1024,
            temperature_c: 95.0,
            process_count: 1,
        });

        let err = h
            .controller
            .submit(SubmitRequest {
                input_file_id: file_id,
                model_name: "gemma-3-4b".to_string(),
                endpoint: "/v1/chat/completions".to_string(),
                completion_window: None,
                metadata: Default::default(),
                webhook_url: None,
                webhook_secret: None,
                priority: 0,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, AdmissionError::ServiceUnavailable));
    }

    fn sample_job(id: &str) -> Job {
        Job {
            id: id.to_string(),
            input_file_id: "unused".to_string(),
            output_file_id: None,
            error_file_id: None,
            endpoint: "/v1/chat/completions".to_string(),
            completion_window: None,
            model_name: "gemma-3-4b".to_string(),
            status: JobStatus::Validating,
            request_counts: RequestCounts {
                total: 1,
                completed: 0,
                failed: 0,
            },
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            checkpoint: 0,
            metadata: Default::default(),
            webhook_url: None,
            webhook_secret: None,
            priority: 0,
            attempt_count: 0,
            last_error: None,
            cancel_requested: false,
        }
    }
}
