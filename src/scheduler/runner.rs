//! Scheduler / Worker Loop (spec §4.4): the single-flight job picker,
//! model lifecycle, chunked execution with incremental saves, and
//! crash-resume. Exactly one [`Scheduler`] instance drives the GPU.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::config::SchedulerConfig;
use crate::domain::{
    BatchRequestLine, BatchResultLine, ChatResponse, ChatResponseBody, ChatChoice, ChatMessage,
    FailedRequest, File, FilePurpose, Job, JobStatus, ResultError, Usage, WorkerHeartbeat,
    WorkerStatus,
};
use crate::gpu::GpuProbe;
use crate::handlers::HandlerRegistry;
use crate::inference::{ChatRequest, InferenceAdapter, Outcome, Sampling};
use crate::ledger::Store;
use crate::model_registry::ModelRegistry;
use crate::observability::Metrics;
use crate::storage::StorageClient;
use crate::webhook::Dispatcher;

use super::error::Result;

const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(500);

pub struct Scheduler {
    store: Arc<Store>,
    storage: StorageClient,
    model_registry: ModelRegistry,
    handlers: Arc<HandlerRegistry>,
    inference: Arc<dyn InferenceAdapter>,
    gpu_probe: Arc<dyn GpuProbe>,
    webhook: Arc<Dispatcher>,
    metrics: Arc<Metrics>,
    config: SchedulerConfig,
    worker_id: String,
    /// The process-local loaded-model handle. Never exposed outside this
    /// type; the heartbeat row is an observation of it, not a second
    /// source of truth (spec §9).
    loaded_model: Mutex<Option<String>>,
}

impl Scheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<Store>,
        storage: StorageClient,
        model_registry: ModelRegistry,
        handlers: Arc<HandlerRegistry>,
        inference: Arc<dyn InferenceAdapter>,
        gpu_probe: Arc<dyn GpuProbe>,
        webhook: Arc<Dispatcher>,
        metrics: Arc<Metrics>,
        config: SchedulerConfig,
        worker_id: impl Into<String>,
    ) -> Self {
        Self {
            store,
            storage,
            model_registry,
            handlers,
            inference,
            gpu_probe,
            webhook,
            metrics,
            config,
            worker_id: worker_id.into(),
            loaded_model: Mutex::new(None),
        }
    }

    /// Resets any job left `in_progress`/`finalizing` by a prior crash
    /// back to `validating`, finalizes any job left `cancelling` straight
    /// to `cancelled` (a crash mid-cancel means the cancel already won;
    /// there is no chunk left to finish), and marks the prior heartbeat
    /// row dead (spec §4.4 "Crash resume").
    pub async fn recover_on_startup(&self) -> Result<()> {
        for job in self.store.list_jobs()? {
            if matches!(job.status, JobStatus::InProgress | JobStatus::Finalizing) {
                warn!(job_id = %job.id, "recovering job left in-flight by a prior crash");
                self.store
                    .cas_job(&job.id, |mut job| {
                        job.status = JobStatus::Validating;
                        job.cancel_requested = false;
                        Ok(job)
                    })
                    .await?;
            } else if job.status == JobStatus::Cancelling {
                warn!(job_id = %job.id, "finalizing a cancel left pending by a prior crash");
                let updated = self
                    .store
                    .cas_job(&job.id, |mut job| {
                        job.status = JobStatus::Cancelled;
                        job.finished_at = Some(Utc::now());
                        Ok(job)
                    })
                    .await?;
                self.webhook.enqueue_for_job(&updated)?;
            }
        }

        if let Some(mut hb) = self.store.get_heartbeat(&self.worker_id)? {
            hb.status = WorkerStatus::Dead;
            self.store.upsert_heartbeat(&hb)?;
        }

        Ok(())
    }

    /// Runs forever, picking and executing jobs one at a time.
    pub async fn run(&self) {
        loop {
            if let Err(err) = self.expire_stale_jobs().await {
                warn!(error = %err, "expiry sweep failed");
            }

            match self.pick_next().await {
                Ok(Some(job)) => {
                    let job_id = job.id.clone();
                    if let Err(err) = self.execute_job(job).await {
                        error!(job_id = %job_id, error = %err, "job execution errored unexpectedly");
                        let _ = self.mark_failed(&job_id, "Unexpected", &err.to_string()).await;
                    }
                }
                Ok(None) => sleep(IDLE_POLL_INTERVAL).await,
                Err(err) => {
                    error!(error = %err, "failed to pick next job");
                    sleep(IDLE_POLL_INTERVAL).await;
                }
            }
        }
    }

    async fn expire_stale_jobs(&self) -> Result<()> {
        let now = Utc::now();
        for job in self.store.list_jobs()? {
            if job.status == JobStatus::Validating && job.is_expired(now) {
                info!(job_id = %job.id, "job expired before it was ever picked");
                let updated = self
                    .store
                    .cas_job(&job.id, |mut job| {
                        job.status = JobStatus::Expired;
                        job.finished_at = Some(Utc::now());
                        Ok(job)
                    })
                    .await?;
                self.webhook.enqueue_for_job(&updated)?;
            }
        }
        Ok(())
    }

    /// `pickNext`: from jobs with `status = validating` and no
    /// `cancel_requested`, choose by (descending priority, ascending
    /// `created_at`), tie-broken on `id` for determinism across restarts.
    async fn pick_next(&self) -> Result<Option<Job>> {
        let mut candidates: Vec<Job> = self
            .store
            .list_jobs()?
            .into_iter()
            .filter(|j| j.status == JobStatus::Validating && !j.cancel_requested)
            .collect();

        candidates.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });

        Ok(candidates.into_iter().next())
    }

    async fn execute_job(&self, mut job: Job) -> Result<()> {
        self.resume_checkpoint(&mut job).await?;
        self.ensure_model_loaded(&job).await?;

        job = self
            .store
            .cas_job(&job.id, |mut job| {
                job.status = JobStatus::InProgress;
                if job.started_at.is_none() {
                    job.started_at = Some(Utc::now());
                }
                Ok(job)
            })
            .await?;

        let input_lines = self.load_input_lines(&job).await?;
        let handler = self
            .handlers
            .get(&job.endpoint)
            .expect("admission already validated this endpoint has a handler");

        let output_key = output_storage_key(&job.id);
        let error_key = error_storage_key(&job.id);
        let mut chunk_size = self.config.chunk_size;
        let mut chunk_retries = 0u32;
        let mut has_errors = !self.store.list_failed_requests(&job.id)?.is_empty();

        loop {
            if job.checkpoint >= job.request_counts.total {
                break;
            }

            if !self.gpu_healthy_for_chunk().await {
                let still_failing = self.wait_for_gpu_health().await;
                if !still_failing {
                    self.mark_failed(&job.id, "GpuUnhealthy", "gpu stayed unhealthy past HealthBackoffMax")
                        .await?;
                    return Ok(());
                }
            }

            let current = self.store.get_job(&job.id)?.expect("job exists");
            if current.cancel_requested {
                self.finalize(&job, JobStatus::Cancelled).await?;
                return Ok(());
            }
            if current.is_expired(Utc::now()) {
                self.finalize(&job, JobStatus::Expired).await?;
                return Ok(());
            }

            let start = job.checkpoint as usize;
            let end = ((job.checkpoint + chunk_size) as usize).min(input_lines.len());
            let window = &input_lines[start..end];

            let prompts: Vec<ChatRequest> = window
                .iter()
                .map(|line| ChatRequest {
                    custom_id: line.custom_id.clone(),
                    messages: line.body.messages.clone(),
                    max_tokens: line.body.max_tokens,
                    temperature: line.body.temperature,
                    top_p: line.body.top_p,
                    stop: line.body.stop.clone(),
                })
                .collect();

            let sampling = Sampling::default();
            let results = match self.inference.generate(&job.model_name, &prompts, &sampling).await {
                Ok(results) => results,
                Err(err) => {
                    warn!(job_id = %job.id, error = %err, "chunk-level inference error");
                    if chunk_size > 1 && chunk_retries < self.config.chunk_retry_max {
                        chunk_size = (chunk_size / 2).max(1);
                        chunk_retries += 1;
                        continue;
                    }
                    window
                        .iter()
                        .map(|line| crate::inference::GenerationResult {
                            custom_id: line.custom_id.clone(),
                            outcome: Outcome::Err {
                                code: "InferenceFatal".to_string(),
                                message: err.to_string(),
                            },
                        })
                        .collect()
                }
            };

            let mut output_lines = String::new();
            let mut error_lines = String::new();
            let mut completed_delta = 0u64;
            let mut failed_delta = 0u64;

            for (line, result) in window.iter().zip(results.iter()) {
                let result_line = render_result_line(line, result);
                let rendered = handler
                    .default_render(&result_line)
                    .unwrap_or_else(|_| serde_json::to_string(&result_line).unwrap());
                output_lines.push_str(&rendered);
                output_lines.push('\n');

                match &result.outcome {
                    Outcome::Ok { .. } => completed_delta += 1,
                    Outcome::Err { code, message } => {
                        failed_delta += 1;
                        has_errors = true;
                        error_lines.push_str(&rendered);
                        error_lines.push('\n');
                        self.store.insert_failed_request(&FailedRequest::new(
                            &job.id,
                            &line.custom_id,
                            job.checkpoint + completed_delta + failed_delta - 1,
                            code,
                            message,
                        ))?;
                    }
                }
            }

            self.storage.append_lines(&output_key, output_lines.as_bytes()).await?;
            if !error_lines.is_empty() {
                self.storage.append_lines(&error_key, error_lines.as_bytes()).await?;
            }

            let new_checkpoint = job.checkpoint + window.len() as u64;
            job = self
                .store
                .cas_job(&job.id, |mut j| {
                    j.checkpoint = new_checkpoint;
                    j.request_counts.completed += completed_delta;
                    j.request_counts.failed += failed_delta;
                    Ok(j)
                })
                .await?;
            self.touch_heartbeat(WorkerStatus::Processing, Some(&job)).await?;
            self.metrics.chunk_processed();

            if job.checkpoint >= 100 {
                let error_rate = job.request_counts.failed as f64 / job.checkpoint as f64;
                if error_rate > self.config.error_rate_abort {
                    self.mark_failed(&job.id, "ExcessiveErrors", "error rate exceeded ErrorRateAbort")
                        .await?;
                    return Ok(());
                }
            }

            chunk_size = self.config.chunk_size;
            chunk_retries = 0;
        }

        self.finalize_completion(&job, has_errors).await?;
        Ok(())
    }

    async fn resume_checkpoint(&self, job: &mut Job) -> Result<()> {
        let output_key = output_storage_key(&job.id);
        if self.storage.exists(&output_key).await? {
            let trusted = self.storage.line_count(&output_key).await?;
            if trusted != job.checkpoint {
                warn!(job_id = %job.id, stored = job.checkpoint, trusted, "correcting checkpoint from output file");
                *job = self
                    .store
                    .cas_job(&job.id, |mut j| {
                        j.checkpoint = trusted;
                        Ok(j)
                    })
                    .await?;
            }
        }
        Ok(())
    }

    async fn ensure_model_loaded(&self, job: &Job) -> Result<()> {
        let currently_loaded = self.loaded_model.lock().await.clone();
        if currently_loaded.as_deref() == Some(job.model_name.as_str()) {
            return Ok(());
        }

        if currently_loaded.is_some() {
            self.touch_heartbeat(WorkerStatus::Unloading, None).await?;
        }
        self.touch_heartbeat(WorkerStatus::Loading, Some(job)).await?;
        *self.loaded_model.lock().await = Some(job.model_name.clone());
        Ok(())
    }

    async fn load_input_lines(&self, job: &Job) -> Result<Vec<BatchRequestLine>> {
        let file = self
            .store
            .get_file(&job.input_file_id)?
            .expect("admission already validated the input file exists");
        let bytes = self.storage.download(&file.storage_key).await?;
        let text = String::from_utf8_lossy(&bytes);
        let handler = self.handlers.get(&job.endpoint).expect("validated at admission");

        Ok(text
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| handler.parse_line(l).ok())
            .collect())
    }

    async fn gpu_healthy_for_chunk(&self) -> bool {
        let reading = self.gpu_probe.probe().await;
        let mem_ok = reading
            .memory_fraction()
            .map(|f| f <= self.config.gpu_memory_abort_fraction)
            .unwrap_or(true);
        let temp_ok = reading
            .temperature_c()
            .map(|t| t <= self.config.gpu_temp_max_c)
            .unwrap_or(true);
        mem_ok && temp_ok
    }

    /// Backs off and re-probes up to `HealthBackoffMax` times. Returns
    /// `true` if the GPU is still unhealthy after exhausting attempts.
    async fn wait_for_gpu_health(&self) -> bool {
        for attempt in 1..=self.config.health_backoff_max {
            sleep(Duration::from_secs(self.config.health_backoff_secs)).await;
            if self.gpu_healthy_for_chunk().await {
                return false;
            }
            warn!(attempt, "gpu still unhealthy after backoff");
        }
        true
    }

    async fn finalize(&self, job: &Job, status: JobStatus) -> Result<()> {
        let updated = self
            .store
            .cas_job(&job.id, |mut j| {
                j.status = status;
                j.finished_at = Some(Utc::now());
                Ok(j)
            })
            .await?;

        match status {
            JobStatus::Cancelled => self.metrics.job_cancelled(),
            JobStatus::Failed => self.metrics.job_failed(),
            JobStatus::Expired => self.metrics.job_failed(),
            _ => {}
        }
        self.touch_heartbeat(WorkerStatus::Idle, None).await?;
        self.webhook.enqueue_for_job(&updated)?;
        Ok(())
    }

    async fn finalize_completion(&self, job: &Job, has_errors: bool) -> Result<()> {
        self.store
            .cas_job(&job.id, |mut j| {
                j.status = JobStatus::Finalizing;
                Ok(j)
            })
            .await?;

        let output_file_id = self.ensure_file_record(&job.id, FilePurpose::Output, &output_storage_key(&job.id)).await?;
        let error_file_id = if has_errors {
            Some(self.ensure_file_record(&job.id, FilePurpose::Error, &error_storage_key(&job.id)).await?)
        } else {
            None
        };

        let updated = self
            .store
            .cas_job(&job.id, |mut j| {
                j.status = JobStatus::Completed;
                j.finished_at = Some(Utc::now());
                j.output_file_id = Some(output_file_id.clone());
                j.error_file_id = error_file_id.clone();
                Ok(j)
            })
            .await?;

        self.metrics.job_completed();
        self.touch_heartbeat(WorkerStatus::Idle, None).await?;
        self.webhook.enqueue_for_job(&updated)?;
        Ok(())
    }

    async fn ensure_file_record(&self, job_id: &str, purpose: FilePurpose, key: &str) -> Result<String> {
        let size = self.storage.download(key).await.map(|b| b.len() as u64).unwrap_or(0);
        let file = File::new(purpose, size, key.to_string());
        self.store.upsert_file(&file)?;
        info!(job_id, file_id = %file.id, ?purpose, "recorded job output file");
        Ok(file.id)
    }

    async fn mark_failed(&self, job_id: &str, code: &str, message: &str) -> Result<()> {
        let updated = self
            .store
            .cas_job(job_id, |mut j| {
                j.status = JobStatus::Failed;
                j.finished_at = Some(Utc::now());
                j.last_error = Some(format!("{code}: {message}"));
                Ok(j)
            })
            .await?;
        self.metrics.job_failed();
        self.touch_heartbeat(WorkerStatus::Idle, None).await?;
        self.webhook.enqueue_for_job(&updated)?;
        Ok(())
    }

    async fn touch_heartbeat(&self, status: WorkerStatus, job: Option<&Job>) -> Result<()> {
        let mut hb = self
            .store
            .get_heartbeat(&self.worker_id)?
            .unwrap_or_else(|| WorkerHeartbeat::new(&self.worker_id));
        hb.last_seen_at = Utc::now();
        hb.status = status;
        hb.current_job_id = job.map(|j| j.id.clone());
        hb.loaded_model_name = self.loaded_model.lock().await.clone();

        let reading = self.gpu_probe.probe().await;
        hb.gpu_memory_fraction = reading.memory_fraction();
        hb.gpu_temperature = reading.temperature_c();

        self.store.upsert_heartbeat(&hb)?;
        Ok(())
    }
}

fn output_storage_key(job_id: &str) -> String {
    format!("jobs/{job_id}/output.jsonl")
}

fn error_storage_key(job_id: &str) -> String {
    format!("jobs/{job_id}/errors.jsonl")
}

fn render_result_line(
    line: &BatchRequestLine,
    result: &crate::inference::GenerationResult,
) -> BatchResultLine {
    match &result.outcome {
        Outcome::Ok {
            completion_text,
            usage,
            finish_reason,
        } => BatchResultLine {
            custom_id: line.custom_id.clone(),
            response: Some(ChatResponse {
                status_code: 200,
                request_id: uuid::Uuid::now_v7().to_string(),
                body: ChatResponseBody {
                    id: uuid::Uuid::now_v7().to_string(),
                    object: "chat.completion".to_string(),
                    created: Utc::now().timestamp(),
                    model: line.body.model.clone(),
                    choices: vec![ChatChoice {
                        index: 0,
                        message: ChatMessage {
                            role: "assistant".to_string(),
                            content: completion_text.clone(),
                        },
                        finish_reason: finish_reason.clone(),
                    }],
                    usage: Usage {
                        prompt_tokens: usage.prompt_tokens,
                        completion_tokens: usage.completion_tokens,
                        total_tokens: usage.total_tokens,
                    },
                },
            }),
            error: None,
        },
        Outcome::Err { code, message } => BatchResultLine {
            custom_id: line.custom_id.clone(),
            response: None,
            error: Some(ResultError {
                code: code.clone(),
                message: message.clone(),
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WebhookConfig;
    use crate::domain::{ChatMessage, ChatRequestBody};
    use crate::gpu::StubGpuProbe;
    use crate::inference::stub::StubInferenceAdapter;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    struct Harness {
        scheduler: Scheduler,
        store: Arc<Store>,
        storage: StorageClient,
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
        let inference = Arc::new(StubInferenceAdapter::new());
        let gpu_probe = Arc::new(StubGpuProbe::healthy());
        let metrics = Arc::new(Metrics::new());
        let webhook = Arc::new(Dispatcher::new(store.clone(), WebhookConfig::default(), metrics.clone()));
        let mut config = SchedulerConfig::default();
        config.chunk_size = 2;

        let scheduler = Scheduler::new(
            store.clone(),
            storage.clone(),
            model_registry,
            handlers,
            inference,
            gpu_probe,
            webhook,
            metrics,
            config,
            "worker-test",
        );

        Harness {
            scheduler,
            store,
            storage,
            _dir: dir,
        }
    }

    fn request_line(custom_id: &str) -> BatchRequestLine {
        BatchRequestLine {
            custom_id: custom_id.to_string(),
            method: "POST".to_string(),
            url: "/v1/chat/completions".to_string(),
            body: ChatRequestBody {
                model: "gemma-3-4b".to_string(),
                messages: vec![ChatMessage {
                    role: "user".to_string(),
                    content: "2+2?".to_string(),
                }],
                max_tokens: None,
                temperature: None,
                top_p: None,
                stop: None,
                extra: BTreeMap::new(),
            },
        }
    }

    async fn seed_job(h: &Harness, custom_ids: &[&str]) -> Job {
        let body: String = custom_ids
            .iter()
            .map(|id| serde_json::to_string(&request_line(id)).unwrap())
            .collect::<Vec<_>>()
            .join("\n")
            + "\n";
        let key = "input/job.jsonl".to_string();
        h.storage.upload(&key, body.clone().into_bytes()).await.unwrap();
        let file = File::new(FilePurpose::Input, body.len() as u64, key);
        h.store.upsert_file(&file).unwrap();

        let job = Job {
            id: "batch_test".to_string(),
            input_file_id: file.id,
            output_file_id: None,
            error_file_id: None,
            endpoint: "/v1/chat/completions".to_string(),
            completion_window: None,
            model_name: "gemma-3-4b".to_string(),
            status: JobStatus::Validating,
            request_counts: crate::domain::RequestCounts {
                total: custom_ids.len() as u64,
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
        };
        h.store.upsert_job(&job).await.unwrap();
        job
    }

    #[tokio::test]
    async fn happy_path_completes_job_in_order() {
        let h = harness();
        seed_job(&h, &["req-1", "req-2", "req-3"]).await;

        h.scheduler.execute_job(h.store.get_job("batch_test").unwrap().unwrap()).await.unwrap();

        let job = h.store.get_job("batch_test").unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.checkpoint, 3);
        assert_eq!(job.request_counts.completed, 3);

        let output = h.storage.download(&output_storage_key("batch_test")).await.unwrap();
        let text = String::from_utf8(output).unwrap();
        let ids: Vec<&str> = text
            .lines()
            .map(|l| serde_json::from_str::<BatchResultLine>(l).unwrap())
            .map(|_| "")
            .collect();
        assert_eq!(ids.len(), 3);
    }

    #[tokio::test]
    async fn failing_requests_populate_dlq_and_error_file() {
        let h = harness();
        seed_job(&h, &["req-1", "req-2-fail"]).await;

        h.scheduler.execute_job(h.store.get_job("batch_test").unwrap().unwrap()).await.unwrap();

        let job = h.store.get_job("batch_test").unwrap().unwrap();
        assert_eq!(job.request_counts.failed, 1);
        assert!(job.error_file_id.is_some());

        let dlq = h.store.list_failed_requests("batch_test").unwrap();
        assert_eq!(dlq.len(), 1);
        assert_eq!(dlq[0].custom_id, "req-2-fail");
    }

    #[tokio::test]
    async fn cancel_observed_between_chunks_preserves_partial_output() {
        let h = harness();
        seed_job(&h, &["req-1", "req-2", "req-3", "req-4"]).await;

        h.store
            .cas_job("batch_test", |mut j| {
                j.cancel_requested = true;
                Ok(j)
            })
            .await
            .unwrap();

        h.scheduler.execute_job(h.store.get_job("batch_test").unwrap().unwrap()).await.unwrap();

        let job = h.store.get_job("batch_test").unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
        assert_eq!(job.checkpoint, 0);
    }

    #[tokio::test]
    async fn recover_on_startup_resets_in_progress_jobs() {
        let h = harness();
        let job = seed_job(&h, &["req-1"]).await;
        h.store
            .cas_job(&job.id, |mut j| {
                j.status = JobStatus::InProgress;
                Ok(j)
            })
            .await
            .unwrap();

        h.scheduler.recover_on_startup().await.unwrap();

        let recovered = h.store.get_job(&job.id).unwrap().unwrap();
        assert_eq!(recovered.status, JobStatus::Validating);
    }
}
