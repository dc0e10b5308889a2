use std::path::Path;
use std::sync::Arc;

use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::domain::{
    FailedRequest, File, Job, JobStatus, WebhookDelivery, WorkerHeartbeat,
};
use crate::model_registry::ModelInfo;

use super::error::Result;
use super::partitions::{
    decode_model_key, encode_dlq_key, encode_dlq_prefix, encode_file_key, encode_heartbeat_key,
    encode_job_key, encode_model_key, encode_webhook_key,
};
use super::pruning::{prune_terminal_jobs, PruneStats};

/// Fjall-backed durable store for jobs, files, the dead-letter queue, the
/// worker heartbeat, webhook deliveries, and the model registry table.
///
/// All job-table read-modify-write sequences go through [`Store::cas_job`],
/// which serializes critical sections behind an in-process lock. This is
/// the "row-level locking or equivalent compare-and-set" the scheduler's
/// concurrency model requires (spec §5) — sufficient because exactly one
/// process is ever the active scheduler for a given store directory.
#[derive(Clone)]
pub struct Store {
    keyspace: Keyspace,
    jobs: PartitionHandle,
    files: PartitionHandle,
    failed_requests: PartitionHandle,
    webhook_deliveries: PartitionHandle,
    heartbeat: PartitionHandle,
    models: PartitionHandle,
    write_lock: Arc<Mutex<()>>,
}

impl Store {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "opening durable store");

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let keyspace = Config::new(path).open()?;
        let jobs = keyspace.open_partition("jobs", PartitionCreateOptions::default())?;
        let files = keyspace.open_partition("files", PartitionCreateOptions::default())?;
        let failed_requests =
            keyspace.open_partition("failed_requests", PartitionCreateOptions::default())?;
        let webhook_deliveries =
            keyspace.open_partition("webhook_deliveries", PartitionCreateOptions::default())?;
        let heartbeat = keyspace.open_partition("heartbeat", PartitionCreateOptions::default())?;
        let models = keyspace.open_partition("models", PartitionCreateOptions::default())?;

        Ok(Self {
            keyspace,
            jobs,
            files,
            failed_requests,
            webhook_deliveries,
            heartbeat,
            models,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    // ---- Jobs ----------------------------------------------------------

    pub async fn upsert_job(&self, job: &Job) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.upsert_job_unlocked(job)
    }

    fn upsert_job_unlocked(&self, job: &Job) -> Result<()> {
        let key = encode_job_key(&job.id);
        let value = serde_json::to_vec(job)?;
        self.jobs.insert(key, value)?;
        debug!(job_id = %job.id, status = ?job.status, "upserted job");
        Ok(())
    }

    pub fn get_job(&self, job_id: &str) -> Result<Option<Job>> {
        match self.jobs.get(encode_job_key(job_id))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Full scan of the jobs partition. Fine at this scale (bounded by
    /// `MaxQueueDepth` non-terminal jobs plus whatever terminal jobs
    /// haven't been pruned yet); a client-server database would add a
    /// secondary index instead (see spec §6.4).
    pub fn list_jobs(&self) -> Result<Vec<Job>> {
        let mut out = Vec::new();
        for item in self.jobs.iter() {
            let (_, value) = item?;
            out.push(serde_json::from_slice(&value)?);
        }
        Ok(out)
    }

    /// Read-modify-write a job under the store's write lock. `f` receives
    /// the current job and returns the updated job; returning `Err` aborts
    /// the write. Callers that need to enforce "only transition from status
    /// X" should check `job.status` inside `f` and return an error if it
    /// has moved.
    pub async fn cas_job<F>(&self, job_id: &str, f: F) -> Result<Job>
    where
        F: FnOnce(Job) -> std::result::Result<Job, super::error::LedgerError>,
    {
        let _guard = self.write_lock.lock().await;
        let current = self
            .get_job(job_id)?
            .ok_or_else(|| super::error::LedgerError::JobNotFound(job_id.to_string()))?;
        let updated = f(current)?;
        self.upsert_job_unlocked(&updated)?;
        Ok(updated)
    }

    // ---- Files -----------------------------------------------------------

    pub fn upsert_file(&self, file: &File) -> Result<()> {
        let key = encode_file_key(&file.id);
        self.files.insert(key, serde_json::to_vec(file)?)?;
        Ok(())
    }

    pub fn get_file(&self, file_id: &str) -> Result<Option<File>> {
        match self.files.get(encode_file_key(file_id))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    // ---- Dead-letter queue -------------------------------------------

    pub fn insert_failed_request(&self, req: &FailedRequest) -> Result<()> {
        let key = encode_dlq_key(&req.job_id, req.request_index);
        self.failed_requests.insert(key, serde_json::to_vec(req)?)?;
        Ok(())
    }

    pub fn list_failed_requests(&self, job_id: &str) -> Result<Vec<FailedRequest>> {
        let prefix = encode_dlq_prefix(job_id);
        let mut out = Vec::new();
        for item in self.failed_requests.prefix(&prefix) {
            let (_, value) = item?;
            out.push(serde_json::from_slice(&value)?);
        }
        Ok(out)
    }

    // ---- Webhook deliveries --------------------------------------------

    pub fn upsert_webhook_delivery(&self, delivery: &WebhookDelivery) -> Result<()> {
        let key = encode_webhook_key(&delivery.id);
        self.webhook_deliveries
            .insert(key, serde_json::to_vec(delivery)?)?;
        Ok(())
    }

    pub fn list_pending_webhook_deliveries(&self) -> Result<Vec<WebhookDelivery>> {
        let mut out = Vec::new();
        for item in self.webhook_deliveries.iter() {
            let (_, value) = item?;
            let delivery: WebhookDelivery = serde_json::from_slice(&value)?;
            if !delivery.terminal {
                out.push(delivery);
            }
        }
        Ok(out)
    }

    // ---- Heartbeat -------------------------------------------------------

    pub fn upsert_heartbeat(&self, hb: &WorkerHeartbeat) -> Result<()> {
        let key = encode_heartbeat_key(&hb.worker_id);
        self.heartbeat.insert(key, serde_json::to_vec(hb)?)?;
        Ok(())
    }

    pub fn get_heartbeat(&self, worker_id: &str) -> Result<Option<WorkerHeartbeat>> {
        match self.heartbeat.get(encode_heartbeat_key(worker_id))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    // ---- Model registry table -------------------------------------------

    pub fn upsert_model(&self, model: &ModelInfo) -> Result<()> {
        let key = encode_model_key(&model.model_name);
        self.models.insert(key, serde_json::to_vec(model)?)?;
        Ok(())
    }

    pub fn get_model(&self, model_name: &str) -> Result<Option<ModelInfo>> {
        match self.models.get(encode_model_key(model_name))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let mut out = Vec::new();
        for item in self.models.iter() {
            let (key, value) = item?;
            if decode_model_key(&key).is_some() {
                out.push(serde_json::from_slice(&value)?);
            }
        }
        Ok(out)
    }

    pub fn models_is_empty(&self) -> Result<bool> {
        Ok(self.models.iter().next().is_none())
    }

    // ---- Maintenance -------------------------------------------------

    pub fn persist(&self) -> Result<()> {
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        Ok(())
    }

    pub fn prune_terminal_jobs(&self, older_than: chrono::Duration) -> Result<PruneStats> {
        prune_terminal_jobs(&self.jobs, older_than)
    }

    pub fn health_check(&self) -> Result<()> {
        let _ = self.jobs.get(b"__health__")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FilePurpose, JobStatus, RequestCounts};
    use chrono::Utc;
    use tempfile::TempDir;

    fn open_store() -> (Store, TempDir) {
        let dir = TempDir::new().unwrap();
        (Store::open(dir.path().join("store")).unwrap(), dir)
    }

    fn sample_job(id: &str) -> Job {
        Job {
            id: id.to_string(),
            input_file_id: "file_in".to_string(),
            output_file_id: None,
            error_file_id: None,
            endpoint: "/v1/chat/completions".to_string(),
            completion_window: None,
            model_name: "gemma-3-4b".to_string(),
            status: JobStatus::Validating,
            request_counts: RequestCounts {
                total: 3,
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

    #[tokio::test]
    async fn upsert_and_get_job() {
        let (store, _dir) = open_store();
        let job = sample_job("job_1");
        store.upsert_job(&job).await.unwrap();

        let fetched = store.get_job("job_1").unwrap().unwrap();
        assert_eq!(fetched.id, "job_1");
        assert_eq!(fetched.request_counts.total, 3);
    }

    #[tokio::test]
    async fn cas_job_applies_mutation() {
        let (store, _dir) = open_store();
        store.upsert_job(&sample_job("job_1")).await.unwrap();

        let updated = store
            .cas_job("job_1", |mut job| {
                job.checkpoint = 1;
                job.status = JobStatus::InProgress;
                Ok(job)
            })
            .await
            .unwrap();

        assert_eq!(updated.checkpoint, 1);
        assert_eq!(store.get_job("job_1").unwrap().unwrap().checkpoint, 1);
    }

    #[tokio::test]
    async fn list_jobs_returns_all() {
        let (store, _dir) = open_store();
        store.upsert_job(&sample_job("job_1")).await.unwrap();
        store.upsert_job(&sample_job("job_2")).await.unwrap();

        let jobs = store.list_jobs().unwrap();
        assert_eq!(jobs.len(), 2);
    }

    #[test]
    fn file_round_trip() {
        let (store, _dir) = open_store();
        let file = File::new(FilePurpose::Input, 100, "blobs/in1".to_string());
        store.upsert_file(&file).unwrap();

        let fetched = store.get_file(&file.id).unwrap().unwrap();
        assert_eq!(fetched.storage_key, "blobs/in1");
    }

    #[test]
    fn dlq_entries_are_listed_in_order() {
        let (store, _dir) = open_store();
        store
            .insert_failed_request(&FailedRequest::new("job_1", "req-10", 10, "E", "m"))
            .unwrap();
        store
            .insert_failed_request(&FailedRequest::new("job_1", "req-2", 2, "E", "m"))
            .unwrap();

        let entries = store.list_failed_requests("job_1").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].request_index, 2);
        assert_eq!(entries[1].request_index, 10);
    }
}
