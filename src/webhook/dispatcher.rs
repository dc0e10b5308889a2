//! Webhook Dispatcher (spec §4.6): delivers terminal-state notifications
//! with retries, exponential backoff + jitter, and a dead-letter record.
//! Runs independently of the scheduler — deliveries are persisted, so the
//! dispatcher survives scheduler restarts and resumes from the store.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::WebhookConfig;
use crate::domain::{Job, WebhookDelivery};
use crate::ledger::Store;
use crate::observability::Metrics;

use super::signer;

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error(transparent)]
    Ledger(#[from] crate::ledger::LedgerError),
}

pub type Result<T> = std::result::Result<T, WebhookError>;

#[derive(Debug, Serialize)]
struct WebhookPayload {
    id: String,
    object: &'static str,
    endpoint: String,
    status: String,
    created_at: i64,
    completed_at: Option<i64>,
    request_counts: RequestCountsPayload,
    metadata: std::collections::BTreeMap<String, Value>,
    output_file_url: Option<String>,
    error_file_url: Option<String>,
}

#[derive(Debug, Serialize)]
struct RequestCountsPayload {
    total: u64,
    completed: u64,
    failed: u64,
}

pub struct Dispatcher {
    store: Arc<Store>,
    client: Client,
    config: WebhookConfig,
    metrics: Arc<Metrics>,
}

impl Dispatcher {
    pub fn new(store: Arc<Store>, config: WebhookConfig, metrics: Arc<Metrics>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.attempt_timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(3))
            .build()
            .expect("reqwest client configuration is valid");

        Self {
            store,
            client,
            config,
            metrics,
        }
    }

    /// Enqueue a delivery for a job's terminal transition (spec §4.4 step 6).
    /// A no-op when the job has no `webhook_url`.
    pub fn enqueue_for_job(&self, job: &Job) -> Result<()> {
        let Some(url) = job.webhook_url.clone() else {
            return Ok(());
        };
        let secret = job
            .webhook_secret
            .clone()
            .or_else(|| self.config.default_secret.clone());

        let delivery = WebhookDelivery::new(&job.id, job.status_label(), url, secret);
        self.store.upsert_webhook_delivery(&delivery)?;
        info!(job_id = %job.id, delivery_id = %delivery.id, "enqueued webhook delivery");
        Ok(())
    }

    /// One sweep over pending deliveries whose `next_attempt_at` has
    /// passed. Intended to be called on a timer by the retry-queue
    /// drainer task (spec §5 "Task topology").
    pub async fn run_once(&self) -> Result<()> {
        let now = Utc::now();
        for delivery in self.store.list_pending_webhook_deliveries()? {
            if delivery.next_attempt_at > now {
                continue;
            }
            if let Err(err) = self.attempt(delivery).await {
                warn!(error = %err, "webhook delivery attempt errored");
            }
        }
        Ok(())
    }

    async fn attempt(&self, mut delivery: WebhookDelivery) -> Result<()> {
        let job = match self.store.get_job(&delivery.job_id)? {
            Some(job) => job,
            None => {
                warn!(job_id = %delivery.job_id, "webhook delivery references missing job, dropping");
                delivery.terminal = true;
                self.store.upsert_webhook_delivery(&delivery)?;
                return Ok(());
            }
        };

        let payload = build_payload(&job);
        let body = serde_json::to_vec(&payload).expect("payload always serializes");

        delivery.attempt_count += 1;
        self.metrics.webhook_attempt();

        let mut request = self.client.post(&delivery.url).header(
            "content-type",
            "application/json",
        );
        if let Some(secret) = &delivery.secret {
            request = request.header("X-Webhook-Signature", signer::sign(secret, &body));
        }

        let send_result = request.body(body).send().await;

        match send_result {
            Ok(response) => {
                let status = response.status();
                delivery.last_status_code = Some(status.as_u16());

                if status.is_success() {
                    delivery.terminal = true;
                    self.metrics.webhook_terminal();
                    info!(delivery_id = %delivery.id, job_id = %job.id, "webhook delivered");
                } else if status.is_client_error()
                    && status.as_u16() != 408
                    && status.as_u16() != 429
                {
                    delivery.terminal = true;
                    delivery.last_error = Some(format!("permanent failure: HTTP {status}"));
                    self.metrics.webhook_terminal();
                    warn!(delivery_id = %delivery.id, %status, "webhook permanent failure");
                } else {
                    self.schedule_retry(&mut delivery, format!("HTTP {status}"));
                }
            }
            Err(err) => {
                self.schedule_retry(&mut delivery, err.to_string());
            }
        }

        self.store.upsert_webhook_delivery(&delivery)?;
        Ok(())
    }

    fn schedule_retry(&self, delivery: &mut WebhookDelivery, error: String) {
        delivery.last_error = Some(error);

        if delivery.attempt_count >= self.config.max_attempts {
            delivery.terminal = true;
            self.metrics.webhook_terminal();
            warn!(delivery_id = %delivery.id, attempts = delivery.attempt_count, "webhook exhausted retries");
            return;
        }

        let backoff = backoff_with_jitter(
            delivery.attempt_count,
            self.config.base_backoff_secs,
            self.config.max_backoff_secs,
        );
        delivery.next_attempt_at = Utc::now() + chrono::Duration::from_std(backoff).unwrap();
        debug!(
            delivery_id = %delivery.id,
            attempt = delivery.attempt_count,
            backoff_secs = backoff.as_secs(),
            "scheduled webhook retry"
        );
    }
}

fn backoff_with_jitter(attempt: u32, base_secs: u64, max_secs: u64) -> Duration {
    let exp = base_secs.saturating_mul(1u64 << (attempt.saturating_sub(1)).min(20));
    let capped = exp.min(max_secs);
    let jitter_ms = rand::thread_rng().gen_range(0..500);
    Duration::from_secs(capped) + Duration::from_millis(jitter_ms)
}

fn build_payload(job: &Job) -> WebhookPayload {
    WebhookPayload {
        id: job.id.clone(),
        object: "batch",
        endpoint: job.endpoint.clone(),
        status: job.status_label(),
        created_at: job.created_at.timestamp(),
        completed_at: job.finished_at.map(|t| t.timestamp()),
        request_counts: RequestCountsPayload {
            total: job.request_counts.total,
            completed: job.request_counts.completed,
            failed: job.request_counts.failed,
        },
        metadata: job.metadata.clone(),
        output_file_url: job
            .output_file_id
            .as_ref()
            .map(|id| format!("/v1/files/{id}/content")),
        error_file_url: job
            .error_file_id
            .as_ref()
            .map(|id| format!("/v1/files/{id}/content")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_exponentially_until_cap() {
        let d1 = backoff_with_jitter(1, 1, 60);
        let d2 = backoff_with_jitter(2, 1, 60);
        let d3 = backoff_with_jitter(3, 1, 60);
        assert!(d1.as_secs() < 2);
        assert!(d2.as_secs() < 3);
        assert!(d3.as_secs() < 5);

        let capped = backoff_with_jitter(10, 1, 60);
        assert!(capped.as_secs() <= 61);
    }
}
