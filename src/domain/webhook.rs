use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A durable webhook delivery attempt record, owned solely by the webhook
/// dispatcher. References the job by id; the job never references back
/// (§9 — resolve cyclic references by id lookup, not structural reference).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookDelivery {
    pub id: String,
    pub job_id: String,
    pub event: String,
    pub url: String,
    pub secret: Option<String>,
    pub attempt_count: u32,
    pub next_attempt_at: DateTime<Utc>,
    pub last_status_code: Option<u16>,
    pub last_error: Option<String>,
    pub terminal: bool,
}

impl WebhookDelivery {
    pub fn new(job_id: &str, event: impl Into<String>, url: String, secret: Option<String>) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            job_id: job_id.to_string(),
            event: event.into(),
            url,
            secret,
            attempt_count: 0,
            next_attempt_at: Utc::now(),
            last_status_code: None,
            last_error: None,
            terminal: false,
        }
    }
}
