//! Core entities shared by every component: files, jobs, the dead-letter
//! record, the worker heartbeat, and webhook deliveries.
//!
//! These types are plain data — persistence lives in [`crate::ledger`],
//! blob storage in [`crate::storage`]. Keeping them dependency-free makes
//! them safe to pass across the admission/scheduler/api boundary without
//! pulling in fjall or object_store everywhere.

mod file;
mod heartbeat;
mod job;
mod webhook;

pub use file::{File, FilePurpose};
pub use heartbeat::{WorkerHeartbeat, WorkerStatus};
pub use job::{
    BatchRequestLine, BatchResultLine, ChatChoice, ChatMessage, ChatRequestBody, ChatResponse,
    ChatResponseBody, FailedRequest, Job, JobStatus, RequestCounts, ResponseBody, ResultError,
    Usage,
};
pub use webhook::WebhookDelivery;
