//! Webhook notification (spec §4.6): signs and delivers terminal-state
//! callbacks with retry/backoff, independent of the scheduler loop.

pub mod dispatcher;
pub mod signer;

pub use dispatcher::{Dispatcher, WebhookError};
