//! Durable storage for the batch control plane: jobs, files, the dead-letter
//! queue, webhook deliveries, worker heartbeat, and the model registry table.
//!
//! Backed by [`fjall`], an embedded LSM key-value store — no external
//! database to run, which matters for a self-hosted single-box deployment.
//! All domain types are persisted as JSON (see [`crate::domain`]); the key
//! layout for each partition is in [`partitions`].
//!
//! ## Retention
//!
//! Terminal jobs are kept past completion so clients can poll status and
//! fetch results, then reclaimed after `RetentionDays` by [`pruning`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! use batchd::ledger::Store;
//!
//! let store = Store::open("data/ledger")?;
//! store.upsert_job(&job).await?;
//! let job = store.get_job("job_123")?;
//! ```

pub mod error;
pub mod partitions;
pub mod pruning;
pub mod store;

pub use error::{LedgerError, Result};
pub use pruning::PruneStats;
pub use store::Store;
