//! Retention policy for terminal jobs.
//!
//! Finished jobs (`completed`, `failed`, `expired`, `cancelled`) stay in the
//! `jobs` partition after the scheduler is done with them so clients can
//! still poll status and download results. Past the retention window they're
//! reclaimed by [`prune_terminal_jobs`], which the scheduler's heartbeat task
//! calls once per sweep (spec §6.5 `RetentionDays`).

use chrono::{Duration, Utc};
use fjall::PartitionHandle;
use tracing::info;

use crate::domain::Job;

use super::error::Result;
use super::partitions::encode_job_key;

#[derive(Debug, Default)]
pub struct PruneStats {
    pub jobs_pruned: usize,
}

pub fn prune_terminal_jobs(jobs: &PartitionHandle, older_than: Duration) -> Result<PruneStats> {
    let cutoff = Utc::now() - older_than;
    let mut stats = PruneStats::default();

    for item in jobs.iter() {
        let (key, value) = item?;
        let job: Job = serde_json::from_slice(&value)?;

        let finished_at = match job.finished_at {
            Some(t) => t,
            None => continue,
        };

        if job.status.is_terminal() && finished_at < cutoff {
            jobs.remove(key)?;
            stats.jobs_pruned += 1;
        }
    }

    if stats.jobs_pruned > 0 {
        info!(pruned = stats.jobs_pruned, "pruned terminal jobs past retention window");
    }

    Ok(stats)
}
