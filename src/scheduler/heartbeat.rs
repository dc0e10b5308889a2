//! Background heartbeat timer (spec §4.4 "Heartbeat"): advances
//! `WorkerHeartbeat.last_seen_at` on a fixed period, independent of
//! whatever state the scheduler loop's own transitions already wrote.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::warn;

use crate::domain::WorkerHeartbeat;
use crate::ledger::Store;

pub async fn run(store: Arc<Store>, worker_id: String, period: Duration) {
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        if let Err(err) = tick(&store, &worker_id).await {
            warn!(error = %err, "heartbeat tick failed");
        }
    }
}

async fn tick(store: &Store, worker_id: &str) -> crate::ledger::Result<()> {
    let mut hb = store
        .get_heartbeat(worker_id)?
        .unwrap_or_else(|| WorkerHeartbeat::new(worker_id));
    hb.last_seen_at = Utc::now();
    store.upsert_heartbeat(&hb)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn tick_creates_heartbeat_when_absent() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path().join("store")).unwrap();

        tick(&store, "worker-1").await.unwrap();
        let hb = store.get_heartbeat("worker-1").unwrap().unwrap();
        assert_eq!(hb.worker_id, "worker-1");
    }

    #[tokio::test]
    async fn tick_advances_existing_heartbeat() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path().join("store")).unwrap();
        let mut hb = WorkerHeartbeat::new("worker-1");
        hb.last_seen_at = Utc::now() - chrono::Duration::seconds(120);
        store.upsert_heartbeat(&hb).unwrap();

        tick(&store, "worker-1").await.unwrap();
        let refreshed = store.get_heartbeat("worker-1").unwrap().unwrap();
        assert!(refreshed.last_seen_at > hb.last_seen_at);
    }
}
