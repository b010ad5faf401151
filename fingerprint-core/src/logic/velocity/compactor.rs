//! Background Compactor
//!
//! Periodic tokio task running scheduled compaction. Never blocks callers
//! of `record`/`query`; each pass holds locks only for the swap steps.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;

use super::index::VelocityIndex;

/// Spawn the compaction loop on the current tokio runtime
pub fn spawn_compactor(index: Arc<VelocityIndex>, interval: Duration, retention: chrono::Duration) -> JoinHandle<()> {
    log::info!(
        "Starting velocity compactor (every {}s, retention {}s)",
        interval.as_secs(),
        retention.num_seconds()
    );

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // First tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let removed = index.compact(Utc::now(), retention);
            if removed > 0 {
                log::info!("Compacted {} velocity events ({} live)", removed, index.len());
            }
        }
    })
}

/// Compactor using the index's own interval and retention
pub fn spawn_default_compactor(index: Arc<VelocityIndex>) -> JoinHandle<()> {
    let interval = Duration::from_secs(index.config().compaction_interval_secs);
    let retention = chrono::Duration::seconds(index.config().retention_secs);
    spawn_compactor(index, interval, retention)
}
