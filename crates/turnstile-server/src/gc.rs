use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::task::JoinHandle;
use turnstile_core::Timestamp;
use turnstile_storage::EntitlementStore;

use crate::metrics::Metrics;

/// Drops removal markers older than `retention` relative to `now_millis`.
///
/// A stale upsert for a purged key is applied again, so retention must exceed
/// the longest expected redelivery delay.
pub fn run_purge_cycle(store: &EntitlementStore, retention: Duration, now_millis: i64) -> usize {
    let retention_millis = i64::try_from(retention.as_millis()).unwrap_or(i64::MAX);
    let horizon = Timestamp::new(now_millis).saturating_sub_millis(retention_millis);
    store.purge_removed(horizon)
}

pub fn spawn_purge_task(
    store: Arc<EntitlementStore>,
    metrics: Arc<Metrics>,
    retention: Duration,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // the first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let purged = run_purge_cycle(&store, retention, now_millis());
            metrics.record_removals_purged(purged);
            if purged > 0 {
                tracing::info!(purged, "purged expired removal markers");
            }
        }
    })
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
