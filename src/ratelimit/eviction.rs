//! Background eviction of idle counters.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use super::registry::LimiterRegistry;

/// Periodically remove counters that have been empty for `idle_ttl`.
///
/// The task runs until the returned handle is aborted or the runtime shuts
/// down.
pub fn spawn_eviction_task(
    registry: Arc<LimiterRegistry>,
    window: Duration,
    idle_ttl: Duration,
    every: Duration,
) -> JoinHandle<()> {
    info!(
        interval_secs = every.as_secs_f64(),
        idle_ttl_secs = idle_ttl.as_secs_f64(),
        "Idle counter eviction started"
    );

    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let evicted = registry.evict_idle(window, idle_ttl);
            debug!(evicted, tracked = registry.len(), "Eviction sweep finished");
        }
    })
}
