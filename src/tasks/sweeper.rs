//! Expiry Sweeper
//!
//! Optional background task that physically removes expired cache entries.
//! Reads never depend on it: expiry is already enforced on lookup.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::ReadThroughCache;

/// Spawns a task sweeping every cache in `caches` once per `interval`.
///
/// Each sweep holds one cache's lock only for that cache's pass. Abort the
/// returned handle to stop the task.
pub fn spawn_sweeper_task(caches: Vec<Arc<ReadThroughCache>>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            "Starting cache sweeper over {} cache(s) every {:?}",
            caches.len(),
            interval
        );

        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let removed: usize = caches.iter().map(|cache| cache.sweep_expired()).sum();
            if removed > 0 {
                info!("Cache sweep: removed {} expired entries", removed);
            } else {
                debug!("Cache sweep: no expired entries found");
            }
        }
    })
}
