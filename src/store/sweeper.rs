//! Background task that periodically removes expired images.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::ImageStore;

/// Default interval between sweeps: 1 hour.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

/// Spawn a task that calls [`ImageStore::sweep`] every `interval`.
///
/// The first sweep happens one full interval after spawning. Abort the
/// returned handle to stop the task.
pub fn spawn_sweeper(store: Arc<ImageStore>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let removed = store.sweep().await;
            let remaining = store.len().await;
            let bytes = store.total_bytes().await;
            if removed > 0 {
                info!(removed, remaining, bytes, "Swept expired images");
            } else {
                debug!(remaining, bytes, "Sweep found no expired images");
            }
        }
    })
}
