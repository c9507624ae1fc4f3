//! Periodic cache hygiene.

use crate::cache::warmer::CacheWarmer;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Spawn a background task that sweeps expired entries every `interval`
/// until `shutdown` flips to true.
pub fn spawn_sweeper(
    warmer: CacheWarmer,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(interval_secs = interval.as_secs(), "Cache sweeper started");

        loop {
            if *shutdown.borrow() {
                info!("Cache sweeper shutting down");
                return;
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        debug!("Shutdown sender dropped, stopping sweeper");
                        return;
                    }
                    continue;
                }
            }

            let (swept, pruned) = warmer.sweep();
            if swept > 0 || pruned > 0 {
                info!(swept = swept, pruned = pruned, "Swept expired cache data");
            } else {
                debug!("Sweep found nothing to remove");
            }
        }
    })
}
