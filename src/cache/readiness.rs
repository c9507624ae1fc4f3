//! Readiness queries for request handlers.
//!
//! Every call here resolves within its timeout: waiting races the recorded
//! task handle against a timer and never cancels the task itself.

use crate::cache::post::CachedPost;
use crate::cache::state::{CacheStatus, CacheType, TaskLookup};
use crate::cache::warmer::CacheWarmer;
use crate::error::WarmerError;
use std::time::Duration;
use tracing::debug;

impl CacheWarmer {
    pub fn is_cache_ready(&self, user_id: &str, cache: CacheType) -> bool {
        self.tracker.is_ready(user_id, cache)
    }

    pub fn is_cache_warming(&self, user_id: &str, cache: CacheType) -> bool {
        self.tracker.is_warming(user_id, cache)
    }

    /// Wait up to `timeout` for `cache` to become ready for `user_id`.
    ///
    /// Returns `false` immediately if warming never started, and the current
    /// readiness if no task was launched for this cache.
    pub async fn wait_for_cache(&self, user_id: &str, cache: CacheType, timeout: Duration) -> bool {
        let task = match self.tracker.lookup(user_id, cache) {
            TaskLookup::NoState => {
                self.metrics.record_wait(cache, "absent");
                return false;
            }
            TaskLookup::Settled(ready) => {
                self.metrics
                    .record_wait(cache, if ready { "ready" } else { "absent" });
                return ready;
            }
            TaskLookup::Pending(task) => task,
        };

        match tokio::time::timeout(timeout, task.wait()).await {
            Ok(()) => {
                self.metrics.record_wait(cache, "ready");
                true
            }
            Err(_) => {
                debug!(
                    user_id = user_id,
                    cache = %cache,
                    timeout_ms = timeout.as_millis() as u64,
                    "Timed out waiting for cache"
                );
                self.metrics.record_wait(cache, "timeout");
                false
            }
        }
    }

    /// `wait_for_cache` bounded by the configured default timeout
    pub async fn wait_for_cache_default(&self, user_id: &str, cache: CacheType) -> bool {
        self.wait_for_cache(user_id, cache, self.config.wait_timeout)
            .await
    }

    pub fn get_cache_status(&self, user_id: &str) -> CacheStatus {
        self.tracker.status(user_id)
    }

    /// Forget the warming state for `user_id`; cached posts are kept
    pub fn cleanup(&self, user_id: &str) -> bool {
        self.tracker.remove(user_id)
    }

    /// Posts a generation request can use, after a bounded wait.
    ///
    /// Cached data is returned even while a refresh is still running. With
    /// nothing cached the result is `NotReady` if warming has not finished
    /// and `NoData` if it finished empty.
    pub async fn require_posts(
        &self,
        user_id: &str,
        cache: CacheType,
        timeout: Duration,
    ) -> Result<Vec<CachedPost>, WarmerError> {
        let ready = self.wait_for_cache(user_id, cache, timeout).await;

        let posts = match cache {
            CacheType::Competitor => self.caches.competitor.get(user_id),
            CacheType::Trending => self
                .tracker
                .get(user_id)
                .map(|state| self.caches.trending.get(&state.niche))
                .unwrap_or_default(),
        };

        if !posts.is_empty() {
            Ok(posts)
        } else if ready {
            Err(WarmerError::NoData { cache })
        } else {
            Err(WarmerError::NotReady { cache })
        }
    }
}
