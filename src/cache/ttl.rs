//! Expiring post cache.
//!
//! Entries are checked against their deadline on every read, so a missed
//! sweep never serves stale data; the sweeper only bounds memory.

use crate::cache::post::{CachedPost, RawPost};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Default entry lifetime: 24 hours
pub const DEFAULT_POST_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Longest lifetime an entry can be given; larger TTLs are clamped
pub const MAX_POST_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

#[derive(Debug, Clone)]
struct CacheEntry {
    items: Arc<[CachedPost]>,
    expires_at: Instant,
}

fn expiry_after(lifetime: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(lifetime)
        .or_else(|| now.checked_add(MAX_POST_TTL))
        .unwrap_or(now)
}

impl CacheEntry {
    fn is_fresh(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Posts keyed by string with a fixed TTL per entry.
#[derive(Debug, Clone)]
pub struct PostCache {
    name: &'static str,
    entries: Arc<DashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl PostCache {
    pub fn new(name: &'static str, ttl: Duration) -> Self {
        Self {
            name,
            entries: Arc::new(DashMap::new()),
            ttl: ttl.min(MAX_POST_TTL),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Cached posts for `key`, or an empty list when absent or expired.
    pub fn get(&self, key: &str) -> Vec<CachedPost> {
        let now = Instant::now();

        if let Some(entry) = self.entries.get(key) {
            if entry.is_fresh(now) {
                return entry.items.to_vec();
            }
        }

        if self
            .entries
            .remove_if(key, |_, entry| !entry.is_fresh(now))
            .is_some()
        {
            debug!(cache = self.name, key = key, "Dropped expired entry on read");
        }

        Vec::new()
    }

    /// Normalize and store `raw`, replacing any previous entry.
    /// Returns the normalized posts.
    pub fn set(&self, key: &str, raw: Vec<RawPost>) -> Vec<CachedPost> {
        let posts: Vec<CachedPost> = raw.into_iter().map(CachedPost::from).collect();
        self.set_normalized(key, posts.clone());
        posts
    }

    /// Store posts that are already normalized, with the full TTL.
    pub fn set_normalized(&self, key: &str, posts: Vec<CachedPost>) {
        self.set_normalized_for(key, posts, self.ttl);
    }

    /// Store normalized posts that should only live for `lifetime`, e.g. a
    /// stored copy that has already used up part of its TTL.
    pub fn set_normalized_for(&self, key: &str, posts: Vec<CachedPost>, lifetime: Duration) {
        let lifetime = lifetime.min(self.ttl);
        debug!(
            cache = self.name,
            key = key,
            count = posts.len(),
            ttl_secs = lifetime.as_secs(),
            "Cache SET"
        );

        self.entries.insert(
            key.to_string(),
            CacheEntry {
                items: posts.into(),
                expires_at: expiry_after(lifetime),
            },
        );
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Delete every expired entry, returning how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_fresh(now));
        before.saturating_sub(self.entries.len())
    }

    /// Number of stored entries, expired ones included until swept
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The two cache namespaces the warmer fills.
#[derive(Debug, Clone)]
pub struct PostCaches {
    /// Keyed by user id
    pub competitor: PostCache,
    /// Keyed by niche, shared by every user in that niche
    pub trending: PostCache,
}

impl PostCaches {
    pub fn new(ttl: Duration) -> Self {
        Self {
            competitor: PostCache::new("competitor", ttl),
            trending: PostCache::new("trending", ttl),
        }
    }

    pub fn sweep_expired(&self) -> usize {
        self.competitor.sweep_expired() + self.trending.sweep_expired()
    }
}

impl Default for PostCaches {
    fn default() -> Self {
        Self::new(DEFAULT_POST_TTL)
    }
}
