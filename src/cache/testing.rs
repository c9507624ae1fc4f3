//! Fakes and helpers shared by the cache tests.

use crate::cache::post::{CachedPost, RawPost};
use crate::cache::state::WarmingStateTracker;
use crate::cache::ttl::PostCaches;
use crate::cache::warmer::{CacheWarmer, WarmerConfig};
use crate::error::WarmerError;
use crate::metrics::create_metrics;
use crate::services::scraper::PostScraper;
use crate::services::storage::{
    CompetitorsField, MemoryStore, StoredCompetitorPosts, StoredProfile, UserStore,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn post(id: &str, likes: i64, comments: i64) -> RawPost {
    RawPost {
        id: Some(id.to_string()),
        likes_count: Some(likes),
        comments_count: Some(comments),
        ..Default::default()
    }
}

pub fn profile(niche: Option<&str>, competitors: &[&str]) -> StoredProfile {
    StoredProfile {
        niche: niche.map(str::to_string),
        competitors: CompetitorsField::List(competitors.iter().map(|c| c.to_string()).collect()),
    }
}

pub fn warmer_with(store: Arc<MemoryStore>, scraper: Arc<FakeScraper>) -> CacheWarmer {
    warmer_with_store(store, scraper)
}

pub fn warmer_with_store(store: Arc<dyn UserStore>, scraper: Arc<FakeScraper>) -> CacheWarmer {
    CacheWarmer::new(
        store,
        scraper,
        PostCaches::default(),
        Arc::new(WarmingStateTracker::new()),
        WarmerConfig::default(),
        create_metrics(),
    )
}

/// Poll `cond` on a short timer until it holds, panicking if it never does.
/// Under a paused clock the sleeps let spawned tasks and their timers run.
pub async fn eventually<F: Fn() -> bool>(cond: F) {
    for _ in 0..1000 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

/// Scraper returning canned posts, with call counters.
#[derive(Default)]
pub struct FakeScraper {
    pub competitor_posts: Vec<RawPost>,
    pub trending_posts: Vec<RawPost>,
    pub fail_competitors: bool,
    pub fail_trending: bool,
    /// Applied before every response
    pub delay: Duration,
    pub competitor_calls: AtomicUsize,
    pub trending_calls: AtomicUsize,
    pub(crate) urls: Mutex<Vec<String>>,
}

impl FakeScraper {
    pub fn last_urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PostScraper for FakeScraper {
    async fn scrape_competitor_profiles(
        &self,
        urls: &[String],
        _posts_per_profile: u32,
    ) -> Result<Vec<RawPost>, WarmerError> {
        self.competitor_calls.fetch_add(1, Ordering::SeqCst);
        *self.urls.lock().unwrap() = urls.to_vec();

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail_competitors {
            return Err(WarmerError::Upstream("HTTP 429".into()));
        }
        Ok(self.competitor_posts.clone())
    }

    async fn search_trending_posts(
        &self,
        _niche: &str,
        _limit: u32,
    ) -> Result<Vec<RawPost>, WarmerError> {
        self.trending_calls.fetch_add(1, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail_trending {
            return Err(WarmerError::Upstream("HTTP 503".into()));
        }
        Ok(self.trending_posts.clone())
    }
}

/// `MemoryStore` whose stored competitor posts take `read_delay` to load.
pub struct SlowStore {
    pub inner: MemoryStore,
    pub read_delay: Duration,
}

#[async_trait]
impl UserStore for SlowStore {
    async fn get_user(&self, user_id: &str) -> Result<Option<StoredProfile>, WarmerError> {
        self.inner.get_user(user_id).await
    }

    async fn get_cached_competitor_posts(
        &self,
        user_id: &str,
    ) -> Result<Option<StoredCompetitorPosts>, WarmerError> {
        tokio::time::sleep(self.read_delay).await;
        self.inner.get_cached_competitor_posts(user_id).await
    }

    async fn set_cached_competitor_posts(
        &self,
        user_id: &str,
        posts: &[CachedPost],
    ) -> Result<(), WarmerError> {
        self.inner.set_cached_competitor_posts(user_id, posts).await
    }
}
