//! Background cache warming.
//!
//! `warm_cache_on_startup` returns immediately; profile loading, scraping and
//! cache population all happen on spawned tasks. A failed or empty fetch
//! still marks its cache ready so that waiters are never stuck: callers tell
//! "no data" apart from "not ready" by the emptiness of the cache.

use crate::cache::post::top_by_engagement;
use crate::cache::state::{CacheType, WarmTask, WarmingStateTracker};
use crate::cache::ttl::PostCaches;
use crate::error::WarmerError;
use crate::metrics::{SharedMetrics, TaskOutcome};
use crate::services::scraper::PostScraper;
use crate::services::storage::{parse_competitors, UserStore};
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};

/// Tunables for the warming pipeline
#[derive(Debug, Clone)]
pub struct WarmerConfig {
    /// Posts requested per competitor profile
    pub posts_per_competitor: u32,
    /// Competitor posts kept after ranking
    pub top_competitor_posts: usize,
    /// Trending posts requested per niche
    pub trending_limit: u32,
    /// Trending entries below this count trigger a refetch
    pub trending_min_cached: usize,
    /// Default bound for `wait_for_cache`
    pub wait_timeout: Duration,
    /// Finished warming states older than this are discarded
    pub state_max_age: Duration,
}

impl Default for WarmerConfig {
    fn default() -> Self {
        Self {
            posts_per_competitor: 10,
            top_competitor_posts: 10,
            trending_limit: 30,
            trending_min_cached: 10,
            wait_timeout: Duration::from_millis(5000),
            state_max_age: Duration::from_secs(86400), // 24 hours
        }
    }
}

/// Inputs resolved from the user's profile for one warming pass
#[derive(Debug)]
struct WarmPlan {
    user_id: String,
    niche: String,
    competitors: Vec<String>,
    generation: u64,
}

/// Coordinates background warming of the competitor and trending caches.
#[derive(Clone)]
pub struct CacheWarmer {
    store: Arc<dyn UserStore>,
    scraper: Arc<dyn PostScraper>,
    pub(crate) caches: PostCaches,
    pub(crate) tracker: Arc<WarmingStateTracker>,
    /// Users whose profile is being loaded, before a state exists
    starting: Arc<DashMap<String, ()>>,
    /// Trending fetches in flight, shared by every user in the niche
    trending_inflight: Arc<DashMap<String, WarmTask>>,
    pub(crate) config: WarmerConfig,
    pub(crate) metrics: SharedMetrics,
}

impl CacheWarmer {
    pub fn new(
        store: Arc<dyn UserStore>,
        scraper: Arc<dyn PostScraper>,
        caches: PostCaches,
        tracker: Arc<WarmingStateTracker>,
        config: WarmerConfig,
        metrics: SharedMetrics,
    ) -> Self {
        Self {
            store,
            scraper,
            caches,
            tracker,
            starting: Arc::new(DashMap::new()),
            trending_inflight: Arc::new(DashMap::new()),
            config,
            metrics,
        }
    }

    pub fn caches(&self) -> &PostCaches {
        &self.caches
    }

    pub fn tracker(&self) -> Arc<WarmingStateTracker> {
        self.tracker.clone()
    }

    pub fn config(&self) -> &WarmerConfig {
        &self.config
    }

    /// Schedule warming for `user_id` without waiting on any of it.
    ///
    /// Returns `false` when a pass for this user is already starting or
    /// holds a live state. A finished state older than `state_max_age` is
    /// discarded and warming starts fresh.
    pub fn warm_cache_on_startup(&self, user_id: &str) -> bool {
        if self.tracker.remove_if_stale(user_id, self.config.state_max_age) {
            debug!(user_id = user_id, "Discarded stale warming state");
        }

        if self.tracker.contains(user_id)
            || self.starting.insert(user_id.to_string(), ()).is_some()
        {
            debug!(user_id = user_id, "Warming already in progress or done");
            self.metrics.record_trigger(false);
            return false;
        }

        self.metrics.record_trigger(true);

        let warmer = self.clone();
        let user_id = user_id.to_string();
        let span = info_span!("warm", user_id = %user_id);

        tokio::spawn(
            async move {
                let plan = warmer.prepare(&user_id).await;
                warmer.starting.remove(&user_id);

                if let Some(plan) = plan {
                    warmer.run(plan).await;
                }
            }
            .instrument(span),
        );

        true
    }

    /// Load the profile and register a warming state
    async fn prepare(&self, user_id: &str) -> Option<WarmPlan> {
        let profile = match self.store.get_user(user_id).await {
            Ok(Some(profile)) => profile,
            Ok(None) => {
                info!("User not found, nothing to warm");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "Failed to load user profile, skipping warm");
                return None;
            }
        };

        let Some(niche) = profile.niche().map(str::to_string) else {
            debug!("No niche set, nothing to warm");
            return None;
        };

        let competitors = parse_competitors(&profile.competitors);
        let generation = self.tracker.create(user_id, &niche, &competitors)?;

        Some(WarmPlan {
            user_id: user_id.to_string(),
            niche,
            competitors,
            generation,
        })
    }

    async fn run(&self, plan: WarmPlan) {
        let start = Instant::now();
        let mut launched = Vec::with_capacity(2);

        info!(
            niche = %plan.niche,
            competitors = plan.competitors.len(),
            "Starting cache warm"
        );

        // Both tasks are attached before anything here awaits, so waiters
        // always find a handle once the state exists.
        if plan.competitors.is_empty() {
            self.tracker
                .mark_ready_for(&plan.user_id, CacheType::Competitor, plan.generation);
        } else {
            let task = WarmTask::spawn(
                self.clone()
                    .warm_competitors(
                        plan.user_id.clone(),
                        plan.competitors.clone(),
                        plan.generation,
                    )
                    .in_current_span(),
            );
            self.tracker.attach_task(
                &plan.user_id,
                CacheType::Competitor,
                plan.generation,
                task.clone(),
            );
            launched.push(task);
        }

        let cached_trending = self.caches.trending.get(&plan.niche).len();
        if cached_trending < self.config.trending_min_cached {
            let fetch = self.trending_fetch(&plan.niche);
            let tracker = self.tracker.clone();
            let user_id = plan.user_id.clone();
            let generation = plan.generation;

            let task = WarmTask::spawn(async move {
                fetch.wait().await;
                tracker.mark_ready_for(&user_id, CacheType::Trending, generation);
            });
            self.tracker
                .attach_task(&plan.user_id, CacheType::Trending, plan.generation, task.clone());
            launched.push(task);
        } else {
            debug!(cached = cached_trending, "Trending cache already warm");
            self.tracker
                .mark_ready_for(&plan.user_id, CacheType::Trending, plan.generation);
        }

        join_all(launched.iter().map(|task| task.wait())).await;
        self.tracker.finish_warming(&plan.user_id, plan.generation);

        let status = self.tracker.status(&plan.user_id);
        info!(
            competitor = status.competitor,
            trending = status.trending,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Cache warm finished"
        );
    }

    /// Seed the in-memory competitor cache from storage if it is empty.
    /// Stored posts only live for what is left of their TTL; posts written
    /// a full TTL ago, or without a write time, are ignored.
    /// Returns how many posts the cache holds afterwards.
    async fn hydrate_competitor_cache(&self, user_id: &str) -> usize {
        let in_memory = self.caches.competitor.get(user_id).len();
        if in_memory > 0 {
            return in_memory;
        }

        let stored = match self.store.get_cached_competitor_posts(user_id).await {
            Ok(Some(stored)) if !stored.posts.is_empty() => stored,
            Ok(_) => return 0,
            Err(e) => {
                warn!(error = %e, "Failed to read stored competitor posts");
                return 0;
            }
        };

        let Some(updated_at) = stored.updated_at else {
            debug!("Stored competitor posts have no write time, not seeding");
            return 0;
        };

        // a write time in the future counts as just written
        let age = (Utc::now() - updated_at).to_std().unwrap_or_default();
        let ttl = self.caches.competitor.ttl();
        if age >= ttl {
            debug!(age_secs = age.as_secs(), "Stored competitor posts expired, not seeding");
            return 0;
        }

        let count = stored.posts.len();
        self.caches
            .competitor
            .set_normalized_for(user_id, stored.posts, ttl - age);
        debug!(count = count, age_secs = age.as_secs(), "Seeded competitor cache from storage");
        count
    }

    async fn warm_competitors(self, user_id: String, competitors: Vec<String>, generation: u64) {
        let start = Instant::now();

        let existing = self.hydrate_competitor_cache(&user_id).await;
        debug!(existing = existing, "Refreshing competitor cache");

        let outcome = match self.fetch_competitor_posts(&user_id, &competitors).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(
                    error = %e,
                    "Competitor warming failed, marking ready without data"
                );
                TaskOutcome::Failed
            }
        };

        self.metrics.record_task(
            CacheType::Competitor,
            outcome,
            start.elapsed().as_secs_f64(),
        );
        self.tracker
            .mark_ready_for(&user_id, CacheType::Competitor, generation);
    }

    async fn fetch_competitor_posts(
        &self,
        user_id: &str,
        competitors: &[String],
    ) -> Result<TaskOutcome, WarmerError> {
        let urls = self.scraper.convert_usernames_to_urls(competitors);
        if urls.is_empty() {
            return Ok(TaskOutcome::Empty);
        }

        let posts = self
            .scraper
            .scrape_competitor_profiles(&urls, self.config.posts_per_competitor)
            .await?;

        if posts.is_empty() {
            info!(profiles = urls.len(), "Scraper returned no competitor posts");
            return Ok(TaskOutcome::Empty);
        }

        let fetched = posts.len();
        let top = top_by_engagement(posts, self.config.top_competitor_posts);
        let cached = self.caches.competitor.set(user_id, top);

        if let Err(e) = self.store.set_cached_competitor_posts(user_id, &cached).await {
            warn!(error = %e, "Failed to persist competitor posts");
        }

        info!(
            fetched = fetched,
            cached = cached.len(),
            "Competitor cache warmed"
        );
        Ok(TaskOutcome::Success)
    }

    /// Handle to the trending fetch for `niche`, joining one already in flight
    fn trending_fetch(&self, niche: &str) -> WarmTask {
        match self.trending_inflight.entry(niche.to_string()) {
            Entry::Occupied(existing) if !existing.get().is_finished() => {
                debug!(niche = niche, "Joining in-flight trending fetch");
                existing.get().clone()
            }
            Entry::Occupied(mut finished) => {
                let task = self.spawn_trending(niche);
                finished.insert(task.clone());
                task
            }
            Entry::Vacant(slot) => {
                let task = self.spawn_trending(niche);
                slot.insert(task.clone());
                task
            }
        }
    }

    fn spawn_trending(&self, niche: &str) -> WarmTask {
        let span = info_span!("trending", niche = %niche);
        WarmTask::spawn(self.clone().warm_trending(niche.to_string()).instrument(span))
    }

    async fn warm_trending(self, niche: String) {
        let start = Instant::now();

        let outcome = match self
            .scraper
            .search_trending_posts(&niche, self.config.trending_limit)
            .await
        {
            Ok(posts) if posts.is_empty() => {
                info!("Scraper returned no trending posts");
                TaskOutcome::Empty
            }
            Ok(mut posts) => {
                posts.truncate(self.config.trending_limit as usize);
                let cached = self.caches.trending.set(&niche, posts);
                info!(cached = cached.len(), "Trending cache warmed");
                TaskOutcome::Success
            }
            Err(e) => {
                warn!(
                    error = %e,
                    "Trending warming failed, marking ready without data"
                );
                TaskOutcome::Failed
            }
        };

        self.metrics
            .record_task(CacheType::Trending, outcome, start.elapsed().as_secs_f64());
    }

    /// Drop expired cache entries, stale warming states and finished
    /// trending handles. Returns (entries swept, states pruned).
    pub fn sweep(&self) -> (usize, usize) {
        let swept = self.caches.sweep_expired();
        let pruned = self.tracker.prune_stale(self.config.state_max_age);
        self.trending_inflight.retain(|_, task| !task.is_finished());

        self.metrics.record_sweep(swept, pruned);
        self.metrics.update_cache_metrics(&self.caches, &self.tracker);
        (swept, pruned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::post::{CachedPost, RawPost};
    use crate::cache::testing::{
        eventually, post, profile, warmer_with, warmer_with_store, FakeScraper, SlowStore,
    };
    use crate::services::storage::MemoryStore;
    use std::sync::atomic::Ordering;

    #[tokio::test(start_paused = true)]
    async fn test_no_niche_does_nothing() {
        let store = Arc::new(MemoryStore::new());
        store.upsert_user("u1", profile(None, &["alice"]));
        let scraper = Arc::new(FakeScraper::default());
        let warmer = warmer_with(store, scraper.clone());

        warmer.warm_cache_on_startup("u1");
        warmer.warm_cache_on_startup("missing");
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(!warmer.tracker.contains("u1"));
        assert!(!warmer.tracker.contains("missing"));
        assert_eq!(scraper.competitor_calls.load(Ordering::SeqCst), 0);
        assert_eq!(scraper.trending_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_competitors_ready_without_scrape() {
        let store = Arc::new(MemoryStore::new());
        store.upsert_user("u1", profile(Some("fitness"), &[]));
        let scraper = Arc::new(FakeScraper::default());
        let warmer = warmer_with(store, scraper.clone());

        warmer.warm_cache_on_startup("u1");
        eventually(|| warmer.is_cache_ready("u1", CacheType::Competitor)).await;

        assert_eq!(scraper.competitor_calls.load(Ordering::SeqCst), 0);
        assert!(warmer.caches.competitor.get("u1").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_trigger_schedules_once() {
        let store = Arc::new(MemoryStore::new());
        store.upsert_user("u1", profile(Some("fitness"), &["alice", "bob"]));
        let scraper = Arc::new(FakeScraper {
            competitor_posts: vec![post("a", 10, 1)],
            trending_posts: vec![post("t", 5, 5)],
            delay: Duration::from_millis(200),
            ..Default::default()
        });
        let warmer = warmer_with(store, scraper.clone());

        assert!(warmer.warm_cache_on_startup("u1"));
        assert!(!warmer.warm_cache_on_startup("u1"));

        eventually(|| {
            warmer
                .tracker
                .get("u1")
                .map(|s| !s.is_warming)
                .unwrap_or(false)
        })
        .await;
        assert!(!warmer.warm_cache_on_startup("u1"));

        assert_eq!(scraper.competitor_calls.load(Ordering::SeqCst), 1);
        assert_eq!(scraper.trending_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_competitor_posts_ranked_and_capped() {
        let store = Arc::new(MemoryStore::new());
        store.upsert_user("u1", profile(Some("fitness"), &["alice", "@bob"]));

        let competitor_posts: Vec<RawPost> = (0..15)
            .map(|i| {
                let mut p = post(&format!("p{}", i), (i * 37) % 101, (i * 11) % 23);
                p.owner_username = Some(if i % 2 == 0 { "alice" } else { "bob" }.to_string());
                p
            })
            .collect();
        let best = competitor_posts
            .iter()
            .map(|p| p.engagement())
            .max()
            .unwrap();

        let scraper = Arc::new(FakeScraper {
            competitor_posts,
            ..Default::default()
        });
        let warmer = warmer_with(store.clone(), scraper.clone());

        warmer.warm_cache_on_startup("u1");
        eventually(|| warmer.is_cache_ready("u1", CacheType::Competitor)).await;

        let cached = warmer.caches.competitor.get("u1");
        assert_eq!(cached.len(), 10);
        assert_eq!(cached[0].engagement, best);
        assert!(cached.windows(2).all(|w| w[0].engagement >= w[1].engagement));
        assert!(cached.iter().all(|p| p.engagement == p.likes + p.comments));

        let persisted = store.get_cached_competitor_posts("u1").await.unwrap().unwrap();
        assert_eq!(persisted.posts, cached);
        assert!(persisted.updated_at.is_some());
        assert_eq!(
            scraper.last_urls(),
            vec![
                "https://www.instagram.com/alice/",
                "https://www.instagram.com/bob/"
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_scraper_failure_still_marks_ready() {
        let store = Arc::new(MemoryStore::new());
        store.upsert_user("u1", profile(Some("fitness"), &["alice"]));
        let scraper = Arc::new(FakeScraper {
            fail_competitors: true,
            trending_posts: vec![post("t1", 1, 1), post("t2", 2, 2)],
            ..Default::default()
        });
        let warmer = warmer_with(store, scraper);

        warmer.warm_cache_on_startup("u1");
        eventually(|| warmer.is_cache_ready("u1", CacheType::Competitor)).await;
        eventually(|| warmer.is_cache_ready("u1", CacheType::Trending)).await;

        assert!(warmer.caches.competitor.get("u1").is_empty());
        assert_eq!(warmer.caches.trending.get("fitness").len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_scrape_marks_ready_without_caching() {
        let store = Arc::new(MemoryStore::new());
        store.upsert_user("u1", profile(Some("fitness"), &["alice"]));
        let scraper = Arc::new(FakeScraper::default());
        let warmer = warmer_with(store, scraper.clone());

        warmer.warm_cache_on_startup("u1");
        eventually(|| warmer.get_cache_status("u1").competitor).await;

        assert_eq!(scraper.competitor_calls.load(Ordering::SeqCst), 1);
        assert!(warmer.caches.competitor.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_warm_trending_cache_is_not_refetched() {
        let store = Arc::new(MemoryStore::new());
        store.upsert_user("u1", profile(Some("fitness"), &[]));
        let scraper = Arc::new(FakeScraper::default());
        let warmer = warmer_with(store, scraper.clone());

        warmer
            .caches
            .trending
            .set("fitness", (0..12).map(|i| post(&i.to_string(), i, 0)).collect());

        warmer.warm_cache_on_startup("u1");
        eventually(|| warmer.is_cache_ready("u1", CacheType::Trending)).await;

        assert_eq!(scraper.trending_calls.load(Ordering::SeqCst), 0);
        assert!(!warmer.is_cache_warming("u1", CacheType::Trending));
    }

    #[tokio::test(start_paused = true)]
    async fn test_users_in_same_niche_share_trending_fetch() {
        let store = Arc::new(MemoryStore::new());
        store.upsert_user("u1", profile(Some("fitness"), &[]));
        store.upsert_user("u2", profile(Some("fitness"), &[]));
        let scraper = Arc::new(FakeScraper {
            trending_posts: vec![post("t", 3, 3)],
            delay: Duration::from_millis(500),
            ..Default::default()
        });
        let warmer = warmer_with(store, scraper.clone());

        warmer.warm_cache_on_startup("u1");
        warmer.warm_cache_on_startup("u2");
        eventually(|| {
            warmer.is_cache_ready("u1", CacheType::Trending)
                && warmer.is_cache_ready("u2", CacheType::Trending)
        })
        .await;

        assert_eq!(scraper.trending_calls.load(Ordering::SeqCst), 1);
        assert_eq!(warmer.caches.trending.get("fitness").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stored_posts_seed_cache_before_refresh() {
        let store = Arc::new(MemoryStore::new());
        store.upsert_user("u1", profile(Some("fitness"), &["alice"]));
        let stored = vec![CachedPost::from(post("old", 9, 9))];
        store.set_cached_competitor_posts("u1", &stored).await.unwrap();

        let scraper = Arc::new(FakeScraper {
            competitor_posts: vec![post("new", 1, 1)],
            delay: Duration::from_millis(500),
            ..Default::default()
        });
        let warmer = warmer_with(store, scraper);

        warmer.warm_cache_on_startup("u1");
        eventually(|| !warmer.caches.competitor.get("u1").is_empty()).await;
        assert_eq!(warmer.caches.competitor.get("u1")[0].id, "old");
        assert!(warmer.is_cache_warming("u1", CacheType::Competitor));

        eventually(|| warmer.is_cache_ready("u1", CacheType::Competitor)).await;
        assert_eq!(warmer.caches.competitor.get("u1")[0].id, "new");
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_stored_posts_are_not_served() {
        let store = Arc::new(MemoryStore::new());
        store.upsert_user("u1", profile(Some("fitness"), &["alice"]));
        store.upsert_user("u2", profile(Some("fitness"), &["bob"]));
        let old = vec![CachedPost::from(post("ancient", 9, 9))];
        store.seed_competitor_posts(
            "u1",
            old.clone(),
            Some(Utc::now() - chrono::Duration::hours(25)),
        );
        store.seed_competitor_posts("u2", old, None);

        let scraper = Arc::new(FakeScraper {
            fail_competitors: true,
            ..Default::default()
        });
        let warmer = warmer_with(store, scraper);

        warmer.warm_cache_on_startup("u1");
        warmer.warm_cache_on_startup("u2");
        eventually(|| {
            warmer.is_cache_ready("u1", CacheType::Competitor)
                && warmer.is_cache_ready("u2", CacheType::Competitor)
        })
        .await;

        assert!(warmer.caches.competitor.get("u1").is_empty());
        assert!(warmer.caches.competitor.get("u2").is_empty());
        let err = warmer
            .require_posts("u1", CacheType::Competitor, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, WarmerError::NoData { cache: CacheType::Competitor }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stored_posts_keep_remaining_lifetime() {
        let store = Arc::new(MemoryStore::new());
        store.upsert_user("u1", profile(Some("fitness"), &["alice"]));
        store.seed_competitor_posts(
            "u1",
            vec![CachedPost::from(post("recent", 9, 9))],
            Some(Utc::now() - chrono::Duration::hours(23)),
        );

        let scraper = Arc::new(FakeScraper {
            fail_competitors: true,
            ..Default::default()
        });
        let warmer = warmer_with(store, scraper);

        warmer.warm_cache_on_startup("u1");
        eventually(|| warmer.is_cache_ready("u1", CacheType::Competitor)).await;
        assert_eq!(warmer.caches.competitor.get("u1")[0].id, "recent");

        tokio::time::advance(Duration::from_secs(2 * 3600)).await;
        assert!(warmer.caches.competitor.get("u1").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tasks_attached_before_storage_read() {
        let inner = MemoryStore::new();
        inner.upsert_user("u1", profile(Some("fitness"), &["alice"]));
        let store = Arc::new(SlowStore {
            inner,
            read_delay: Duration::from_millis(300),
        });
        let scraper = Arc::new(FakeScraper {
            competitor_posts: vec![post("a", 2, 2)],
            trending_posts: vec![post("t", 1, 1)],
            delay: Duration::from_millis(100),
            ..Default::default()
        });
        let warmer = warmer_with_store(store, scraper);

        warmer.warm_cache_on_startup("u1");
        eventually(|| warmer.tracker.contains("u1")).await;
        assert!(warmer.is_cache_warming("u1", CacheType::Competitor));
        assert!(warmer.is_cache_warming("u1", CacheType::Trending));

        let start = Instant::now();
        assert!(
            warmer
                .wait_for_cache("u1", CacheType::Competitor, Duration::from_secs(5))
                .await
        );
        assert!(start.elapsed() >= Duration::from_millis(300));
        assert_eq!(warmer.caches.competitor.get("u1").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trending_failure_still_marks_ready() {
        let store = Arc::new(MemoryStore::new());
        store.upsert_user("u1", profile(Some("fitness"), &["alice"]));
        let scraper = Arc::new(FakeScraper {
            competitor_posts: vec![post("a", 3, 1), post("b", 1, 0)],
            fail_trending: true,
            ..Default::default()
        });
        let warmer = warmer_with(store, scraper.clone());

        warmer.warm_cache_on_startup("u1");
        eventually(|| warmer.tracker.warming_count() == 0 && warmer.tracker.len() == 1).await;

        assert!(warmer.is_cache_ready("u1", CacheType::Trending));
        assert!(warmer.caches.trending.get("fitness").is_empty());
        assert_eq!(scraper.trending_calls.load(Ordering::SeqCst), 1);

        assert!(warmer.is_cache_ready("u1", CacheType::Competitor));
        assert_eq!(warmer.caches.competitor.get("u1").len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_state_is_rewarmed() {
        let store = Arc::new(MemoryStore::new());
        store.upsert_user("u1", profile(Some("fitness"), &["alice"]));
        let scraper = Arc::new(FakeScraper {
            competitor_posts: vec![post("a", 1, 1)],
            ..Default::default()
        });
        let warmer = warmer_with(store, scraper.clone());

        warmer.warm_cache_on_startup("u1");
        eventually(|| warmer.tracker.warming_count() == 0 && warmer.tracker.len() == 1).await;

        tokio::time::advance(warmer.config.state_max_age).await;
        assert!(warmer.warm_cache_on_startup("u1"));
        eventually(|| scraper.competitor_calls.load(Ordering::SeqCst) == 2).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_prunes_finished_states() {
        let store = Arc::new(MemoryStore::new());
        store.upsert_user("u1", profile(Some("fitness"), &[]));
        let scraper = Arc::new(FakeScraper {
            trending_posts: vec![post("t", 1, 1)],
            ..Default::default()
        });
        let warmer = warmer_with(store, scraper);

        warmer.warm_cache_on_startup("u1");
        eventually(|| warmer.tracker.len() == 1 && warmer.tracker.warming_count() == 0).await;

        assert_eq!(warmer.sweep(), (0, 0));

        tokio::time::advance(Duration::from_secs(86400)).await;
        assert_eq!(warmer.sweep(), (1, 1));
        assert!(warmer.caches.trending.is_empty());
        assert!(!warmer.tracker.contains("u1"));
    }
}
