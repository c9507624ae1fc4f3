//! Per-user warming state.
//!
//! Each user with an active or finished warming pass has one `WarmingState`.
//! Readiness flags only move from false to true; the only way back is
//! `remove` followed by a fresh `create`, which also bumps the generation so
//! tasks from an earlier pass cannot mark the new one ready.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error};

/// The two caches a warming pass fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheType {
    Competitor,
    Trending,
}

impl CacheType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheType::Competitor => "competitor",
            CacheType::Trending => "trending",
        }
    }
}

impl fmt::Display for CacheType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handle to a background warming task.
///
/// Cloning is cheap and every clone observes the same completion. Dropping a
/// handle, or timing out while waiting on one, never cancels the task.
#[derive(Clone)]
pub struct WarmTask {
    done: Arc<AtomicBool>,
    completion: Shared<BoxFuture<'static, ()>>,
}

impl WarmTask {
    /// Spawn `work` onto the runtime and return a handle to it
    pub fn spawn<F>(work: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let done = Arc::new(AtomicBool::new(false));
        let flag = done.clone();

        let handle = tokio::spawn(async move {
            work.await;
            flag.store(true, Ordering::Release);
        });

        let completion = async move {
            if let Err(e) = handle.await {
                error!(error = %e, "Warming task panicked");
            }
        }
        .boxed()
        .shared();

        Self { done, completion }
    }

    pub fn is_finished(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// Resolves once the task has run to completion
    pub async fn wait(&self) {
        self.completion.clone().await
    }
}

impl fmt::Debug for WarmTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WarmTask")
            .field("finished", &self.is_finished())
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct PendingTasks {
    pub competitor: Option<WarmTask>,
    pub trending: Option<WarmTask>,
}

impl PendingTasks {
    fn get(&self, cache: CacheType) -> Option<&WarmTask> {
        match cache {
            CacheType::Competitor => self.competitor.as_ref(),
            CacheType::Trending => self.trending.as_ref(),
        }
    }

    fn slot(&mut self, cache: CacheType) -> &mut Option<WarmTask> {
        match cache {
            CacheType::Competitor => &mut self.competitor,
            CacheType::Trending => &mut self.trending,
        }
    }
}

/// Warming state for a single user
#[derive(Debug, Clone)]
pub struct WarmingState {
    pub user_id: String,
    pub niche: String,
    pub competitors: Vec<String>,
    pub competitor_posts_ready: bool,
    pub trending_posts_ready: bool,
    pub is_warming: bool,
    pub pending_tasks: PendingTasks,
    /// Distinguishes this pass from earlier ones for the same user
    pub generation: u64,
    pub created_at: Instant,
    /// Set once every launched task has finished
    pub finished_at: Option<Instant>,
}

impl WarmingState {
    fn ready(&self, cache: CacheType) -> bool {
        match cache {
            CacheType::Competitor => self.competitor_posts_ready,
            CacheType::Trending => self.trending_posts_ready,
        }
    }

    fn is_stale(&self, now: Instant, max_age: Duration) -> bool {
        match self.finished_at {
            Some(finished) => !self.is_warming && now.duration_since(finished) >= max_age,
            None => false,
        }
    }

    fn set_ready(&mut self, cache: CacheType) {
        match cache {
            CacheType::Competitor => self.competitor_posts_ready = true,
            CacheType::Trending => self.trending_posts_ready = true,
        }
    }
}

/// Readiness snapshot for both caches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStatus {
    pub competitor: bool,
    pub trending: bool,
}

/// What a waiter should do for one (user, cache) pair
#[derive(Debug, Clone)]
pub enum TaskLookup {
    /// Warming never started for this user
    NoState,
    /// No task to wait on; carries current readiness
    Settled(bool),
    Pending(WarmTask),
}

/// Registry of warming states, one per user.
#[derive(Debug, Default)]
pub struct WarmingStateTracker {
    states: DashMap<String, WarmingState>,
    next_generation: AtomicU64,
}

impl WarmingStateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a warming pass for `user_id`.
    ///
    /// Returns the generation of the new state, or `None` if a state already
    /// exists (warming is never started twice for the same user).
    pub fn create(&self, user_id: &str, niche: &str, competitors: &[String]) -> Option<u64> {
        match self.states.entry(user_id.to_string()) {
            Entry::Occupied(_) => {
                debug!(user_id = user_id, "Warming state already exists");
                None
            }
            Entry::Vacant(slot) => {
                let generation = self.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
                slot.insert(WarmingState {
                    user_id: user_id.to_string(),
                    niche: niche.to_string(),
                    competitors: competitors.to_vec(),
                    competitor_posts_ready: false,
                    trending_posts_ready: false,
                    is_warming: true,
                    pending_tasks: PendingTasks::default(),
                    generation,
                    created_at: Instant::now(),
                    finished_at: None,
                });
                debug!(
                    user_id = user_id,
                    niche = niche,
                    competitors = competitors.len(),
                    generation = generation,
                    "Created warming state"
                );
                Some(generation)
            }
        }
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.states.contains_key(user_id)
    }

    pub fn get(&self, user_id: &str) -> Option<WarmingState> {
        self.states.get(user_id).map(|s| s.value().clone())
    }

    pub fn mark_ready(&self, user_id: &str, cache: CacheType) {
        if let Some(mut state) = self.states.get_mut(user_id) {
            state.set_ready(cache);
        }
    }

    /// Mark ready only if the state still belongs to `generation`
    pub fn mark_ready_for(&self, user_id: &str, cache: CacheType, generation: u64) {
        if let Some(mut state) = self.states.get_mut(user_id) {
            if state.generation == generation {
                state.set_ready(cache);
            } else {
                debug!(
                    user_id = user_id,
                    cache = %cache,
                    "Ignoring readiness from a superseded warming pass"
                );
            }
        }
    }

    pub fn attach_task(&self, user_id: &str, cache: CacheType, generation: u64, task: WarmTask) {
        if let Some(mut state) = self.states.get_mut(user_id) {
            if state.generation == generation {
                *state.pending_tasks.slot(cache) = Some(task);
            }
        }
    }

    /// Clear the overall warming flag once every launched task has finished
    pub fn finish_warming(&self, user_id: &str, generation: u64) {
        if let Some(mut state) = self.states.get_mut(user_id) {
            if state.generation == generation {
                state.is_warming = false;
                state.finished_at = Some(Instant::now());
                debug!(
                    user_id = %state.user_id,
                    elapsed_ms = state.created_at.elapsed().as_millis() as u64,
                    "Warming pass finished"
                );
            }
        }
    }

    pub fn is_ready(&self, user_id: &str, cache: CacheType) -> bool {
        self.states
            .get(user_id)
            .map(|s| s.ready(cache))
            .unwrap_or(false)
    }

    pub fn is_warming(&self, user_id: &str, cache: CacheType) -> bool {
        self.states
            .get(user_id)
            .map(|s| s.is_warming && !s.ready(cache) && s.pending_tasks.get(cache).is_some())
            .unwrap_or(false)
    }

    pub fn lookup(&self, user_id: &str, cache: CacheType) -> TaskLookup {
        match self.states.get(user_id) {
            None => TaskLookup::NoState,
            Some(state) => match state.pending_tasks.get(cache) {
                Some(task) => TaskLookup::Pending(task.clone()),
                None => TaskLookup::Settled(state.ready(cache)),
            },
        }
    }

    pub fn status(&self, user_id: &str) -> CacheStatus {
        self.states
            .get(user_id)
            .map(|s| CacheStatus {
                competitor: s.competitor_posts_ready,
                trending: s.trending_posts_ready,
            })
            .unwrap_or_default()
    }

    pub fn remove(&self, user_id: &str) -> bool {
        self.states.remove(user_id).is_some()
    }

    /// Remove the state for `user_id` if it finished warming at least
    /// `max_age` ago. Returns whether it was removed.
    pub fn remove_if_stale(&self, user_id: &str, max_age: Duration) -> bool {
        let now = Instant::now();
        self.states
            .remove_if(user_id, |_, s| s.is_stale(now, max_age))
            .is_some()
    }

    /// Remove states that finished at least `max_age` ago, returning how
    /// many went
    pub fn prune_stale(&self, max_age: Duration) -> usize {
        let now = Instant::now();
        let before = self.states.len();
        self.states.retain(|_, s| {
            let stale = s.is_stale(now, max_age);
            if stale {
                debug!(user_id = %s.user_id, "Pruning stale warming state");
            }
            !stale
        });
        before.saturating_sub(self.states.len())
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Number of states with work still outstanding
    pub fn warming_count(&self) -> usize {
        self.states.iter().filter(|s| s.is_warming).count()
    }
}
