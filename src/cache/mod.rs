//! Cache warming coordinator.
//!
//! This module provides:
//! - Expiring post caches for competitor (per user) and trending (per niche) data
//! - Per-user warming state with task handles for bounded waits
//! - The background warming pipeline
//! - Readiness queries for request handlers
//! - A periodic sweeper bounding memory use

pub mod post;
pub mod readiness;
pub mod state;
pub mod sweeper;
pub mod ttl;
pub mod warmer;

#[cfg(test)]
pub(crate) mod testing;

pub use post::CachedPost;
pub use state::{CacheStatus, CacheType, WarmingStateTracker};
pub use sweeper::spawn_sweeper;
pub use ttl::PostCaches;
pub use warmer::{CacheWarmer, WarmerConfig};
