use crate::cache::ttl::MAX_POST_TTL;
use crate::cache::WarmerConfig;
use anyhow::{Context, Result};
use std::env;
use std::time::Duration;

/// Default post cache TTL: 24 hours in milliseconds
const DEFAULT_CACHE_TTL_MS: u64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct ScraperConfig {
    pub apify_token: Option<String>,
    pub base_url: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub mongo_url: Option<String>,
    pub mongo_db: String,
    pub users_collection: String,
    pub competitor_cache_collection: String,
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub ttl_ms: u64,
    pub sweep_interval_secs: u64,
    pub wait_timeout_ms: u64,
    pub trending_min_cached: usize,
    pub trending_limit: u32,
    pub posts_per_competitor: u32,
    pub top_competitor_posts: usize,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub scraper: ScraperConfig,
    pub storage: StorageConfig,
    pub cache: CacheConfig,
    /// Enable debug logging for scraper requests (set via CLI)
    pub debug_requests: bool,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let defaults = WarmerConfig::default();

        let port = match env::var("PORT") {
            Ok(v) => v.parse().context("PORT must be a valid port number")?,
            Err(_) => 3000,
        };

        let apify_token = env::var("APIFY_TOKEN").ok().filter(|t| !t.is_empty());
        let mongo_url = env::var("MONGO_URL").ok().filter(|u| !u.is_empty());

        Ok(Self {
            server: ServerConfig { port },
            scraper: ScraperConfig {
                apify_token,
                base_url: env::var("APIFY_BASE_URL")
                    .unwrap_or_else(|_| "https://api.apify.com".to_string()),
                request_timeout_secs: env_or("SCRAPER_TIMEOUT_SECS", 180),
            },
            storage: StorageConfig {
                mongo_url,
                mongo_db: env::var("MONGO_DB").unwrap_or_else(|_| "instagen".to_string()),
                users_collection: env::var("MONGO_USERS_COLLECTION")
                    .unwrap_or_else(|_| "users".to_string()),
                competitor_cache_collection: env::var("MONGO_COMPETITOR_CACHE_COLLECTION")
                    .unwrap_or_else(|_| "competitor_cache".to_string()),
            },
            cache: CacheConfig {
                ttl_ms: env_or("CACHE_TTL_MS", DEFAULT_CACHE_TTL_MS),
                sweep_interval_secs: env_or("SWEEP_INTERVAL_SECS", 3600),
                wait_timeout_ms: env_or("WAIT_TIMEOUT_MS", defaults.wait_timeout.as_millis() as u64),
                trending_min_cached: env_or("TRENDING_MIN_CACHED", defaults.trending_min_cached),
                trending_limit: env_or("TRENDING_LIMIT", defaults.trending_limit),
                posts_per_competitor: env_or("POSTS_PER_COMPETITOR", defaults.posts_per_competitor),
                top_competitor_posts: env_or("TOP_COMPETITOR_POSTS", defaults.top_competitor_posts),
            },
            debug_requests: false, // Set by CLI args in main.rs
        })
    }

    /// Post cache TTL, clamped so expiry timestamps cannot overflow
    pub fn post_ttl(&self) -> Duration {
        Duration::from_millis(self.cache.ttl_ms).min(MAX_POST_TTL)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.cache.sweep_interval_secs.max(1))
    }

    pub fn to_warmer_config(&self) -> WarmerConfig {
        WarmerConfig {
            posts_per_competitor: self.cache.posts_per_competitor,
            top_competitor_posts: self.cache.top_competitor_posts,
            trending_limit: self.cache.trending_limit,
            trending_min_cached: self.cache.trending_min_cached,
            wait_timeout: Duration::from_millis(self.cache.wait_timeout_ms),
            state_max_age: self.post_ttl(),
        }
    }
}
