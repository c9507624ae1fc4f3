//! User profile storage consumed by the warmer.

pub mod mongo;

use crate::cache::post::CachedPost;
use crate::error::WarmerError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

pub use mongo::MongoStore;

/// The competitors field as it may appear in stored profiles: a native
/// list, a JSON-array string, or a comma-separated string.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CompetitorsField {
    #[default]
    Missing,
    List(Vec<String>),
    Text(String),
    Other(Value),
}

/// Profile fields the warmer needs
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StoredProfile {
    pub niche: Option<String>,
    #[serde(default)]
    pub competitors: CompetitorsField,
}

impl StoredProfile {
    /// Trimmed niche, `None` when unset or blank
    pub fn niche(&self) -> Option<&str> {
        self.niche
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
    }
}

/// Normalize a stored competitors field into usernames in their original
/// order. Blank entries are dropped; unparseable input yields no competitors.
pub fn parse_competitors(field: &CompetitorsField) -> Vec<String> {
    let names: Vec<String> = match field {
        CompetitorsField::Missing => Vec::new(),
        CompetitorsField::List(items) => items.clone(),
        CompetitorsField::Text(text) => {
            let text = text.trim();
            if text.starts_with('[') {
                match serde_json::from_str::<Vec<Value>>(text) {
                    Ok(items) => strings_from_values(&items),
                    Err(e) => {
                        warn!(error = %e, "Malformed competitors JSON, treating as empty");
                        Vec::new()
                    }
                }
            } else {
                text.split(',').map(str::to_string).collect()
            }
        }
        CompetitorsField::Other(Value::Array(items)) => strings_from_values(items),
        CompetitorsField::Other(other) => {
            warn!(value = %other, "Unsupported competitors value, treating as empty");
            Vec::new()
        }
    };

    names
        .into_iter()
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .collect()
}

fn strings_from_values(items: &[Value]) -> Vec<String> {
    items
        .iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect()
}

/// Competitor posts persisted for a user and when they were written.
/// `updated_at` is `None` for records written without a timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredCompetitorPosts {
    pub posts: Vec<CachedPost>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_user(&self, user_id: &str) -> Result<Option<StoredProfile>, WarmerError>;

    async fn get_cached_competitor_posts(
        &self,
        user_id: &str,
    ) -> Result<Option<StoredCompetitorPosts>, WarmerError>;

    async fn set_cached_competitor_posts(
        &self,
        user_id: &str,
        posts: &[CachedPost],
    ) -> Result<(), WarmerError>;
}

/// Process-local store, used when no database is configured and in tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    users: DashMap<String, StoredProfile>,
    competitor_posts: DashMap<String, StoredCompetitorPosts>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert_user(&self, user_id: &str, profile: StoredProfile) {
        self.users.insert(user_id.to_string(), profile);
    }

    /// Store competitor posts with an explicit write time
    #[cfg(test)]
    pub fn seed_competitor_posts(
        &self,
        user_id: &str,
        posts: Vec<CachedPost>,
        updated_at: Option<DateTime<Utc>>,
    ) {
        self.competitor_posts.insert(
            user_id.to_string(),
            StoredCompetitorPosts { posts, updated_at },
        );
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn get_user(&self, user_id: &str) -> Result<Option<StoredProfile>, WarmerError> {
        Ok(self.users.get(user_id).map(|p| p.value().clone()))
    }

    async fn get_cached_competitor_posts(
        &self,
        user_id: &str,
    ) -> Result<Option<StoredCompetitorPosts>, WarmerError> {
        Ok(self.competitor_posts.get(user_id).map(|p| p.value().clone()))
    }

    async fn set_cached_competitor_posts(
        &self,
        user_id: &str,
        posts: &[CachedPost],
    ) -> Result<(), WarmerError> {
        self.competitor_posts.insert(
            user_id.to_string(),
            StoredCompetitorPosts {
                posts: posts.to_vec(),
                updated_at: Some(Utc::now()),
            },
        );
        Ok(())
    }
}
