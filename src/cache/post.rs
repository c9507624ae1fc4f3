//! Post records held by the warming caches.
//!
//! Upstream scrapers disagree on field names depending on which actor
//! produced the data and whether it came from a live fetch or a stored copy,
//! so every post enters the cache through `RawPost` and leaves as a
//! `CachedPost` with a single shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace};

/// A post as returned by a scraper, with every field optional.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPost {
    pub id: Option<String>,
    pub short_code: Option<String>,
    #[serde(alias = "postUrl")]
    pub url: Option<String>,
    #[serde(alias = "text")]
    pub caption: Option<String>,
    #[serde(alias = "likes")]
    pub likes_count: Option<i64>,
    #[serde(alias = "comments")]
    pub comments_count: Option<i64>,
    #[serde(alias = "username")]
    pub owner_username: Option<String>,
    #[serde(alias = "imageUrl")]
    pub display_url: Option<String>,
    pub timestamp: Option<String>,
    #[serde(rename = "type")]
    pub post_type: Option<String>,
    pub hashtags: Option<Vec<String>>,
}

impl RawPost {
    /// Likes, clamped at zero (scrapers report -1 for hidden counts)
    pub fn likes(&self) -> u64 {
        self.likes_count.unwrap_or(0).max(0) as u64
    }

    pub fn comments(&self) -> u64 {
        self.comments_count.unwrap_or(0).max(0) as u64
    }

    pub fn engagement(&self) -> u64 {
        self.likes() + self.comments()
    }
}

/// Normalized post as stored in the caches and handed to generation requests.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedPost {
    pub id: String,
    pub url: Option<String>,
    pub caption: String,
    pub likes: u64,
    pub comments: u64,
    pub engagement: u64,
    pub owner_username: Option<String>,
    pub image_url: Option<String>,
    pub posted_at: Option<DateTime<Utc>>,
    pub post_type: Option<String>,
    pub hashtags: Vec<String>,
}

impl From<RawPost> for CachedPost {
    fn from(raw: RawPost) -> Self {
        let likes = raw.likes();
        let comments = raw.comments();

        let posted_at = raw
            .timestamp
            .as_deref()
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
            .map(|dt| dt.with_timezone(&Utc));

        let url = raw.url.filter(|u| !u.is_empty()).or_else(|| {
            raw.short_code
                .as_ref()
                .map(|code| format!("https://www.instagram.com/p/{}/", code))
        });

        let id = raw
            .id
            .or(raw.short_code)
            .or_else(|| url.clone())
            .unwrap_or_default();

        Self {
            id,
            url,
            caption: raw.caption.unwrap_or_default(),
            likes,
            comments,
            engagement: likes + comments,
            owner_username: raw.owner_username,
            image_url: raw.display_url,
            posted_at,
            post_type: raw.post_type,
            hashtags: raw.hashtags.unwrap_or_default(),
        }
    }
}

/// Decode a scraper's JSON items, dropping error records and anything that
/// is not a post object.
pub fn decode_posts(items: Vec<Value>) -> Vec<RawPost> {
    items
        .into_iter()
        .filter_map(|item| {
            let obj = item.as_object()?;
            if obj.contains_key("error") {
                trace!(item = %item, "Skipping scraper error record");
                return None;
            }
            match serde_json::from_value::<RawPost>(item) {
                Ok(post) => Some(post),
                Err(e) => {
                    debug!(error = %e, "Skipping malformed scraper item");
                    None
                }
            }
        })
        .collect()
}

/// Rank by likes + comments, highest first, keeping at most `n`.
pub fn top_by_engagement(mut posts: Vec<RawPost>, n: usize) -> Vec<RawPost> {
    // stable sort keeps scraper order among ties
    posts.sort_by(|a, b| b.engagement().cmp(&a.engagement()));
    posts.truncate(n);
    posts
}
