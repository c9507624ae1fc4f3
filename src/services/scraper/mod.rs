//! Instagram scraping collaborator.

pub mod apify;

use crate::cache::post::RawPost;
use crate::error::WarmerError;
use async_trait::async_trait;

pub use apify::ApifyScraper;

const PROFILE_BASE_URL: &str = "https://www.instagram.com/";

/// Profile URL for each username, skipping blanks and a leading `@`.
pub fn profile_urls(usernames: &[String]) -> Vec<String> {
    usernames
        .iter()
        .map(|u| u.trim().trim_start_matches('@'))
        .filter(|u| !u.is_empty())
        .map(|u| format!("{}{}/", PROFILE_BASE_URL, urlencoding::encode(u)))
        .collect()
}

#[async_trait]
pub trait PostScraper: Send + Sync {
    fn convert_usernames_to_urls(&self, usernames: &[String]) -> Vec<String> {
        profile_urls(usernames)
    }

    async fn scrape_competitor_profiles(
        &self,
        urls: &[String],
        posts_per_profile: u32,
    ) -> Result<Vec<RawPost>, WarmerError>;

    async fn search_trending_posts(
        &self,
        niche: &str,
        limit: u32,
    ) -> Result<Vec<RawPost>, WarmerError>;
}
