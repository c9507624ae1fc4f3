use crate::cache::post::{decode_posts, RawPost};
use crate::config::ScraperConfig;
use crate::error::WarmerError;
use crate::services::scraper::PostScraper;
use async_trait::async_trait;
use rand::Rng;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 500;

const PROFILE_ACTOR: &str = "apify~instagram-scraper";
const HASHTAG_ACTOR: &str = "apify~instagram-hashtag-scraper";

/// Client for synchronous Apify actor runs.
#[derive(Clone)]
pub struct ApifyScraper {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ApifyScraper {
    pub fn new(config: &ScraperConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(config.request_timeout_secs))
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.apify_token.clone(),
        }
    }

    fn run_url(&self, actor: &str) -> String {
        format!("{}/v2/acts/{}/run-sync-get-dataset-items", self.base_url, actor)
    }

    /// Run an actor and return its dataset items, retrying server errors and
    /// transport failures with exponential backoff.
    async fn run_actor(&self, actor: &str, input: &Value) -> Result<Vec<Value>, WarmerError> {
        let token = self
            .token
            .as_deref()
            .ok_or_else(|| WarmerError::Upstream("APIFY_TOKEN is not configured".into()))?;

        let url = self.run_url(actor);
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            let start = Instant::now();

            debug!(
                actor = actor,
                attempt = attempt + 1,
                "Starting scraper run"
            );

            match self
                .client
                .post(&url)
                .query(&[("token", token)])
                .json(input)
                .send()
                .await
            {
                Ok(resp) => {
                    let status = resp.status();
                    let elapsed_ms = start.elapsed().as_millis() as u64;

                    if status.is_success() {
                        let body: Value = resp.json().await.map_err(WarmerError::from)?;
                        return match body {
                            Value::Array(items) => {
                                debug!(
                                    actor = actor,
                                    items = items.len(),
                                    elapsed_ms = elapsed_ms,
                                    "Scraper run finished"
                                );
                                Ok(items)
                            }
                            other => Err(WarmerError::Parsing(format!(
                                "expected dataset array, got {}",
                                json_kind(&other)
                            ))),
                        };
                    } else if status.is_server_error() || status.as_u16() == 429 {
                        debug!(
                            actor = actor,
                            status = %status,
                            elapsed_ms = elapsed_ms,
                            "Retryable scraper error"
                        );
                        last_error = Some(WarmerError::Upstream(format!("HTTP {}", status)));
                    } else {
                        debug!(
                            actor = actor,
                            status = %status,
                            elapsed_ms = elapsed_ms,
                            "Client error, not retrying"
                        );
                        return Err(WarmerError::Upstream(format!("HTTP {}", status)));
                    }
                }
                Err(e) => {
                    debug!(actor = actor, error = %e, "Scraper request failed");
                    last_error = Some(WarmerError::from(e));
                }
            }

            if attempt < MAX_RETRIES - 1 {
                let backoff = INITIAL_BACKOFF_MS * 2u64.pow(attempt);
                let jitter = rand::thread_rng().gen_range(0..=backoff / 2);
                warn!(
                    actor = actor,
                    attempt = attempt + 1,
                    max_retries = MAX_RETRIES,
                    backoff_ms = backoff + jitter,
                    "Scraper run failed, retrying"
                );
                tokio::time::sleep(Duration::from_millis(backoff + jitter)).await;
            }
        }

        Err(last_error
            .unwrap_or_else(|| WarmerError::Upstream("Scraper run failed after retries".into())))
    }
}

/// Hashtag for a niche: lowercase letters and digits only
fn niche_hashtag(niche: &str) -> String {
    niche
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[async_trait]
impl PostScraper for ApifyScraper {
    #[instrument(skip(self, urls), fields(profiles = urls.len()))]
    async fn scrape_competitor_profiles(
        &self,
        urls: &[String],
        posts_per_profile: u32,
    ) -> Result<Vec<RawPost>, WarmerError> {
        if urls.is_empty() {
            return Ok(Vec::new());
        }

        let input = json!({
            "directUrls": urls,
            "resultsType": "posts",
            "resultsLimit": posts_per_profile,
            "addParentData": false,
        });

        let items = self.run_actor(PROFILE_ACTOR, &input).await?;
        Ok(decode_posts(items))
    }

    #[instrument(skip(self))]
    async fn search_trending_posts(
        &self,
        niche: &str,
        limit: u32,
    ) -> Result<Vec<RawPost>, WarmerError> {
        let hashtag = niche_hashtag(niche);
        if hashtag.is_empty() {
            return Err(WarmerError::Parsing(format!(
                "niche {:?} has no usable hashtag",
                niche
            )));
        }

        let input = json!({
            "hashtags": [hashtag],
            "resultsType": "posts",
            "resultsLimit": limit,
        });

        let items = self.run_actor(HASHTAG_ACTOR, &input).await?;
        Ok(decode_posts(items))
    }
}
