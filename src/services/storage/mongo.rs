use crate::cache::post::CachedPost;
use crate::config::Config;
use crate::error::WarmerError;
use crate::services::storage::{StoredCompetitorPosts, StoredProfile, UserStore};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use mongodb::bson::{doc, oid::ObjectId, DateTime as BsonDateTime, Document};
use mongodb::options::{ClientOptions, UpdateOptions};
use mongodb::{Client, Collection};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct CompetitorCacheDocument {
    user_id: String,
    #[serde(default)]
    posts: Vec<CachedPost>,
    #[serde(default)]
    updated_at: Option<BsonDateTime>,
}

impl From<CompetitorCacheDocument> for StoredCompetitorPosts {
    fn from(doc: CompetitorCacheDocument) -> Self {
        Self {
            posts: doc.posts,
            updated_at: doc
                .updated_at
                .and_then(|t| Utc.timestamp_millis_opt(t.timestamp_millis()).single()),
        }
    }
}

/// MongoDB-backed profile store.
pub struct MongoStore {
    users: Collection<StoredProfile>,
    competitor_cache: Collection<CompetitorCacheDocument>,
}

impl MongoStore {
    pub async fn new(config: &Config) -> Result<Self, WarmerError> {
        let mongo_url = config
            .storage
            .mongo_url
            .as_ref()
            .ok_or_else(|| WarmerError::Internal("Mongo URL not configured".to_string()))?;

        let mut client_options = ClientOptions::parse(mongo_url).await?;
        client_options.app_name = Some("instagen-warmer".to_string());

        let client = Client::with_options(client_options)?;
        let db = client.database(&config.storage.mongo_db);
        let users = db.collection::<StoredProfile>(&config.storage.users_collection);
        let competitor_cache =
            db.collection::<CompetitorCacheDocument>(&config.storage.competitor_cache_collection);

        info!(
            db = %config.storage.mongo_db,
            users = %config.storage.users_collection,
            competitor_cache = %config.storage.competitor_cache_collection,
            "Connected to MongoDB"
        );

        Ok(Self {
            users,
            competitor_cache,
        })
    }

    /// Ids may be stored as ObjectIds or as plain strings
    fn user_filter(user_id: &str) -> Document {
        match ObjectId::parse_str(user_id) {
            Ok(oid) => doc! { "_id": oid },
            Err(_) => doc! { "_id": user_id },
        }
    }
}

#[async_trait]
impl UserStore for MongoStore {
    async fn get_user(&self, user_id: &str) -> Result<Option<StoredProfile>, WarmerError> {
        let profile = self
            .users
            .find_one(Self::user_filter(user_id), None)
            .await?;
        debug!(user_id = user_id, found = profile.is_some(), "Loaded user profile");
        Ok(profile)
    }

    async fn get_cached_competitor_posts(
        &self,
        user_id: &str,
    ) -> Result<Option<StoredCompetitorPosts>, WarmerError> {
        let cached = self
            .competitor_cache
            .find_one(doc! { "userId": user_id }, None)
            .await?;
        Ok(cached.map(StoredCompetitorPosts::from))
    }

    async fn set_cached_competitor_posts(
        &self,
        user_id: &str,
        posts: &[CachedPost],
    ) -> Result<(), WarmerError> {
        let posts = mongodb::bson::to_bson(posts)?;
        let options = UpdateOptions::builder().upsert(true).build();

        self.competitor_cache
            .update_one(
                doc! { "userId": user_id },
                doc! { "$set": { "posts": posts, "updatedAt": BsonDateTime::now() } },
                options,
            )
            .await?;

        debug!(user_id = user_id, "Persisted competitor posts");
        Ok(())
    }
}
