use crate::cache::CacheType;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WarmerError {
    #[error("Upstream API error: {0}")]
    Upstream(String),

    #[error("Parsing error: {0}")]
    Parsing(String),

    #[error("Database error: {0}")]
    Database(#[from] mongodb::error::Error),

    #[error("{cache} data is still being prepared, try again shortly")]
    NotReady { cache: CacheType },

    #[error("No {cache} data available for this request")]
    NoData { cache: CacheType },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<reqwest::Error> for WarmerError {
    fn from(err: reqwest::Error) -> Self {
        WarmerError::Upstream(err.to_string())
    }
}

impl From<serde_json::Error> for WarmerError {
    fn from(err: serde_json::Error) -> Self {
        WarmerError::Parsing(err.to_string())
    }
}

impl From<mongodb::bson::ser::Error> for WarmerError {
    fn from(err: mongodb::bson::ser::Error) -> Self {
        WarmerError::Internal(err.to_string())
    }
}
