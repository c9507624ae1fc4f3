//! HTTP surface for triggering warms and inspecting readiness.

use crate::cache::{CacheStatus, CacheType, CacheWarmer, CachedPost};
use crate::error::WarmerError;
use crate::metrics::SharedMetrics;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{delete, get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::{Duration, Instant};
use tracing::{error, instrument};

/// Upper bound on client-requested waits
const MAX_WAIT_MS: u64 = 30_000;

#[derive(Clone)]
pub struct AppState {
    pub warmer: CacheWarmer,
    pub metrics: SharedMetrics,
    pub started_at: Instant,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/users/{id}/warm", post(trigger_warm))
        .route("/users/{id}/cache-status", get(cache_status))
        .route("/users/{id}/cache/{cache}", get(cached_posts))
        .route("/users/{id}/cache/{cache}/wait", get(wait_for_cache))
        .route("/users/{id}/warming", delete(cleanup))
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitParams {
    pub timeout_ms: Option<u64>,
}

impl WaitParams {
    fn timeout(&self, warmer: &CacheWarmer) -> Duration {
        self.timeout_ms
            .map(|ms| Duration::from_millis(ms.min(MAX_WAIT_MS)))
            .unwrap_or(warmer.config().wait_timeout)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WarmResponse {
    pub scheduled: bool,
    pub status: CacheStatus,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub competitor: bool,
    pub trending: bool,
    pub competitor_warming: bool,
    pub trending_warming: bool,
}

#[derive(Debug, Serialize)]
pub struct WaitResponse {
    pub ready: bool,
}

#[derive(Debug, Serialize)]
pub struct PostsResponse {
    pub cache: CacheType,
    pub posts: Vec<CachedPost>,
}

impl IntoResponse for WarmerError {
    fn into_response(self) -> Response {
        let status = match &self {
            WarmerError::NotReady { .. } => StatusCode::ACCEPTED,
            WarmerError::NoData { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            WarmerError::Upstream(_) => StatusCode::BAD_GATEWAY,
            _ => {
                error!(error = %self, "Request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[instrument(skip(state))]
async fn trigger_warm(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> (StatusCode, Json<WarmResponse>) {
    let scheduled = state.warmer.warm_cache_on_startup(&user_id);
    let status = state.warmer.get_cache_status(&user_id);

    (
        StatusCode::ACCEPTED,
        Json(WarmResponse { scheduled, status }),
    )
}

async fn cache_status(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Json<StatusResponse> {
    let warmer = &state.warmer;
    let status = warmer.get_cache_status(&user_id);

    Json(StatusResponse {
        competitor: status.competitor,
        trending: status.trending,
        competitor_warming: warmer.is_cache_warming(&user_id, CacheType::Competitor),
        trending_warming: warmer.is_cache_warming(&user_id, CacheType::Trending),
    })
}

#[instrument(skip(state, params))]
async fn wait_for_cache(
    State(state): State<AppState>,
    Path((user_id, cache)): Path<(String, CacheType)>,
    Query(params): Query<WaitParams>,
) -> Json<WaitResponse> {
    let warmer = &state.warmer;
    let ready = match params.timeout_ms {
        Some(_) => {
            warmer
                .wait_for_cache(&user_id, cache, params.timeout(warmer))
                .await
        }
        None => warmer.wait_for_cache_default(&user_id, cache).await,
    };
    Json(WaitResponse { ready })
}

#[instrument(skip(state, params))]
async fn cached_posts(
    State(state): State<AppState>,
    Path((user_id, cache)): Path<(String, CacheType)>,
    Query(params): Query<WaitParams>,
) -> Result<Json<PostsResponse>, WarmerError> {
    let timeout = params.timeout(&state.warmer);
    let posts = state.warmer.require_posts(&user_id, cache, timeout).await?;
    Ok(Json(PostsResponse { cache, posts }))
}

async fn cleanup(State(state): State<AppState>, Path(user_id): Path<String>) -> StatusCode {
    if state.warmer.cleanup(&user_id) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    state
        .metrics
        .uptime_seconds
        .set(state.started_at.elapsed().as_secs_f64());
    state
        .metrics
        .update_cache_metrics(state.warmer.caches(), &state.warmer.tracker());

    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let caches = state.warmer.caches();
    let tracker = state.warmer.tracker();

    Json(json!({
        "status": "healthy",
        "competitorEntries": caches.competitor.len(),
        "trendingEntries": caches.trending.len(),
        "warmingStates": tracker.len(),
        "warming": tracker.warming_count(),
        "uptimeSeconds": state.started_at.elapsed().as_secs(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
