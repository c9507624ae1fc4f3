//! InstaGen Warmer - background cache warming for idea generation
//!
//! Warms per-user competitor posts and per-niche trending posts ahead of
//! generation requests, with:
//! - Expiring in-memory caches with a periodic sweeper
//! - Per-user readiness tracking and bounded waits
//! - Prometheus metrics

mod api;
mod cache;
mod config;
mod error;
mod metrics;
mod services;

use crate::api::AppState;
use crate::cache::{spawn_sweeper, CacheWarmer, PostCaches, WarmingStateTracker};
use crate::config::Config;
use crate::metrics::create_metrics;
use crate::services::scraper::ApifyScraper;
use crate::services::storage::{MemoryStore, MongoStore, UserStore};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// InstaGen Warmer - cache warming coordinator
#[derive(Parser, Debug)]
#[command(name = "instagen-warmer")]
#[command(author, version, about = "Background cache warming coordinator", long_about = None)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long)]
    json_logs: bool,

    /// Enable debug logging for scraper requests
    #[arg(long)]
    debug_requests: bool,

    /// Server port (overrides PORT env var)
    #[arg(short, long)]
    port: Option<u16>,

    /// User ids to warm as soon as the server starts (repeatable)
    #[arg(long = "warm", value_name = "USER_ID")]
    warm_users: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let started_at = Instant::now();

    // Load .env before parsing args so env vars are available
    dotenvy::dotenv().ok();

    let args = Args::parse();

    init_logging(&args.log_level, args.json_logs, args.debug_requests)?;

    info!("Starting InstaGen Warmer v{}", env!("CARGO_PKG_VERSION"));

    // CLI port overrides env var
    let mut config = Config::from_env()?;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    config.debug_requests = args.debug_requests;

    if config.debug_requests {
        info!("Request debugging enabled");
    }

    let metrics = create_metrics();

    let store: Arc<dyn UserStore> = match &config.storage.mongo_url {
        Some(_) => {
            info!("Connecting to MongoDB user store");
            match MongoStore::new(&config).await {
                Ok(store) => Arc::new(store),
                Err(e) => {
                    error!("Failed to initialize MongoDB store: {}", e);
                    return Err(e.into());
                }
            }
        }
        None => {
            warn!("MONGO_URL not set, using an empty in-memory user store");
            Arc::new(MemoryStore::new())
        }
    };

    if config.scraper.apify_token.is_none() {
        warn!("APIFY_TOKEN not set, scraper requests will be rejected upstream");
    }
    let scraper = Arc::new(ApifyScraper::new(&config.scraper));

    let warmer = CacheWarmer::new(
        store,
        scraper,
        PostCaches::new(config.post_ttl()),
        Arc::new(WarmingStateTracker::new()),
        config.to_warmer_config(),
        metrics.clone(),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let sweeper_handle = spawn_sweeper(warmer.clone(), config.sweep_interval(), shutdown_rx);

    let metrics_updater = {
        let warmer = warmer.clone();
        let metrics = metrics.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_secs(5)).await;
                metrics
                    .uptime_seconds
                    .set(started_at.elapsed().as_secs_f64());
                metrics.update_cache_metrics(warmer.caches(), &warmer.tracker());
            }
        })
    };

    for user_id in &args.warm_users {
        warmer.warm_cache_on_startup(user_id);
    }

    let state = AppState {
        warmer,
        metrics,
        started_at,
    };

    let app = api::router(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    info!(
        "Listening on http://{} (Warm: POST /users/{{id}}/warm, Metrics: /metrics, Health: /health)",
        addr
    );

    let shutdown_signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received, initiating graceful shutdown...");
        let _ = shutdown_tx.send(true);
    };

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    if let Err(e) = sweeper_handle.await {
        warn!("Sweeper task ended abnormally: {}", e);
    }
    metrics_updater.abort();

    info!("InstaGen Warmer shutdown complete");
    Ok(())
}

fn init_logging(level: &str, json: bool, debug_requests: bool) -> anyhow::Result<()> {
    let level = level.parse::<Level>().unwrap_or(Level::INFO);

    let filter = if debug_requests {
        EnvFilter::new(format!(
            "instagen_warmer={},instagen_warmer::services::scraper=debug,tower_http=debug,hyper=warn",
            level
        ))
    } else {
        EnvFilter::new(format!(
            "instagen_warmer={},tower_http=info,hyper=warn",
            level
        ))
    };

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .init();
    }

    Ok(())
}
