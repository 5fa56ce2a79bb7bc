//! Catalog Server - Authors and Books REST API
//!
//! Wires configuration, logging, the selected store and cache backends and
//! the report worker, then serves the router.

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use catalog_server::{
    api,
    config::{AppConfig, CacheBackend, StoreBackend},
    repository::{MemoryRepository, PgRepository, Repository},
    services::{
        cache::{ListCache, MemoryCache, RedisCache},
        reports::{ReportQueue, ReportWorker},
        Services,
    },
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load().context("Failed to load configuration")?;

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("catalog_server={},tower_http=debug", config.logging.level).into());

    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!("Starting Catalog Server v{}", env!("CARGO_PKG_VERSION"));

    // Entity store
    let repository: Repository = match config.database.backend {
        StoreBackend::Postgres => {
            let pool = PgPoolOptions::new()
                .max_connections(config.database.max_connections)
                .min_connections(config.database.min_connections)
                .connect(&config.database.url)
                .await
                .context("Failed to connect to database")?;

            tracing::info!("Connected to database");

            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .context("Failed to run database migrations")?;

            tracing::info!("Database migrations completed");
            Arc::new(PgRepository::new(pool))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory store; data is lost on restart");
            Arc::new(MemoryRepository::new())
        }
    };

    // List cache
    let cache: Arc<dyn ListCache> = match config.cache.backend {
        CacheBackend::Redis => {
            let cache = RedisCache::new(&config.cache.url)
                .await
                .context("Failed to connect to Redis")?;
            tracing::info!("Connected to Redis");
            Arc::new(cache)
        }
        CacheBackend::Memory => Arc::new(MemoryCache::new()),
    };

    // Report jobs
    let (queue, receiver) = ReportQueue::channel(config.reports.queue_capacity);
    let worker = ReportWorker::new(repository.clone(), receiver, &config.reports);
    tokio::spawn(worker.run());

    let addr = SocketAddr::new(
        config.server.host.parse().context("Invalid host address")?,
        config.server.port,
    );

    let services = Services::new(&config, repository, cache, Arc::new(queue));
    let state = AppState::new(config, services);

    if state.config.rate_limit.enabled {
        let limits = state.rate_limits.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                interval.tick().await;
                limits.prune();
            }
        });
    }

    let app = api::router(state);

    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}
