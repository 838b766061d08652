use std::{path::Path, sync::Arc};

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use screenrank_api::{
    config::Config,
    db::{create_pool, create_redis_client, run_migrations, Cache},
    routes::{create_router, AppState},
    services::{
        index_store,
        providers::{PgCatalog, PgInteractionStore},
        IndexHandle, RecommendationService, RecommendationSettings,
    },
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("screenrank_api=info,tower_http=info")),
        )
        .init();

    let config = Config::from_env()?;

    let pool = create_pool(&config.database_url).await?;
    run_migrations(&pool).await?;

    // A malformed index is an operator error: refuse to start rather than serve it
    let index = match index_store::load(Path::new(&config.index_path))
        .await
        .context("Failed to load similarity index")?
    {
        Some(published) => IndexHandle::new(published),
        None => {
            tracing::warn!(
                path = %config.index_path,
                "No similarity index found, content recommendations empty until rebuild"
            );
            IndexHandle::default()
        }
    };

    let mut recommender = RecommendationService::new(
        Arc::new(PgCatalog::new(pool.clone())),
        Arc::new(PgInteractionStore::new(pool)),
        Arc::new(index),
        RecommendationSettings::from(&config),
    );

    let mut cache_handle = None;
    if let Some(redis_url) = &config.redis_url {
        let (cache, handle) = Cache::new(create_redis_client(redis_url)?);
        recommender = recommender.with_cache(cache);
        cache_handle = Some(handle);
        tracing::info!("Redis response cache enabled");
    }

    let addr = format!("{}:{}", config.host, config.port);
    let state = Arc::new(AppState {
        recommender: Arc::new(recommender),
        config,
    });
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = cache_handle {
        handle.shutdown().await;
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}
