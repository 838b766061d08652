//! Offline index build: reads the catalog from Postgres, writes the index
//! file the server loads at startup. A running server picks the new file up
//! on restart; use the admin rebuild endpoint to swap without one.

use std::path::Path;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use screenrank_api::{
    config::Config,
    db::create_pool,
    services::{index_store, indexer::IndexBuilder, providers::Catalog, providers::PgCatalog},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("screenrank_api=info,build_index=info")),
        )
        .init();

    let config = Config::from_env()?;
    let path = Path::new(&config.index_path);

    // Move or delete an unreadable index by hand; it is never overwritten here
    let version = index_store::next_version(path)
        .await
        .context("Existing index unreadable, refusing to replace it")?;

    let pool = create_pool(&config.database_url).await?;
    let items = PgCatalog::new(pool)
        .list_items()
        .await
        .context("Failed to read catalog")?;

    let index = IndexBuilder::new(config.indexer())
        .build(&items, version)
        .context("Failed to build similarity index")?;

    index_store::save(path, &index).await?;

    tracing::info!(
        path = %path.display(),
        version = index.version,
        documents = index.len(),
        terms = index.vocabulary.len(),
        "Content-based index built"
    );

    Ok(())
}
