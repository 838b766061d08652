//! Postgres-backed catalog and interaction store.
//!
//! Tables are created by the migrations under `migrations/`; the catalog
//! ingestion pipeline and the list endpoints write them, this module only
//! reads.
use sqlx::PgPool;
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{InteractionSnapshot, Item, ItemKey, MediaType, UserId},
    services::providers::{Catalog, InteractionStore},
};

const ITEM_COLUMNS: &str = "key, title, overview, genres, popularity, vote_average, \
     vote_count, release_date, poster_path, media_type";

#[derive(Debug, sqlx::FromRow)]
struct ItemRow {
    key: i64,
    title: String,
    overview: String,
    genres: Vec<String>,
    popularity: f64,
    vote_average: Option<f64>,
    vote_count: Option<i64>,
    release_date: Option<String>,
    poster_path: Option<String>,
    media_type: String,
}

impl From<ItemRow> for Item {
    fn from(row: ItemRow) -> Self {
        Item {
            key: ItemKey(row.key),
            title: row.title,
            overview: row.overview,
            genres: row.genres,
            popularity: row.popularity,
            vote_average: row.vote_average,
            vote_count: row.vote_count,
            release_date: row.release_date,
            poster_path: row.poster_path,
            media_type: MediaType::parse(&row.media_type),
        }
    }
}

#[derive(Clone)]
pub struct PgCatalog {
    pool: PgPool,
}

impl PgCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl Catalog for PgCatalog {
    async fn list_items(&self) -> AppResult<Vec<Item>> {
        let rows: Vec<ItemRow> =
            sqlx::query_as(&format!("SELECT {} FROM items ORDER BY key", ITEM_COLUMNS))
                .fetch_all(&self.pool)
                .await?;

        tracing::debug!(count = rows.len(), "Listed catalog items");

        Ok(rows.into_iter().map(Item::from).collect())
    }

    async fn find_items_by_keys(&self, keys: &[ItemKey]) -> AppResult<Vec<Item>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let raw: Vec<i64> = keys.iter().map(|k| k.0).collect();
        let rows: Vec<ItemRow> = sqlx::query_as(&format!(
            "SELECT {} FROM items WHERE key = ANY($1)",
            ITEM_COLUMNS
        ))
        .bind(&raw)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Item::from).collect())
    }

    async fn most_popular(&self, limit: usize) -> AppResult<Vec<ItemKey>> {
        let keys: Vec<(i64,)> =
            sqlx::query_as("SELECT key FROM items ORDER BY popularity DESC, key ASC LIMIT $1")
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await?;

        Ok(keys.into_iter().map(|(key,)| ItemKey(key)).collect())
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}

#[derive(Clone)]
pub struct PgInteractionStore {
    pool: PgPool,
}

impl PgInteractionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl InteractionStore for PgInteractionStore {
    async fn get_user_set(&self, user_id: UserId) -> AppResult<BTreeSet<ItemKey>> {
        let rows: Vec<(i64,)> =
            sqlx::query_as("SELECT item_key FROM user_items WHERE user_id = $1")
                .bind(user_id.0)
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.into_iter().map(|(key,)| ItemKey(key)).collect())
    }

    async fn all_user_sets(&self) -> AppResult<InteractionSnapshot> {
        // A single statement reads one MVCC snapshot
        let rows: Vec<(Uuid, i64)> = sqlx::query_as("SELECT user_id, item_key FROM user_items")
            .fetch_all(&self.pool)
            .await?;

        let mut snapshot = InteractionSnapshot::new();
        for (user_id, item_key) in rows {
            snapshot
                .entry(UserId(user_id))
                .or_default()
                .insert(ItemKey(item_key));
        }

        tracing::debug!(
            users = snapshot.len(),
            "Read interaction snapshot"
        );

        Ok(snapshot)
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}
