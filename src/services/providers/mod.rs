//! Read interfaces onto the collaborators the recommender depends on.
//!
//! The catalog and the interaction store are owned elsewhere (catalog CRUD,
//! list-membership endpoints, the ingestion pipeline); the recommender only
//! reads them. Each has a Postgres implementation for production and an
//! in-memory one for fixtures and tests.
use std::collections::BTreeSet;

use crate::{
    error::AppResult,
    models::{InteractionSnapshot, Item, ItemKey, UserId},
    services::collaborative::rank_by_popularity,
};

pub mod memory;
pub mod postgres;

pub use memory::{MemoryCatalog, MemoryInteractionStore};
pub use postgres::{PgCatalog, PgInteractionStore};

/// Read access to catalog items
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait Catalog: Send + Sync {
    /// Every item in the catalog, as one read
    async fn list_items(&self) -> AppResult<Vec<Item>>;

    /// Items for the given keys; unknown keys are skipped and order is unspecified
    async fn find_items_by_keys(&self, keys: &[ItemKey]) -> AppResult<Vec<Item>>;

    /// Keys of the `limit` items with the highest catalog popularity
    ///
    /// Default implementation ranks the full listing. Backends with an
    /// ordered index should override it.
    async fn most_popular(&self, limit: usize) -> AppResult<Vec<ItemKey>> {
        Ok(rank_by_popularity(self.list_items().await?, limit))
    }

    /// Backend name for logging
    fn name(&self) -> &'static str;
}

/// Read access to users' item lists
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait InteractionStore: Send + Sync {
    /// One user's items; empty if the user holds nothing
    async fn get_user_set(&self, user_id: UserId) -> AppResult<BTreeSet<ItemKey>>;

    /// Every user's items, read at a single point in time
    async fn all_user_sets(&self) -> AppResult<InteractionSnapshot>;

    /// Backend name for logging
    fn name(&self) -> &'static str;
}
