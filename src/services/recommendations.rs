use std::{collections::HashMap, path::PathBuf, sync::Arc, time::Duration};
use tokio::sync::Mutex;

use crate::{
    cached,
    config::Config,
    db::{Cache, CacheKey},
    error::{AppError, AppResult},
    models::{IndexSummary, Item, ItemKey, RecommendedItem, ScoredItem, UserId},
    services::{
        aggregator::compute_global_counts,
        collaborative::{CancelFlag, CollaborativeScorer, Recommendation, ScorerConfig},
        index_store::{self, IndexStoreError},
        indexer::{IndexBuilder, IndexerConfig},
        providers::{Catalog, InteractionStore},
        similarity::{IndexHandle, PublishedIndex, SimilarityError},
    },
};

/// Tunables for the recommendation service
#[derive(Debug, Clone)]
pub struct RecommendationSettings {
    pub indexer: IndexerConfig,
    pub scorer: ScorerConfig,
    /// Where rebuilt indexes are persisted; `None` keeps them in memory only
    pub index_path: Option<PathBuf>,
    pub recommend_timeout: Duration,
    pub similar_cache_ttl: u64,
}

impl Default for RecommendationSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for RecommendationSettings {
    fn from(config: &Config) -> Self {
        Self {
            indexer: config.indexer(),
            scorer: config.scorer(),
            index_path: Some(PathBuf::from(&config.index_path)),
            recommend_timeout: config.recommend_timeout(),
            similar_cache_ttl: config.similar_cache_ttl,
        }
    }
}

/// Content similarity, collaborative scoring and index rebuilds over the
/// catalog and interaction store collaborators
pub struct RecommendationService {
    catalog: Arc<dyn Catalog>,
    store: Arc<dyn InteractionStore>,
    index: Arc<IndexHandle>,
    cache: Option<Cache>,
    builder: IndexBuilder,
    scorer: CollaborativeScorer,
    settings: RecommendationSettings,
    rebuild_lock: Mutex<()>,
}

impl RecommendationService {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        store: Arc<dyn InteractionStore>,
        index: Arc<IndexHandle>,
        settings: RecommendationSettings,
    ) -> Self {
        Self {
            catalog,
            store,
            index,
            cache: None,
            builder: IndexBuilder::new(settings.indexer.clone()),
            scorer: CollaborativeScorer::new(settings.scorer.clone()),
            settings,
            rebuild_lock: Mutex::new(()),
        }
    }

    /// Enables Redis caching of hydrated similarity responses
    pub fn with_cache(mut self, cache: Cache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn index_summary(&self) -> IndexSummary {
        self.index.current().summary()
    }

    /// Items most similar to `item`, best first.
    ///
    /// An item missing from the index yields no recommendations rather
    /// than an error.
    pub fn content_similar(&self, item: ItemKey, top_n: usize) -> Vec<ScoredItem> {
        let index = self.index.current();
        match index.query(item, top_n) {
            Ok(results) => results,
            Err(SimilarityError::NotFound(key)) => {
                tracing::debug!(
                    item_key = %key,
                    index_version = index.version(),
                    "Item not indexed, no similar items"
                );
                Vec::new()
            }
        }
    }

    /// Collaborative recommendations for `user_id`, best first.
    ///
    /// Users below the cold-start threshold get the catalog's most popular
    /// items instead. The scoring pass runs on the blocking pool under the
    /// configured timeout; on timeout, or if this future is dropped, the
    /// pass is cancelled and nothing is returned.
    pub async fn collaborative_recommend(
        &self,
        user_id: UserId,
        top_k: usize,
    ) -> AppResult<Vec<ItemKey>> {
        let held = self.store.get_user_set(user_id).await?;
        if self.scorer.is_cold_start(&held) {
            tracing::debug!(user_id = %user_id, held = held.len(), "Cold start");
            return self.catalog.most_popular(top_k).await;
        }

        let snapshot = self.store.all_user_sets().await?;

        let cancel = CancelFlag::new();
        let _guard = cancel.drop_guard();
        let task_cancel = cancel.clone();
        let scorer = self.scorer.clone();

        let task = tokio::task::spawn_blocking(move || {
            let counts = compute_global_counts(&snapshot);
            scorer.score(user_id, &snapshot, &counts, top_k, &task_cancel)
        });

        let outcome = match tokio::time::timeout(self.settings.recommend_timeout, task).await {
            Ok(joined) => joined.map_err(|e| AppError::Internal(e.to_string()))??,
            Err(_) => {
                cancel.cancel();
                tracing::warn!(
                    user_id = %user_id,
                    timeout_ms = self.settings.recommend_timeout.as_millis() as u64,
                    "Collaborative scoring timed out"
                );
                return Err(AppError::Timeout);
            }
        };

        match outcome {
            // The list shrank between the two reads; the snapshot decides
            Recommendation::ColdStart => self.catalog.most_popular(top_k).await,
            Recommendation::Ranked(ranked) => {
                Ok(ranked.into_iter().map(|(key, _)| key).collect())
            }
        }
    }

    /// Builds a fresh index from the whole catalog and publishes it.
    ///
    /// The new index is built off to the side, persisted, and only then
    /// swapped in. Any failure leaves the current index serving.
    pub async fn rebuild_content_index(&self) -> AppResult<IndexSummary> {
        let _rebuild = self.rebuild_lock.lock().await;

        let items = self.catalog.list_items().await?;
        let version = self.index.current().version() + 1;

        tracing::info!(
            catalog = self.catalog.name(),
            items = items.len(),
            version,
            "Rebuilding similarity index"
        );

        let builder = self.builder.clone();
        let published = tokio::task::spawn_blocking(move || -> AppResult<PublishedIndex> {
            let index = builder.build(&items, version)?;
            PublishedIndex::new(index).map_err(|e| AppError::from(IndexStoreError::from(e)))
        })
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?
        .inspect_err(|e| tracing::error!(error = %e, "Index rebuild failed"))?;

        if let Some(path) = &self.settings.index_path {
            index_store::save(path, published.index()).await?;
        }

        let summary = published.summary();
        let previous = self.index.publish(published);

        tracing::info!(
            version = summary.version,
            documents = summary.documents,
            terms = summary.terms,
            previous_version = previous.version(),
            "Published similarity index"
        );

        Ok(summary)
    }

    /// Similar items with their catalog records, cached per index version
    pub async fn similar_items(
        &self,
        item: ItemKey,
        limit: usize,
    ) -> AppResult<Vec<RecommendedItem>> {
        match &self.cache {
            Some(cache) => {
                let current = self.index.current();
                let key = CacheKey::SimilarItems {
                    index_version: current.version(),
                    built_at_ms: current.index().built_at.timestamp_millis(),
                    item,
                    limit,
                };
                cached!(cache, key, self.settings.similar_cache_ttl, async {
                    self.hydrate_similar(item, limit).await
                })
            }
            None => self.hydrate_similar(item, limit).await,
        }
    }

    /// Collaborative recommendations with their catalog records
    pub async fn user_recommendations(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> AppResult<Vec<RecommendedItem>> {
        let keys = self.collaborative_recommend(user_id, limit).await?;
        let items = self.hydrate(&keys).await?;
        Ok(items
            .into_iter()
            .map(|item| RecommendedItem {
                item,
                similarity: None,
            })
            .collect())
    }

    async fn hydrate_similar(&self, item: ItemKey, limit: usize) -> AppResult<Vec<RecommendedItem>> {
        let scored = self.content_similar(item, limit);
        let keys: Vec<ItemKey> = scored.iter().map(|s| s.key).collect();
        let similarity: HashMap<ItemKey, f64> =
            scored.iter().map(|s| (s.key, s.similarity)).collect();

        let items = self.hydrate(&keys).await?;
        Ok(items
            .into_iter()
            .map(|item| RecommendedItem {
                similarity: similarity.get(&item.key).copied(),
                item,
            })
            .collect())
    }

    /// Catalog records for `keys`, in the order given
    async fn hydrate(&self, keys: &[ItemKey]) -> AppResult<Vec<Item>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut found: HashMap<ItemKey, Item> = self
            .catalog
            .find_items_by_keys(keys)
            .await?
            .into_iter()
            .map(|item| (item.key, item))
            .collect();

        let items: Vec<Item> = keys.iter().filter_map(|key| found.remove(key)).collect();

        if items.len() < keys.len() {
            tracing::warn!(
                requested = keys.len(),
                found = items.len(),
                "Recommended items missing from catalog"
            );
        }

        Ok(items)
    }
}
