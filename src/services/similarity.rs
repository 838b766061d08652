use std::{
    cmp::Ordering,
    collections::HashMap,
    sync::{Arc, RwLock},
};
use thiserror::Error;

use crate::models::{
    index::IntegrityError, IndexSummary, ItemKey, ScoredItem, SimilarityIndex,
};

#[derive(Debug, Error, PartialEq)]
pub enum SimilarityError {
    #[error("Item {0} is not in the similarity index")]
    NotFound(ItemKey),
}

/// A validated index plus the lookups built once at publish time
#[derive(Debug)]
pub struct PublishedIndex {
    index: SimilarityIndex,
    rows_by_key: HashMap<ItemKey, usize>,
    /// column -> (row, weight), rows ascending
    postings: Vec<Vec<(usize, f64)>>,
}

impl PublishedIndex {
    /// Validates `index` and builds its reverse lookup and postings
    pub fn new(index: SimilarityIndex) -> Result<Self, IntegrityError> {
        index.validate()?;

        let rows_by_key = index
            .id_order
            .iter()
            .enumerate()
            .map(|(row, key)| (*key, row))
            .collect();

        let mut postings = vec![Vec::new(); index.vocabulary.len()];
        for (row, weights) in index.matrix.iter().enumerate() {
            for &(column, weight) in weights.iter() {
                postings[column as usize].push((row, weight));
            }
        }

        Ok(Self {
            index,
            rows_by_key,
            postings,
        })
    }

    pub fn empty() -> Self {
        Self {
            index: SimilarityIndex::empty(),
            rows_by_key: HashMap::new(),
            postings: Vec::new(),
        }
    }

    pub fn index(&self) -> &SimilarityIndex {
        &self.index
    }

    pub fn version(&self) -> u64 {
        self.index.version
    }

    pub fn summary(&self) -> IndexSummary {
        IndexSummary {
            version: self.index.version,
            documents: self.index.len(),
            terms: self.index.vocabulary.len(),
            built_at: self.index.built_at,
        }
    }

    /// Items most similar to `key`, best first.
    ///
    /// Only items whose reported (rounded) similarity is strictly positive
    /// are returned, so the result may be shorter than `top_n`. Ties go to
    /// the lower key.
    pub fn query(&self, key: ItemKey, top_n: usize) -> Result<Vec<ScoredItem>, SimilarityError> {
        let &query_row = self
            .rows_by_key
            .get(&key)
            .ok_or(SimilarityError::NotFound(key))?;

        if top_n == 0 {
            return Ok(Vec::new());
        }

        let mut scores = vec![0.0f64; self.index.len()];
        for &(column, query_weight) in self.index.matrix[query_row].iter() {
            for &(row, weight) in &self.postings[column as usize] {
                scores[row] += query_weight * weight;
            }
        }
        scores[query_row] = 0.0;

        let mut ranked: Vec<(ItemKey, f64)> = scores
            .into_iter()
            .enumerate()
            .filter(|(_, score)| round3(*score) > 0.0)
            .map(|(row, score)| (self.index.id_order[row], score))
            .collect();

        ranked.sort_by(|a, b| rank_order(a, b));
        ranked.truncate(top_n);

        Ok(ranked
            .into_iter()
            .map(|(key, score)| ScoredItem {
                key,
                similarity: round3(score),
            })
            .collect())
    }
}

/// Descending score, then ascending key
pub(crate) fn rank_order(a: &(ItemKey, f64), b: &(ItemKey, f64)) -> Ordering {
    b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0))
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Shared handle to the index currently serving queries.
///
/// Readers take a clone of the inner `Arc` and query it without holding
/// the lock; publishing replaces the whole `Arc` at once, so a query sees
/// either the old index or the new one, never a mix.
#[derive(Debug)]
pub struct IndexHandle {
    current: RwLock<Arc<PublishedIndex>>,
}

impl Default for IndexHandle {
    fn default() -> Self {
        Self::new(PublishedIndex::empty())
    }
}

impl IndexHandle {
    pub fn new(index: PublishedIndex) -> Self {
        Self {
            current: RwLock::new(Arc::new(index)),
        }
    }

    /// The index new queries should use
    pub fn current(&self) -> Arc<PublishedIndex> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Swaps in `index` and returns the one it replaced
    pub fn publish(&self, index: PublishedIndex) -> Arc<PublishedIndex> {
        let next = Arc::new(index);
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        std::mem::replace(&mut *guard, next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{Item, SparseRow},
        services::indexer::{IndexBuilder, IndexerConfig},
    };

    fn build(items: &[Item], version: u64) -> PublishedIndex {
        let builder = IndexBuilder::new(IndexerConfig {
            min_df: 1,
            max_df: 1.0,
            ..IndexerConfig::default()
        });
        PublishedIndex::new(builder.build(items, version).unwrap()).unwrap()
    }

    fn drama_corpus() -> Vec<Item> {
        vec![
            Item::new(
                10,
                "Quiet Harbor",
                "A grieving mother rebuilds her family in a small town",
                &["Drama"],
                4.0,
            ),
            Item::new(
                20,
                "Winter Letters",
                "A grieving father reconnects with his family",
                &["Drama"],
                6.0,
            ),
            Item::new(
                30,
                "Turbo Racers",
                "Supercharged cars race across the desert",
                &["Action"],
                8.0,
            ),
        ]
    }

    #[test]
    fn test_related_drama_ranks_above_unrelated_item() {
        let index = build(&drama_corpus(), 1);
        let results = index.query(ItemKey(10), 10).unwrap();

        assert_eq!(results[0].key, ItemKey(20));
        let unrelated = results
            .iter()
            .find(|r| r.key == ItemKey(30))
            .map(|r| r.similarity)
            .unwrap_or(0.0);
        assert!(results[0].similarity > unrelated);
    }

    #[test]
    fn test_query_item_excluded_from_results() {
        let index = build(&drama_corpus(), 1);
        let results = index.query(ItemKey(20), 10).unwrap();
        assert!(results.iter().all(|r| r.key != ItemKey(20)));
    }

    #[test]
    fn test_zero_similarity_items_not_padded() {
        let index = build(&drama_corpus(), 1);
        // The action title shares no term with the dramas
        let results = index.query(ItemKey(30), 10).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_repeated_queries_identical() {
        let index = build(&drama_corpus(), 1);
        let first = index.query(ItemKey(10), 10).unwrap();
        for _ in 0..5 {
            assert_eq!(index.query(ItemKey(10), 10).unwrap(), first);
        }
    }

    #[test]
    fn test_unknown_item_not_found() {
        let index = build(&drama_corpus(), 1);
        assert_eq!(
            index.query(ItemKey(99), 10),
            Err(SimilarityError::NotFound(ItemKey(99)))
        );
    }

    #[test]
    fn test_ties_broken_by_ascending_key() {
        let items = vec![
            Item::new(1, "The Keeper", "haunted lighthouse", &["Horror"], 1.0),
            Item::new(7, "The Keeper", "haunted lighthouse", &["Horror"], 1.0),
            Item::new(4, "The Keeper", "haunted lighthouse", &["Horror"], 1.0),
        ];
        let index = build(&items, 1);
        let results = index.query(ItemKey(1), 10).unwrap();
        let keys: Vec<ItemKey> = results.iter().map(|r| r.key).collect();
        assert_eq!(keys, vec![ItemKey(4), ItemKey(7)]);
    }

    #[test]
    fn test_top_n_truncates() {
        let index = build(&drama_corpus(), 1);
        assert!(index.query(ItemKey(10), 0).unwrap().is_empty());
        assert!(index.query(ItemKey(10), 1).unwrap().len() <= 1);
    }

    #[test]
    fn test_postings_agree_with_row_dot_product() {
        let index = build(&drama_corpus(), 1);
        let inner = index.index();
        let expected = round3(inner.matrix[0].dot(&inner.matrix[1]));
        let results = index.query(inner.id_order[0], 10).unwrap();
        assert_eq!(results[0].similarity, expected);
    }

    #[test]
    fn test_similarity_rounded_to_three_places() {
        let index = build(&drama_corpus(), 1);
        for result in index.query(ItemKey(10), 10).unwrap() {
            let scaled = result.similarity * 1000.0;
            assert!((scaled - scaled.round()).abs() < 1e-9);
        }
    }

    #[test]
    fn test_overlap_that_rounds_to_zero_not_returned() {
        let faint = 0.0003f64;
        let index = SimilarityIndex {
            version: 1,
            built_at: chrono::Utc::now(),
            vocabulary: [("drama".to_string(), 0), ("space".to_string(), 1)]
                .into_iter()
                .collect(),
            idf_weights: vec![1.0, 1.0],
            matrix: vec![
                SparseRow(vec![(0, 1.0)]),
                SparseRow(vec![(0, faint), (1, (1.0 - faint * faint).sqrt())]),
            ],
            id_order: vec![ItemKey(1), ItemKey(2)],
        };
        let published = PublishedIndex::new(index).unwrap();

        assert!(published.query(ItemKey(1), 10).unwrap().is_empty());
    }

    #[test]
    fn test_publish_swaps_whole_index() {
        let handle = IndexHandle::default();
        let before = handle.current();
        assert_eq!(before.version(), 0);

        let old = handle.publish(build(&drama_corpus(), 2));
        assert_eq!(old.version(), 0);
        assert_eq!(handle.current().version(), 2);

        // A reader holding the old snapshot is unaffected
        assert!(before.query(ItemKey(10), 10).is_err());
        assert!(handle.current().query(ItemKey(10), 10).is_ok());
    }
}
