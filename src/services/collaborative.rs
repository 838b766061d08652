use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use thiserror::Error;

use crate::{
    models::{InteractionSnapshot, Item, ItemKey, PopularityCounts, UserId},
    services::similarity::rank_order,
};

/// Error types for collaborative scoring
#[derive(Debug, Error, PartialEq)]
pub enum ScoringError {
    #[error("Scoring was cancelled")]
    Cancelled,
}

/// Cooperative cancellation signal shared between a caller and a scoring pass
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Guard that raises this flag when dropped, e.g. when the request
    /// future waiting on the scoring pass goes away
    pub fn drop_guard(&self) -> CancelOnDrop {
        CancelOnDrop(self.clone())
    }
}

#[derive(Debug)]
pub struct CancelOnDrop(CancelFlag);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScorerConfig {
    /// Requesters holding fewer items than this get the popularity fallback
    pub cold_start_threshold: usize,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            cold_start_threshold: 3,
        }
    }
}

/// Outcome of a scoring pass
#[derive(Debug, Clone, PartialEq)]
pub enum Recommendation {
    /// Not enough history; rank the catalog by its own popularity instead
    ColdStart,
    /// Items with their accumulated scores, best first. May be empty.
    Ranked(Vec<(ItemKey, f64)>),
}

/// Jaccard index of two item sets; 0 when both are empty
pub fn jaccard(a: &BTreeSet<ItemKey>, b: &BTreeSet<ItemKey>) -> f64 {
    let shared = a.intersection(b).count();
    let union = a.len() + b.len() - shared;
    if union == 0 {
        return 0.0;
    }
    shared as f64 / union as f64
}

/// Keys of the `top_k` most popular items; ties go to the lower key
pub fn rank_by_popularity(mut items: Vec<Item>, top_k: usize) -> Vec<ItemKey> {
    items.sort_by(|a, b| {
        b.popularity
            .total_cmp(&a.popularity)
            .then_with(|| a.key.cmp(&b.key))
    });
    items.into_iter().take(top_k).map(|item| item.key).collect()
}

/// Scores unseen items by the lists of users who share items with the requester.
///
/// Each neighbor `U` votes for every item in `U \ R` with weight
/// `jaccard(R, U) / (1 + holders(item))`, which damps items that are
/// already on many lists.
#[derive(Debug, Clone, Default)]
pub struct CollaborativeScorer {
    config: ScorerConfig,
}

impl CollaborativeScorer {
    pub fn new(config: ScorerConfig) -> Self {
        Self { config }
    }

    pub fn is_cold_start(&self, items: &BTreeSet<ItemKey>) -> bool {
        items.len() < self.config.cold_start_threshold
    }

    /// Scores one requester against a single snapshot.
    ///
    /// `counts` must be derived from the same `snapshot`. When `cancel` is
    /// raised mid-pass the partial scores are dropped and
    /// [`ScoringError::Cancelled`] is returned.
    pub fn score(
        &self,
        requester: UserId,
        snapshot: &InteractionSnapshot,
        counts: &PopularityCounts,
        top_k: usize,
        cancel: &CancelFlag,
    ) -> Result<Recommendation, ScoringError> {
        let empty = BTreeSet::new();
        let held = snapshot.get(&requester).unwrap_or(&empty);

        if self.is_cold_start(held) {
            tracing::debug!(
                user_id = %requester,
                held = held.len(),
                "Cold start, falling back to popularity"
            );
            return Ok(Recommendation::ColdStart);
        }

        let mut scores: BTreeMap<ItemKey, f64> = BTreeMap::new();
        let mut neighbors = 0usize;

        for (user, items) in snapshot {
            if cancel.is_cancelled() {
                return Err(ScoringError::Cancelled);
            }
            if *user == requester || held.is_disjoint(items) {
                continue;
            }

            let similarity = jaccard(held, items);
            if similarity == 0.0 {
                continue;
            }
            neighbors += 1;

            for item in items.difference(held) {
                let holders = counts.get(item).copied().unwrap_or(0);
                *scores.entry(*item).or_insert(0.0) += similarity / (1.0 + holders as f64);
            }
        }

        if cancel.is_cancelled() {
            return Err(ScoringError::Cancelled);
        }

        let mut ranked: Vec<(ItemKey, f64)> = scores.into_iter().collect();
        ranked.sort_by(rank_order);
        ranked.truncate(top_k);

        tracing::debug!(
            user_id = %requester,
            neighbors,
            ranked = ranked.len(),
            "Collaborative scoring finished"
        );

        Ok(Recommendation::Ranked(ranked))
    }
}
