use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

use super::ItemKey;

const NORM_TOLERANCE: f64 = 1e-6;

/// Structural problems found in a similarity index
#[derive(Debug, Error, PartialEq)]
pub enum IntegrityError {
    #[error("id_order has {ids} entries but matrix has {rows} rows")]
    RowCountMismatch { ids: usize, rows: usize },

    #[error("vocabulary has {terms} terms but {weights} idf weights")]
    IdfLengthMismatch { terms: usize, weights: usize },

    #[error("vocabulary columns are not contiguous from 0")]
    SparseVocabulary,

    #[error("row {row} references column {column} outside the vocabulary")]
    ColumnOutOfRange { row: usize, column: u32 },

    #[error("row {row} columns are not strictly increasing")]
    UnsortedRow { row: usize },

    #[error("row {row} holds a negative or non-finite weight")]
    InvalidWeight { row: usize },

    #[error("row {row} is not unit length (norm {norm})")]
    NotNormalized { row: usize, norm: f64 },

    #[error("item {0} appears more than once in id_order")]
    DuplicateItem(ItemKey),
}

/// A document's TF-IDF weights as `(column, weight)` pairs sorted by column
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct SparseRow(pub Vec<(u32, f64)>);

impl SparseRow {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(u32, f64)> {
        self.0.iter()
    }

    pub fn norm(&self) -> f64 {
        self.0.iter().map(|(_, w)| w * w).sum::<f64>().sqrt()
    }

    /// Dot product of two column-sorted rows
    pub fn dot(&self, other: &SparseRow) -> f64 {
        let (mut i, mut j) = (0, 0);
        let mut sum = 0.0;
        while i < self.0.len() && j < other.0.len() {
            let (ci, wi) = self.0[i];
            let (cj, wj) = other.0[j];
            match ci.cmp(&cj) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    sum += wi * wj;
                    i += 1;
                    j += 1;
                }
            }
        }
        sum
    }
}

/// Persisted vector-space index over the catalog.
///
/// Row `i` of `matrix` belongs to `id_order[i]`; every non-empty row is
/// L2-normalized so the dot product of two rows is their cosine similarity.
/// The serialized shape of this struct is the on-disk format.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimilarityIndex {
    pub version: u64,
    pub built_at: DateTime<Utc>,
    pub vocabulary: BTreeMap<String, u32>,
    pub idf_weights: Vec<f64>,
    pub matrix: Vec<SparseRow>,
    pub id_order: Vec<ItemKey>,
}

impl SimilarityIndex {
    /// An index with no documents; every query against it is a miss
    pub fn empty() -> Self {
        Self {
            version: 0,
            built_at: Utc::now(),
            vocabulary: BTreeMap::new(),
            idf_weights: Vec::new(),
            matrix: Vec::new(),
            id_order: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.id_order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_order.is_empty()
    }

    /// Checks every structural invariant of the index
    pub fn validate(&self) -> Result<(), IntegrityError> {
        if self.id_order.len() != self.matrix.len() {
            return Err(IntegrityError::RowCountMismatch {
                ids: self.id_order.len(),
                rows: self.matrix.len(),
            });
        }

        let terms = self.vocabulary.len();
        if self.idf_weights.len() != terms {
            return Err(IntegrityError::IdfLengthMismatch {
                terms,
                weights: self.idf_weights.len(),
            });
        }

        let columns: HashSet<u32> = self.vocabulary.values().copied().collect();
        if columns.len() != terms || columns.iter().any(|&c| c as usize >= terms) {
            return Err(IntegrityError::SparseVocabulary);
        }

        let mut seen = HashSet::with_capacity(self.id_order.len());
        for key in &self.id_order {
            if !seen.insert(*key) {
                return Err(IntegrityError::DuplicateItem(*key));
            }
        }

        for (row, weights) in self.matrix.iter().enumerate() {
            let mut previous: Option<u32> = None;
            for &(column, weight) in weights.iter() {
                if column as usize >= terms {
                    return Err(IntegrityError::ColumnOutOfRange { row, column });
                }
                if previous.is_some_and(|p| p >= column) {
                    return Err(IntegrityError::UnsortedRow { row });
                }
                if !weight.is_finite() || weight < 0.0 {
                    return Err(IntegrityError::InvalidWeight { row });
                }
                previous = Some(column);
            }

            if !weights.is_empty() {
                let norm = weights.norm();
                if (norm - 1.0).abs() > NORM_TOLERANCE {
                    return Err(IntegrityError::NotNormalized { row, norm });
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_row_index() -> SimilarityIndex {
        let mut vocabulary = BTreeMap::new();
        vocabulary.insert("drama".to_string(), 0);
        vocabulary.insert("space".to_string(), 1);

        SimilarityIndex {
            version: 1,
            built_at: Utc::now(),
            vocabulary,
            idf_weights: vec![1.0, 1.5],
            matrix: vec![
                SparseRow(vec![(0, 1.0)]),
                SparseRow(vec![(0, 0.6), (1, 0.8)]),
            ],
            id_order: vec![ItemKey(1), ItemKey(2)],
        }
    }

    #[test]
    fn test_valid_index_passes() {
        assert_eq!(two_row_index().validate(), Ok(()));
    }

    #[test]
    fn test_row_count_mismatch_rejected() {
        let mut index = two_row_index();
        index.id_order.push(ItemKey(3));
        assert_eq!(
            index.validate(),
            Err(IntegrityError::RowCountMismatch { ids: 3, rows: 2 })
        );
    }

    #[test]
    fn test_out_of_range_column_rejected() {
        let mut index = two_row_index();
        index.matrix[0] = SparseRow(vec![(7, 1.0)]);
        assert_eq!(
            index.validate(),
            Err(IntegrityError::ColumnOutOfRange { row: 0, column: 7 })
        );
    }

    #[test]
    fn test_unnormalized_row_rejected() {
        let mut index = two_row_index();
        index.matrix[1] = SparseRow(vec![(0, 2.0), (1, 1.0)]);
        assert!(matches!(
            index.validate(),
            Err(IntegrityError::NotNormalized { row: 1, .. })
        ));
    }

    #[test]
    fn test_duplicate_item_rejected() {
        let mut index = two_row_index();
        index.id_order[1] = ItemKey(1);
        assert_eq!(
            index.validate(),
            Err(IntegrityError::DuplicateItem(ItemKey(1)))
        );
    }

    #[test]
    fn test_sparse_dot_matches_dense() {
        let a = SparseRow(vec![(0, 0.6), (2, 0.8)]);
        let b = SparseRow(vec![(1, 0.5), (2, 0.5)]);
        assert!((a.dot(&b) - 0.4).abs() < 1e-12);
        assert_eq!(a.dot(&SparseRow::default()), 0.0);
    }

    #[test]
    fn test_empty_index_is_valid() {
        assert_eq!(SimilarityIndex::empty().validate(), Ok(()));
    }
}
