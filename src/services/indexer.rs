use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

use crate::{
    models::{Item, ItemKey, SimilarityIndex, SparseRow},
    services::normalizer::build_document,
};

/// Error types for index construction
#[derive(Debug, Error, PartialEq)]
pub enum IndexError {
    #[error("Cannot build an index from an empty corpus")]
    EmptyCorpus,

    #[error("No terms remain after document-frequency pruning of {documents} documents")]
    EmptyVocabulary { documents: usize },

    #[error("Invalid indexer configuration: {0}")]
    InvalidConfig(String),
}

/// Vocabulary and weighting parameters
#[derive(Debug, Clone, PartialEq)]
pub struct IndexerConfig {
    /// Terms found in fewer documents than this are dropped
    pub min_df: usize,
    /// Terms found in more than this fraction of documents are dropped
    pub max_df: f64,
    /// Inclusive n-gram lengths to extract
    pub ngram_range: (usize, usize),
    pub min_token_len: usize,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            min_df: 3,
            max_df: 0.8,
            ngram_range: (1, 2),
            min_token_len: 2,
        }
    }
}

impl IndexerConfig {
    fn check(&self) -> Result<(), IndexError> {
        if self.min_df == 0 {
            return Err(IndexError::InvalidConfig("min_df must be at least 1".to_string()));
        }
        if !(self.max_df > 0.0 && self.max_df <= 1.0) {
            return Err(IndexError::InvalidConfig(format!(
                "max_df must be in (0, 1], got {}",
                self.max_df
            )));
        }
        let (min_n, max_n) = self.ngram_range;
        if min_n == 0 || min_n > max_n {
            return Err(IndexError::InvalidConfig(format!(
                "invalid ngram range ({}, {})",
                min_n, max_n
            )));
        }
        Ok(())
    }
}

/// Builds TF-IDF similarity indexes from catalog items
#[derive(Debug, Clone, Default)]
pub struct IndexBuilder {
    config: IndexerConfig,
}

impl IndexBuilder {
    pub fn new(config: IndexerConfig) -> Self {
        Self { config }
    }

    /// Builds a complete index over `items`.
    ///
    /// Items are ordered by key and deduplicated so the same catalog always
    /// yields the same `id_order`, vocabulary and weights.
    pub fn build(&self, items: &[Item], version: u64) -> Result<SimilarityIndex, IndexError> {
        self.config.check()?;

        if items.is_empty() {
            return Err(IndexError::EmptyCorpus);
        }

        let mut by_key: BTreeMap<ItemKey, &Item> = BTreeMap::new();
        for item in items {
            if by_key.insert(item.key, item).is_some() {
                tracing::warn!(item_key = %item.key, "Duplicate item in corpus, keeping last");
            }
        }

        let id_order: Vec<ItemKey> = by_key.keys().copied().collect();
        let n_docs = id_order.len();

        // Raw term counts per document, and document frequency per term
        let mut doc_terms: Vec<HashMap<String, u32>> = Vec::with_capacity(n_docs);
        let mut doc_freq: HashMap<String, usize> = HashMap::new();

        for item in by_key.values() {
            let document = build_document(item);
            let tokens = tokenize(&document, self.config.min_token_len);

            let mut counts: HashMap<String, u32> = HashMap::new();
            for term in extract_terms(&tokens, self.config.ngram_range) {
                *counts.entry(term).or_insert(0) += 1;
            }
            for term in counts.keys() {
                *doc_freq.entry(term.clone()).or_insert(0) += 1;
            }
            doc_terms.push(counts);
        }

        let max_doc_count = (self.config.max_df * n_docs as f64).floor() as usize;

        let kept: BTreeMap<String, usize> = doc_freq
            .into_iter()
            .filter(|(_, df)| *df >= self.config.min_df && *df <= max_doc_count)
            .collect();

        if kept.is_empty() {
            return Err(IndexError::EmptyVocabulary { documents: n_docs });
        }

        let mut vocabulary = BTreeMap::new();
        let mut idf_weights = Vec::with_capacity(kept.len());
        for (column, (term, df)) in kept.into_iter().enumerate() {
            idf_weights.push(smoothed_idf(n_docs, df));
            vocabulary.insert(term, column as u32);
        }

        let matrix: Vec<SparseRow> = doc_terms
            .iter()
            .map(|counts| weigh_document(counts, &vocabulary, &idf_weights))
            .collect();

        let empty_rows = matrix.iter().filter(|row| row.is_empty()).count();

        tracing::info!(
            documents = n_docs,
            terms = vocabulary.len(),
            empty_rows,
            version,
            "Built similarity index"
        );

        Ok(SimilarityIndex {
            version,
            built_at: Utc::now(),
            vocabulary,
            idf_weights,
            matrix,
            id_order,
        })
    }
}

/// Whitespace tokens at least `min_len` characters long
fn tokenize(document: &str, min_len: usize) -> Vec<&str> {
    document
        .split_whitespace()
        .filter(|token| token.chars().count() >= min_len)
        .collect()
}

/// All n-grams of `tokens` with lengths in the inclusive `range`
fn extract_terms(tokens: &[&str], range: (usize, usize)) -> Vec<String> {
    let (min_n, max_n) = range;
    let mut terms = Vec::new();
    for n in min_n..=max_n {
        if n > tokens.len() {
            break;
        }
        terms.extend(tokens.windows(n).map(|gram| gram.join(" ")));
    }
    terms
}

fn smoothed_idf(n_docs: usize, df: usize) -> f64 {
    ((1.0 + n_docs as f64) / (1.0 + df as f64)).ln() + 1.0
}

/// TF-IDF weights of one document, L2-normalized and sorted by column
fn weigh_document(
    counts: &HashMap<String, u32>,
    vocabulary: &BTreeMap<String, u32>,
    idf_weights: &[f64],
) -> SparseRow {
    let mut weights: Vec<(u32, f64)> = counts
        .iter()
        .filter_map(|(term, &count)| {
            vocabulary
                .get(term)
                .map(|&column| (column, count as f64 * idf_weights[column as usize]))
        })
        .collect();
    weights.sort_by_key(|(column, _)| *column);

    let norm = weights.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
    if norm > 0.0 {
        for (_, weight) in weights.iter_mut() {
            *weight /= norm;
        }
    }

    SparseRow(weights)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn permissive() -> IndexBuilder {
        IndexBuilder::new(IndexerConfig {
            min_df: 1,
            max_df: 1.0,
            ..IndexerConfig::default()
        })
    }

    fn sample_corpus() -> Vec<Item> {
        vec![
            Item::new(3, "River Days", "A family drama about loss", &["Drama"], 5.0),
            Item::new(1, "Lake Nights", "A family drama about grief", &["Drama"], 7.0),
            Item::new(2, "Laser Pilots", "Robots fight in orbit", &["Science Fiction"], 9.0),
        ]
    }

    #[test]
    fn test_empty_corpus_rejected() {
        let result = IndexBuilder::default().build(&[], 1);
        assert_eq!(result, Err(IndexError::EmptyCorpus));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let builder = IndexBuilder::new(IndexerConfig {
            max_df: 0.0,
            ..IndexerConfig::default()
        });
        assert!(matches!(
            builder.build(&sample_corpus(), 1),
            Err(IndexError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_default_thresholds_prune_tiny_corpus() {
        // Three documents: min_df=3 keeps only terms in every document,
        // and max_df=0.8 removes those again.
        let result = IndexBuilder::default().build(&sample_corpus(), 1);
        assert_eq!(result, Err(IndexError::EmptyVocabulary { documents: 3 }));
    }

    #[test]
    fn test_id_order_sorted_by_key() {
        let index = permissive().build(&sample_corpus(), 1).unwrap();
        assert_eq!(index.id_order, vec![ItemKey(1), ItemKey(2), ItemKey(3)]);
        assert_eq!(index.matrix.len(), 3);
    }

    #[test]
    fn test_rows_are_unit_length() {
        let index = permissive().build(&sample_corpus(), 1).unwrap();
        for row in &index.matrix {
            assert!((row.norm() - 1.0).abs() < 1e-9);
        }
        assert_eq!(index.validate(), Ok(()));
    }

    #[test]
    fn test_vocabulary_includes_bigrams_in_lexical_order() {
        let index = permissive().build(&sample_corpus(), 1).unwrap();
        assert!(index.vocabulary.contains_key("family drama"));
        assert!(index.vocabulary.contains_key("drama"));

        let terms: Vec<&String> = index.vocabulary.keys().collect();
        let columns: Vec<u32> = index.vocabulary.values().copied().collect();
        assert!(terms.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(columns, (0..columns.len() as u32).collect::<Vec<_>>());
    }

    #[test]
    fn test_single_character_tokens_ignored() {
        let index = permissive().build(&sample_corpus(), 1).unwrap();
        assert!(!index.vocabulary.contains_key("a"));
    }

    #[test]
    fn test_max_df_drops_ubiquitous_terms() {
        let builder = IndexBuilder::new(IndexerConfig {
            min_df: 1,
            max_df: 0.5,
            ..IndexerConfig::default()
        });
        let index = builder.build(&sample_corpus(), 1).unwrap();
        // "drama" appears in 2 of 3 documents, above floor(0.5 * 3) = 1
        assert!(!index.vocabulary.contains_key("drama"));
        assert!(index.vocabulary.contains_key("robots"));
    }

    #[test]
    fn test_idf_is_smoothed() {
        let index = permissive().build(&sample_corpus(), 1).unwrap();
        let column = index.vocabulary["robots"] as usize;
        let expected = (4.0f64 / 2.0).ln() + 1.0;
        assert!((index.idf_weights[column] - expected).abs() < 1e-12);
    }

    #[test]
    fn test_rebuild_is_deterministic() {
        let mut shuffled = sample_corpus();
        shuffled.reverse();

        let first = permissive().build(&sample_corpus(), 1).unwrap();
        let second = permissive().build(&shuffled, 1).unwrap();

        assert_eq!(first.vocabulary, second.vocabulary);
        assert_eq!(first.matrix, second.matrix);
        assert_eq!(first.id_order, second.id_order);
    }

    #[test]
    fn test_extract_terms_unigrams_and_bigrams() {
        let terms = extract_terms(&["dark", "knight", "rises"], (1, 2));
        assert_eq!(
            terms,
            vec!["dark", "knight", "rises", "dark knight", "knight rises"]
        );
    }
}
