//! Turns an item's metadata into the single document the indexer sees.

use regex::Regex;
use std::sync::LazyLock;

use crate::models::Item;

static NON_ALPHANUMERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9\s]").expect("valid regex"));

static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Replaces punctuation and symbols with spaces, collapses whitespace, lowercases
pub fn normalize(text: &str) -> String {
    let cleaned = NON_ALPHANUMERIC.replace_all(text, " ");
    WHITESPACE_RUN
        .replace_all(&cleaned, " ")
        .trim()
        .to_lowercase()
}

/// Builds the indexable document for an item.
///
/// Genre labels are appended twice so genre terms weigh double against
/// the free-text title and overview.
pub fn build_document(item: &Item) -> String {
    let title = normalize(&item.title);
    let overview = normalize(&item.overview);
    let genres = normalize(&item.genres.join(" "));

    [title.as_str(), overview.as_str(), genres.as_str(), genres.as_str()]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ")
}
