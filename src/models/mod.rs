use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::Display,
};
use uuid::Uuid;

pub mod index;

pub use index::{SimilarityIndex, SparseRow};

/// Catalog key of a movie or TV show (the provider's numeric id)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ItemKey(pub i64);

impl Display for ItemKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque identifier of a user whose list is scored
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

impl Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    #[default]
    Movie,
    Tv,
}

impl MediaType {
    pub fn parse(value: &str) -> Self {
        match value {
            "tv" | "series" => MediaType::Tv,
            _ => MediaType::Movie,
        }
    }
}

/// A catalog entry, as read from the catalog collaborator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Item {
    pub key: ItemKey,
    pub title: String,
    #[serde(default)]
    pub overview: String,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub popularity: f64,
    #[serde(default)]
    pub vote_average: Option<f64>,
    #[serde(default)]
    pub vote_count: Option<i64>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub media_type: MediaType,
}

impl Item {
    /// Creates an item carrying only the fields the recommender reads
    pub fn new(key: i64, title: &str, overview: &str, genres: &[&str], popularity: f64) -> Self {
        Self {
            key: ItemKey(key),
            title: title.to_string(),
            overview: overview.to_string(),
            genres: genres.iter().map(|g| g.to_string()).collect(),
            popularity,
            vote_average: None,
            vote_count: None,
            release_date: None,
            poster_path: None,
            media_type: MediaType::Movie,
        }
    }
}

/// One content-similarity result
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ScoredItem {
    pub key: ItemKey,
    /// Cosine similarity rounded to 3 decimal places
    pub similarity: f64,
}

/// Per-user item sets read at one point in time
pub type InteractionSnapshot = BTreeMap<UserId, BTreeSet<ItemKey>>;

/// Number of distinct users holding each item
pub type PopularityCounts = BTreeMap<ItemKey, u32>;

/// Catalog item returned to clients, optionally carrying its similarity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecommendedItem {
    #[serde(flatten)]
    pub item: Item,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f64>,
}

/// Summary of the active similarity index
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexSummary {
    pub version: u64,
    pub documents: usize,
    pub terms: usize,
    pub built_at: chrono::DateTime<chrono::Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_key_display() {
        assert_eq!(format!("{}", ItemKey(27205)), "27205");
    }

    #[test]
    fn test_item_key_serde_is_transparent() {
        let json = serde_json::to_string(&ItemKey(603)).unwrap();
        assert_eq!(json, "603");

        let deserialized: ItemKey = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, ItemKey(603));
    }

    #[test]
    fn test_media_type_parse() {
        assert_eq!(MediaType::parse("tv"), MediaType::Tv);
        assert_eq!(MediaType::parse("movie"), MediaType::Movie);
        assert_eq!(MediaType::parse("documentary"), MediaType::Movie);
    }

    #[test]
    fn test_recommended_item_flattens_item_fields() {
        let item = Item::new(11, "Star Wars", "A galaxy far away", &["Sci-Fi"], 80.0);
        let recommended = RecommendedItem {
            item,
            similarity: Some(0.421),
        };

        let json = serde_json::to_value(&recommended).unwrap();
        assert_eq!(json["key"], 11);
        assert_eq!(json["title"], "Star Wars");
        assert_eq!(json["similarity"], 0.421);
    }

    #[test]
    fn test_recommended_item_omits_missing_similarity() {
        let recommended = RecommendedItem {
            item: Item::new(12, "Finding Nemo", "", &[], 50.0),
            similarity: None,
        };

        let json = serde_json::to_value(&recommended).unwrap();
        assert!(json.get("similarity").is_none());
    }
}
