pub mod aggregator;
pub mod collaborative;
pub mod index_store;
pub mod indexer;
pub mod normalizer;
pub mod providers;
pub mod recommendations;
pub mod similarity;

pub use recommendations::{RecommendationService, RecommendationSettings};
pub use similarity::{IndexHandle, PublishedIndex};
