//! Phenotypic activity metrics: pair matching, similarity, AP and mAP.

pub mod ap;
pub mod map;
pub mod pairs;
pub mod similarity;

pub use ap::{average_precision, ApParams};
pub use map::{mean_average_precision, MapParams};
pub use pairs::find_pairs;
pub use similarity::{cosine, pairwise_cosine, pearson};
