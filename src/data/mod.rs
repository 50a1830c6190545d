//! Data structures for image-based profiles.

pub mod consensus;
pub mod features;
pub mod table;

pub use consensus::consensus_median;
pub use features::{
    find_shared_features, shuffle_features, split_meta_and_features, FeatureInference,
    DEFAULT_COMPARTMENTS,
};
pub use table::{ProfileTable, Variable};
