//! Cardiac Fibroblast Compound Screen Scoring Library
//!
//! This library scores compounds from image-based profiles of cardiac
//! fibroblasts by how strongly they move failing cells away from the
//! failing phenotype and toward the healthy one.
//!
//! # Overview
//!
//! The library is organized into composable modules:
//!
//! - **data**: Profile tables, feature inference, consensus profiles
//! - **io**: Barcode sheets, Parquet profiles and plate loading
//! - **batch**: Platemap annotation and per-batch concatenation
//! - **metric**: Pair selection, similarity, average precision and mAP
//! - **correct**: Multiple testing correction (Benjamini-Hochberg)
//! - **analysis**: Control-referenced mAP, pairwise correlations, delta mAP
//! - **pipeline**: End-to-end mAP runs
//!
//! # Example
//!
//! ```no_run
//! use cfret_screen::prelude::*;
//!
//! let config = load_config("configs.yaml").unwrap();
//! let summary = MapPipeline::new(config)
//!     .barcodes("data/barcodes.csv")
//!     .profile_dir("data/profiles")
//!     .metadata_dir("data/metadata/platemaps")
//!     .outdir("results/map_scores")
//!     .run()
//!     .unwrap();
//! println!("{} plates skipped", summary.skipped_plates.len());
//! ```

pub mod analysis;
pub mod batch;
pub mod config;
pub mod correct;
pub mod data;
pub mod error;
pub mod io;
pub mod logging;
pub mod metric;
pub mod pipeline;

/// Convenient re-exports for common usage.
pub mod prelude {
    pub use crate::analysis::{
        assign_reference_index, attach_pathways, calculate_trt_map_batch_profiles,
        compute_delta_map, rank_delta_map, run_pairwise_analysis, write_ranked_delta_map,
        Comparator, ControlCondition, ControlScores, ControlType, DeltaMapRecord, DeltaOrder,
        PairwiseCompare, PairwiseOutputs, RankedDelta,
    };
    pub use crate::batch::{annotate_batch, concat_batch_profiles, BatchProfile, PlateRecord};
    pub use crate::config::{load_config, AnalysisConfig, ConfigSource};
    pub use crate::correct::bh_adjust;
    pub use crate::data::{
        consensus_median, find_shared_features, shuffle_features, split_meta_and_features,
        FeatureInference, ProfileTable, Variable, DEFAULT_COMPARTMENTS,
    };
    pub use crate::error::{Result, ScreenError};
    pub use crate::io::{load_barcodes, load_batch_profiles, BatchPlates, LoadedProfiles, SkippedPlate};
    pub use crate::logging::init_logging;
    pub use crate::metric::{
        average_precision, find_pairs, mean_average_precision, ApParams, MapParams,
    };
    pub use crate::pipeline::{MapPipeline, PipelineConfig, RunSummary};
}
