//! Screen-level analyses built on the metrics: control-referenced mAP,
//! pairwise correlations and delta-mAP ranking.

pub mod control_map;
pub mod delta;
pub mod pairwise;

use crate::error::{Result, ScreenError};
use std::path::Path;

pub use control_map::{
    assign_reference_index, calculate_trt_map_batch_profiles, ControlCondition, ControlScores,
    ControlType,
};
pub use delta::{
    attach_pathways, compute_delta_map, rank_delta_map, write_ranked_delta_map, DeltaMapRecord,
    DeltaOrder, RankedDelta,
};
pub use pairwise::{run_pairwise_analysis, Comparator, PairwiseCompare, PairwiseOutputs};

/// Create `dir` if needed; an existing file at that path is an error.
pub(crate) fn ensure_dir(dir: &Path) -> Result<()> {
    if dir.exists() && !dir.is_dir() {
        return Err(ScreenError::InvalidInput(format!(
            "output path {} is not a directory",
            dir.display()
        )));
    }
    std::fs::create_dir_all(dir)?;
    Ok(())
}
