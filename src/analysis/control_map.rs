//! Average precision and mAP of every treatment against control references.
//!
//! Each batch is scored twice: once against failing cells with DMSO
//! (negative control) and once against healthy cells with DMSO (positive
//! control).

use crate::batch::BatchProfile;
use crate::config::{AnalysisConfig, ConfigSource};
use crate::data::features::{split_meta_and_features, FeatureInference, DEFAULT_COMPARTMENTS};
use crate::data::table::{ProfileTable, Variable};
use crate::error::Result;
use crate::metric::ap::{average_precision, ApParams};
use crate::metric::map::{mean_average_precision, MapParams};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::info;

/// Column marking reference rows; `-1` marks rows outside the reference.
pub const REFERENCE_INDEX: &str = "Metadata_reference_index";

const TREATMENT: &str = "Metadata_treatment";
const CELL_TYPE: &str = "Metadata_cell_type";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlType {
    Negative,
    Positive,
}

impl fmt::Display for ControlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlType::Negative => write!(f, "negative"),
            ControlType::Positive => write!(f, "positive"),
        }
    }
}

/// A control reference: which treatment in which cell state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlCondition {
    pub control_type: ControlType,
    pub treatment: String,
    pub cell_state: String,
}

impl ControlCondition {
    /// Failing cells with DMSO.
    pub fn negative() -> Self {
        Self {
            control_type: ControlType::Negative,
            treatment: "DMSO".to_string(),
            cell_state: "failing".to_string(),
        }
    }

    /// Healthy cells with DMSO.
    pub fn positive() -> Self {
        Self {
            control_type: ControlType::Positive,
            treatment: "DMSO".to_string(),
            cell_state: "healthy".to_string(),
        }
    }

    /// Controls scored for every batch, in run order.
    pub fn defaults() -> Vec<Self> {
        vec![Self::negative(), Self::positive()]
    }

    /// `{batch}_{original|shuffled}_{type}_control_{state}_{treatment}_{metric}_scores.csv`
    pub fn score_file_name(&self, batch_id: &str, shuffled: bool, metric: &str) -> String {
        format!(
            "{}_{}_{}_control_{}_{}_{}_scores.csv",
            batch_id,
            if shuffled { "shuffled" } else { "original" },
            self.control_type,
            self.cell_state,
            self.treatment,
            metric
        )
    }
}

/// Scores of one batch against one control.
#[derive(Debug, Clone)]
pub struct ControlScores {
    pub batch_id: String,
    pub control: ControlCondition,
    pub ap_scores: ProfileTable,
    pub map_scores: ProfileTable,
    pub ap_path: PathBuf,
    pub map_path: PathBuf,
}

/// Copy `table` with a leading reference index column.
///
/// The index starts as the row position and becomes `-1` where the row is
/// neither the control treatment nor the control cell state. Missing
/// values never equal a label.
pub fn assign_reference_index(table: &ProfileTable, control: &ControlCondition) -> Result<ProfileTable> {
    let mut out = table.clone();
    if out.has_column(REFERENCE_INDEX) {
        out.remove_column(REFERENCE_INDEX)?;
    }

    let treatments = out.column(TREATMENT)?;
    let cell_types = out.column(CELL_TYPE)?;
    let index: Vec<Variable> = treatments
        .iter()
        .zip(cell_types)
        .enumerate()
        .map(|(row, (t, c))| {
            if !t.matches_label(&control.treatment) && !c.matches_label(&control.cell_state) {
                Variable::Ordinal(-1)
            } else {
                Variable::Ordinal(row as i64)
            }
        })
        .collect();

    out.insert_column(0, REFERENCE_INDEX, index)?;
    Ok(out)
}

/// Score one batch against one control and write both score tables.
pub fn score_batch_control(
    batch: &BatchProfile,
    control: &ControlCondition,
    config: &AnalysisConfig,
    outdir: &Path,
    shuffled: bool,
) -> Result<ControlScores> {
    let profile = assign_reference_index(&batch.table, control)?;
    let (meta_columns, feature_columns) =
        split_meta_and_features(&profile, DEFAULT_COMPARTMENTS, FeatureInference::CompartmentPrefix)?;

    let ap_params = ApParams {
        pos_sameby: config.copairs_ap_configs.pos_sameby.clone(),
        pos_diffby: config.copairs_ap_configs.pos_diffby.clone(),
        neg_sameby: Vec::new(),
        neg_diffby: config.copairs_ap_configs.neg_diffby.clone(),
    };
    let meta = profile.select(&meta_columns)?;
    let features = profile.feature_matrix(&feature_columns)?;
    let all_scores = average_precision(&meta, &features, &ap_params)?;

    let treatments = all_scores.column(TREATMENT)?;
    let ap_scores = all_scores.filter_rows(|r| !treatments[r].matches_label(&control.treatment));
    let ap_path = outdir.join(control.score_file_name(&batch.batch_id, shuffled, "AP"));
    ap_scores.to_csv(&ap_path)?;

    let map_params = MapParams {
        sameby: config.copairs_map_configs.same_by.clone(),
        null_size: config.copairs_map_configs.null_size,
        threshold: config.copairs_map_configs.threshold,
        seed: config.general_configs.seed,
    };
    let map_scores = mean_average_precision(&ap_scores, &map_params)?;
    let map_path = outdir.join(control.score_file_name(&batch.batch_id, shuffled, "mAP"));
    map_scores.to_csv(&map_path)?;

    info!(
        batch = %batch.batch_id,
        control = %control.control_type,
        n_ap = ap_scores.n_rows(),
        n_map = map_scores.n_rows(),
        "scored batch against control"
    );

    Ok(ControlScores {
        batch_id: batch.batch_id.clone(),
        control: control.clone(),
        ap_scores,
        map_scores,
        ap_path,
        map_path,
    })
}

/// Score every batch against the negative and then the positive control.
///
/// Batches run in order; files written for earlier batches stay in place
/// when a later batch fails.
pub fn calculate_trt_map_batch_profiles(
    batches: &[BatchProfile],
    config: impl Into<ConfigSource>,
    outdir: &Path,
    shuffled: bool,
) -> Result<Vec<ControlScores>> {
    let config = config.into().into_config()?;
    crate::analysis::ensure_dir(outdir)?;

    let mut results = Vec::with_capacity(batches.len() * 2);
    for batch in batches {
        for control in ControlCondition::defaults() {
            results.push(score_batch_control(batch, &control, &config, outdir, shuffled)?);
        }
    }
    Ok(results)
}
