//! Per-plate profile loading.

use crate::batch::PlateRecord;
use crate::data::table::ProfileTable;
use crate::error::Result;
use crate::io::barcodes::BatchPlates;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Suffix of cleaned per-plate profile files.
pub const PROFILE_SUFFIX: &str = "_cleaned.parquet";

/// A plate listed in the barcode sheet whose profile file was absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedPlate {
    pub batch_id: String,
    pub platemap: String,
    pub plate_barcode: String,
    pub path: PathBuf,
}

/// Loaded plates plus the plates that had to be skipped.
#[derive(Debug, Clone, Default)]
pub struct LoadedProfiles {
    /// One record per loaded plate, in barcode file order.
    pub records: Vec<PlateRecord>,
    /// Plates whose profile file was missing.
    pub skipped: Vec<SkippedPlate>,
}

impl LoadedProfiles {
    /// Number of skipped plates.
    pub fn n_skipped(&self) -> usize {
        self.skipped.len()
    }
}

/// Path of a plate's cleaned profile.
pub fn profile_path(profile_dir: &Path, barcode: &str) -> PathBuf {
    profile_dir.join(format!("{}{}", barcode, PROFILE_SUFFIX))
}

/// Load `{barcode}_cleaned.parquet` for every plate of every batch.
///
/// A missing file is logged, recorded in [`LoadedProfiles::skipped`] and
/// left out; replicate indices count loaded plates only. Any other read
/// failure is an error.
pub fn load_batch_profiles(batches: &[BatchPlates], profile_dir: &Path) -> Result<LoadedProfiles> {
    let mut loaded = LoadedProfiles::default();

    for batch in batches {
        let mut replicate_index = 0;
        for barcode in &batch.plate_barcodes {
            let path = profile_path(profile_dir, barcode);
            if !path.exists() {
                warn!(
                    batch = %batch.batch_id,
                    platemap = %batch.platemap,
                    plate = %barcode,
                    path = %path.display(),
                    "profile file not found, skipping plate"
                );
                loaded.skipped.push(SkippedPlate {
                    batch_id: batch.batch_id.clone(),
                    platemap: batch.platemap.clone(),
                    plate_barcode: barcode.clone(),
                    path,
                });
                continue;
            }

            let table = ProfileTable::from_path(&path)?;
            loaded.records.push(PlateRecord {
                batch_id: batch.batch_id.clone(),
                platemap_id: batch.platemap.clone(),
                plate_barcode: barcode.clone(),
                replicate_index,
                table,
            });
            replicate_index += 1;
        }
    }

    info!(
        n_loaded = loaded.records.len(),
        n_skipped = loaded.n_skipped(),
        "loaded plate profiles"
    );
    Ok(loaded)
}
