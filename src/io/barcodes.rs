//! Barcode sheets: which plates were imaged with which platemap.

use crate::data::table::ProfileTable;
use crate::error::{Result, ScreenError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

/// Plates that share one platemap layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchPlates {
    /// Synthesized id, `batch_1`, `batch_2`, ...
    pub batch_id: String,
    /// Platemap file stem.
    pub platemap: String,
    /// Plate barcodes in file order.
    pub plate_barcodes: Vec<String>,
}

/// Load a barcode CSV with `platemap_file` and `plate_barcode` columns.
///
/// Plates are grouped by platemap and batches are numbered in sorted
/// platemap order. Barcodes keep their file order within a batch.
pub fn load_barcodes<P: AsRef<Path>>(path: P) -> Result<Vec<BatchPlates>> {
    let path = path.as_ref();
    let table = ProfileTable::from_csv(path)?;
    let platemaps = table.column("platemap_file")?;
    let barcodes = table.column("plate_barcode")?;

    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (platemap, barcode) in platemaps.iter().zip(barcodes) {
        if platemap.is_missing() || barcode.is_missing() {
            return Err(ScreenError::InvalidInput(format!(
                "barcode file {} has an empty platemap_file or plate_barcode cell",
                path.display()
            )));
        }
        grouped
            .entry(platemap.key())
            .or_default()
            .push(barcode.key());
    }

    let batches: Vec<BatchPlates> = grouped
        .into_iter()
        .enumerate()
        .map(|(i, (platemap, plate_barcodes))| BatchPlates {
            batch_id: format!("batch_{}", i + 1),
            platemap,
            plate_barcodes,
        })
        .collect();

    info!(
        path = %path.display(),
        n_batches = batches.len(),
        n_plates = batches.iter().map(|b| b.plate_barcodes.len()).sum::<usize>(),
        "loaded barcodes"
    );
    Ok(batches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_batches_follow_sorted_platemaps() {
        let mut file = NamedTempFile::with_suffix(".csv").unwrap();
        writeln!(file, "plate_barcode,platemap_file").unwrap();
        writeln!(file, "localhost231120090001,Platemap_b").unwrap();
        writeln!(file, "localhost231120090002,Platemap_a").unwrap();
        writeln!(file, "localhost231120090003,Platemap_b").unwrap();
        file.flush().unwrap();

        let batches = load_barcodes(file.path()).unwrap();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].batch_id, "batch_1");
        assert_eq!(batches[0].platemap, "Platemap_a");
        assert_eq!(batches[0].plate_barcodes, vec!["localhost231120090002"]);
        assert_eq!(batches[1].batch_id, "batch_2");
        assert_eq!(batches[1].platemap, "Platemap_b");
        assert_eq!(
            batches[1].plate_barcodes,
            vec!["localhost231120090001", "localhost231120090003"]
        );
    }

    #[test]
    fn test_missing_column() {
        let mut file = NamedTempFile::with_suffix(".csv").unwrap();
        writeln!(file, "plate_barcode").unwrap();
        writeln!(file, "plate_1").unwrap();
        file.flush().unwrap();

        let err = load_barcodes(file.path()).unwrap_err();
        assert!(matches!(err, ScreenError::MissingColumn(c) if c == "platemap_file"));
    }
}
