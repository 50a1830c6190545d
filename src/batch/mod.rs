//! Plate records, platemap annotation and per-batch concatenation.

use crate::data::table::{ProfileTable, Variable};
use crate::error::{Result, ScreenError};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{debug, info};

/// Column holding the synthesized plate identifier.
pub const PLATE_NAME_COLUMN: &str = "Metadata_plate_name";

/// One loaded plate and where it sits in the screen.
#[derive(Debug, Clone, PartialEq)]
pub struct PlateRecord {
    pub batch_id: String,
    pub platemap_id: String,
    pub plate_barcode: String,
    /// Position of the plate among the loaded plates of its platemap.
    pub replicate_index: usize,
    pub table: ProfileTable,
}

impl PlateRecord {
    /// `{batch}_{platemap}_rplate_{replicate_index + 1}`.
    pub fn plate_name(&self) -> String {
        format!(
            "{}_{}_rplate_{}",
            self.batch_id,
            self.platemap_id,
            self.replicate_index + 1
        )
    }
}

/// All plates of one batch stacked into a single table.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchProfile {
    pub batch_id: String,
    pub table: ProfileTable,
}

fn platemap_path(metadata_dir: &Path, platemap: &str) -> std::path::PathBuf {
    if platemap.ends_with(".csv") {
        metadata_dir.join(platemap)
    } else {
        metadata_dir.join(format!("{}.csv", platemap))
    }
}

/// Join every plate with its platemap.
///
/// Each platemap CSV is read once. The join must not change a plate's row
/// count.
pub fn annotate_batch(
    records: &[PlateRecord],
    metadata_dir: &Path,
    platemap_key: &str,
    profile_key: &str,
) -> Result<Vec<PlateRecord>> {
    let mut platemaps: HashMap<String, ProfileTable> = HashMap::new();
    let mut annotated = Vec::with_capacity(records.len());

    for record in records {
        if !platemaps.contains_key(&record.platemap_id) {
            let path = platemap_path(metadata_dir, &record.platemap_id);
            let platemap = ProfileTable::from_csv(&path)?;
            debug!(platemap = %record.platemap_id, n_wells = platemap.n_rows(), "loaded platemap");
            platemaps.insert(record.platemap_id.clone(), platemap);
        }
        let platemap = &platemaps[&record.platemap_id];

        let table = record
            .table
            .join_annotations(platemap, profile_key, platemap_key)?;
        if table.n_rows() != record.table.n_rows() {
            return Err(ScreenError::RowCountMismatch {
                context: format!(
                    "annotating plate {} with platemap {}",
                    record.plate_barcode, record.platemap_id
                ),
                expected: record.table.n_rows(),
                actual: table.n_rows(),
            });
        }

        annotated.push(PlateRecord {
            batch_id: record.batch_id.clone(),
            platemap_id: record.platemap_id.clone(),
            plate_barcode: record.plate_barcode.clone(),
            replicate_index: record.replicate_index,
            table,
        });
    }

    info!(n_plates = annotated.len(), n_platemaps = platemaps.len(), "annotated plates");
    Ok(annotated)
}

/// Stack the plates of each batch into one table.
///
/// Every row is tagged with its plate name in a leading
/// `Metadata_plate_name` column. Batches come out in first-appearance order.
pub fn concat_batch_profiles(records: &[PlateRecord]) -> Result<Vec<BatchProfile>> {
    let mut seen = HashSet::new();
    let mut order: Vec<String> = Vec::new();
    let mut tables: HashMap<String, Vec<ProfileTable>> = HashMap::new();

    for record in records {
        let triple = (
            record.batch_id.as_str(),
            record.platemap_id.as_str(),
            record.replicate_index,
        );
        if !seen.insert(triple) {
            return Err(ScreenError::InvalidInput(format!(
                "duplicate plate {} in batch {}",
                record.plate_name(),
                record.batch_id
            )));
        }
        if record.table.has_column(PLATE_NAME_COLUMN) {
            return Err(ScreenError::InvalidInput(format!(
                "plate {} already carries a {} column",
                record.plate_barcode, PLATE_NAME_COLUMN
            )));
        }

        let mut table = record.table.clone();
        let name = Variable::Categorical(record.plate_name());
        table.insert_column(0, PLATE_NAME_COLUMN, vec![name; table.n_rows()])?;

        if !tables.contains_key(&record.batch_id) {
            order.push(record.batch_id.clone());
        }
        tables.entry(record.batch_id.clone()).or_default().push(table);
    }

    order
        .into_iter()
        .map(|batch_id| {
            let parts = tables.remove(&batch_id).unwrap_or_default();
            let table = ProfileTable::concat(&parts)?;
            debug!(batch = %batch_id, n_plates = parts.len(), n_rows = table.n_rows(), "concatenated batch");
            Ok(BatchProfile { batch_id, table })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn plate(batch: &str, platemap: &str, barcode: &str, replicate_index: usize, wells: &[&str]) -> PlateRecord {
        let table = ProfileTable::from_columns(vec![
            (
                "Image_Metadata_Well".to_string(),
                wells.iter().map(|w| Variable::from(*w)).collect(),
            ),
            (
                "Cells_Area".to_string(),
                (0..wells.len()).map(|i| Variable::Continuous(i as f64)).collect(),
            ),
        ])
        .unwrap();
        PlateRecord {
            batch_id: batch.to_string(),
            platemap_id: platemap.to_string(),
            plate_barcode: barcode.to_string(),
            replicate_index,
            table,
        }
    }

    #[test]
    fn test_annotate_batch() {
        let dir = tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("Platemap_1.csv")).unwrap();
        writeln!(file, "well_position,treatment,cell_type").unwrap();
        writeln!(file, "A01,DMSO,healthy").unwrap();
        writeln!(file, "A02,cmpd_1,failing").unwrap();
        drop(file);

        let records = vec![plate("batch_1", "Platemap_1", "p1", 0, &["A02", "A01"])];
        let annotated =
            annotate_batch(&records, dir.path(), "well_position", "Image_Metadata_Well").unwrap();

        let table = &annotated[0].table;
        assert_eq!(table.n_rows(), 2);
        assert_eq!(
            table.column_names(),
            &["well_position", "treatment", "cell_type", "Image_Metadata_Well", "Cells_Area"]
        );
        assert_eq!(table.get(0, "treatment"), Some(&Variable::from("cmpd_1")));
    }

    #[test]
    fn test_annotate_rejects_row_change() {
        let dir = tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("Platemap_1.csv")).unwrap();
        writeln!(file, "well_position,treatment").unwrap();
        writeln!(file, "A01,DMSO").unwrap();
        drop(file);

        let records = vec![plate("batch_1", "Platemap_1", "p1", 0, &["A01", "B07"])];
        let err = annotate_batch(&records, dir.path(), "well_position", "Image_Metadata_Well")
            .unwrap_err();
        assert!(matches!(
            err,
            ScreenError::RowCountMismatch { expected: 2, actual: 1, .. }
        ));

        let missing = annotate_batch(&records, Path::new("/nonexistent"), "well_position", "Image_Metadata_Well");
        assert!(matches!(missing, Err(ScreenError::FileNotFound(_))));
    }

    #[test]
    fn test_concat_batch_profiles() {
        let records = vec![
            plate("batch_1", "Platemap_1", "p1", 0, &["A01", "A02"]),
            plate("batch_2", "Platemap_2", "p3", 0, &["A01"]),
            plate("batch_1", "Platemap_1", "p2", 1, &["A01", "A02", "A03"]),
        ];

        let batches = concat_batch_profiles(&records).unwrap();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].batch_id, "batch_1");
        assert_eq!(batches[0].table.n_rows(), 5);
        assert_eq!(batches[0].table.column_names()[0], PLATE_NAME_COLUMN);

        let names: HashSet<String> = batches[0]
            .table
            .column(PLATE_NAME_COLUMN)
            .unwrap()
            .iter()
            .map(|v| v.key())
            .collect();
        assert_eq!(names.len(), 2);
        assert!(names.contains("batch_1_Platemap_1_rplate_2"));
        assert_eq!(batches[1].table.n_rows(), 1);
    }

    #[test]
    fn test_concat_rejects_duplicate_plate() {
        let records = vec![
            plate("batch_1", "Platemap_1", "p1", 0, &["A01"]),
            plate("batch_1", "Platemap_1", "p2", 0, &["A01"]),
        ];
        assert!(matches!(
            concat_batch_profiles(&records),
            Err(ScreenError::InvalidInput(_))
        ));
    }
}
