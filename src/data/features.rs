//! Metadata/feature column inference and feature-level utilities.
//!
//! Image-based profiles name morphology features after the compartment they
//! were measured in (`Nuclei_`, `Cells_`, `Cytoplasm_`). Everything else is
//! metadata.

use crate::data::table::ProfileTable;
use crate::error::{Result, ScreenError};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

/// Compartments measured in the cardiac fibroblast screen.
pub const DEFAULT_COMPARTMENTS: &[&str] = &["Nuclei", "Cells", "Cytoplasm"];

/// Prefix that tags metadata columns.
pub const METADATA_PREFIX: &str = "Metadata_";

/// How metadata columns are identified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeatureInference {
    /// Metadata is every column that is not a feature.
    #[default]
    CompartmentPrefix,
    /// Metadata is every column tagged `Metadata_`.
    MetadataTag,
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(|c| c.to_lowercase()))
            .collect(),
        None => String::new(),
    }
}

/// Split column names into `(metadata, features)`, both in table order.
pub fn split_meta_and_features(
    table: &ProfileTable,
    compartments: &[&str],
    inference: FeatureInference,
) -> Result<(Vec<String>, Vec<String>)> {
    let prefixes: Vec<String> = compartments.iter().map(|c| title_case(c)).collect();

    let features: Vec<String> = table
        .column_names()
        .iter()
        .filter(|name| prefixes.iter().any(|p| name.starts_with(p.as_str())))
        .cloned()
        .collect();

    if features.is_empty() {
        return Err(ScreenError::NoFeatures(format!(
            "no column starts with any of {:?}",
            prefixes
        )));
    }

    let feature_set: HashSet<&str> = features.iter().map(|s| s.as_str()).collect();
    let metadata: Vec<String> = match inference {
        FeatureInference::CompartmentPrefix => table
            .column_names()
            .iter()
            .filter(|name| !feature_set.contains(name.as_str()))
            .cloned()
            .collect(),
        FeatureInference::MetadataTag => table
            .column_names()
            .iter()
            .filter(|name| name.starts_with(METADATA_PREFIX))
            .cloned()
            .collect(),
    };

    Ok((metadata, features))
}

/// Column names present in every Parquet file, in the first file's order.
///
/// Only schemas are read.
pub fn find_shared_features<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<String>> {
    for path in paths {
        let path = path.as_ref();
        match path.extension().and_then(|e| e.to_str()) {
            Some("parquet") | Some("pq") => {}
            _ => {
                return Err(ScreenError::InvalidInput(format!(
                    "all profile paths must point to Parquet files: {}",
                    path.display()
                )))
            }
        }
    }

    let mut shared: Option<Vec<String>> = None;
    for path in paths {
        let names = crate::io::parquet::parquet_column_names(path.as_ref())?;
        shared = Some(match shared {
            None => names,
            Some(current) => {
                let present: HashSet<&String> = names.iter().collect();
                current.into_iter().filter(|n| present.contains(n)).collect()
            }
        });
    }

    let shared = shared.unwrap_or_default();
    debug!(n_files = paths.len(), n_shared = shared.len(), "found shared features");
    Ok(shared)
}

/// Shuffle feature values across rows while leaving metadata untouched.
///
/// Every feature column receives the permutation produced by `seed`, so
/// rows stay aligned across features. The output holds metadata columns
/// followed by feature columns.
pub fn shuffle_features(table: &ProfileTable, seed: u64) -> Result<ProfileTable> {
    let (metadata, features) =
        split_meta_and_features(table, DEFAULT_COMPARTMENTS, FeatureInference::CompartmentPrefix)?;

    let mut out = table.select(&metadata)?;
    for name in &features {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut order: Vec<usize> = (0..table.n_rows()).collect();
        order.shuffle(&mut rng);

        let values = table.column(name)?;
        let shuffled = order.iter().map(|&i| values[i].clone()).collect();
        out.push_column(name, shuffled)?;
    }
    Ok(out)
}
