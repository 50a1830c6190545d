//! Median consensus profiles.

use crate::data::table::{ProfileTable, Variable};
use crate::error::{Result, ScreenError};
use statrs::statistics::{Data, Median};
use std::collections::HashMap;

/// Collapse rows sharing `group_columns` into one median profile per group.
///
/// Groups appear in order of first occurrence. Output holds the group
/// columns followed by `features`; missing feature values are ignored and
/// an all-missing group yields a missing median.
pub fn consensus_median(
    table: &ProfileTable,
    group_columns: &[String],
    features: &[String],
) -> Result<ProfileTable> {
    if group_columns.is_empty() {
        return Err(ScreenError::InvalidParameter(
            "consensus requires at least one grouping column".to_string(),
        ));
    }

    let keys = table.row_keys(group_columns)?;
    let matrix = table.feature_matrix(features)?;

    let mut order: Vec<Vec<String>> = Vec::new();
    let mut members: HashMap<Vec<String>, Vec<usize>> = HashMap::new();
    for (row, key) in keys.into_iter().enumerate() {
        let entry = members.entry(key.clone()).or_default();
        if entry.is_empty() {
            order.push(key);
        }
        entry.push(row);
    }

    let first_rows: Vec<usize> = order.iter().map(|k| members[k][0]).collect();
    let mut out = table.select(group_columns)?.take_rows(&first_rows);

    for (col, name) in features.iter().enumerate() {
        let values: Vec<Variable> = order
            .iter()
            .map(|key| {
                let present: Vec<f64> = members[key]
                    .iter()
                    .map(|&row| matrix[(row, col)])
                    .filter(|v| !v.is_nan())
                    .collect();
                if present.is_empty() {
                    Variable::Missing
                } else {
                    Variable::Continuous(Data::new(present).median())
                }
            })
            .collect();
        out.push_column(name, values)?;
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_consensus_median() {
        let table = ProfileTable::from_columns(vec![
            ("Metadata_plate".to_string(), vec!["p1".into(), "p1".into(), "p2".into(), "p1".into()]),
            ("Metadata_treatment".to_string(), vec!["DMSO".into(), "DMSO".into(), "DMSO".into(), "DMSO".into()]),
            ("Cells_A".to_string(), vec![1.0.into(), 3.0.into(), 5.0.into(), 10.0.into()]),
            ("Cells_B".to_string(), vec![Variable::Missing, 2.0.into(), Variable::Missing, 4.0.into()]),
        ])
        .unwrap();

        let groups = vec!["Metadata_plate".to_string(), "Metadata_treatment".to_string()];
        let features = vec!["Cells_A".to_string(), "Cells_B".to_string()];
        let consensus = consensus_median(&table, &groups, &features).unwrap();

        assert_eq!(consensus.n_rows(), 2);
        assert_eq!(consensus.get(0, "Metadata_plate"), Some(&Variable::from("p1")));
        assert_relative_eq!(consensus.get(0, "Cells_A").and_then(Variable::as_f64).unwrap(), 3.0);
        assert_relative_eq!(consensus.get(0, "Cells_B").and_then(Variable::as_f64).unwrap(), 3.0);
        assert_relative_eq!(consensus.get(1, "Cells_A").and_then(Variable::as_f64).unwrap(), 5.0);
        assert!(consensus.get(1, "Cells_B").unwrap().is_missing());
    }
}
