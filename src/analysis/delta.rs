//! Delta mAP: how far a treatment moves failing cells toward the healthy
//! phenotype, scored from the two control-referenced mAP tables.

use crate::data::table::{ProfileTable, Variable};
use crate::error::{Result, ScreenError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Which reference is subtracted from which.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeltaOrder {
    /// Negative-control mAP minus positive-control mAP.
    NegativeMinusPositive,
    /// Positive-control mAP minus negative-control mAP.
    PositiveMinusNegative,
}

/// One treatment scored against both references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaMapRecord {
    #[serde(rename = "Metadata_treatment")]
    pub treatment: String,
    pub negative_mean_average_precision: f64,
    pub negative_corrected_p_value: f64,
    pub positive_mean_average_precision: f64,
    pub positive_corrected_p_value: f64,
    #[serde(rename = "delta_mAP")]
    pub delta_map: f64,
    #[serde(rename = "Pathway")]
    pub pathway: Option<String>,
}

/// A ranked row of the delta mAP output file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedDelta {
    #[serde(rename = "Metadata_treatment")]
    pub treatment: String,
    #[serde(rename = "delta_mAP")]
    pub delta_map: f64,
    #[serde(rename = "Pathway")]
    pub pathway: Option<String>,
    /// Empty when delta mAP is undefined.
    pub rank: Option<f64>,
}

fn score_column(table: &ProfileTable, name: &str) -> Result<Vec<f64>> {
    table
        .column(name)?
        .iter()
        .map(|v| {
            if v.is_missing() {
                Ok(f64::NAN)
            } else {
                v.as_f64().ok_or_else(|| {
                    ScreenError::InvalidInput(format!("{} holds a non-numeric value '{}'", name, v))
                })
            }
        })
        .collect()
}

/// Inner-join the negative- and positive-referenced mAP tables on
/// `Metadata_treatment` and compute delta mAP in the given order.
///
/// Rows follow the negative table; a treatment present in only one table
/// is dropped.
pub fn compute_delta_map(
    negative: &ProfileTable,
    positive: &ProfileTable,
    order: DeltaOrder,
) -> Result<Vec<DeltaMapRecord>> {
    let neg_trt = negative.column("Metadata_treatment")?;
    let neg_map = score_column(negative, "mean_average_precision")?;
    let neg_p = score_column(negative, "corrected_p_value")?;
    let pos_trt = positive.column("Metadata_treatment")?;
    let pos_map = score_column(positive, "mean_average_precision")?;
    let pos_p = score_column(positive, "corrected_p_value")?;

    let mut records = Vec::new();
    for (i, treatment) in neg_trt.iter().enumerate() {
        if treatment.is_missing() {
            continue;
        }
        for (j, other) in pos_trt.iter().enumerate() {
            if other != treatment {
                continue;
            }
            let delta_map = match order {
                DeltaOrder::NegativeMinusPositive => neg_map[i] - pos_map[j],
                DeltaOrder::PositiveMinusNegative => pos_map[j] - neg_map[i],
            };
            records.push(DeltaMapRecord {
                treatment: treatment.key(),
                negative_mean_average_precision: neg_map[i],
                negative_corrected_p_value: neg_p[i],
                positive_mean_average_precision: pos_map[j],
                positive_corrected_p_value: pos_p[j],
                delta_map,
                pathway: None,
            });
        }
    }
    Ok(records)
}

/// Inner-merge pathway labels onto delta records by treatment id.
pub fn attach_pathways(
    records: &[DeltaMapRecord],
    pathways: &ProfileTable,
    id_column: &str,
    pathway_column: &str,
) -> Result<Vec<DeltaMapRecord>> {
    let ids = pathways.column(id_column)?;
    let labels = pathways.column(pathway_column)?;

    let mut out = Vec::new();
    for record in records {
        for (id, label) in ids.iter().zip(labels) {
            if id.is_missing() || id.key() != record.treatment {
                continue;
            }
            out.push(DeltaMapRecord {
                pathway: match label {
                    Variable::Missing => None,
                    other => Some(other.key()),
                },
                ..record.clone()
            });
        }
    }
    Ok(out)
}

/// Rank treatments by delta mAP, highest rank first.
///
/// Ranks are ascending with ties taking the largest rank of the tie. A NaN
/// delta gets no rank, is left out of the other ranks and sorts last.
pub fn rank_delta_map(records: &[DeltaMapRecord]) -> Vec<RankedDelta> {
    let mut ranked: Vec<RankedDelta> = records
        .iter()
        .map(|r| RankedDelta {
            treatment: r.treatment.clone(),
            delta_map: r.delta_map,
            pathway: r.pathway.clone(),
            rank: (!r.delta_map.is_nan()).then(|| {
                records.iter().filter(|o| o.delta_map <= r.delta_map).count() as f64
            }),
        })
        .collect();
    ranked.sort_by(|a, b| match (a.rank, b.rank) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (x, y) => x.is_none().cmp(&y.is_none()),
    });
    ranked
}

/// Write `Metadata_treatment, delta_mAP, Pathway, rank`.
pub fn write_ranked_delta_map(ranked: &[RankedDelta], path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for row in ranked {
        writer.serialize(row)?;
    }
    writer.flush()?;
    info!(n_treatments = ranked.len(), path = %path.display(), "wrote ranked delta mAP");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use tempfile::tempdir;

    fn map_table(rows: &[(&str, f64, f64)]) -> ProfileTable {
        ProfileTable::from_columns(vec![
            ("Metadata_treatment".to_string(), rows.iter().map(|r| Variable::from(r.0)).collect()),
            ("mean_average_precision".to_string(), rows.iter().map(|r| Variable::Continuous(r.1)).collect()),
            ("corrected_p_value".to_string(), rows.iter().map(|r| Variable::Continuous(r.2)).collect()),
        ])
        .unwrap()
    }

    fn records(order: DeltaOrder) -> Vec<DeltaMapRecord> {
        let negative = map_table(&[("cmpd_1", 0.9, 0.01), ("cmpd_2", 0.5, 0.2), ("cmpd_3", 0.4, 0.3)]);
        let positive = map_table(&[("cmpd_2", 0.7, 0.1), ("cmpd_1", 0.2, 0.04)]);
        compute_delta_map(&negative, &positive, order).unwrap()
    }

    #[test]
    fn test_delta_order_flips_sign() {
        let nmp = records(DeltaOrder::NegativeMinusPositive);
        let pmn = records(DeltaOrder::PositiveMinusNegative);
        assert_eq!(nmp.len(), 2);
        assert_eq!(nmp[0].treatment, "cmpd_1");
        assert_relative_eq!(nmp[0].delta_map, 0.7, epsilon = 1e-12);
        assert_relative_eq!(pmn[0].delta_map, -0.7, epsilon = 1e-12);
        assert_relative_eq!(nmp[1].delta_map, -pmn[1].delta_map, epsilon = 1e-12);
    }

    #[test]
    fn test_attach_pathways_inner() {
        let pathways = ProfileTable::from_columns(vec![
            ("UCD ID".to_string(), vec!["cmpd_1".into(), "cmpd_9".into()]),
            ("Pathway".to_string(), vec!["MAPK".into(), "PI3K".into()]),
        ])
        .unwrap();
        let merged = attach_pathways(&records(DeltaOrder::NegativeMinusPositive), &pathways, "UCD ID", "Pathway").unwrap();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].pathway.as_deref(), Some("MAPK"));
    }

    #[test]
    fn test_rank_uses_max_for_ties() {
        let base = records(DeltaOrder::NegativeMinusPositive)[0].clone();
        let input: Vec<DeltaMapRecord> = [("a", 0.1), ("b", 0.5), ("c", 0.1), ("d", -0.2)]
            .iter()
            .map(|(t, d)| DeltaMapRecord { treatment: t.to_string(), delta_map: *d, ..base.clone() })
            .collect();

        let ranked = rank_delta_map(&input);
        let ranks: Vec<(&str, Option<f64>)> =
            ranked.iter().map(|r| (r.treatment.as_str(), r.rank)).collect();
        assert_eq!(
            ranks,
            vec![("b", Some(4.0)), ("a", Some(3.0)), ("c", Some(3.0)), ("d", Some(1.0))]
        );

        let dir = tempdir().unwrap();
        let path = dir.path().join("ranked_delta_mAPs.csv");
        write_ranked_delta_map(&ranked, &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("Metadata_treatment,delta_mAP,Pathway,rank\n"));
        assert_eq!(text.lines().count(), 5);
    }

    #[test]
    fn test_nan_delta_has_no_rank() {
        let base = records(DeltaOrder::NegativeMinusPositive)[0].clone();
        let input: Vec<DeltaMapRecord> = [("a", f64::NAN), ("b", 0.3), ("c", -0.1)]
            .iter()
            .map(|(t, d)| DeltaMapRecord { treatment: t.to_string(), delta_map: *d, ..base.clone() })
            .collect();

        let ranked = rank_delta_map(&input);
        let order: Vec<&str> = ranked.iter().map(|r| r.treatment.as_str()).collect();
        assert_eq!(order, vec!["b", "c", "a"]);
        assert_eq!(ranked[0].rank, Some(2.0));
        assert_eq!(ranked[1].rank, Some(1.0));
        assert_eq!(ranked[2].rank, None);

        let dir = tempdir().unwrap();
        let path = dir.path().join("ranked_delta_mAPs.csv");
        write_ranked_delta_map(&ranked, &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.lines().last().unwrap().ends_with(','));
    }
}
