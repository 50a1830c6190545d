//! Mean average precision with permutation-null significance.
//!
//! Average precision scores are grouped by a set of metadata columns. Each
//! group's mean is compared against a null distribution built from random
//! rankings that have the same number of positive and total pairs as the
//! group's members. P-values are then corrected with Benjamini-Hochberg.

use crate::correct::bh::bh_adjust;
use crate::data::table::{ProfileTable, Variable};
use crate::error::{Result, ScreenError};
use crate::metric::ap::ranked_average_precision;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Output columns appended after the grouping columns.
pub const MAP_COLUMNS: &[&str] = &[
    "mean_average_precision",
    "p_value",
    "corrected_p_value",
    "below_p",
    "below_corrected_p",
];

/// Grouping and null distribution settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapParams {
    pub sameby: Vec<String>,
    pub null_size: usize,
    pub threshold: f64,
    pub seed: u64,
}

/// Average precision of `null_size` random rankings with `n_pos` relevant
/// entries out of `n_total`.
pub fn null_distribution(n_pos: usize, n_total: usize, null_size: usize, seed: u64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut relevance: Vec<bool> = (0..n_total).map(|k| k < n_pos).collect();
    (0..null_size)
        .map(|_| {
            relevance.shuffle(&mut rng);
            ranked_average_precision(&relevance).unwrap_or(0.0)
        })
        .collect()
}

fn count_column(table: &ProfileTable, name: &str) -> Result<Vec<Option<usize>>> {
    table
        .column(name)?
        .iter()
        .map(|v| match v {
            Variable::Missing => Ok(None),
            other => other
                .as_f64()
                .filter(|x| *x >= 0.0 && x.fract() == 0.0)
                .map(|x| Some(x as usize))
                .ok_or_else(|| {
                    ScreenError::InvalidInput(format!("{} holds a non-count value '{}'", name, other))
                }),
        })
        .collect()
}

/// Aggregate average precision scores into one row per group.
///
/// Rows with a missing score or no positive pair are dropped first. Groups
/// are keyed by `sameby` and emitted in sorted key order. An input without
/// scorable rows yields an empty table with the output header.
pub fn mean_average_precision(ap_scores: &ProfileTable, params: &MapParams) -> Result<ProfileTable> {
    if params.null_size == 0 {
        return Err(ScreenError::InvalidParameter("null_size must be positive".to_string()));
    }

    let scores = ap_scores.column("average_precision")?;
    let n_pos = count_column(ap_scores, "n_pos_pairs")?;
    let n_total = count_column(ap_scores, "n_total_pairs")?;
    let keys = ap_scores.row_keys(&params.sameby)?;

    let rows: Vec<usize> = (0..ap_scores.n_rows())
        .filter(|&r| !scores[r].is_missing() && n_pos[r].unwrap_or(0) > 0)
        .collect();

    // one null per distinct (n_pos, n_total), seeded in sorted order
    let mut configs: Vec<(usize, usize)> = rows
        .iter()
        .map(|&r| (n_pos[r].unwrap_or(0), n_total[r].unwrap_or(0)))
        .collect();
    configs.sort_unstable();
    configs.dedup();

    let mut master = StdRng::seed_from_u64(params.seed);
    let seeded: Vec<((usize, usize), u64)> = configs.iter().map(|&c| (c, master.gen())).collect();
    let nulls: HashMap<(usize, usize), Vec<f64>> = seeded
        .into_par_iter()
        .map(|((pos, total), seed)| ((pos, total), null_distribution(pos, total, params.null_size, seed)))
        .collect();
    debug!(n_rows = rows.len(), n_configs = nulls.len(), "built null distributions");

    let mut groups: BTreeMap<Vec<String>, Vec<usize>> = BTreeMap::new();
    for &r in &rows {
        groups.entry(keys[r].clone()).or_default().push(r);
    }

    let mut first_rows = Vec::with_capacity(groups.len());
    let mut maps = Vec::with_capacity(groups.len());
    let mut p_values = Vec::with_capacity(groups.len());
    for members in groups.values() {
        let mean_ap = members
            .iter()
            .filter_map(|&r| scores[r].as_f64())
            .sum::<f64>()
            / members.len() as f64;

        let mut null = vec![0.0; params.null_size];
        for &r in members {
            let config = (n_pos[r].unwrap_or(0), n_total[r].unwrap_or(0));
            if let Some(dist) = nulls.get(&config) {
                for (acc, v) in null.iter_mut().zip(dist) {
                    *acc += v;
                }
            }
        }
        let n_members = members.len() as f64;
        let exceed = null.iter().filter(|&&v| v / n_members > mean_ap).count();

        first_rows.push(members[0]);
        maps.push(mean_ap);
        p_values.push((exceed + 1) as f64 / (params.null_size + 1) as f64);
    }

    let q_values = bh_adjust(&p_values);

    let mut out = ap_scores.select(&params.sameby)?.take_rows(&first_rows);
    out.push_column("mean_average_precision", maps.into_iter().map(Variable::Continuous).collect())?;
    out.push_column("p_value", p_values.iter().map(|&p| Variable::Continuous(p)).collect())?;
    out.push_column(
        "corrected_p_value",
        q_values.iter().map(|&q| Variable::Continuous(q)).collect(),
    )?;
    out.push_column(
        "below_p",
        p_values.iter().map(|&p| Variable::Boolean(p < params.threshold)).collect(),
    )?;
    out.push_column(
        "below_corrected_p",
        q_values
            .iter()
            .map(|&q| Variable::Boolean(q < params.threshold))
            .collect(),
    )?;
    Ok(out)
}
