//! Average precision of each profile against its positive and negative pairs.

use crate::data::table::{ProfileTable, Variable};
use crate::error::{Result, ScreenError};
use crate::metric::pairs::find_pairs;
use crate::metric::similarity::pairwise_cosine;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::debug;

/// Pair selection keys for average precision.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApParams {
    pub pos_sameby: Vec<String>,
    pub pos_diffby: Vec<String>,
    pub neg_sameby: Vec<String>,
    pub neg_diffby: Vec<String>,
}

/// Average precision of a ranked relevance list.
///
/// `ranked` holds relevance flags ordered from most to least similar.
/// Returns `None` when nothing is relevant.
pub fn ranked_average_precision(ranked: &[bool]) -> Option<f64> {
    let mut hits = 0usize;
    let mut total = 0.0;
    for (k, &relevant) in ranked.iter().enumerate() {
        if relevant {
            hits += 1;
            total += hits as f64 / (k + 1) as f64;
        }
    }
    (hits > 0).then(|| total / hits as f64)
}

/// Descending similarity with NaN ranked last. Equal values compare equal
/// so a stable sort keeps insertion order on ties.
fn by_similarity_desc(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
        (a_nan, b_nan) => a_nan.cmp(&b_nan),
    }
}

/// Score every row of `meta` by average precision.
///
/// Each row ranks all of its pairs by cosine similarity (descending, ties
/// keep positives first) and averages the precision at every positive.
/// The output is `meta` plus `n_pos_pairs`, `n_total_pairs` and
/// `average_precision`; rows without a positive pair get a missing score.
pub fn average_precision(
    meta: &ProfileTable,
    features: &DMatrix<f64>,
    params: &ApParams,
) -> Result<ProfileTable> {
    if features.nrows() != meta.n_rows() {
        return Err(ScreenError::DimensionMismatch {
            expected: meta.n_rows(),
            actual: features.nrows(),
        });
    }

    let pos_pairs = find_pairs(meta, &params.pos_sameby, &params.pos_diffby)?;
    if pos_pairs.is_empty() {
        return Err(ScreenError::Unpaired("positive".to_string()));
    }
    let neg_pairs = find_pairs(meta, &params.neg_sameby, &params.neg_diffby)?;
    if neg_pairs.is_empty() {
        return Err(ScreenError::Unpaired("negative".to_string()));
    }
    debug!(n_pos = pos_pairs.len(), n_neg = neg_pairs.len(), "found pairs");

    let pos_sims = pairwise_cosine(features, &pos_pairs);
    let neg_sims = pairwise_cosine(features, &neg_pairs);

    // positives are pushed first so the stable sort keeps them ahead on ties
    let mut ranked: Vec<Vec<(f64, bool)>> = vec![Vec::new(); meta.n_rows()];
    for (pairs, sims, relevant) in [(&pos_pairs, &pos_sims, true), (&neg_pairs, &neg_sims, false)] {
        for (&(i, j), &sim) in pairs.iter().zip(sims.iter()) {
            ranked[i].push((sim, relevant));
            ranked[j].push((sim, relevant));
        }
    }

    let mut n_pos = Vec::with_capacity(meta.n_rows());
    let mut n_total = Vec::with_capacity(meta.n_rows());
    let mut scores = Vec::with_capacity(meta.n_rows());
    for mut entries in ranked {
        entries.sort_by(|a, b| by_similarity_desc(a.0, b.0));
        let relevance: Vec<bool> = entries.iter().map(|e| e.1).collect();
        let positives = relevance.iter().filter(|&&r| r).count();

        n_pos.push(Variable::Ordinal(positives as i64));
        n_total.push(Variable::Ordinal(relevance.len() as i64));
        scores.push(
            ranked_average_precision(&relevance)
                .map(Variable::Continuous)
                .unwrap_or(Variable::Missing),
        );
    }

    let mut out = meta.clone();
    out.push_column("n_pos_pairs", n_pos)?;
    out.push_column("n_total_pairs", n_total)?;
    out.push_column("average_precision", scores)?;
    Ok(out)
}
