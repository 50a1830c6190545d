//! Similarity measures between feature vectors.

use nalgebra::DMatrix;
use rayon::prelude::*;

/// Cosine similarity. Zero vectors have similarity 0.
pub fn cosine(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Cosine similarity of each row pair of `features`.
pub fn pairwise_cosine(features: &DMatrix<f64>, pairs: &[(usize, usize)]) -> Vec<f64> {
    let rows: Vec<Vec<f64>> = features
        .row_iter()
        .map(|r| r.iter().copied().collect())
        .collect();
    pairs
        .par_iter()
        .map(|&(i, j)| cosine(&rows[i], &rows[j]))
        .collect()
}

/// Pearson correlation coefficient; NaN when either vector is constant.
pub fn pearson(a: &[f64], b: &[f64]) -> f64 {
    use statrs::statistics::Statistics;

    if a.len() != b.len() || a.len() < 2 {
        return f64::NAN;
    }
    let sd_a = a.std_dev();
    let sd_b = b.std_dev();
    if sd_a == 0.0 || sd_b == 0.0 {
        return f64::NAN;
    }
    a.covariance(b) / (sd_a * sd_b)
}
