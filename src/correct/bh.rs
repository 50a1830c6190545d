//! Benjamini-Hochberg adjustment of mAP p-values.

/// Benjamini-Hochberg adjusted p-values, returned in input order.
///
/// Walking from the largest p-value down, each value becomes
/// `min(p * n / rank, previous)`, capped at 1.
pub fn bh_adjust(p_values: &[f64]) -> Vec<f64> {
    let n = p_values.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| p_values[a].total_cmp(&p_values[b]));

    let mut adjusted = vec![0.0; n];
    let mut running = 1.0_f64;
    for (rank, &idx) in order.iter().enumerate().rev() {
        let scaled = p_values[idx] * n as f64 / (rank + 1) as f64;
        running = running.min(scaled);
        adjusted[idx] = running;
    }
    adjusted
}
