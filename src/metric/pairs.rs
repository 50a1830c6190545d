//! Pair selection by shared and differing metadata keys.

use crate::data::table::ProfileTable;
use crate::error::Result;
use std::collections::HashMap;

/// Unordered row pairs `(i, j)`, `i < j`, equal on every `sameby` column and
/// different on every `diffby` column.
///
/// Missing cells compare like any other value. Pairs come back sorted.
pub fn find_pairs(
    table: &ProfileTable,
    sameby: &[String],
    diffby: &[String],
) -> Result<Vec<(usize, usize)>> {
    let same_keys = table.row_keys(sameby)?;
    let diff_keys = table.row_keys(diffby)?;

    let mut groups: HashMap<&[String], Vec<usize>> = HashMap::new();
    for (row, key) in same_keys.iter().enumerate() {
        groups.entry(key.as_slice()).or_default().push(row);
    }

    let mut pairs = Vec::new();
    for rows in groups.values() {
        for (a, &i) in rows.iter().enumerate() {
            for &j in &rows[a + 1..] {
                let differs = diff_keys[i]
                    .iter()
                    .zip(&diff_keys[j])
                    .all(|(x, y)| x != y);
                if differs {
                    pairs.push((i, j));
                }
            }
        }
    }

    pairs.sort_unstable();
    Ok(pairs)
}
