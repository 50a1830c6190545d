//! Pearson-based pairwise comparisons between controls, replicates and
//! treatments of an aggregated profile.

use crate::data::consensus::consensus_median;
use crate::data::features::{split_meta_and_features, FeatureInference, DEFAULT_COMPARTMENTS};
use crate::data::table::{ProfileTable, Variable};
use crate::error::{Result, ScreenError};
use crate::metric::similarity::pearson;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::info;

/// Treatment label of healthy cells with DMSO.
pub const HEALTHY_CONTROL: &str = "DMSO-positive";
/// Treatment label of failing cells with DMSO.
pub const FAILING_CONTROL: &str = "DMSO-negative";
/// Fill value for treatments without a pathway.
pub const NO_PATHWAY: &str = "No Pathway";

const TREATMENT: &str = "Metadata_treatment";
const PLATE_NAME: &str = "Metadata_plate_name";
const PLATE_WELL: &str = "Metadata_plate_well";
const PATHWAY: &str = "Metadata_Pathway";

/// Scoring function applied to a pair of feature vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Comparator {
    #[default]
    PearsonsCorrelation,
}

impl Comparator {
    /// Output column holding the score.
    pub fn column_name(&self) -> &'static str {
        match self {
            Comparator::PearsonsCorrelation => "pearsons_correlation",
        }
    }

    pub fn compare(&self, a: &[f64], b: &[f64]) -> f64 {
        match self {
            Comparator::PearsonsCorrelation => pearson(a, b),
        }
    }
}

/// Compares every row pair that shares `same_columns` and differs in all
/// `different_columns`.
///
/// Rows are first grouped by the same columns. Inside a group, rows are
/// grouped again by the tuple of different columns, in order of first
/// appearance, and every pair of those sub-groups that differs in each
/// column is compared row by row.
#[derive(Debug, Clone)]
pub struct PairwiseCompare<'a> {
    table: &'a ProfileTable,
    features: &'a [String],
    same_columns: Vec<String>,
    different_columns: Vec<String>,
    comparator: Comparator,
}

impl<'a> PairwiseCompare<'a> {
    pub fn new(table: &'a ProfileTable, features: &'a [String]) -> Self {
        Self {
            table,
            features,
            same_columns: Vec::new(),
            different_columns: Vec::new(),
            comparator: Comparator::default(),
        }
    }

    pub fn same_columns(mut self, columns: &[&str]) -> Self {
        self.same_columns = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn different_columns(mut self, columns: &[&str]) -> Self {
        self.different_columns = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn comparator(mut self, comparator: Comparator) -> Self {
        self.comparator = comparator;
        self
    }

    /// Run the comparison.
    ///
    /// Output columns: the score, `{c}__antehoc_group0` per same column,
    /// then `{c}__posthoc_group0` and `{c}__posthoc_group1` per different
    /// column.
    pub fn run(&self) -> Result<ProfileTable> {
        if self.different_columns.is_empty() {
            return Err(ScreenError::InvalidParameter(
                "pairwise comparison needs at least one different column".to_string(),
            ));
        }

        let matrix = self.table.feature_matrix(self.features)?;
        let rows: Vec<Vec<f64>> = matrix.row_iter().map(|r| r.iter().copied().collect()).collect();
        let same_keys = self.table.row_keys(&self.same_columns)?;
        let diff_keys = self.table.row_keys(&self.different_columns)?;
        let same_values = self.values(&self.same_columns)?;
        let diff_values = self.values(&self.different_columns)?;

        let mut scores = Vec::new();
        let mut antehoc: Vec<Vec<Variable>> = vec![Vec::new(); self.same_columns.len()];
        let mut posthoc0: Vec<Vec<Variable>> = vec![Vec::new(); self.different_columns.len()];
        let mut posthoc1: Vec<Vec<Variable>> = vec![Vec::new(); self.different_columns.len()];

        for group in first_appearance_groups(&same_keys, 0..self.table.n_rows()) {
            let subgroups = first_appearance_groups(&diff_keys, group.iter().copied());
            for (g0, rows0) in subgroups.iter().enumerate() {
                for rows1 in &subgroups[g0 + 1..] {
                    let key0 = &diff_keys[rows0[0]];
                    let key1 = &diff_keys[rows1[0]];
                    if key0.iter().zip(key1).any(|(a, b)| a == b) {
                        continue;
                    }
                    for &i in rows0 {
                        for &j in rows1 {
                            scores.push(Variable::Continuous(self.comparator.compare(&rows[i], &rows[j])));
                            for (c, values) in same_values.iter().enumerate() {
                                antehoc[c].push(values[i].clone());
                            }
                            for (c, values) in diff_values.iter().enumerate() {
                                posthoc0[c].push(values[i].clone());
                                posthoc1[c].push(values[j].clone());
                            }
                        }
                    }
                }
            }
        }

        let mut out = ProfileTable::new();
        out.push_column(self.comparator.column_name(), scores)?;
        for (name, values) in self.same_columns.iter().zip(antehoc) {
            out.push_column(&format!("{}__antehoc_group0", name), values)?;
        }
        for (name, values) in self.different_columns.iter().zip(posthoc0) {
            out.push_column(&format!("{}__posthoc_group0", name), values)?;
        }
        for (name, values) in self.different_columns.iter().zip(posthoc1) {
            out.push_column(&format!("{}__posthoc_group1", name), values)?;
        }
        Ok(out)
    }

    fn values(&self, columns: &[String]) -> Result<Vec<&'a [Variable]>> {
        columns.iter().map(|c| self.table.column(c)).collect()
    }
}

fn first_appearance_groups(keys: &[Vec<String>], rows: impl Iterator<Item = usize>) -> Vec<Vec<usize>> {
    let mut index: HashMap<&[String], usize> = HashMap::new();
    let mut groups: Vec<Vec<usize>> = Vec::new();
    for row in rows {
        let slot = *index.entry(keys[row].as_slice()).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push(row);
    }
    groups
}

fn rows_with_treatment(table: &ProfileTable, labels: &[&str]) -> Result<ProfileTable> {
    let treatments = table.column(TREATMENT)?;
    Ok(table.filter_rows(|r| labels.iter().any(|l| treatments[r].matches_label(l))))
}

fn rows_without_treatment(table: &ProfileTable, labels: &[&str]) -> Result<ProfileTable> {
    let treatments = table.column(TREATMENT)?;
    Ok(table.filter_rows(|r| !labels.iter().any(|l| treatments[r].matches_label(l))))
}

fn select_renamed(table: &ProfileTable, columns: &[(&str, &str)]) -> Result<ProfileTable> {
    let names: Vec<String> = columns.iter().map(|(from, _)| from.to_string()).collect();
    let mut out = table.select(&names)?;
    for (from, to) in columns {
        out.rename_column(from, to)?;
    }
    Ok(out)
}

/// Cross-plate correlations between wells of the same control.
///
/// Columns: `pearsons_correlation`, `Metadata_treatment`, `plate_well_0`,
/// `plate_well_1`. Healthy controls come first.
pub fn control_pairwise_scores(profile: &ProfileTable, features: &[String]) -> Result<ProfileTable> {
    let mut controls = rows_with_treatment(profile, &[HEALTHY_CONTROL, FAILING_CONTROL])?;
    let plates = controls.column(PLATE_NAME)?;
    let wells = controls.column("Metadata_Well")?;
    let plate_wells: Vec<Variable> = plates
        .iter()
        .zip(wells)
        .map(|(p, w)| Variable::Categorical(format!("{}_{}", p, w)))
        .collect();
    controls.push_column(PLATE_WELL, plate_wells)?;

    let mut parts = Vec::new();
    for label in [HEALTHY_CONTROL, FAILING_CONTROL] {
        let subset = rows_with_treatment(&controls, &[label])?;
        let scores = PairwiseCompare::new(&subset, features)
            .same_columns(&[TREATMENT])
            .different_columns(&[PLATE_WELL])
            .run()?;
        parts.push(select_renamed(
            &scores,
            &[
                ("pearsons_correlation", "pearsons_correlation"),
                ("Metadata_treatment__antehoc_group0", TREATMENT),
                ("Metadata_plate_well__posthoc_group0", "plate_well_0"),
                ("Metadata_plate_well__posthoc_group1", "plate_well_1"),
            ],
        )?);
    }
    ProfileTable::concat(&parts)
}

/// Cross-plate correlations between median consensus profiles of each
/// control.
pub fn consensus_control_pairwise_scores(
    profile: &ProfileTable,
    features: &[String],
) -> Result<ProfileTable> {
    let controls = rows_with_treatment(profile, &[HEALTHY_CONTROL, FAILING_CONTROL])?;
    let replicate_columns = vec![
        "Metadata_plate_barcode".to_string(),
        PLATE_NAME.to_string(),
        TREATMENT.to_string(),
    ];
    let consensus = consensus_median(&controls, &replicate_columns, features)?;

    let mut parts = Vec::new();
    for label in [HEALTHY_CONTROL, FAILING_CONTROL] {
        let subset = rows_with_treatment(&consensus, &[label])?;
        let scores = PairwiseCompare::new(&subset, features)
            .same_columns(&[TREATMENT])
            .different_columns(&[PLATE_NAME])
            .run()?;
        parts.push(select_renamed(
            &scores,
            &[
                ("pearsons_correlation", "pearsons_correlation"),
                ("Metadata_treatment__antehoc_group0", TREATMENT),
                ("Metadata_plate_name__posthoc_group0", "Metadata_plate_name__posthoc_group0"),
                ("Metadata_plate_name__posthoc_group1", "Metadata_plate_name__posthoc_group1"),
            ],
        )?);
    }
    ProfileTable::concat(&parts)
}

/// Cross-plate correlations between replicate wells of each treatment.
pub fn replicate_pairwise_scores(profile: &ProfileTable, features: &[String]) -> Result<ProfileTable> {
    let treated = rows_without_treatment(profile, &[HEALTHY_CONTROL, FAILING_CONTROL])?;
    let scores = PairwiseCompare::new(&treated, features)
        .same_columns(&[TREATMENT])
        .different_columns(&[PLATE_NAME])
        .run()?;
    select_renamed(
        &scores,
        &[
            ("pearsons_correlation", "pearsons_correlation"),
            ("Metadata_treatment__antehoc_group0", TREATMENT),
            ("Metadata_plate_name__posthoc_group0", "plate_name_0"),
            ("Metadata_plate_name__posthoc_group1", "plate_name_1"),
        ],
    )
}

/// Treatment to pathway, the last profile row of each treatment winning.
pub fn build_pathway_lookup(profile: &ProfileTable) -> Result<HashMap<String, Variable>> {
    let treatments = profile.column(TREATMENT)?;
    let pathways = profile.column(PATHWAY)?;
    Ok(treatments
        .iter()
        .zip(pathways)
        .map(|(t, p)| (t.key(), p.clone()))
        .collect())
}

fn first_pathways(profile: &ProfileTable) -> Result<HashMap<String, Variable>> {
    let treatments = profile.column(TREATMENT)?;
    let pathways = profile.column(PATHWAY)?;
    let mut first = HashMap::new();
    for (t, p) in treatments.iter().zip(pathways) {
        first.entry(t.key()).or_insert_with(|| p.clone());
    }
    Ok(first)
}

/// Check merged pathways against the lookup.
///
/// Two missing pathways agree; any other difference is an error, as is a
/// treatment the lookup does not know.
pub fn validate_pathways(
    merged: &[(String, Variable)],
    lookup: &HashMap<String, Variable>,
) -> Result<()> {
    for (treatment, merged_pathway) in merged {
        let original = lookup
            .get(treatment)
            .ok_or_else(|| ScreenError::MissingPathway(treatment.clone()))?;
        if merged_pathway.is_missing() && original.is_missing() {
            continue;
        }
        if merged_pathway != original {
            return Err(ScreenError::PathwayMismatch {
                treatment: treatment.clone(),
                merged: merged_pathway.to_string(),
                original: original.to_string(),
            });
        }
    }
    Ok(())
}

/// Correlations between treated wells and each opposite control.
///
/// Rows excluding the failing control are scored against the healthy
/// control (`Healthy`), rows excluding the healthy control against the
/// failing control (`Failing`). `Metadata_treatment` always names the
/// non-control side of the pair. Pathways are attached and validated
/// before the table is returned; missing pathways read `No Pathway`.
pub fn treatment_reference_scores(profile: &ProfileTable, features: &[String]) -> Result<ProfileTable> {
    let mut parts = Vec::new();
    for (excluded, control, reference) in [
        (FAILING_CONTROL, HEALTHY_CONTROL, "Healthy"),
        (HEALTHY_CONTROL, FAILING_CONTROL, "Failing"),
    ] {
        let subset = rows_without_treatment(profile, &[excluded])?;
        let scores = PairwiseCompare::new(&subset, features)
            .different_columns(&["Metadata_control_type", TREATMENT])
            .run()?;

        let group0 = scores.column("Metadata_treatment__posthoc_group0")?;
        let group1 = scores.column("Metadata_treatment__posthoc_group1")?;
        let treatments: Vec<Variable> = group0
            .iter()
            .zip(group1)
            .map(|(t0, t1)| {
                if t1.matches_label(control) {
                    t0.clone()
                } else {
                    t1.clone()
                }
            })
            .collect();

        let mut part = scores.select(&["pearsons_correlation".to_string()])?;
        let n = part.n_rows();
        part.push_column(TREATMENT, treatments)?;
        part.push_column("reference", vec![Variable::from(reference); n])?;
        parts.push(part);
    }
    let mut combined = ProfileTable::concat(&parts)?;

    let first = first_pathways(profile)?;
    let attached: Vec<Variable> = combined
        .column(TREATMENT)?
        .iter()
        .map(|t| first.get(&t.key()).cloned().unwrap_or(Variable::Missing))
        .collect();

    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    for (t, p) in combined.column(TREATMENT)?.iter().zip(&attached) {
        if seen.insert(t.key()) {
            merged.push((t.key(), p.clone()));
        }
    }
    validate_pathways(&merged, &build_pathway_lookup(profile)?)?;

    let filled = attached
        .into_iter()
        .map(|p| if p.is_missing() { Variable::from(NO_PATHWAY) } else { p })
        .collect();
    combined.push_column(PATHWAY, filled)?;

    let keys = combined.row_keys(&combined.column_names().to_vec())?;
    let mut unique = HashSet::new();
    let keep: Vec<usize> = (0..combined.n_rows()).filter(|&r| unique.insert(keys[r].clone())).collect();
    Ok(combined.take_rows(&keep))
}

/// Paths written by [`run_pairwise_analysis`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairwiseOutputs {
    pub control_scores: PathBuf,
    pub consensus_scores: PathBuf,
    pub replicate_scores: PathBuf,
    pub treatment_scores: PathBuf,
}

/// Run every pairwise comparison on an aggregated profile and write the
/// four score tables into `outdir`.
pub fn run_pairwise_analysis(profile: &ProfileTable, outdir: &Path) -> Result<PairwiseOutputs> {
    crate::analysis::ensure_dir(outdir)?;
    let (_, features) =
        split_meta_and_features(profile, DEFAULT_COMPARTMENTS, FeatureInference::CompartmentPrefix)?;

    let outputs = PairwiseOutputs {
        control_scores: outdir.join("final_pairwise_scores.csv"),
        consensus_scores: outdir.join("final_dmso_consensus_pairwise_scores.csv"),
        replicate_scores: outdir.join("final_replicate_pairwise_scores.csv"),
        treatment_scores: outdir.join("final_trt_pairwise_scores.csv"),
    };

    let controls = control_pairwise_scores(profile, &features)?;
    controls.to_csv(&outputs.control_scores)?;
    info!(n_pairs = controls.n_rows(), path = %outputs.control_scores.display(), "wrote control pairwise scores");

    let consensus = consensus_control_pairwise_scores(profile, &features)?;
    consensus.to_csv(&outputs.consensus_scores)?;
    info!(n_pairs = consensus.n_rows(), "wrote consensus control pairwise scores");

    let replicates = replicate_pairwise_scores(profile, &features)?;
    replicates.to_csv(&outputs.replicate_scores)?;
    info!(n_pairs = replicates.n_rows(), "wrote replicate pairwise scores");

    let treatments = treatment_reference_scores(profile, &features)?;
    treatments.to_csv(&outputs.treatment_scores)?;
    info!(n_pairs = treatments.n_rows(), "wrote treatment pairwise scores");

    Ok(outputs)
}
