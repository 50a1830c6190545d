//! Integration tests for the pairwise correlation workflow.

use cfret_screen::prelude::*;
use std::collections::HashSet;
use tempfile::tempdir;

const FEATURES: &[&str] = &[
    "Cells_AreaShape_Area",
    "Cells_Intensity_Mean",
    "Nuclei_AreaShape_Area",
    "Nuclei_Texture_Contrast",
    "Cytoplasm_Intensity_Mean",
];

/// Wells per plate: two of each control and one well per compound.
const LAYOUT: &[(&str, &str, &str)] = &[
    ("A01", "DMSO-positive", "positive"),
    ("A02", "DMSO-positive", "positive"),
    ("A03", "DMSO-negative", "negative"),
    ("A04", "DMSO-negative", "negative"),
    ("B01", "cmpd_1", "trt"),
    ("B02", "cmpd_2", "trt"),
    ("B03", "cmpd_3", "trt"),
];

fn pathway(treatment: &str, _plate: usize) -> Variable {
    match treatment {
        "cmpd_1" => Variable::from("TGF-beta"),
        "cmpd_2" => Variable::from("MAPK"),
        _ => Variable::Missing,
    }
}

/// Create an aggregated two-plate profile with deterministic noise.
fn create_profile(pathway_of: impl Fn(&str, usize) -> Variable) -> ProfileTable {
    let mut seed = 7u64;
    let mut simple_rand = move || {
        seed = seed.wrapping_mul(1103515245).wrapping_add(12345);
        ((seed >> 16) & 0x7FFF) as f64 / 32768.0
    };

    let mut barcodes = Vec::new();
    let mut plate_names = Vec::new();
    let mut wells = Vec::new();
    let mut treatments = Vec::new();
    let mut control_types = Vec::new();
    let mut pathways = Vec::new();
    let mut values: Vec<Vec<Variable>> = vec![Vec::new(); FEATURES.len()];

    for plate in 0..2 {
        for (well, treatment, control_type) in LAYOUT {
            barcodes.push(Variable::from(format!("localhost23091{}", plate)));
            plate_names.push(Variable::from(format!("batch_1_Platemap_1_rplate_{}", plate + 1)));
            wells.push(Variable::from(*well));
            treatments.push(Variable::from(*treatment));
            control_types.push(Variable::from(*control_type));
            pathways.push(pathway_of(treatment, plate));

            let base = match *treatment {
                "DMSO-positive" => [1.0, 0.4, 0.2, 0.9, 0.1],
                "DMSO-negative" => [0.2, 1.0, 0.9, 0.1, 0.6],
                "cmpd_1" => [0.9, 0.5, 0.3, 0.8, 0.2],
                "cmpd_2" => [0.3, 0.9, 0.8, 0.2, 0.5],
                _ => [0.6, 0.1, 0.7, 0.4, 1.0],
            };
            for (f, column) in values.iter_mut().enumerate() {
                column.push(Variable::Continuous(base[f] + 0.1 * simple_rand()));
            }
        }
    }

    let mut columns = vec![
        ("Metadata_plate_barcode".to_string(), barcodes),
        ("Metadata_plate_name".to_string(), plate_names),
        ("Metadata_Well".to_string(), wells),
        ("Metadata_treatment".to_string(), treatments),
        ("Metadata_control_type".to_string(), control_types),
        ("Metadata_Pathway".to_string(), pathways),
    ];
    for (name, column) in FEATURES.iter().zip(values) {
        columns.push((name.to_string(), column));
    }
    ProfileTable::from_columns(columns).unwrap()
}

#[test]
fn test_pairwise_analysis_writes_all_tables() {
    let dir = tempdir().unwrap();
    let outdir = dir.path().join("pairwise");
    let profile = create_profile(pathway);

    let outputs = run_pairwise_analysis(&profile, &outdir).unwrap();

    let controls = ProfileTable::from_csv(&outputs.control_scores).unwrap();
    // four wells per control across both plates
    assert_eq!(controls.n_rows(), 12);
    assert_eq!(
        controls.column_names(),
        &["pearsons_correlation", "Metadata_treatment", "plate_well_0", "plate_well_1"]
    );
    assert_eq!(controls.get(0, "Metadata_treatment"), Some(&Variable::from("DMSO-positive")));
    assert_eq!(controls.get(11, "Metadata_treatment"), Some(&Variable::from("DMSO-negative")));

    let consensus = ProfileTable::from_csv(&outputs.consensus_scores).unwrap();
    assert_eq!(consensus.n_rows(), 2);

    let replicates = ProfileTable::from_csv(&outputs.replicate_scores).unwrap();
    assert_eq!(replicates.n_rows(), 3);
    for row in 0..replicates.n_rows() {
        assert_ne!(replicates.get(row, "plate_name_0"), replicates.get(row, "plate_name_1"));
        let r = replicates.get(row, "pearsons_correlation").and_then(Variable::as_f64).unwrap();
        assert!((-1.0..=1.0).contains(&r));
    }

    let treatments = ProfileTable::from_csv(&outputs.treatment_scores).unwrap();
    assert_eq!(
        treatments.column_names(),
        &["pearsons_correlation", "Metadata_treatment", "reference", "Metadata_Pathway"]
    );
    // four control wells against two wells of each compound, per reference
    assert_eq!(treatments.n_rows(), 48);
}

#[test]
fn test_treatment_scores_name_the_compound() {
    let profile = create_profile(pathway);
    let (_, features) =
        split_meta_and_features(&profile, DEFAULT_COMPARTMENTS, FeatureInference::CompartmentPrefix)
            .unwrap();
    let scores = cfret_screen::analysis::pairwise::treatment_reference_scores(&profile, &features)
        .unwrap();

    let treatments: HashSet<String> = scores
        .column("Metadata_treatment")
        .unwrap()
        .iter()
        .map(|t| t.key())
        .collect();
    assert_eq!(
        treatments,
        ["cmpd_1", "cmpd_2", "cmpd_3"].iter().map(|s| s.to_string()).collect()
    );

    let references: HashSet<String> =
        scores.column("reference").unwrap().iter().map(|r| r.key()).collect();
    assert!(references.contains("Healthy") && references.contains("Failing"));

    for row in 0..scores.n_rows() {
        let treatment = scores.get(row, "Metadata_treatment").unwrap().key();
        let pathway = scores.get(row, "Metadata_Pathway").unwrap().key();
        match treatment.as_str() {
            "cmpd_1" => assert_eq!(pathway, "TGF-beta"),
            "cmpd_2" => assert_eq!(pathway, "MAPK"),
            _ => assert_eq!(pathway, "No Pathway"),
        }
    }
}

#[test]
fn test_conflicting_pathways_abort_treatment_scores() {
    let dir = tempdir().unwrap();
    let outdir = dir.path().join("pairwise");
    let profile = create_profile(|treatment, plate| match (treatment, plate) {
        ("cmpd_1", 0) => Variable::from("TGF-beta"),
        ("cmpd_1", _) => Variable::from("Wnt"),
        _ => Variable::Missing,
    });

    let err = run_pairwise_analysis(&profile, &outdir).unwrap_err();
    match err {
        ScreenError::PathwayMismatch { treatment, merged, original } => {
            assert_eq!(treatment, "cmpd_1");
            assert_eq!(merged, "TGF-beta");
            assert_eq!(original, "Wnt");
        }
        other => panic!("unexpected error: {}", other),
    }

    assert!(outdir.join("final_pairwise_scores.csv").exists());
    assert!(!outdir.join("final_trt_pairwise_scores.csv").exists());
}

#[test]
fn test_outdir_must_be_a_directory() {
    let dir = tempdir().unwrap();
    let not_a_dir = dir.path().join("scores.csv");
    std::fs::write(&not_a_dir, "x").unwrap();

    let result = run_pairwise_analysis(&create_profile(pathway), &not_a_dir);
    assert!(matches!(result, Err(ScreenError::InvalidInput(_))));
}
