//! cfret - compound screen scoring CLI
//!
//! Command-line interface for control-referenced mAP scoring, pairwise
//! correlation analysis and delta-mAP ranking of cardiac fibroblast screens.

use cfret_screen::analysis::delta::{
    attach_pathways, compute_delta_map, rank_delta_map, write_ranked_delta_map, DeltaOrder,
};
use cfret_screen::analysis::pairwise::run_pairwise_analysis;
use cfret_screen::config::{load_config, AnalysisConfig};
use cfret_screen::data::features::find_shared_features;
use cfret_screen::data::ProfileTable;
use cfret_screen::error::Result;
use cfret_screen::logging::init_logging;
use cfret_screen::pipeline::MapPipeline;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing::info;

/// CLI-friendly delta order
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliDeltaOrder {
    /// Negative-control mAP minus positive-control mAP
    NegativeMinusPositive,
    /// Positive-control mAP minus negative-control mAP
    PositiveMinusNegative,
}

impl From<CliDeltaOrder> for DeltaOrder {
    fn from(order: CliDeltaOrder) -> Self {
        match order {
            CliDeltaOrder::NegativeMinusPositive => DeltaOrder::NegativeMinusPositive,
            CliDeltaOrder::PositiveMinusNegative => DeltaOrder::PositiveMinusNegative,
        }
    }
}

/// Phenotypic scoring of cardiac fibroblast compound screens
#[derive(Parser)]
#[command(name = "cfret")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score every batch against the negative and positive controls
    Map {
        /// Analysis configuration YAML
        #[arg(short, long)]
        config: PathBuf,

        /// Barcode CSV (platemap_file, plate_barcode)
        #[arg(short, long)]
        barcodes: PathBuf,

        /// Directory of {barcode}_cleaned.parquet profiles
        #[arg(short, long)]
        profiles: PathBuf,

        /// Directory of platemap CSVs
        #[arg(short, long)]
        metadata: PathBuf,

        /// Output directory
        #[arg(short, long)]
        output: PathBuf,

        /// Platemap column to join on
        #[arg(long, default_value = "well_position")]
        platemap_key: String,

        /// Profile column to join on
        #[arg(long, default_value = "Metadata_Well")]
        profile_key: String,

        /// Shuffle features before scoring
        #[arg(long)]
        shuffled: bool,
    },

    /// Pairwise correlations of controls, replicates and treatments
    Pairwise {
        /// Aggregated profile (CSV or Parquet)
        #[arg(short, long)]
        profile: PathBuf,

        /// Output directory
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Rank treatments by delta mAP
    Delta {
        /// mAP scores against the negative control
        #[arg(short, long)]
        negative: PathBuf,

        /// mAP scores against the positive control
        #[arg(short, long)]
        positive: PathBuf,

        /// Pathway CSV
        #[arg(long)]
        pathways: PathBuf,

        /// Treatment id column in the pathway CSV
        #[arg(long, default_value = "UCD ID")]
        id_column: String,

        /// Pathway column in the pathway CSV
        #[arg(long, default_value = "Pathway")]
        pathway_column: String,

        /// Which mAP is subtracted from which
        #[arg(long, value_enum)]
        order: CliDeltaOrder,

        /// Output CSV
        #[arg(short, long, default_value = "ranked_delta_mAPs.csv")]
        output: PathBuf,
    },

    /// List columns shared by all Parquet profiles
    SharedFeatures {
        /// Parquet profiles
        #[arg(required = true)]
        profiles: Vec<PathBuf>,

        /// Write the JSON list here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Write an example analysis configuration
    ExampleConfig {
        /// Output path
        #[arg(short, long, default_value = "configs.yaml")]
        output: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Map {
            config,
            barcodes,
            profiles,
            metadata,
            output,
            platemap_key,
            profile_key,
            shuffled,
        } => cmd_map(
            &config,
            &barcodes,
            &profiles,
            &metadata,
            &output,
            &platemap_key,
            &profile_key,
            shuffled,
        ),

        Commands::Pairwise { profile, output } => cmd_pairwise(&profile, &output),

        Commands::Delta {
            negative,
            positive,
            pathways,
            id_column,
            pathway_column,
            order,
            output,
        } => cmd_delta(
            &negative,
            &positive,
            &pathways,
            &id_column,
            &pathway_column,
            order.into(),
            &output,
        ),

        Commands::SharedFeatures { profiles, output } => {
            cmd_shared_features(&profiles, output.as_deref())
        }

        Commands::ExampleConfig { output } => cmd_example_config(&output),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Run the control-referenced mAP workflow
#[allow(clippy::too_many_arguments)]
fn cmd_map(
    config_path: &Path,
    barcodes: &Path,
    profiles: &Path,
    metadata: &Path,
    output: &Path,
    platemap_key: &str,
    profile_key: &str,
    shuffled: bool,
) -> Result<()> {
    info!(config = %config_path.display(), "loading analysis configuration");
    let config = load_config(config_path)?;

    let summary = MapPipeline::new(config)
        .barcodes(barcodes)
        .profile_dir(profiles)
        .metadata_dir(metadata)
        .join_keys(platemap_key, profile_key)
        .outdir(output)
        .shuffled(shuffled)
        .run()?;

    let summary_path = output.join("run_summary.json");
    summary.write_json(&summary_path)?;

    info!(
        n_batches = summary.batches.len(),
        n_skipped = summary.skipped_plates.len(),
        n_outputs = summary.outputs.len(),
        summary = %summary_path.display(),
        "done"
    );
    Ok(())
}

/// Run every pairwise comparison on an aggregated profile
fn cmd_pairwise(profile_path: &Path, output: &Path) -> Result<()> {
    info!(profile = %profile_path.display(), "loading aggregated profile");
    let profile = ProfileTable::from_path(profile_path)?;
    let outputs = run_pairwise_analysis(&profile, output)?;
    info!(treatments = %outputs.treatment_scores.display(), "done");
    Ok(())
}

/// Compute, annotate and rank delta mAP
fn cmd_delta(
    negative: &Path,
    positive: &Path,
    pathways: &Path,
    id_column: &str,
    pathway_column: &str,
    order: DeltaOrder,
    output: &Path,
) -> Result<()> {
    let negative = ProfileTable::from_csv(negative)?;
    let positive = ProfileTable::from_csv(positive)?;
    let pathways = ProfileTable::from_csv(pathways)?;

    let records = compute_delta_map(&negative, &positive, order)?;
    let records = attach_pathways(&records, &pathways, id_column, pathway_column)?;
    info!(n_treatments = records.len(), ?order, "computed delta mAP");

    write_ranked_delta_map(&rank_delta_map(&records), output)
}

/// Print or write the shared Parquet columns as JSON
fn cmd_shared_features(profiles: &[PathBuf], output: Option<&Path>) -> Result<()> {
    let shared = find_shared_features(profiles)?;
    let json = serde_json::to_string_pretty(&shared)?;
    match output {
        Some(path) => {
            std::fs::write(path, json)?;
            info!(n_shared = shared.len(), path = %path.display(), "wrote shared features");
        }
        None => println!("{}", json),
    }
    Ok(())
}

/// Write an example analysis configuration
fn cmd_example_config(output: &Path) -> Result<()> {
    let yaml = AnalysisConfig::example().to_yaml()?;
    std::fs::write(output, yaml)?;
    info!(path = %output.display(), "wrote example configuration");
    Ok(())
}
