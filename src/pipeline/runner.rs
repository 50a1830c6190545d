//! Pipeline runner for the control-referenced mAP workflow.

use crate::analysis::control_map::{calculate_trt_map_batch_profiles, ControlScores};
use crate::batch::{annotate_batch, concat_batch_profiles, BatchProfile};
use crate::config::AnalysisConfig;
use crate::data::features::shuffle_features;
use crate::error::{Result, ScreenError};
use crate::io::{load_barcodes, load_batch_profiles, SkippedPlate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::info;

/// A stage of the mAP run, used to label failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineStage {
    LoadBarcodes,
    LoadProfiles,
    Annotate,
    Concatenate,
    ShuffleFeatures,
    Score,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::LoadBarcodes => "load barcodes",
            PipelineStage::LoadProfiles => "load profiles",
            PipelineStage::Annotate => "annotate",
            PipelineStage::Concatenate => "concatenate",
            PipelineStage::ShuffleFeatures => "shuffle features",
            PipelineStage::Score => "score",
        };
        write!(f, "{}", name)
    }
}

/// Inputs and outputs of a run, serializable for reuse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Name of the run.
    pub name: String,
    /// Barcode CSV.
    pub barcodes: PathBuf,
    /// Directory of `{barcode}_cleaned.parquet` files.
    pub profile_dir: PathBuf,
    /// Directory of platemap CSVs.
    pub metadata_dir: PathBuf,
    /// Platemap column joined on.
    #[serde(default = "default_platemap_key")]
    pub platemap_key: String,
    /// Profile column joined on.
    #[serde(default = "default_profile_key")]
    pub profile_key: String,
    /// Where score tables are written.
    pub outdir: PathBuf,
    /// Shuffle features before scoring.
    #[serde(default)]
    pub shuffled: bool,
}

fn default_platemap_key() -> String {
    "well_position".to_string()
}

fn default_profile_key() -> String {
    "Metadata_Well".to_string()
}

impl PipelineConfig {
    /// Load from YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(ScreenError::from)
    }

    /// Save to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(ScreenError::from)
    }
}

/// Rows and plates of one concatenated batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub batch_id: String,
    pub n_plates: usize,
    pub n_rows: usize,
}

/// What a run produced, written as `run_summary.json` by the CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub name: String,
    pub shuffled: bool,
    pub batches: Vec<BatchSummary>,
    pub skipped_plates: Vec<SkippedPlate>,
    pub outputs: Vec<PathBuf>,
}

impl RunSummary {
    /// Write the summary as pretty JSON.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Builder for a mAP run.
///
/// ```no_run
/// use cfret_screen::prelude::*;
///
/// let summary = MapPipeline::new(AnalysisConfig::example())
///     .barcodes("data/barcodes.csv")
///     .profile_dir("data/profiles")
///     .metadata_dir("data/metadata/platemaps")
///     .outdir("results/map_scores")
///     .run()
///     .unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct MapPipeline {
    config: AnalysisConfig,
    settings: PipelineConfig,
}

impl MapPipeline {
    /// Create a pipeline with default join keys and paths relative to the
    /// working directory.
    pub fn new(config: AnalysisConfig) -> Self {
        Self {
            config,
            settings: PipelineConfig {
                name: "cfret_map".to_string(),
                barcodes: PathBuf::from("barcodes.csv"),
                profile_dir: PathBuf::from("."),
                metadata_dir: PathBuf::from("."),
                platemap_key: default_platemap_key(),
                profile_key: default_profile_key(),
                outdir: PathBuf::from("results"),
                shuffled: false,
            },
        }
    }

    /// Set the run name.
    pub fn name(mut self, name: &str) -> Self {
        self.settings.name = name.to_string();
        self
    }

    pub fn barcodes<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.settings.barcodes = path.as_ref().to_path_buf();
        self
    }

    pub fn profile_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.settings.profile_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn metadata_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.settings.metadata_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Set the platemap and profile columns used to annotate plates.
    pub fn join_keys(mut self, platemap_key: &str, profile_key: &str) -> Self {
        self.settings.platemap_key = platemap_key.to_string();
        self.settings.profile_key = profile_key.to_string();
        self
    }

    pub fn outdir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.settings.outdir = dir.as_ref().to_path_buf();
        self
    }

    /// Score shuffled features instead of the original ones.
    pub fn shuffled(mut self, shuffled: bool) -> Self {
        self.settings.shuffled = shuffled;
        self
    }

    /// Run settings for serialization.
    pub fn to_config(&self) -> PipelineConfig {
        self.settings.clone()
    }

    /// Run every stage in order.
    pub fn run(&self) -> Result<RunSummary> {
        let settings = &self.settings;

        let batches = stage(PipelineStage::LoadBarcodes, || load_barcodes(&settings.barcodes))?;
        let loaded = stage(PipelineStage::LoadProfiles, || {
            load_batch_profiles(&batches, &settings.profile_dir)
        })?;
        let annotated = stage(PipelineStage::Annotate, || {
            annotate_batch(
                &loaded.records,
                &settings.metadata_dir,
                &settings.platemap_key,
                &settings.profile_key,
            )
        })?;
        let mut profiles = stage(PipelineStage::Concatenate, || concat_batch_profiles(&annotated))?;

        // shuffling runs on whole batch tables, so rows move across plates
        if settings.shuffled {
            let seed = self.config.general_configs.seed;
            profiles = stage(PipelineStage::ShuffleFeatures, || {
                profiles
                    .iter()
                    .map(|b| -> Result<BatchProfile> {
                        Ok(BatchProfile {
                            batch_id: b.batch_id.clone(),
                            table: shuffle_features(&b.table, seed)?,
                        })
                    })
                    .collect()
            })?;
        }

        let scores: Vec<ControlScores> = stage(PipelineStage::Score, || {
            calculate_trt_map_batch_profiles(
                &profiles,
                self.config.clone(),
                &settings.outdir,
                settings.shuffled,
            )
        })?;

        let batch_summaries = profiles
            .iter()
            .map(|b| BatchSummary {
                batch_id: b.batch_id.clone(),
                n_plates: annotated.iter().filter(|r| r.batch_id == b.batch_id).count(),
                n_rows: b.table.n_rows(),
            })
            .collect();
        let outputs = scores
            .iter()
            .flat_map(|s| [s.ap_path.clone(), s.map_path.clone()])
            .collect::<Vec<_>>();

        info!(
            name = %settings.name,
            n_batches = profiles.len(),
            n_skipped = loaded.n_skipped(),
            n_outputs = outputs.len(),
            "mAP run finished"
        );

        Ok(RunSummary {
            name: settings.name.clone(),
            shuffled: settings.shuffled,
            batches: batch_summaries,
            skipped_plates: loaded.skipped.clone(),
            outputs,
        })
    }
}

fn stage<T, F: FnOnce() -> Result<T>>(stage: PipelineStage, f: F) -> Result<T> {
    f().map_err(|e| ScreenError::Pipeline {
        stage: stage.to_string(),
        source: Box::new(e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_roundtrip() {
        let pipeline = MapPipeline::new(AnalysisConfig::example())
            .name("screen")
            .barcodes("barcodes.csv")
            .join_keys("well", "Metadata_Well")
            .shuffled(true);

        let yaml = pipeline.to_config().to_yaml().unwrap();
        let parsed = PipelineConfig::from_yaml(&yaml).unwrap();
        assert_eq!(parsed, pipeline.to_config());
        assert_eq!(parsed.platemap_key, "well");
        assert!(parsed.shuffled);
    }

    #[test]
    fn test_default_join_keys() {
        let yaml = "name: run\nbarcodes: b.csv\nprofile_dir: p\nmetadata_dir: m\noutdir: o\n";
        let parsed = PipelineConfig::from_yaml(yaml).unwrap();
        assert_eq!(parsed.platemap_key, "well_position");
        assert_eq!(parsed.profile_key, "Metadata_Well");
        assert!(!parsed.shuffled);
    }

    #[test]
    fn test_missing_barcodes_names_stage() {
        let err = MapPipeline::new(AnalysisConfig::example())
            .barcodes("/nonexistent/barcodes.csv")
            .run()
            .unwrap_err();
        match err {
            ScreenError::Pipeline { stage, source } => {
                assert_eq!(stage, "load barcodes");
                assert!(matches!(*source, ScreenError::FileNotFound(_)));
            }
            other => panic!("unexpected error: {}", other),
        }
    }
}
