//! YAML analysis configuration.
//!
//! The configuration carries three sections: a global seed, the pair
//! selection keys used for average precision, and the grouping and null
//! distribution settings used for mean average precision.

use crate::error::{Result, ScreenError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Dotted keys every configuration must define.
const REQUIRED_KEYS: &[&str] = &[
    "general_configs.seed",
    "copairs_ap_configs.pos_sameby",
    "copairs_ap_configs.pos_diffby",
    "copairs_ap_configs.neg_diffby",
    "copairs_map_configs.same_by",
    "copairs_map_configs.null_size",
    "copairs_map_configs.threshold",
];

/// Settings shared across all analyses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralConfigs {
    /// Seed for null distributions and feature shuffling.
    pub seed: u64,
}

/// Pair selection keys for average precision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApConfigs {
    /// Columns positive pairs must share.
    pub pos_sameby: Vec<String>,
    /// Columns positive pairs must differ on.
    pub pos_diffby: Vec<String>,
    /// Columns negative pairs must differ on.
    pub neg_diffby: Vec<String>,
}

/// Grouping and significance settings for mean average precision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapConfigs {
    /// Columns defining mAP groups.
    pub same_by: Vec<String>,
    /// Number of random rankings in each null distribution.
    pub null_size: usize,
    /// Significance threshold for `below_p` and `below_corrected_p`.
    pub threshold: f64,
}

/// Complete analysis configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    pub general_configs: GeneralConfigs,
    pub copairs_ap_configs: ApConfigs,
    pub copairs_map_configs: MapConfigs,
}

impl AnalysisConfig {
    /// Parse a configuration from YAML text.
    ///
    /// Every required key is checked before typed deserialisation so a
    /// missing entry is reported by its dotted name.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let value: serde_yaml::Value = serde_yaml::from_str(yaml)?;
        for key in REQUIRED_KEYS {
            if lookup(&value, key).is_none() {
                return Err(ScreenError::MissingConfigKey(key.to_string()));
            }
        }
        let config: AnalysisConfig = serde_yaml::from_value(value)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to YAML text.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(ScreenError::from)
    }

    /// Check parameter ranges.
    pub fn validate(&self) -> Result<()> {
        if self.copairs_ap_configs.pos_sameby.is_empty() {
            return Err(ScreenError::InvalidParameter(
                "copairs_ap_configs.pos_sameby must name at least one column".to_string(),
            ));
        }
        if self.copairs_map_configs.same_by.is_empty() {
            return Err(ScreenError::InvalidParameter(
                "copairs_map_configs.same_by must name at least one column".to_string(),
            ));
        }
        if self.copairs_map_configs.null_size == 0 {
            return Err(ScreenError::InvalidParameter(
                "copairs_map_configs.null_size must be positive".to_string(),
            ));
        }
        let threshold = self.copairs_map_configs.threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(ScreenError::InvalidParameter(format!(
                "copairs_map_configs.threshold must be in (0, 1], got {}",
                threshold
            )));
        }
        Ok(())
    }

    /// Configuration used for the cardiac fibroblast screen.
    pub fn example() -> Self {
        Self {
            general_configs: GeneralConfigs { seed: 0 },
            copairs_ap_configs: ApConfigs {
                pos_sameby: vec!["Metadata_treatment".to_string()],
                pos_diffby: vec!["Metadata_plate_name".to_string()],
                neg_diffby: vec![
                    "Metadata_treatment".to_string(),
                    "Metadata_reference_index".to_string(),
                ],
            },
            copairs_map_configs: MapConfigs {
                same_by: vec!["Metadata_treatment".to_string()],
                null_size: 10_000,
                threshold: 0.05,
            },
        }
    }
}

fn lookup<'a>(value: &'a serde_yaml::Value, dotted: &str) -> Option<&'a serde_yaml::Value> {
    dotted
        .split('.')
        .try_fold(value, |current, key| current.get(key))
        .filter(|v| !v.is_null())
}

/// Load a configuration file.
///
/// The path must exist; it is canonicalised before reading.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AnalysisConfig> {
    let path = path.as_ref();
    let resolved = path
        .canonicalize()
        .map_err(|_| ScreenError::FileNotFound(path.to_path_buf()))?;
    let text = std::fs::read_to_string(&resolved)?;
    AnalysisConfig::from_yaml(&text)
}

/// Where an analysis takes its configuration from.
#[derive(Debug, Clone)]
pub enum ConfigSource {
    /// A YAML file on disk.
    Path(PathBuf),
    /// An already loaded configuration.
    Loaded(AnalysisConfig),
}

impl ConfigSource {
    /// Resolve into a validated configuration.
    pub fn into_config(self) -> Result<AnalysisConfig> {
        match self {
            ConfigSource::Path(path) => load_config(path),
            ConfigSource::Loaded(config) => {
                config.validate()?;
                Ok(config)
            }
        }
    }
}

impl From<AnalysisConfig> for ConfigSource {
    fn from(config: AnalysisConfig) -> Self {
        ConfigSource::Loaded(config)
    }
}

impl From<PathBuf> for ConfigSource {
    fn from(path: PathBuf) -> Self {
        ConfigSource::Path(path)
    }
}

impl From<&Path> for ConfigSource {
    fn from(path: &Path) -> Self {
        ConfigSource::Path(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const CONFIG: &str = "\
general_configs:
  seed: 0
copairs_ap_configs:
  pos_sameby: [Metadata_treatment]
  pos_diffby: [Metadata_plate_name]
  neg_diffby: [Metadata_treatment, Metadata_reference_index]
copairs_map_configs:
  same_by: [Metadata_treatment]
  null_size: 1000
  threshold: 0.05
";

    #[test]
    fn test_load_config() {
        let mut file = NamedTempFile::with_suffix(".yaml").unwrap();
        file.write_all(CONFIG.as_bytes()).unwrap();
        file.flush().unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.general_configs.seed, 0);
        assert_eq!(config.copairs_map_configs.null_size, 1000);
        assert_eq!(
            config.copairs_ap_configs.neg_diffby,
            vec!["Metadata_treatment", "Metadata_reference_index"]
        );
    }

    #[test]
    fn test_missing_key_is_named() {
        let yaml = CONFIG.replace("  null_size: 1000\n", "");
        let err = AnalysisConfig::from_yaml(&yaml).unwrap_err();
        match err {
            ScreenError::MissingConfigKey(key) => {
                assert_eq!(key, "copairs_map_configs.null_size")
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_missing_file() {
        let err = load_config("/nonexistent/configs.yaml").unwrap_err();
        assert!(matches!(err, ScreenError::FileNotFound(_)));
    }

    #[test]
    fn test_validate_ranges() {
        let mut config = AnalysisConfig::example();
        config.copairs_map_configs.null_size = 0;
        assert!(matches!(config.validate(), Err(ScreenError::InvalidParameter(_))));

        let mut config = AnalysisConfig::example();
        config.copairs_map_configs.threshold = 1.5;
        assert!(config.validate().is_err());

        assert!(AnalysisConfig::example().validate().is_ok());
    }

    #[test]
    fn test_yaml_roundtrip_and_source() {
        let yaml = AnalysisConfig::example().to_yaml().unwrap();
        let parsed = AnalysisConfig::from_yaml(&yaml).unwrap();
        assert_eq!(parsed, AnalysisConfig::example());

        let resolved = ConfigSource::from(parsed.clone()).into_config().unwrap();
        assert_eq!(resolved, parsed);
    }
}
