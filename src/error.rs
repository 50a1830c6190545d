//! Error types for the cfret-screen library.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the library.
#[derive(Error, Debug)]
pub enum ScreenError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Missing column '{0}'")]
    MissingColumn(String),

    #[error("Missing configuration key '{0}'")]
    MissingConfigKey(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Row count changed while {context}: expected {expected}, got {actual}")]
    RowCountMismatch {
        context: String,
        expected: usize,
        actual: usize,
    },

    #[error("Pathway mismatch for treatment '{treatment}': {merged} != {original}")]
    PathwayMismatch {
        treatment: String,
        merged: String,
        original: String,
    },

    #[error("Treatment '{0}' not found in pathway lookup")]
    MissingPathway(String),

    #[error("No morphological features found: {0}")]
    NoFeatures(String),

    #[error("Unable to find {0} pairs")]
    Unpaired(String),

    #[error("Empty data: {0}")]
    EmptyData(String),

    #[error("Stage '{stage}' failed: {source}")]
    Pipeline {
        stage: String,
        #[source]
        source: Box<ScreenError>,
    },
}

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, ScreenError>;
