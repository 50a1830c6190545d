//! End-to-end mAP runs from barcode sheet to score tables.

mod runner;

pub use runner::{BatchSummary, MapPipeline, PipelineConfig, PipelineStage, RunSummary};
