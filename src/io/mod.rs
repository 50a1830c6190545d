//! Reading barcode sheets, platemaps and plate profiles.

pub mod barcodes;
pub mod parquet;
pub mod profiles;

pub use barcodes::{load_barcodes, BatchPlates};
pub use profiles::{load_batch_profiles, LoadedProfiles, SkippedPlate};
