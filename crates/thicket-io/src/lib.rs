//! CSV dataset loading and validation for thicket.

mod domain;
mod error;
mod reader;

pub use domain::{FeatureDataset, LabeledDataset};
pub use error::IoError;
pub use reader::{FeatureCsvReader, LabeledCsvReader};
