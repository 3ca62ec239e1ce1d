mod download;
mod ort_service;

pub mod config;
pub mod inference;
pub mod labels;
pub mod model_service;
pub mod provisioner;

#[cfg(test)]
mod test_support;

pub use download::{DownloadError, ModelDownloader};
pub use inference::{predict, ClassScore, InferenceService, Prediction, PredictionError};
pub use labels::{TumourClass, LABELS};
pub use ort_service::{OrtClassifier, OrtModelLoader};
pub use provisioner::{ModelProvisioner, ModelStatus, ProvisionError};
