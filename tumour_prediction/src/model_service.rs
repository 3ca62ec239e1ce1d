use ndarray::{Array, Ix4};
use std::path::Path;

/// `(batch, height, width, channels)` grayscale input, batch and channels of 1.
pub type InputTensor = Array<f32, Ix4>;

/// A loaded model: takes an [`InputTensor`] and returns one score per class.
pub trait Classifier: Send + Sync + 'static {
    fn classify(&self, input: &InputTensor) -> Result<Vec<f32>, String>;
}

pub trait ModelLoader: Send + Sync + 'static {
    type Model: Classifier;

    fn load(&self, path: &Path) -> Result<Self::Model, String>;
}
