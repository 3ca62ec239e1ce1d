use crate::{
    labels::{TumourClass, LABELS},
    model_service::{Classifier, InputTensor, ModelLoader},
    provisioner::ModelProvisioner,
};
use image::{
    imageops::{self, FilterType},
    DynamicImage, GrayImage, Luma,
};
use ndarray::Array;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

pub const INPUT_SIZE: u32 = 150;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PredictionError {
    #[error("Uploaded file is not a readable image: {0}")]
    Decode(String),
    #[error("Model is unavailable: {0}")]
    ModelUnavailable(String),
    #[error("Inference failed: {0}")]
    Inference(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassScore {
    pub label: TumourClass,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub label: TumourClass,
    pub confidence: f32,
    pub probabilities: Vec<ClassScore>,
}

/// Decodes `image_data` and lays it out as the `(1, 150, 150, 1)` grayscale
/// tensor the model was trained on. Intensities stay in `0..=255`.
pub fn transform_image(image_data: &[u8]) -> Result<InputTensor, PredictionError> {
    let image_reader = image::ImageReader::new(std::io::Cursor::new(image_data))
        .with_guessed_format()
        .map_err(|e| PredictionError::Decode(e.to_string()))?;

    let decoded_img = image_reader
        .decode()
        .map_err(|e| PredictionError::Decode(e.to_string()))?;

    let gray = to_luma_601(&decoded_img);
    let resized = imageops::resize(&gray, INPUT_SIZE, INPUT_SIZE, FilterType::CatmullRom);

    let side = INPUT_SIZE as usize;
    let mut input = Array::zeros((1, side, side, 1));
    for (x, y, pixel) in resized.enumerate_pixels() {
        input[[0, y as usize, x as usize, 0]] = pixel.0[0] as f32;
    }

    Ok(input)
}

/// Grayscale with ITU-R 601 weights (299/587/114), the conversion the training
/// images went through. `to_luma8` would apply Rec. 709 weights instead.
fn to_luma_601(img: &DynamicImage) -> GrayImage {
    let rgb = img.to_rgb8();
    GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        let [r, g, b] = rgb.get_pixel(x, y).0;
        let luma = (r as u32 * 299 + g as u32 * 587 + b as u32 * 114 + 500) / 1000;
        Luma([luma as u8])
    })
}

/// Picks the highest-scoring class. Ties resolve to the earlier label.
pub fn reduce_scores(scores: &[f32]) -> Result<Prediction, PredictionError> {
    if scores.len() != LABELS.len() {
        return Err(PredictionError::Inference(format!(
            "model returned {} scores, expected {}",
            scores.len(),
            LABELS.len()
        )));
    }
    if let Some(bad) = scores.iter().find(|s| !s.is_finite()) {
        return Err(PredictionError::Inference(format!(
            "model returned a non-finite score: {}",
            bad
        )));
    }

    let (index, max) = scores
        .iter()
        .copied()
        .enumerate()
        .reduce(|best, candidate| if candidate.1 > best.1 { candidate } else { best })
        .ok_or_else(|| PredictionError::Inference("model returned no scores".to_string()))?;

    let probabilities = LABELS
        .iter()
        .zip(scores)
        .map(|(label, score)| ClassScore {
            label: *label,
            score: *score,
        })
        .collect();

    Ok(Prediction {
        label: LABELS[index],
        confidence: max.clamp(0.0, 1.0),
        probabilities,
    })
}

/// Runs one image through `model`. A missing model is reported as
/// [`PredictionError::ModelUnavailable`] after the image has been checked.
pub fn predict<C: Classifier>(
    image_data: &[u8],
    model: Option<&C>,
) -> Result<Prediction, PredictionError> {
    let input = transform_image(image_data)?;
    let model = model.ok_or_else(|| {
        PredictionError::ModelUnavailable("no model has been loaded".to_string())
    })?;

    classify_input(model, &input)
}

fn classify_input<C: Classifier>(
    model: &C,
    input: &InputTensor,
) -> Result<Prediction, PredictionError> {
    let scores = model
        .classify(input)
        .map_err(PredictionError::Inference)?;

    reduce_scores(&scores)
}

pub struct InferenceService<L: ModelLoader> {
    provisioner: Arc<ModelProvisioner<L>>,
}

impl<L: ModelLoader> Clone for InferenceService<L> {
    fn clone(&self) -> Self {
        Self {
            provisioner: self.provisioner.clone(),
        }
    }
}

impl<L: ModelLoader> InferenceService<L> {
    pub fn new(provisioner: Arc<ModelProvisioner<L>>) -> Self {
        Self { provisioner }
    }

    pub fn provisioner(&self) -> &Arc<ModelProvisioner<L>> {
        &self.provisioner
    }

    /// Decodes before touching the provisioner, so an unreadable upload never
    /// starts a download and reports `Decode` whatever the model state.
    pub async fn predict(&self, image_data: &[u8]) -> Result<Prediction, PredictionError> {
        let input = transform_image(image_data)?;
        let model = self
            .provisioner
            .acquire()
            .await
            .map_err(|e| PredictionError::ModelUnavailable(e.to_string()))?;

        let prediction = classify_input(model.as_ref(), &input)?;
        tracing::debug!(
            "Predicted {} with confidence {:.3}",
            prediction.label,
            prediction.confidence
        );

        Ok(prediction)
    }
}
