mod analyze;
mod health;
mod index;
mod metrics;
mod predict_image;

use crate::server::SharedState;
use axum::{
    http::StatusCode,
    routing::{get, post},
    Router,
};
use std::time::Instant;
use tumour_prediction::{model_service::ModelLoader, Prediction, PredictionError};

pub use analyze::analyze;
pub use health::healthcheck;
pub use index::index;
pub use metrics::metrics_handler;
pub use predict_image::predict_image;

pub fn api_routes<L: ModelLoader>() -> Router<SharedState<L>> {
    Router::new()
        .route("/", get(index::<L>))
        .route("/analyze", post(analyze::<L>))
        .route("/api/predict", post(predict_image::<L>))
        .route("/health", get(healthcheck::<L>))
        .route("/metrics", get(metrics_handler::<L>))
}

pub(crate) fn status_for(err: &PredictionError) -> StatusCode {
    match err {
        PredictionError::Decode(_) => StatusCode::BAD_REQUEST,
        PredictionError::ModelUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        PredictionError::Inference(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn failure_kind(err: &PredictionError) -> &'static str {
    match err {
        PredictionError::Decode(_) => "decode",
        PredictionError::ModelUnavailable(_) => "model_unavailable",
        PredictionError::Inference(_) => "inference",
    }
}

/// Runs one prediction and records its duration and outcome.
pub(crate) async fn timed_prediction<L: ModelLoader>(
    state: &SharedState<L>,
    image_data: &[u8],
    route: &str,
) -> Result<Prediction, PredictionError> {
    let start = Instant::now();
    let result = state.inference_service.predict(image_data).await;
    state
        .metrics
        .record_prediction_duration(start.elapsed().as_millis() as u64, route);

    match &result {
        Ok(prediction) => state.metrics.record_prediction(prediction.label.as_str()),
        Err(e) => {
            tracing::warn!("Prediction failed on {}: {}", route, e);
            state.metrics.record_failure(failure_kind(e));
        }
    }

    result
}
