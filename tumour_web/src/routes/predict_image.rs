use super::{status_for, timed_prediction};
use crate::server::SharedState;
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::instrument;
use tumour_prediction::{model_service::ModelLoader, Prediction, PredictionError};

const ROUTE: &str = "/api/predict";

#[derive(Error, Debug)]
pub enum PredictImageError {
    #[error("Request body is empty, expected image bytes")]
    EmptyBody,
    #[error(transparent)]
    Prediction(#[from] PredictionError),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for PredictImageError {
    fn into_response(self) -> Response {
        let status = match &self {
            PredictImageError::EmptyBody => StatusCode::BAD_REQUEST,
            PredictImageError::Prediction(e) => status_for(e),
        };
        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

#[instrument(skip(state, image_data), fields(bytes = image_data.len()))]
pub async fn predict_image<L: ModelLoader>(
    State(state): State<SharedState<L>>,
    image_data: Bytes,
) -> Result<Json<Prediction>, PredictImageError> {
    state.metrics.record_request(ROUTE);
    if image_data.is_empty() {
        return Err(PredictImageError::EmptyBody);
    }

    let prediction = timed_prediction(&state, &image_data, ROUTE).await?;

    Ok(Json(prediction))
}
