use crate::server::SharedState;
use axum::{extract::State, response::IntoResponse, response::Json};
use serde::Serialize;
use tumour_prediction::{model_service::ModelLoader, ModelStatus};

#[derive(Serialize)]
pub struct Status {
    status: String,
    model: ModelStatus,
}

pub async fn healthcheck<L: ModelLoader>(State(state): State<SharedState<L>>) -> impl IntoResponse {
    Json(Status {
        status: "Available".into(),
        model: state.inference_service.provisioner().status(),
    })
}
