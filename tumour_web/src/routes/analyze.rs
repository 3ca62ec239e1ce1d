use super::{status_for, timed_prediction};
use crate::{
    page::{render_error, render_prediction},
    server::SharedState,
};
use axum::{
    body::Bytes,
    extract::{multipart::MultipartError, Multipart, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use tracing::instrument;
use tumour_prediction::{model_service::ModelLoader, PredictionError};

const ROUTE: &str = "/analyze";
const UPLOAD_FIELD: &str = "file";

async fn read_upload(multipart: &mut Multipart) -> Result<Option<Bytes>, MultipartError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(UPLOAD_FIELD) {
            let data = field.bytes().await?;
            return Ok((!data.is_empty()).then_some(data));
        }
    }
    Ok(None)
}

/// Form upload from the index page. Always answers with a page the user can
/// read, carrying either the prediction or the reason it failed.
#[instrument(skip(state, multipart))]
pub async fn analyze<L: ModelLoader>(
    State(state): State<SharedState<L>>,
    mut multipart: Multipart,
) -> Response {
    state.metrics.record_request(ROUTE);

    let image_data = match read_upload(&mut multipart).await {
        Ok(Some(data)) => data,
        Ok(None) => {
            return (
                StatusCode::BAD_REQUEST,
                Html(render_error(&state.assets, "Please upload an image first.")),
            )
                .into_response()
        }
        Err(e) => {
            return (e.status(), Html(render_error(&state.assets, &e.body_text()))).into_response()
        }
    };

    match timed_prediction(&state, &image_data, ROUTE).await {
        Ok(prediction) => Html(render_prediction(&state.assets, &prediction)).into_response(),
        Err(e) => {
            let mut message = e.to_string();
            if matches!(e, PredictionError::ModelUnavailable(_)) {
                message.push_str(". Restart the service to download the model again.");
            }
            (status_for(&e), Html(render_error(&state.assets, &message))).into_response()
        }
    }
}
