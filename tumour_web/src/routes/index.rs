use crate::{page::render_index, server::SharedState};
use axum::{extract::State, response::Html};
use tumour_prediction::model_service::ModelLoader;

pub async fn index<L: ModelLoader>(State(state): State<SharedState<L>>) -> Html<String> {
    state.metrics.record_request("/");
    Html(render_index(&state.assets))
}
