use crate::{alert::AlertService, model_service::ModelService, server::AppState};
use axum::{extract::State, response::IntoResponse, response::Json};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub model_loaded: bool,
    pub message: String,
}

pub async fn healthcheck<M: ModelService, A: AlertService>(
    State(state): State<AppState<M, A>>,
) -> impl IntoResponse {
    let model_loaded = state.model.is_some();
    let (status, message) = if model_loaded {
        ("healthy", "Model loaded and ready")
    } else {
        ("unhealthy", "Model failed to load; fix the artifact and restart")
    };

    Json(HealthResponse {
        status: status.into(),
        model_loaded,
        message: message.into(),
    })
}
