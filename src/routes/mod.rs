mod detect;
mod health;
mod metrics;

use crate::{alert::AlertService, model_service::ModelService, server::AppState};
use axum::{
    routing::{get, post},
    Router,
};

pub fn api_routes<M: ModelService, A: AlertService>() -> Router<AppState<M, A>> {
    Router::new()
        .route("/detect", post(detect::detect_image::<M, A>))
        .route("/health", get(health::healthcheck::<M, A>))
        .route("/metrics", get(metrics::metrics_handler::<M, A>))
}
