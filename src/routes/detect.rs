use crate::{
    alert::AlertService,
    detection::{has_anomalies, Detection},
    image_utils,
    model_service::ModelService,
    server::AppState,
};
use axum::{
    extract::{
        multipart::{Multipart, MultipartError},
        State,
    },
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use thiserror::Error;
use tracing::instrument;

#[derive(Error, Debug)]
pub enum DetectError {
    #[error("no image file provided or file is empty")]
    MissingImage,
    #[error("invalid multipart body: {0}")]
    Multipart(#[from] MultipartError),
    #[error("model is not loaded")]
    ModelUnavailable,
    #[error("failed to process image: {0}")]
    Processing(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for DetectError {
    fn into_response(self) -> Response {
        let status = match &self {
            DetectError::MissingImage | DetectError::Multipart(_) => StatusCode::BAD_REQUEST,
            DetectError::ModelUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            DetectError::Processing(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

#[derive(Serialize, Deserialize)]
pub struct DetectResponse {
    pub detections: Vec<Detection>,
    pub has_errors: bool,
    pub alert_sent: bool,
    pub total_detections: usize,
}

#[instrument(skip(state, multipart))]
pub async fn detect_image<M: ModelService, A: AlertService>(
    State(state): State<AppState<M, A>>,
    multipart: Multipart,
) -> Result<Json<DetectResponse>, DetectError> {
    state.metrics.record_request("detect");

    // Checked before touching the upload, matching the health contract.
    let model = state.model.as_ref().ok_or(DetectError::ModelUnavailable)?;

    let image_data = read_image_field(multipart).await?;
    let image = image_utils::decode_image(&image_data)
        .map_err(|e| DetectError::Processing(e.to_string()))?;

    let started = Instant::now();
    let detections = model
        .predict(&image)
        .await
        .map_err(|e| DetectError::Processing(e.to_string()))?;
    state
        .metrics
        .record_detection_duration(started.elapsed().as_millis() as u64, "detect");

    let has_errors = has_anomalies(&detections, &state.normal_class);

    // The annotated copy only feeds the alert; callers get coordinates.
    let annotated = image_utils::annotate(&image, &detections, &state.labels);
    let alert_sent = state.alerter.send_alert(&annotated, &detections).await;
    if has_errors {
        state.metrics.record_alert(alert_sent);
    }

    Ok(Json(DetectResponse {
        total_detections: detections.len(),
        detections,
        has_errors,
        alert_sent,
    }))
}

async fn read_image_field(mut multipart: Multipart) -> Result<Vec<u8>, DetectError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("image") {
            let bytes = field.bytes().await?;
            if bytes.is_empty() {
                return Err(DetectError::MissingImage);
            }
            return Ok(bytes.to_vec());
        }
    }

    Err(DetectError::MissingImage)
}
