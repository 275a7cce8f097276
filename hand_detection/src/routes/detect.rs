use crate::{
    cv_utils::{decode_image, ImageError},
    model_service::{reported_confidence, ModelError},
    server::SharedState,
};
use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::time::Instant;
use thiserror::Error;
use tracing::instrument;

const DETECT_ROUTE: &str = "/detect";
const IMAGE_FIELD: &str = "image";

#[derive(Serialize, Debug)]
pub struct HandPresence {
    hand: bool,
    /// Placeholder unless `report_detector_score` is set, see
    /// [`reported_confidence`].
    confidence: f32,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Error, Debug)]
pub enum DetectError {
    #[error(transparent)]
    Image(#[from] ImageError),
    #[error("invalid multipart body: {0}")]
    Multipart(String),
    #[error("missing `image` field")]
    MissingImage,
    #[error(transparent)]
    Model(#[from] ModelError),
}

impl IntoResponse for DetectError {
    fn into_response(self) -> Response {
        let status = match self {
            DetectError::Image(_) | DetectError::Multipart(_) | DetectError::MissingImage => {
                StatusCode::BAD_REQUEST
            }
            DetectError::Model(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorResponse {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[instrument(skip(state, multipart))]
pub async fn detect(
    State(state): State<SharedState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<HandPresence>, DetectError> {
    state.metrics.record_request(DETECT_ROUTE);

    let result = async {
        let mut multipart = multipart.map_err(|e| DetectError::Multipart(e.body_text()))?;
        let data = read_image_field(&mut multipart).await?;
        let image = decode_image(&data)?;

        let start = Instant::now();
        let detection = state.detector.detect(image).await?;
        state
            .metrics
            .record_inference_duration(start.elapsed().as_millis() as u64, DETECT_ROUTE);

        Ok::<_, DetectError>(Json(HandPresence {
            hand: detection.present,
            confidence: reported_confidence(&detection, state.report_detector_score),
        }))
    }
    .await;

    if let Err(ref err) = result {
        state.metrics.record_failure(DETECT_ROUTE);
        match err {
            DetectError::Model(e) => tracing::error!("Hand detector failed: {}", e),
            other => tracing::warn!("Rejected detect request: {}", other),
        }
    }
    result
}

async fn read_image_field(multipart: &mut Multipart) -> Result<Vec<u8>, DetectError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| DetectError::Multipart(e.body_text()))?
    {
        if field.name() == Some(IMAGE_FIELD) {
            let data = field
                .bytes()
                .await
                .map_err(|e| DetectError::Multipart(e.body_text()))?;
            tracing::debug!("Received {} bytes in `{}` field", data.len(), IMAGE_FIELD);
            return Ok(data.to_vec());
        }
    }

    Err(DetectError::MissingImage)
}
