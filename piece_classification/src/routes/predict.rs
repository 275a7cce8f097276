use crate::{
    model_service::{ModelError, Prediction},
    preprocessing::{base64_to_tensor, flat_to_tensor, InputError},
    server::SharedState,
};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use ndarray::Array4;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use thiserror::Error;
use tracing::instrument;

const PREDICT_ROUTE: &str = "/predict";
const PREDICT_BASE64_ROUTE: &str = "/predict_base64";

#[derive(Deserialize)]
pub struct FlatImageRequest {
    image: Vec<f32>,
}

#[derive(Deserialize)]
pub struct Base64ImageRequest {
    image_base64: String,
}

#[derive(Serialize, Debug)]
pub struct PredictResponse {
    success: bool,
    class_index: usize,
    class_name: &'static str,
    confidence: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    probabilities: Option<Vec<f32>>,
}

impl PredictResponse {
    fn new(prediction: Prediction, with_probabilities: bool) -> Self {
        Self {
            success: true,
            class_index: prediction.class_index,
            class_name: prediction.class_name,
            confidence: prediction.confidence,
            probabilities: with_probabilities.then_some(prediction.probabilities),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
}

#[derive(Error, Debug)]
pub enum PredictError {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error(transparent)]
    Model(#[from] ModelError),
}

impl IntoResponse for PredictError {
    fn into_response(self) -> Response {
        let status = match self {
            PredictError::Input(_) => StatusCode::BAD_REQUEST,
            PredictError::Model(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorResponse {
            success: false,
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[instrument(skip(state, payload))]
pub async fn predict(
    State(state): State<SharedState>,
    payload: Result<Json<FlatImageRequest>, JsonRejection>,
) -> Result<Json<PredictResponse>, PredictError> {
    state.metrics.record_request(PREDICT_ROUTE);

    let result = async {
        let Json(request) = payload.map_err(|e| InputError::Body(e.body_text()))?;
        let input = flat_to_tensor(request.image)?;
        let prediction = classify(&state, input, PREDICT_ROUTE).await?;
        Ok::<_, PredictError>(Json(PredictResponse::new(prediction, true)))
    }
    .await;

    report(&state, PREDICT_ROUTE, result)
}

#[instrument(skip(state, payload))]
pub async fn predict_base64(
    State(state): State<SharedState>,
    payload: Result<Json<Base64ImageRequest>, JsonRejection>,
) -> Result<Json<PredictResponse>, PredictError> {
    state.metrics.record_request(PREDICT_BASE64_ROUTE);

    let result = async {
        let Json(request) = payload.map_err(|e| InputError::Body(e.body_text()))?;
        let input = base64_to_tensor(&request.image_base64)?;
        let prediction = classify(&state, input, PREDICT_BASE64_ROUTE).await?;
        Ok::<_, PredictError>(Json(PredictResponse::new(prediction, false)))
    }
    .await;

    report(&state, PREDICT_BASE64_ROUTE, result)
}

async fn classify(
    state: &SharedState,
    input: Array4<f32>,
    route: &str,
) -> Result<Prediction, ModelError> {
    let start = Instant::now();
    let probabilities = state.classifier.classify(input).await?;
    state
        .metrics
        .record_inference_duration(start.elapsed().as_millis() as u64, route);

    let prediction = Prediction::from_probabilities(probabilities)?;
    tracing::debug!(
        "Predicted class {} ({}) with confidence {:.3}",
        prediction.class_index,
        prediction.class_name,
        prediction.confidence
    );
    Ok(prediction)
}

fn report<T>(
    state: &SharedState,
    route: &str,
    result: Result<T, PredictError>,
) -> Result<T, PredictError> {
    if let Err(ref err) = result {
        state.metrics.record_failure(route);
        match err {
            PredictError::Input(e) => tracing::warn!("Rejected {} request: {}", route, e),
            PredictError::Model(e) => tracing::error!("Classifier failed on {}: {}", route, e),
        }
    }
    result
}
