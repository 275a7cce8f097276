use crate::server::SharedState;
use axum::{extract::State, response::IntoResponse, response::Json};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
pub struct Health {
    status: String,
    model_loaded: bool,
}

pub async fn healthcheck(State(state): State<SharedState>) -> impl IntoResponse {
    Json(Health {
        status: "healthy".into(),
        model_loaded: state.detector.is_loaded(),
    })
}
