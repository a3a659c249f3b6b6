use axum::{Json, extract::State};
use serde_json::{Value, json};
use speechtotext_transcription::JobOrchestrator;

use crate::{error::ApiError, state::AppState};

pub async fn banner() -> Json<Value> {
    Json(json!({
        "message": "Speech to Text Transcription Service",
        "status": "running",
    }))
}

pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "transcription-service",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// 200 once at least one model is loaded, 503 before.
pub async fn ready(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let models = state.orchestrator.models();
    if !models.is_ready() {
        return Err(ApiError::Unavailable("No model loaded yet".to_string()));
    }
    Ok(Json(json!({
        "ready": true,
        "models_loaded": models.loaded_count(),
    })))
}

pub async fn models() -> Json<Value> {
    Json(json!({ "models": JobOrchestrator::supported_models() }))
}
