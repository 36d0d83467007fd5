//! Model lifecycle endpoints
//!
//! POST /models/save, POST /models/{vocab}/retrain, GET /models/status,
//! POST /sleepms

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::error::{ApiError, ApiResult};
use crate::models::VocabName;
use crate::services::SessionStatus;
use crate::AppState;

/// Outcome of saving one vocabulary's model
#[derive(Debug, Serialize)]
pub struct ModelSaveResult {
    pub vocab_name: VocabName,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clips_since_last: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SaveModelsResponse {
    pub results: Vec<ModelSaveResult>,
}

#[derive(Debug, Serialize)]
pub struct RetrainResponse {
    pub vocab_name: String,
    pub clips: usize,
}

#[derive(Debug, Serialize)]
pub struct ModelStatusResponse {
    pub step_delay_ms: u64,
    pub sessions: Vec<SessionStatus>,
}

#[derive(Debug, Serialize)]
pub struct StepDelayResponse {
    pub step_delay_ms: u64,
}

/// POST /models/save
///
/// Always 200; each vocabulary reports its own success or error.
pub async fn save_models(State(state): State<AppState>) -> Json<SaveModelsResponse> {
    let results = state
        .orchestrator
        .save_all_models()
        .await
        .into_iter()
        .map(|(vocab_name, result)| match result {
            Ok(checkpoint) => ModelSaveResult {
                vocab_name,
                ok: true,
                bytes: Some(checkpoint.blob.len()),
                clips_since_last: Some(checkpoint.clips_since_last),
                error: None,
            },
            Err(e) => ModelSaveResult {
                vocab_name,
                ok: false,
                bytes: None,
                clips_since_last: None,
                error: Some(e.to_string()),
            },
        })
        .collect();

    Json(SaveModelsResponse { results })
}

/// POST /models/{vocab}/retrain
pub async fn retrain(
    State(state): State<AppState>,
    Path(vocab): Path<String>,
) -> ApiResult<Json<RetrainResponse>> {
    let clips = state.orchestrator.retrain(&vocab).await?;
    Ok(Json(RetrainResponse {
        vocab_name: vocab,
        clips,
    }))
}

/// GET /models/status
pub async fn model_status(State(state): State<AppState>) -> ApiResult<Json<ModelStatusResponse>> {
    let sessions = state.orchestrator.session_status().await?;
    Ok(Json(ModelStatusResponse {
        step_delay_ms: state.orchestrator.step_delay(),
        sessions,
    }))
}

/// POST /sleepms
///
/// Body is a bare integer: milliseconds to pause after each training step.
pub async fn set_step_delay(
    State(state): State<AppState>,
    body: String,
) -> ApiResult<Json<StepDelayResponse>> {
    let ms: u64 = body
        .trim()
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("expected milliseconds, got '{}'", body.trim())))?;

    state.orchestrator.set_step_delay(ms);
    Ok(Json(StepDelayResponse { step_delay_ms: ms }))
}

pub fn model_routes() -> Router<AppState> {
    Router::new()
        .route("/models/save", post(save_models))
        .route("/models/:vocab/retrain", post(retrain))
        .route("/models/status", get(model_status))
        .route("/sleepms", post(set_step_delay))
}
