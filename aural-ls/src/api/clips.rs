//! Clip upload, listing and WAV playback
//!
//! POST /clips, GET /clips, GET /audio/{clip_id}.wav

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::header,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use super::parse_clip_id;
use crate::error::{ApiError, ApiResult};
use crate::models::ClipId;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct PutClipResponse {
    pub id: ClipId,
}

#[derive(Debug, Serialize)]
pub struct ListClipsResponse {
    pub count: usize,
    pub clips: Vec<ClipId>,
}

/// POST /clips
///
/// Body is the raw clip (16 kHz mono s16le, exactly 10 seconds).
pub async fn put_clip(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<PutClipResponse>> {
    let id = state.orchestrator.put_clip(body.to_vec()).await?;
    Ok(Json(PutClipResponse { id }))
}

/// GET /clips
pub async fn list_clips(State(state): State<AppState>) -> ApiResult<Json<ListClipsResponse>> {
    let clips = state.orchestrator.list_clips().await?;
    Ok(Json(ListClipsResponse {
        count: clips.len(),
        clips,
    }))
}

/// GET /audio/{clip_id}.wav
pub async fn get_clip_wav(
    State(state): State<AppState>,
    Path(file): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let hex = file
        .strip_suffix(".wav")
        .ok_or_else(|| ApiError::BadRequest(format!("expected <clip_id>.wav, got '{}'", file)))?;
    let id = parse_clip_id(hex)?;

    let wav = state.orchestrator.clip_wav(&id).await?;
    Ok(([(header::CONTENT_TYPE, "audio/wav")], wav))
}

pub fn clip_routes() -> Router<AppState> {
    Router::new()
        .route("/clips", post(put_clip).get(list_clips))
        .route("/audio/:file", get(get_clip_wav))
}
