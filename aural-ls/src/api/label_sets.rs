//! Label set submission and retrieval
//!
//! POST /labelsets/{vocab}/{clip_id}, GET /labelsets/{vocab}/{clip_id}

use axum::{
    body::Bytes,
    extract::{Path, State},
    routing::post,
    Json, Router,
};
use serde::Serialize;

use super::parse_clip_id;
use crate::error::{ApiError, ApiResult};
use crate::models::{ClipId, LabelSet, VocabName};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct PutLabelSetResponse {
    pub status: String,
    pub id: ClipId,
    pub vocab_name: VocabName,
}

/// POST /labelsets/{vocab}/{clip_id}
///
/// Body: `{"id": "<hex>", "vocab_name": "...", "states": [...]}`. The body
/// must name the same clip and vocabulary as the path.
pub async fn put_label_set(
    State(state): State<AppState>,
    Path((vocab, clip_id)): Path<(String, String)>,
    body: Bytes,
) -> ApiResult<Json<PutLabelSetResponse>> {
    let label_set: LabelSet = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("invalid label set JSON: {}", e)))?;

    let path_id = parse_clip_id(&clip_id)?;
    if label_set.vocab_name.as_str() != vocab || label_set.id != path_id {
        return Err(ApiError::BadRequest(format!(
            "label set for {}/{} posted to /labelsets/{}/{}",
            label_set.vocab_name, label_set.id, vocab, clip_id
        )));
    }

    let id = label_set.id;
    let vocab_name = label_set.vocab_name.clone();
    state.orchestrator.put_label_set(label_set).await?;

    Ok(Json(PutLabelSetResponse {
        status: "accepted".to_string(),
        id,
        vocab_name,
    }))
}

/// GET /labelsets/{vocab}/{clip_id}
pub async fn get_label_set(
    State(state): State<AppState>,
    Path((vocab, clip_id)): Path<(String, String)>,
) -> ApiResult<Json<LabelSet>> {
    let id = parse_clip_id(&clip_id)?;
    let label_set = state.orchestrator.get_label_set(&id, &vocab).await?;
    Ok(Json(label_set))
}

pub fn label_set_routes() -> Router<AppState> {
    Router::new().route(
        "/labelsets/:vocab/:clip_id",
        post(put_label_set).get(get_label_set),
    )
}
