//! Visualization images for annotator UIs
//!
//! GET /images/{kind}/{vocab}/{clip_id} where kind is one of
//! `spectrogram`, `mfcc`, `labels`, `probs`, `argmax`, `states`. The last
//! three run the vocabulary's current model over the clip.

use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
    routing::get,
    Router,
};

use super::parse_clip_id;
use crate::backend::VisualizationKind;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

pub async fn get_image(
    State(state): State<AppState>,
    Path((kind, vocab, clip_id)): Path<(String, String, String)>,
) -> ApiResult<impl IntoResponse> {
    let kind: VisualizationKind = kind.parse().map_err(ApiError::BadRequest)?;
    let id = parse_clip_id(&clip_id)?;

    let png = state.orchestrator.render(&id, &vocab, kind).await?;
    Ok(([(header::CONTENT_TYPE, "image/png")], png))
}

pub fn image_routes() -> Router<AppState> {
    Router::new().route("/images/:kind/:vocab/:clip_id", get(get_image))
}
