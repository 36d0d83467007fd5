//! HTTP API handlers for aural-ls
//!
//! A thin layer: every handler parses its inputs, calls one orchestrator
//! operation and maps the result. Errors become `{"error": {...}}` bodies
//! through [`ApiError`](crate::error::ApiError).

pub mod clips;
pub mod health;
pub mod images;
pub mod label_sets;
pub mod models;
pub mod sse;

pub use clips::clip_routes;
pub use health::health_routes;
pub use images::image_routes;
pub use label_sets::label_set_routes;
pub use models::model_routes;
pub use sse::event_stream;

use crate::error::ApiError;
use crate::models::ClipId;

/// Parse a clip id path segment; the all-zero id is rejected
pub(crate) fn parse_clip_id(segment: &str) -> Result<ClipId, ApiError> {
    segment.parse::<ClipId>().map_err(ApiError::from)
}
