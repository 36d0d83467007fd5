//! aural-ls library interface
//!
//! The label server stores raw audio clips, accepts per-vocabulary label
//! sets for them and feeds every newly labeled clip into an online training
//! session for that vocabulary. Exposed as a library for integration tests.

pub mod api;
pub mod backend;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use crate::error::{ApiError, ApiResult, Error, Result};

use aural_common::events::EventBus;
use axum::Router;
use chrono::{DateTime, Utc};
use services::Orchestrator;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>, event_bus: EventBus) -> Self {
        Self {
            orchestrator,
            event_bus,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::clip_routes())
        .merge(api::label_set_routes())
        .merge(api::image_routes())
        .merge(api::model_routes())
        .merge(api::health_routes())
        .route("/events", get(api::event_stream))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
