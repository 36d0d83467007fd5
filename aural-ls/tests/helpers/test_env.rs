//! Orchestrator set up over a temporary root folder

use super::fake_backend::{FakeExtractor, RecordingFactory};
use aural_common::config::{default_vocabularies, TrainingConfig};
use aural_common::events::EventBus;
use aural_ls::db::init_database_pool;
use aural_ls::models::{Vocabularies, AUDIO_CLIP_LEN};
use aural_ls::services::Orchestrator;
use aural_ls::{build_router, AppState};
use axum::Router;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub const FEATURE_WIDTH: usize = 4;

pub struct TestEnv {
    pub dir: TempDir,
    pub orchestrator: Arc<Orchestrator>,
    pub event_bus: EventBus,
    pub factory: RecordingFactory,
}

impl TestEnv {
    pub async fn new(batch_size: usize) -> Self {
        Self::with_factory(batch_size, RecordingFactory::default()).await
    }

    pub async fn with_factory(batch_size: usize, factory: RecordingFactory) -> Self {
        let dir = TempDir::new().unwrap();
        Self::open(dir, batch_size, factory).await
    }

    /// Open (or reopen) an orchestrator over an existing root folder
    pub async fn open(dir: TempDir, batch_size: usize, factory: RecordingFactory) -> Self {
        let pool = init_database_pool(dir.path()).await.unwrap();
        let vocabs = Vocabularies::from_config(&default_vocabularies()).unwrap();
        let training = TrainingConfig {
            batch_size,
            feature_width: FEATURE_WIDTH,
            ..TrainingConfig::default()
        };
        let event_bus = EventBus::new(1000);

        let orchestrator = Orchestrator::open(
            pool,
            dir.path(),
            vocabs,
            &training,
            Arc::new(FakeExtractor {
                width: FEATURE_WIDTH,
            }),
            &factory,
            event_bus.clone(),
        )
        .await
        .unwrap();

        Self {
            dir,
            orchestrator: Arc::new(orchestrator),
            event_bus,
            factory,
        }
    }

    pub fn router(&self) -> Router {
        build_router(AppState::new(
            Arc::clone(&self.orchestrator),
            self.event_bus.clone(),
        ))
    }
}

/// Clip bytes whose content is determined by `seed`
pub fn clip_bytes(seed: u8) -> Vec<u8> {
    let mut bytes = vec![seed; AUDIO_CLIP_LEN];
    bytes[1] = seed.wrapping_mul(31);
    bytes
}

/// `len` strides of state 0 with `state` over `run`
pub fn states_with_run(len: usize, run: std::ops::Range<usize>, state: u32) -> Vec<u32> {
    let mut states = vec![0u32; len];
    states[run].fill(state);
    states
}

/// Poll `check` until it returns true or two seconds pass
pub async fn wait_until<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
