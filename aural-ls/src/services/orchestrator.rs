//! Orchestrator: the operations the HTTP layer exposes
//!
//! **Label flow:**
//! 1. `LabelStore::put` validates and persists (abort on failure)
//! 2. `TrainingIndex::record` notes the clip (failure schedules a full rebuild)
//! 3. The vocabulary's session is offered the clip in a background task
//!
//! Once step 1 succeeds the label is durable, whatever happens afterwards.

use crate::backend::render::{label_strip_png, prediction_png};
use crate::backend::{FeatureExtractor, TrainerFactory, VisualizationKind};
use crate::error::{Error, Result};
use crate::models::{AudioClip, ClipId, LabelSet, VocabName, Vocabularies};
use crate::services::{
    Checkpoint, CheckpointStore, ClipStore, LabelStore, OfferOutcome, SessionContext,
    SessionRegistry, SessionStatus, TrainingIndex, TrainingSession,
};
use aural_common::config::TrainingConfig;
use aural_common::events::{AuralEvent, EventBus};
use chrono::Utc;
use sqlx::SqlitePool;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub struct Orchestrator {
    vocabs: Arc<Vocabularies>,
    clip_store: ClipStore,
    label_store: LabelStore,
    index: Arc<TrainingIndex>,
    registry: Arc<SessionRegistry>,
    extractor: Arc<dyn FeatureExtractor>,
    event_bus: EventBus,
    step_delay_ms: Arc<AtomicU64>,
}

/// Pre-built components for [`Orchestrator::from_parts`]
pub struct OrchestratorParts {
    pub clip_store: ClipStore,
    pub label_store: LabelStore,
    pub index: TrainingIndex,
    pub registry: SessionRegistry,
    pub extractor: Arc<dyn FeatureExtractor>,
    pub event_bus: EventBus,
    pub step_delay_ms: Arc<AtomicU64>,
}

impl Orchestrator {
    /// Open every store under `root_folder`, start one session per
    /// vocabulary and rebuild the training index
    pub async fn open(
        db: SqlitePool,
        root_folder: &Path,
        vocabs: Vocabularies,
        training: &TrainingConfig,
        extractor: Arc<dyn FeatureExtractor>,
        factory: &dyn TrainerFactory,
        event_bus: EventBus,
    ) -> Result<Self> {
        let vocabs = Arc::new(vocabs);
        let clip_store = ClipStore::open(db.clone(), root_folder).await?;
        let label_store = LabelStore::new(db, Arc::clone(&vocabs), training.max_lock_wait_ms);
        let step_delay_ms = Arc::new(AtomicU64::new(training.step_delay_ms));

        let ctx = SessionContext {
            clip_store: clip_store.clone(),
            label_store: label_store.clone(),
            checkpoints: CheckpointStore::open(root_folder).await?,
            extractor: Arc::clone(&extractor),
            event_bus: event_bus.clone(),
            batch_size: training.batch_size,
            queue_capacity: training.queue_capacity,
            step_delay_ms: Arc::clone(&step_delay_ms),
        };
        let registry = SessionRegistry::start(&vocabs, factory, ctx).await?;
        let index = TrainingIndex::new(label_store.clone(), event_bus.clone());

        let orchestrator = Self::from_parts(OrchestratorParts {
            clip_store,
            label_store,
            index,
            registry,
            extractor,
            event_bus,
            step_delay_ms,
        });

        orchestrator.index.rebuild_all().await;
        info!(vocabularies = orchestrator.registry.len(), "Orchestrator ready");

        Ok(orchestrator)
    }

    /// Assemble from components built elsewhere; the index is not rebuilt
    pub fn from_parts(parts: OrchestratorParts) -> Self {
        Self {
            vocabs: Arc::clone(parts.label_store.vocabularies()),
            clip_store: parts.clip_store,
            label_store: parts.label_store,
            index: Arc::new(parts.index),
            registry: Arc::new(parts.registry),
            extractor: parts.extractor,
            event_bus: parts.event_bus,
            step_delay_ms: parts.step_delay_ms,
        }
    }

    pub fn vocabularies(&self) -> &Vocabularies {
        &self.vocabs
    }

    pub fn index(&self) -> &TrainingIndex {
        &self.index
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn clip_store(&self) -> &ClipStore {
        &self.clip_store
    }

    pub fn label_store(&self) -> &LabelStore {
        &self.label_store
    }

    // ------------------------------------------------------------------
    // Clips
    // ------------------------------------------------------------------

    pub async fn put_clip(&self, bytes: Vec<u8>) -> Result<ClipId> {
        let (id, newly_stored) = self.clip_store.store(bytes).await?;

        if newly_stored {
            info!(clip_id = %id.short(), "New clip stored");
        }
        self.event_bus.emit_lossy(AuralEvent::ClipStored {
            clip_id: id.to_hex(),
            newly_stored,
            timestamp: Utc::now(),
        });

        Ok(id)
    }

    pub async fn list_clips(&self) -> Result<Vec<ClipId>> {
        self.clip_store.list().await
    }

    pub async fn get_clip(&self, id: &ClipId) -> Result<AudioClip> {
        self.clip_store.get(id).await
    }

    pub async fn clip_wav(&self, id: &ClipId) -> Result<Vec<u8>> {
        self.clip_store.wav(id).await
    }

    // ------------------------------------------------------------------
    // Labels
    // ------------------------------------------------------------------

    /// Persist a label set and hand the clip to its vocabulary's session
    ///
    /// Returns once the label is durable and indexed; training happens in
    /// the background.
    pub async fn put_label_set(&self, label_set: LabelSet) -> Result<()> {
        self.label_store.put(&label_set).await?;

        let vocab = label_set.vocab_name.as_str();
        let id = label_set.id;

        self.event_bus.emit_lossy(AuralEvent::LabelSetAccepted {
            clip_id: id.to_hex(),
            vocab_name: vocab.to_string(),
            timestamp: Utc::now(),
        });

        if let Err(e) = self.index.record(vocab, id).await {
            error!(
                vocab,
                clip_id = %id.short(),
                error = %e,
                "Label set is durable but could not be indexed, scheduling rebuild"
            );
            let index = Arc::clone(&self.index);
            tokio::spawn(async move {
                index.rebuild_all().await;
            });
            return Err(Error::IndexInconsistency(format!(
                "label set {}/{} stored but not indexed: {}",
                vocab,
                id.short(),
                e
            )));
        }

        match self.registry.get(vocab) {
            Ok(session) => {
                let session = session.clone();
                tokio::spawn(async move {
                    match session.offer(id).await {
                        Ok(outcome) => debug!(
                            vocab = %session.vocab().name,
                            clip_id = %id.short(),
                            ?outcome,
                            "Clip offered to training session"
                        ),
                        Err(e) => warn!(
                            vocab = %session.vocab().name,
                            clip_id = %id.short(),
                            error = %e,
                            "Training offer failed"
                        ),
                    }
                });
            }
            Err(e) => error!(vocab, error = %e, "No training session for indexed vocabulary"),
        }

        Ok(())
    }

    pub async fn get_label_set(&self, id: &ClipId, vocab_name: &str) -> Result<LabelSet> {
        self.label_store.get(id, vocab_name).await
    }

    // ------------------------------------------------------------------
    // Models
    // ------------------------------------------------------------------

    /// Checkpoint every vocabulary independently
    ///
    /// A failure on one vocabulary is reported in its entry and never stops
    /// the others.
    pub async fn save_all_models(&self) -> Vec<(VocabName, Result<Checkpoint>)> {
        let saves = self
            .registry
            .iter()
            .map(|(name, session)| async move {
                let result = self.save_model(session).await;
                if let Err(e) = &result {
                    error!(vocab = %name, error = %e, "Model save failed");
                }
                (name.clone(), result)
            });

        futures::future::join_all(saves).await
    }

    async fn save_model(&self, session: &TrainingSession) -> Result<Checkpoint> {
        let checkpoint = session.save().await?;

        self.event_bus.emit_lossy(AuralEvent::CheckpointSaved {
            vocab_name: checkpoint.vocab_name.to_string(),
            bytes: checkpoint.blob.len(),
            clips_since_last: checkpoint.clips_since_last,
            timestamp: checkpoint.saved_at,
        });

        Ok(checkpoint)
    }

    /// Rebuild one vocabulary's training index from the label store
    pub async fn reconcile(&self, vocab_name: &str) -> Result<usize> {
        self.index.rebuild(vocab_name).await
    }

    /// Rebuild the index, then offer every labeled clip again
    ///
    /// Returns the number of clips offered. Clips that fail to load or
    /// extract are dropped by the session and do not abort the pass.
    pub async fn retrain(&self, vocab_name: &str) -> Result<usize> {
        let session = self.registry.get(vocab_name)?;
        self.index.rebuild(vocab_name).await?;

        let mut ids: Vec<ClipId> = self.index.snapshot(vocab_name).await?.into_iter().collect();
        ids.sort();

        let mut steps = 0usize;
        let mut failed = 0usize;
        for id in &ids {
            match session.offer(*id).await {
                Ok(OfferOutcome::Trained { .. }) => steps += 1,
                Ok(OfferOutcome::Buffered { .. }) => {}
                Err(Error::SessionClosed(name)) => return Err(Error::SessionClosed(name)),
                Err(_) => failed += 1,
            }
        }

        info!(
            vocab = vocab_name,
            clips = ids.len(),
            steps,
            failed,
            "Retraining pass completed"
        );

        Ok(ids.len())
    }

    pub async fn session_status(&self) -> Result<Vec<SessionStatus>> {
        let mut statuses = Vec::with_capacity(self.registry.len());
        for (_, session) in self.registry.iter() {
            statuses.push(session.status().await?);
        }
        Ok(statuses)
    }

    /// Pause inserted after every training step, for all vocabularies
    pub fn set_step_delay(&self, ms: u64) {
        let previous = self.step_delay_ms.swap(ms, Ordering::Relaxed);
        info!(previous_ms = previous, step_delay_ms = ms, "Training step delay changed");
    }

    pub fn step_delay(&self) -> u64 {
        self.step_delay_ms.load(Ordering::Relaxed)
    }

    // ------------------------------------------------------------------
    // Visualization
    // ------------------------------------------------------------------

    pub async fn render(
        &self,
        id: &ClipId,
        vocab_name: &str,
        kind: VisualizationKind,
    ) -> Result<Vec<u8>> {
        let vocab = self.vocabs.get(vocab_name)?.clone();

        let rendered = if kind == VisualizationKind::Labels {
            let label_set = self.label_store.get(id, vocab_name).await?;
            tokio::task::spawn_blocking(move || label_strip_png(&label_set, &vocab))
                .await
                .map_err(|e| Error::Internal(format!("Render task failed: {}", e)))?
        } else if kind.needs_model() {
            // Prediction goes through the session so it never overlaps a step
            let session = self.registry.get(vocab_name)?;
            let clip = self.clip_store.get(id).await?;
            let extractor = Arc::clone(&self.extractor);
            let strides = vocab.strides_per_clip;
            let features = tokio::task::spawn_blocking(move || extractor.extract(&clip, strides))
                .await
                .map_err(|e| Error::Internal(format!("Feature extraction task failed: {}", e)))?
                .map_err(|e| Error::FeatureExtractionFailed(e.to_string()))?;

            let prediction = session.predict(features).await?;
            tokio::task::spawn_blocking(move || prediction_png(&prediction, kind))
                .await
                .map_err(|e| Error::Internal(format!("Render task failed: {}", e)))?
        } else {
            let clip = self.clip_store.get(id).await?;
            let extractor = Arc::clone(&self.extractor);
            tokio::task::spawn_blocking(move || {
                extractor.render(&clip, vocab.strides_per_clip, kind)
            })
            .await
            .map_err(|e| Error::Internal(format!("Render task failed: {}", e)))?
        };

        rendered.map_err(|e| Error::FeatureExtractionFailed(e.to_string()))
    }

    // ------------------------------------------------------------------
    // Background tasks
    // ------------------------------------------------------------------

    /// Save all models every `interval` until the runtime shuts down
    pub fn spawn_autosave(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let results = orchestrator.save_all_models().await;
                let failed = results.iter().filter(|(_, r)| r.is_err()).count();
                info!(
                    saved = results.len() - failed,
                    failed,
                    "Autosave completed"
                );
            }
        })
    }
}
