//! Online training session for one vocabulary
//!
//! Each session is a dedicated tokio task that owns the model, the pending
//! batch and the counters. Callers talk to it through a bounded command
//! queue, so offers, saves and status reads for one vocabulary are
//! serialized while different vocabularies run independently.
//!
//! **Offer pipeline:**
//! 1. Load clip bytes and the stored label set
//! 2. Extract features on the blocking pool
//! 3. Check the tensor shape against the vocabulary
//! 4. Buffer the example (a re-offered clip replaces its pending entry)
//! 5. At `batch_size`, drain the buffer and run one training step
//!
//! Saves write the checkpoint file from inside the worker, so saves of one
//! vocabulary land on disk in the order they were requested.

use crate::backend::{
    FeatureExtractor, FeatureTensor, Prediction, TrainingBackend, TrainingExample,
};
use crate::error::{Error, Result};
use crate::models::{ClipId, VocabName, Vocabulary};
use crate::services::{CheckpointStore, ClipStore, LabelStore};
use aural_common::events::{AuralEvent, EventBus};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Result of offering one clip to a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum OfferOutcome {
    /// Clip waits in the pending buffer
    Buffered { pending: usize },
    /// Clip completed a batch and a training step ran
    Trained { batch_len: usize, step: u64 },
}

/// Serialized model weights for one vocabulary
#[derive(Debug, Clone)]
pub struct Checkpoint {
    pub vocab_name: VocabName,
    pub blob: Vec<u8>,
    /// Clips incorporated since the previous checkpoint
    pub clips_since_last: u64,
    pub saved_at: DateTime<Utc>,
}

/// Point-in-time view of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub vocab_name: VocabName,
    pub pending: usize,
    pub clips_since_checkpoint: u64,
    pub steps_completed: u64,
    pub clips_dropped: u64,
    /// Commands waiting in the session queue
    pub queue_depth: usize,
    pub last_error: Option<String>,
}

/// Everything a session worker needs besides its model
#[derive(Clone)]
pub struct SessionContext {
    pub clip_store: ClipStore,
    pub label_store: LabelStore,
    pub checkpoints: CheckpointStore,
    pub extractor: Arc<dyn FeatureExtractor>,
    pub event_bus: EventBus,
    pub batch_size: usize,
    pub queue_capacity: usize,
    /// Pause after each training step, shared by every session
    pub step_delay_ms: Arc<AtomicU64>,
}

enum Command {
    Offer {
        clip_id: ClipId,
        reply: oneshot::Sender<Result<OfferOutcome>>,
    },
    Save {
        reply: oneshot::Sender<Result<Checkpoint>>,
    },
    Predict {
        features: FeatureTensor,
        reply: oneshot::Sender<Result<Prediction>>,
    },
    Status {
        reply: oneshot::Sender<SessionStatus>,
    },
}

/// Handle to a running session worker
#[derive(Clone)]
pub struct TrainingSession {
    vocab: Vocabulary,
    tx: mpsc::Sender<Command>,
}

impl TrainingSession {
    /// Start the worker task for `vocab`
    pub fn spawn(vocab: Vocabulary, backend: Box<dyn TrainingBackend>, ctx: SessionContext) -> Self {
        let (tx, rx) = mpsc::channel(ctx.queue_capacity);

        let worker = SessionWorker {
            vocab: vocab.clone(),
            backend: Arc::new(Mutex::new(backend)),
            ctx,
            pending: Vec::new(),
            clips_since_checkpoint: 0,
            steps_completed: 0,
            clips_dropped: 0,
            last_error: None,
        };
        tokio::spawn(worker.run(rx));

        Self { vocab, tx }
    }

    pub fn vocab(&self) -> &Vocabulary {
        &self.vocab
    }

    /// Feed a newly labeled clip into the next batch
    pub async fn offer(&self, clip_id: ClipId) -> Result<OfferOutcome> {
        self.request(|reply| Command::Offer { clip_id, reply }).await?
    }

    /// Serialize the model and write its checkpoint file
    ///
    /// Never interleaves with a training step. The clip counter is reset
    /// only once the file is on disk.
    pub async fn save(&self) -> Result<Checkpoint> {
        self.request(|reply| Command::Save { reply }).await?
    }

    /// Run the current model over a clip's features
    pub async fn predict(&self, features: FeatureTensor) -> Result<Prediction> {
        self.request(|reply| Command::Predict { features, reply }).await?
    }

    pub async fn status(&self) -> Result<SessionStatus> {
        let mut status = self.request(|reply| Command::Status { reply }).await?;
        status.queue_depth = self.queue_depth();
        Ok(status)
    }

    /// Commands waiting to be processed
    pub fn queue_depth(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| Error::SessionClosed(self.vocab.name.to_string()))?;
        rx.await
            .map_err(|_| Error::SessionClosed(self.vocab.name.to_string()))
    }
}

struct SessionWorker {
    vocab: Vocabulary,
    backend: Arc<Mutex<Box<dyn TrainingBackend>>>,
    ctx: SessionContext,
    pending: Vec<TrainingExample>,
    clips_since_checkpoint: u64,
    steps_completed: u64,
    clips_dropped: u64,
    last_error: Option<String>,
}

impl SessionWorker {
    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        info!(vocab = %self.vocab.name, "Training session started");

        while let Some(command) = rx.recv().await {
            match command {
                Command::Offer { clip_id, reply } => {
                    let result = self.offer(clip_id).await;
                    let _ = reply.send(result);
                }
                Command::Save { reply } => {
                    let result = self.save().await;
                    let _ = reply.send(result);
                }
                Command::Predict { features, reply } => {
                    let _ = reply.send(self.predict(features).await);
                }
                Command::Status { reply } => {
                    let _ = reply.send(self.status());
                }
            }
        }

        info!(vocab = %self.vocab.name, "Training session stopped");
    }

    async fn offer(&mut self, clip_id: ClipId) -> Result<OfferOutcome> {
        let example = match self.prepare(clip_id).await {
            Ok(example) => example,
            Err(e) => {
                self.drop_clip(clip_id, &e);
                return Err(e);
            }
        };

        match self.pending.iter_mut().find(|p| p.clip_id == clip_id) {
            Some(existing) => *existing = example,
            None => self.pending.push(example),
        }

        if self.pending.len() < self.ctx.batch_size {
            return Ok(OfferOutcome::Buffered {
                pending: self.pending.len(),
            });
        }

        let batch = std::mem::take(&mut self.pending);
        let step = self.train(batch).await?;

        let delay_ms = self.ctx.step_delay_ms.load(Ordering::Relaxed);
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }

        Ok(step)
    }

    /// Load, extract and shape-check one clip
    async fn prepare(&self, clip_id: ClipId) -> Result<TrainingExample> {
        let clip = self.ctx.clip_store.get(&clip_id).await?;
        let label_set = self
            .ctx
            .label_store
            .get(&clip_id, self.vocab.name.as_str())
            .await?;

        let extractor = Arc::clone(&self.ctx.extractor);
        let strides = self.vocab.strides_per_clip;
        let features = tokio::task::spawn_blocking(move || extractor.extract(&clip, strides))
            .await
            .map_err(|e| Error::Internal(format!("Feature extraction task failed: {}", e)))?
            .map_err(|e| Error::FeatureExtractionFailed(e.to_string()))?;

        let expected = (strides, self.ctx.extractor.feature_width());
        if features.shape() != expected || label_set.states.len() != strides {
            return Err(Error::ShapeMismatch {
                expected: format!("{}x{} with {} labels", expected.0, expected.1, strides),
                actual: format!(
                    "{}x{} with {} labels",
                    features.shape().0,
                    features.shape().1,
                    label_set.states.len()
                ),
            });
        }

        Ok(TrainingExample {
            clip_id,
            features,
            states: label_set.states,
        })
    }

    fn drop_clip(&mut self, clip_id: ClipId, err: &Error) {
        self.clips_dropped += 1;
        self.last_error = Some(err.to_string());

        warn!(
            vocab = %self.vocab.name,
            clip_id = %clip_id.short(),
            error = %err,
            "Clip dropped from training"
        );
        self.ctx.event_bus.emit_lossy(AuralEvent::ClipDropped {
            clip_id: clip_id.to_hex(),
            vocab_name: self.vocab.name.to_string(),
            reason: err.to_string(),
            timestamp: Utc::now(),
        });
    }

    /// One training step on a drained batch; a failed batch is discarded
    async fn train(&mut self, batch: Vec<TrainingExample>) -> Result<OfferOutcome> {
        let batch_len = batch.len();
        let backend = Arc::clone(&self.backend);

        let result = tokio::task::spawn_blocking(move || {
            let mut backend = backend
                .lock()
                .map_err(|_| Error::BackendFailure("model lock poisoned".to_string()))?;
            backend
                .step(&batch)
                .map_err(|e| Error::BackendFailure(e.to_string()))
        })
        .await
        .map_err(|e| Error::BackendFailure(format!("Training step task failed: {}", e)))
        .and_then(|r| r);

        match result {
            Ok(loss) => {
                self.steps_completed += 1;
                self.clips_since_checkpoint += batch_len as u64;

                debug!(
                    vocab = %self.vocab.name,
                    step = self.steps_completed,
                    batch_len,
                    loss,
                    "Training step completed"
                );
                self.ctx.event_bus.emit_lossy(AuralEvent::TrainingStepCompleted {
                    vocab_name: self.vocab.name.to_string(),
                    step: self.steps_completed,
                    batch_len,
                    timestamp: Utc::now(),
                });

                Ok(OfferOutcome::Trained {
                    batch_len,
                    step: self.steps_completed,
                })
            }
            Err(e) => {
                self.last_error = Some(e.to_string());

                error!(
                    vocab = %self.vocab.name,
                    batch_len,
                    error = %e,
                    "Training step failed, batch discarded"
                );
                self.ctx.event_bus.emit_lossy(AuralEvent::TrainingStepFailed {
                    vocab_name: self.vocab.name.to_string(),
                    batch_len,
                    error: e.to_string(),
                    timestamp: Utc::now(),
                });

                Err(e)
            }
        }
    }

    async fn save(&mut self) -> Result<Checkpoint> {
        let backend = Arc::clone(&self.backend);

        let blob = tokio::task::spawn_blocking(move || {
            let backend = backend
                .lock()
                .map_err(|_| Error::BackendFailure("model lock poisoned".to_string()))?;
            backend
                .checkpoint()
                .map_err(|e| Error::BackendFailure(e.to_string()))
        })
        .await
        .map_err(|e| Error::BackendFailure(format!("Checkpoint task failed: {}", e)))
        .and_then(|r| r);

        let blob = match blob {
            Ok(blob) => blob,
            Err(e) => {
                self.last_error = Some(e.to_string());
                return Err(e);
            }
        };

        let checkpoint = Checkpoint {
            vocab_name: self.vocab.name.clone(),
            blob,
            clips_since_last: self.clips_since_checkpoint,
            saved_at: Utc::now(),
        };

        if let Err(e) = self.ctx.checkpoints.write(&checkpoint).await {
            self.last_error = Some(e.to_string());
            return Err(e);
        }
        self.clips_since_checkpoint = 0;

        Ok(checkpoint)
    }

    async fn predict(&self, features: FeatureTensor) -> Result<Prediction> {
        let backend = Arc::clone(&self.backend);

        tokio::task::spawn_blocking(move || {
            let backend = backend
                .lock()
                .map_err(|_| Error::BackendFailure("model lock poisoned".to_string()))?;
            backend
                .predict(&features)
                .map_err(|e| Error::BackendFailure(e.to_string()))
        })
        .await
        .map_err(|e| Error::BackendFailure(format!("Prediction task failed: {}", e)))
        .and_then(|r| r)
    }

    fn status(&self) -> SessionStatus {
        SessionStatus {
            vocab_name: self.vocab.name.clone(),
            pending: self.pending.len(),
            clips_since_checkpoint: self.clips_since_checkpoint,
            steps_completed: self.steps_completed,
            clips_dropped: self.clips_dropped,
            queue_depth: 0,
            last_error: self.last_error.clone(),
        }
    }
}
