//! Event types for the aural event system
//!
//! Events are broadcast via [`EventBus`] and serialized for SSE transmission.
//! Clip identities travel as their hex text form so this crate stays free of
//! the label server's domain types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Aural event types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AuralEvent {
    /// A clip was uploaded (or re-uploaded, which is a no-op)
    ClipStored {
        clip_id: String,
        /// False when identical bytes were already stored
        newly_stored: bool,
        timestamp: DateTime<Utc>,
    },

    /// A label set passed validation and is durable
    LabelSetAccepted {
        clip_id: String,
        vocab_name: String,
        timestamp: DateTime<Utc>,
    },

    /// A clip was dropped before reaching a training batch
    ClipDropped {
        clip_id: String,
        vocab_name: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// One training step ran against a drained batch
    TrainingStepCompleted {
        vocab_name: String,
        /// 1-based step counter since process start
        step: u64,
        batch_len: usize,
        timestamp: DateTime<Utc>,
    },

    /// A training step failed and its batch was discarded
    TrainingStepFailed {
        vocab_name: String,
        batch_len: usize,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// Model weights were written to disk
    CheckpointSaved {
        vocab_name: String,
        bytes: usize,
        clips_since_last: u64,
        timestamp: DateTime<Utc>,
    },

    /// The training index for a vocabulary was rebuilt from the label store
    IndexRebuilt {
        vocab_name: String,
        clips: usize,
        timestamp: DateTime<Utc>,
    },
}

impl AuralEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            AuralEvent::ClipStored { .. } => "ClipStored",
            AuralEvent::LabelSetAccepted { .. } => "LabelSetAccepted",
            AuralEvent::ClipDropped { .. } => "ClipDropped",
            AuralEvent::TrainingStepCompleted { .. } => "TrainingStepCompleted",
            AuralEvent::TrainingStepFailed { .. } => "TrainingStepFailed",
            AuralEvent::CheckpointSaved { .. } => "CheckpointSaved",
            AuralEvent::IndexRebuilt { .. } => "IndexRebuilt",
        }
    }

    /// Vocabulary the event belongs to, if any
    pub fn vocab_name(&self) -> Option<&str> {
        match self {
            AuralEvent::ClipStored { .. } => None,
            AuralEvent::LabelSetAccepted { vocab_name, .. }
            | AuralEvent::ClipDropped { vocab_name, .. }
            | AuralEvent::TrainingStepCompleted { vocab_name, .. }
            | AuralEvent::TrainingStepFailed { vocab_name, .. }
            | AuralEvent::CheckpointSaved { vocab_name, .. }
            | AuralEvent::IndexRebuilt { vocab_name, .. } => Some(vocab_name),
        }
    }
}

/// Broadcast bus shared by every component that reports progress
///
/// Slow subscribers lose the oldest events once `capacity` is exceeded.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AuralEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<AuralEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, returning the number of subscribers that received it
    ///
    /// Fails when nobody is listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: AuralEvent,
    ) -> Result<usize, broadcast::error::SendError<AuralEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring the case where no subscriber is listening
    pub fn emit_lossy(&self, event: AuralEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
