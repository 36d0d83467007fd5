//! Per-vocabulary index of clips with a valid label set
//!
//! A cache over the label store. Each vocabulary's set sits behind its own
//! `RwLock`, so writers on one vocabulary never block another. The map of
//! vocabularies is fixed at construction.

use crate::error::{Error, Result};
use crate::models::{ClipId, VocabName};
use crate::services::LabelStore;
use aural_common::events::{AuralEvent, EventBus};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

pub struct TrainingIndex {
    sets: HashMap<VocabName, RwLock<HashSet<ClipId>>>,
    label_store: LabelStore,
    event_bus: EventBus,
}

impl TrainingIndex {
    /// Empty index for every configured vocabulary; call [`rebuild_all`](Self::rebuild_all) to fill it
    pub fn new(label_store: LabelStore, event_bus: EventBus) -> Self {
        let names: Vec<VocabName> = label_store.vocabularies().names().cloned().collect();
        Self::for_vocabularies(label_store, event_bus, names)
    }

    /// Index only the named vocabularies
    pub fn for_vocabularies(
        label_store: LabelStore,
        event_bus: EventBus,
        names: impl IntoIterator<Item = VocabName>,
    ) -> Self {
        let sets = names
            .into_iter()
            .map(|name| (name, RwLock::new(HashSet::new())))
            .collect();

        Self {
            sets,
            label_store,
            event_bus,
        }
    }

    fn set(&self, vocab_name: &str) -> Result<&RwLock<HashSet<ClipId>>> {
        self.sets
            .get(vocab_name)
            .ok_or_else(|| Error::UnknownVocabulary(vocab_name.to_string()))
    }

    /// Replace the vocabulary's set with the keys of the label store
    ///
    /// The write lock is held across the scan so a concurrent `record` is
    /// either included in the scan or applied after it.
    pub async fn rebuild(&self, vocab_name: &str) -> Result<usize> {
        let lock = self.set(vocab_name)?;
        let mut set = lock.write().await;

        let all = self.label_store.get_all(vocab_name).await?;
        *set = all.into_keys().collect();
        let clips = set.len();
        drop(set);

        tracing::info!(vocab = vocab_name, clips, "Training index rebuilt");
        self.event_bus.emit_lossy(AuralEvent::IndexRebuilt {
            vocab_name: vocab_name.to_string(),
            clips,
            timestamp: chrono::Utc::now(),
        });

        Ok(clips)
    }

    /// Rebuild every vocabulary; one failure does not stop the others
    pub async fn rebuild_all(&self) {
        for vocab_name in self.sets.keys() {
            if let Err(e) = self.rebuild(vocab_name.as_str()).await {
                tracing::error!(vocab = %vocab_name, error = %e, "Training index rebuild failed");
            }
        }
    }

    /// Note that `id` now has a durable label set in `vocab_name`
    pub async fn record(&self, vocab_name: &str, id: ClipId) -> Result<()> {
        let lock = match self.set(vocab_name) {
            Ok(lock) => lock,
            Err(e) => {
                tracing::error!(
                    vocab = vocab_name,
                    clip_id = %id.short(),
                    "Label set accepted for a vocabulary the training index does not know"
                );
                return Err(e);
            }
        };

        lock.write().await.insert(id);
        Ok(())
    }

    pub async fn snapshot(&self, vocab_name: &str) -> Result<HashSet<ClipId>> {
        Ok(self.set(vocab_name)?.read().await.clone())
    }

    pub async fn len(&self, vocab_name: &str) -> Result<usize> {
        Ok(self.set(vocab_name)?.read().await.len())
    }

    pub async fn contains(&self, vocab_name: &str, id: &ClipId) -> Result<bool> {
        Ok(self.set(vocab_name)?.read().await.contains(id))
    }
}
