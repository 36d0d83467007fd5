//! Vocabulary name to training session registry
//!
//! Built once at startup and shared by reference; the set of sessions never
//! changes while the process runs.

use crate::backend::TrainerFactory;
use crate::error::{Error, Result};
use crate::models::{VocabName, Vocabularies};
use crate::services::training_session::{SessionContext, TrainingSession};
use std::collections::BTreeMap;

pub struct SessionRegistry {
    sessions: BTreeMap<VocabName, TrainingSession>,
}

impl SessionRegistry {
    /// Start one session per vocabulary, restoring checkpoints from
    /// `ctx.checkpoints`
    ///
    /// A checkpoint the factory cannot restore is logged and the model
    /// starts fresh.
    pub async fn start(
        vocabs: &Vocabularies,
        factory: &dyn TrainerFactory,
        ctx: SessionContext,
    ) -> Result<Self> {
        let feature_width = ctx.extractor.feature_width();
        let mut sessions = BTreeMap::new();

        for vocab in vocabs.iter() {
            let saved = ctx.checkpoints.read(vocab.name.as_str()).await?;

            let restored = match saved.as_deref() {
                Some(blob) => match factory.create(vocab, feature_width, Some(blob)) {
                    Ok(backend) => {
                        tracing::info!(vocab = %vocab.name, bytes = blob.len(), "Restored checkpoint");
                        Some(backend)
                    }
                    Err(e) => {
                        tracing::warn!(
                            vocab = %vocab.name,
                            error = %e,
                            "Checkpoint could not be restored, starting from a fresh model"
                        );
                        None
                    }
                },
                None => None,
            };

            let backend = match restored {
                Some(backend) => backend,
                None => factory
                    .create(vocab, feature_width, None)
                    .map_err(|e| Error::BackendFailure(e.to_string()))?,
            };

            let session = TrainingSession::spawn(vocab.clone(), backend, ctx.clone());
            sessions.insert(vocab.name.clone(), session);
        }

        Ok(Self { sessions })
    }

    pub fn get(&self, vocab_name: &str) -> Result<&TrainingSession> {
        self.sessions
            .get(vocab_name)
            .ok_or_else(|| Error::UnknownVocabulary(vocab_name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&VocabName, &TrainingSession)> {
        self.sessions.iter()
    }

    pub fn vocab_names(&self) -> impl Iterator<Item = &VocabName> {
        self.sessions.keys()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
