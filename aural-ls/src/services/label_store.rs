//! Persistent label sets
//!
//! `put` is the single point where label sets are validated. Everything
//! read back from this store is assumed well-formed by its consumers.

use crate::db::label_sets;
use crate::error::{Error, Result};
use crate::models::{ClipId, LabelSet, Vocabularies};
use crate::utils::retry_on_lock;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone)]
pub struct LabelStore {
    db: SqlitePool,
    vocabs: Arc<Vocabularies>,
    max_lock_wait_ms: u64,
}

impl LabelStore {
    pub fn new(db: SqlitePool, vocabs: Arc<Vocabularies>, max_lock_wait_ms: u64) -> Self {
        Self {
            db,
            vocabs,
            max_lock_wait_ms,
        }
    }

    /// Validate and persist, replacing any earlier set for the same pair
    ///
    /// Nothing is written when validation fails.
    pub async fn put(&self, label_set: &LabelSet) -> Result<()> {
        label_set.validate(&self.vocabs)?;

        retry_on_lock("put_label_set", self.max_lock_wait_ms, || {
            label_sets::upsert_label_set(&self.db, label_set)
        })
        .await?;

        tracing::debug!(
            clip_id = %label_set.id.short(),
            vocab = %label_set.vocab_name,
            "Label set persisted"
        );

        Ok(())
    }

    pub async fn get(&self, id: &ClipId, vocab_name: &str) -> Result<LabelSet> {
        self.vocabs.get(vocab_name)?;

        label_sets::load_label_set(&self.db, id, vocab_name)
            .await?
            .ok_or_else(|| Error::NotFound(format!("label set {}/{}", vocab_name, id)))
    }

    /// Every stored label set of a vocabulary, keyed by clip
    ///
    /// Rows that fail to decode are skipped with a warning.
    pub async fn get_all(&self, vocab_name: &str) -> Result<HashMap<ClipId, LabelSet>> {
        self.vocabs.get(vocab_name)?;

        let rows = label_sets::load_all_label_sets(&self.db, vocab_name).await?;
        let mut sets = HashMap::with_capacity(rows.len());
        for row in rows {
            match row {
                Ok(set) => {
                    sets.insert(set.id, set);
                }
                Err(e) => tracing::warn!(vocab = vocab_name, error = %e, "Skipping stored label set"),
            }
        }
        Ok(sets)
    }

    pub async fn count(&self, vocab_name: &str) -> Result<usize> {
        self.vocabs.get(vocab_name)?;
        label_sets::count_label_sets(&self.db, vocab_name).await
    }

    pub fn vocabularies(&self) -> &Arc<Vocabularies> {
        &self.vocabs
    }
}
