//! Vocabularies: named closed sets of label states
//!
//! Loaded once from configuration and immutable afterwards.

use crate::error::{Error, Result};
use crate::models::clip::STRIDES_PER_CLIP;
use aural_common::config::VocabularyConfig;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;

/// Name of a configured vocabulary (e.g. "intent")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VocabName(String);

impl VocabName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VocabName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for VocabName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for VocabName {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for VocabName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// One classification task
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Vocabulary {
    pub name: VocabName,
    /// State names; index 0 is conventionally "nil"
    pub states: Vec<String>,
    /// Number of labeled strides per clip
    pub strides_per_clip: usize,
}

impl Vocabulary {
    pub fn from_config(config: &VocabularyConfig) -> Self {
        Self {
            name: VocabName::new(config.name.clone()),
            states: config.states.clone(),
            strides_per_clip: config.strides_per_clip.unwrap_or(STRIDES_PER_CLIP),
        }
    }

    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    pub fn state_name(&self, index: u32) -> Option<&str> {
        self.states.get(index as usize).map(String::as_str)
    }
}

/// The configured vocabulary set
#[derive(Debug, Clone, Default)]
pub struct Vocabularies {
    by_name: BTreeMap<VocabName, Vocabulary>,
}

impl Vocabularies {
    /// Build from validated configuration entries
    pub fn from_config(configs: &[VocabularyConfig]) -> Result<Self> {
        let mut by_name = BTreeMap::new();
        for config in configs {
            let vocab = Vocabulary::from_config(config);
            if vocab.states.is_empty() {
                return Err(Error::Config(format!("vocabulary '{}' has no states", vocab.name)));
            }
            if by_name.insert(vocab.name.clone(), vocab).is_some() {
                return Err(Error::Config(format!("duplicate vocabulary '{}'", config.name)));
            }
        }
        Ok(Self { by_name })
    }

    pub fn get(&self, name: &str) -> Result<&Vocabulary> {
        self.by_name
            .get(name)
            .ok_or_else(|| Error::UnknownVocabulary(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &VocabName> {
        self.by_name.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Vocabulary> {
        self.by_name.values()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}
