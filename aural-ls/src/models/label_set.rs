//! Label sets: per-stride state assignments for one clip and vocabulary

use crate::error::{Error, Result};
use crate::models::clip::ClipId;
use crate::models::vocabulary::{VocabName, Vocabularies, Vocabulary};
use serde::{Deserialize, Serialize};

/// States for every stride of one clip in one vocabulary
///
/// A label set replaces any earlier set for the same (clip, vocabulary) pair
/// as a whole; it is never merged or partially updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSet {
    pub id: ClipId,
    pub vocab_name: VocabName,
    /// One state index per stride
    pub states: Vec<u32>,
}

/// A run of identical states, in stride units (end exclusive)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LabelSpan {
    pub state: u32,
    pub start: usize,
    pub end: usize,
}

impl LabelSet {
    pub fn new(id: ClipId, vocab_name: impl Into<VocabName>, states: Vec<u32>) -> Self {
        Self {
            id,
            vocab_name: vocab_name.into(),
            states,
        }
    }

    /// Check every invariant against the configured vocabularies
    ///
    /// Returns the vocabulary the set belongs to.
    pub fn validate<'a>(&self, vocabs: &'a Vocabularies) -> Result<&'a Vocabulary> {
        if self.id.is_empty() {
            return Err(Error::EmptyClipId);
        }

        let vocab = vocabs.get(self.vocab_name.as_str())?;

        if self.states.len() != vocab.strides_per_clip {
            return Err(Error::Malformed(format!(
                "label set for '{}' has {} strides, expected {}",
                vocab.name,
                self.states.len(),
                vocab.strides_per_clip
            )));
        }

        if let Some((stride, state)) = self
            .states
            .iter()
            .enumerate()
            .find(|(_, &state)| state as usize >= vocab.state_count())
        {
            return Err(Error::Malformed(format!(
                "state {} at stride {} out of range for '{}' ({} states)",
                state,
                stride,
                vocab.name,
                vocab.state_count()
            )));
        }

        Ok(vocab)
    }

    /// Collapse the per-stride states into runs
    pub fn spans(&self) -> Vec<LabelSpan> {
        let mut spans: Vec<LabelSpan> = Vec::new();
        for (stride, &state) in self.states.iter().enumerate() {
            match spans.last_mut() {
                Some(last) if last.state == state => last.end = stride + 1,
                _ => spans.push(LabelSpan {
                    state,
                    start: stride,
                    end: stride + 1,
                }),
            }
        }
        spans
    }
}
