//! Data models for aural-ls

pub mod clip;
pub mod label_set;
pub mod vocabulary;

pub use clip::{AudioClip, ClipId, AUDIO_CLIP_LEN, SAMPLE_RATE, STRIDES_PER_CLIP};
pub use label_set::{LabelSet, LabelSpan};
pub use vocabulary::{VocabName, Vocabularies, Vocabulary};
