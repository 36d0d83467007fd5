//! Storage, indexing and training services
//!
//! Leaves first: [`ClipStore`] and [`LabelStore`] persist data,
//! [`TrainingIndex`] caches which clips are labeled, [`TrainingSession`]
//! trains one vocabulary, and [`Orchestrator`] wires them together.

pub mod checkpoint_store;
pub mod clip_store;
pub mod label_store;
pub mod orchestrator;
pub mod registry;
pub mod training_index;
pub mod training_session;

pub use checkpoint_store::CheckpointStore;
pub use clip_store::ClipStore;
pub use label_store::LabelStore;
pub use orchestrator::Orchestrator;
pub use registry::SessionRegistry;
pub use training_index::TrainingIndex;
pub use training_session::{Checkpoint, OfferOutcome, SessionContext, SessionStatus, TrainingSession};
