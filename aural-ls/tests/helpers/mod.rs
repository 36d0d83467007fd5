//! Test helper utilities
//!
//! Shared by the aural-ls integration tests.

#![allow(dead_code)]

pub mod fake_backend;
pub mod test_env;

pub use fake_backend::{
    FakeExtractor, RecordingFactory, TrainingLog, BAD_CLIP_MARKER, WRONG_SHAPE_MARKER,
};
pub use test_env::{clip_bytes, states_with_run, wait_until, TestEnv};
