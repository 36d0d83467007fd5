//! Numerical backends consumed by the training sessions
//!
//! Feature extraction and model training are injected capabilities. The
//! sessions only see these traits; [`LogEnergyExtractor`] and
//! [`SoftmaxTrainer`] are the reference implementations the binary ships.
//!
//! All methods are synchronous and CPU bound. Callers run them on the tokio
//! blocking pool.

pub mod log_energy;
pub mod render;
pub mod softmax;

pub use log_energy::LogEnergyExtractor;
pub use softmax::{SoftmaxFactory, SoftmaxTrainer};

use crate::models::{AudioClip, ClipId, Vocabulary};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Failure reported by a backend
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct BackendError(pub String);

impl BackendError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Row-major `[strides][width]` feature matrix for one clip
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTensor {
    strides: usize,
    width: usize,
    data: Vec<f32>,
}

impl FeatureTensor {
    pub fn new(strides: usize, width: usize, data: Vec<f32>) -> BackendResult<Self> {
        if data.len() != strides * width {
            return Err(BackendError(format!(
                "tensor data has {} values, shape {}x{} needs {}",
                data.len(),
                strides,
                width,
                strides * width
            )));
        }
        Ok(Self {
            strides,
            width,
            data,
        })
    }

    /// (strides, width)
    pub fn shape(&self) -> (usize, usize) {
        (self.strides, self.width)
    }

    pub fn row(&self, stride: usize) -> &[f32] {
        &self.data[stride * self.width..(stride + 1) * self.width]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks_exact(self.width.max(1))
    }

    pub fn values(&self) -> &[f32] {
        &self.data
    }
}

/// One labeled clip ready for a training step
#[derive(Debug, Clone)]
pub struct TrainingExample {
    pub clip_id: ClipId,
    pub features: FeatureTensor,
    /// One state index per stride, aligned with the feature rows
    pub states: Vec<u32>,
}

/// Per-stride model output for one clip
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    /// `[strides][states]` scores before normalization
    pub logits: FeatureTensor,
    /// `[strides][states]` class probabilities
    pub probs: FeatureTensor,
}

impl Prediction {
    /// Most probable state per stride
    pub fn argmax(&self) -> Vec<u32> {
        self.probs
            .rows()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .max_by(|a, b| a.1.total_cmp(b.1))
                    .map(|(k, _)| k as u32)
                    .unwrap_or(0)
            })
            .collect()
    }
}

/// Image kinds served for annotator UIs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisualizationKind {
    /// Feature matrix as extracted (time on x)
    Spectrogram,
    /// Feature matrix with each band's mean removed
    Mfcc,
    /// The stored label set as colored state runs
    Labels,
    /// Live model probabilities per state
    Probs,
    /// Live model's most probable state per stride
    Argmax,
    /// Live model's raw scores per state
    States,
}

impl VisualizationKind {
    /// Kinds rendered from the vocabulary's current model
    pub fn needs_model(self) -> bool {
        matches!(self, Self::Probs | Self::Argmax | Self::States)
    }
}

impl FromStr for VisualizationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "spectrogram" => Ok(Self::Spectrogram),
            "mfcc" => Ok(Self::Mfcc),
            "labels" => Ok(Self::Labels),
            "probs" => Ok(Self::Probs),
            "argmax" => Ok(Self::Argmax),
            "states" => Ok(Self::States),
            other => Err(format!("unknown image kind '{}'", other)),
        }
    }
}

impl fmt::Display for VisualizationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Spectrogram => "spectrogram",
            Self::Mfcc => "mfcc",
            Self::Labels => "labels",
            Self::Probs => "probs",
            Self::Argmax => "argmax",
            Self::States => "states",
        };
        f.write_str(s)
    }
}

/// Turns raw clips into per-stride feature rows
pub trait FeatureExtractor: Send + Sync {
    /// Features per stride
    fn feature_width(&self) -> usize;

    /// Extract a `[strides][feature_width]` tensor
    fn extract(&self, clip: &AudioClip, strides: usize) -> BackendResult<FeatureTensor>;

    /// Render a PNG of the clip's features
    ///
    /// Only `Spectrogram` and `Mfcc` are feature views; the other kinds come
    /// from the label store or the model.
    fn render(
        &self,
        clip: &AudioClip,
        strides: usize,
        kind: VisualizationKind,
    ) -> BackendResult<Vec<u8>>;
}

/// A live trainable model for one vocabulary
pub trait TrainingBackend: Send {
    /// Apply one optimization step; returns the mean batch loss
    fn step(&mut self, batch: &[TrainingExample]) -> BackendResult<f32>;

    /// Serialize the current weights
    fn checkpoint(&self) -> BackendResult<Vec<u8>>;

    /// Run the current model over one clip's features
    fn predict(&self, features: &FeatureTensor) -> BackendResult<Prediction>;
}

/// Creates one model per vocabulary at startup
pub trait TrainerFactory: Send + Sync {
    /// Build a model, restoring `checkpoint` when one was saved earlier
    fn create(
        &self,
        vocab: &Vocabulary,
        feature_width: usize,
        checkpoint: Option<&[u8]>,
    ) -> BackendResult<Box<dyn TrainingBackend>>;
}
