//! Per-stride softmax classifier trained by SGD
//!
//! Every stride's feature row is an independent example for a multinomial
//! logistic regression over the vocabulary's states. Checkpoints are the
//! JSON-serialized weights.

use super::{
    BackendError, BackendResult, FeatureTensor, Prediction, TrainerFactory, TrainingBackend,
    TrainingExample,
};
use crate::models::Vocabulary;
use serde::{Deserialize, Serialize};

/// Serialized model state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct SoftmaxWeights {
    vocab_name: String,
    feature_width: usize,
    /// `[state][feature]`
    weights: Vec<Vec<f32>>,
    bias: Vec<f32>,
    steps: u64,
}

pub struct SoftmaxTrainer {
    model: SoftmaxWeights,
    learning_rate: f32,
}

impl SoftmaxTrainer {
    /// Zero-initialized model
    pub fn new(vocab: &Vocabulary, feature_width: usize, learning_rate: f32) -> Self {
        let states = vocab.state_count();
        Self {
            model: SoftmaxWeights {
                vocab_name: vocab.name.to_string(),
                feature_width,
                weights: vec![vec![0.0; feature_width]; states],
                bias: vec![0.0; states],
                steps: 0,
            },
            learning_rate,
        }
    }

    /// Restore from a checkpoint written by [`TrainingBackend::checkpoint`]
    pub fn restore(
        vocab: &Vocabulary,
        feature_width: usize,
        learning_rate: f32,
        checkpoint: &[u8],
    ) -> BackendResult<Self> {
        let model: SoftmaxWeights = serde_json::from_slice(checkpoint)
            .map_err(|e| BackendError(format!("unreadable checkpoint: {}", e)))?;

        if model.feature_width != feature_width
            || model.weights.len() != vocab.state_count()
            || model.bias.len() != vocab.state_count()
            || model.weights.iter().any(|w| w.len() != feature_width)
        {
            return Err(BackendError(format!(
                "checkpoint for '{}' does not match {} states x {} features",
                model.vocab_name,
                vocab.state_count(),
                feature_width
            )));
        }

        Ok(Self {
            model,
            learning_rate,
        })
    }

    pub fn steps(&self) -> u64 {
        self.model.steps
    }

    fn row_logits(&self, features: &[f32]) -> Vec<f32> {
        self.model
            .weights
            .iter()
            .zip(&self.model.bias)
            .map(|(w, b)| w.iter().zip(features).map(|(w, x)| w * x).sum::<f32>() + b)
            .collect()
    }

    /// Class probabilities for one feature row
    pub fn row_probabilities(&self, features: &[f32]) -> Vec<f32> {
        softmax(&self.row_logits(features))
    }
}

impl TrainingBackend for SoftmaxTrainer {
    fn step(&mut self, batch: &[TrainingExample]) -> BackendResult<f32> {
        let states = self.model.bias.len();
        let width = self.model.feature_width;

        let mut grad_w = vec![vec![0.0f32; width]; states];
        let mut grad_b = vec![0.0f32; states];
        let mut loss = 0.0f32;
        let mut rows = 0usize;

        for example in batch {
            let (strides, example_width) = example.features.shape();
            if example_width != width || example.states.len() != strides {
                return Err(BackendError(format!(
                    "example {} is {}x{} with {} labels, model expects width {}",
                    example.clip_id.short(),
                    strides,
                    example_width,
                    example.states.len(),
                    width
                )));
            }

            for (row, &label) in example.features.rows().zip(&example.states) {
                let label = label as usize;
                if label >= states {
                    return Err(BackendError(format!(
                        "state {} out of range ({} states)",
                        label, states
                    )));
                }

                let probs = self.row_probabilities(row);
                loss -= probs[label].max(f32::MIN_POSITIVE).ln();
                for (k, p) in probs.iter().enumerate() {
                    let err = p - if k == label { 1.0 } else { 0.0 };
                    for (g, x) in grad_w[k].iter_mut().zip(row) {
                        *g += err * x;
                    }
                    grad_b[k] += err;
                }
                rows += 1;
            }
        }

        if rows == 0 {
            return Err(BackendError::new("empty training batch"));
        }

        let scale = self.learning_rate / rows as f32;
        for (w, g) in self.model.weights.iter_mut().zip(&grad_w) {
            for (w, g) in w.iter_mut().zip(g) {
                *w -= scale * g;
            }
        }
        for (b, g) in self.model.bias.iter_mut().zip(&grad_b) {
            *b -= scale * g;
        }
        self.model.steps += 1;

        Ok(loss / rows as f32)
    }

    fn checkpoint(&self) -> BackendResult<Vec<u8>> {
        serde_json::to_vec(&self.model)
            .map_err(|e| BackendError(format!("checkpoint serialization failed: {}", e)))
    }

    fn predict(&self, features: &FeatureTensor) -> BackendResult<Prediction> {
        let (strides, width) = features.shape();
        if width != self.model.feature_width {
            return Err(BackendError(format!(
                "features have width {}, model expects {}",
                width, self.model.feature_width
            )));
        }

        let states = self.model.bias.len();
        let mut logits = Vec::with_capacity(strides * states);
        let mut probs = Vec::with_capacity(strides * states);
        for row in features.rows() {
            let row_logits = self.row_logits(row);
            probs.extend(softmax(&row_logits));
            logits.extend(row_logits);
        }

        Ok(Prediction {
            logits: FeatureTensor::new(strides, states, logits)?,
            probs: FeatureTensor::new(strides, states, probs)?,
        })
    }
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Builds a [`SoftmaxTrainer`] per vocabulary
pub struct SoftmaxFactory {
    learning_rate: f32,
}

impl SoftmaxFactory {
    pub fn new(learning_rate: f32) -> Self {
        Self { learning_rate }
    }
}

impl TrainerFactory for SoftmaxFactory {
    fn create(
        &self,
        vocab: &Vocabulary,
        feature_width: usize,
        checkpoint: Option<&[u8]>,
    ) -> BackendResult<Box<dyn TrainingBackend>> {
        let trainer = match checkpoint {
            Some(blob) => SoftmaxTrainer::restore(vocab, feature_width, self.learning_rate, blob)?,
            None => SoftmaxTrainer::new(vocab, feature_width, self.learning_rate),
        };
        Ok(Box::new(trainer))
    }
}
