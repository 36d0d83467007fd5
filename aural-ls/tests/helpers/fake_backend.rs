//! Deterministic stand-ins for the numerical backends

use aural_ls::backend::render::heatmap_png;
use aural_ls::backend::{
    BackendError, BackendResult, FeatureExtractor, FeatureTensor, Prediction, TrainerFactory,
    TrainingBackend, TrainingExample, VisualizationKind,
};
use aural_ls::models::{AudioClip, ClipId, Vocabulary};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Clips whose first byte is this value fail feature extraction
pub const BAD_CLIP_MARKER: u8 = 0xEE;

/// Clips whose first byte is this value extract one feature too wide
pub const WRONG_SHAPE_MARKER: u8 = 0xEF;

/// Every feature is the clip's first byte scaled to [0, 1]
pub struct FakeExtractor {
    pub width: usize,
}

impl FeatureExtractor for FakeExtractor {
    fn feature_width(&self) -> usize {
        self.width
    }

    fn extract(&self, clip: &AudioClip, strides: usize) -> BackendResult<FeatureTensor> {
        let first = clip.as_bytes()[0];
        if first == BAD_CLIP_MARKER {
            return Err(BackendError::new("marked bad"));
        }
        let width = if first == WRONG_SHAPE_MARKER {
            self.width + 1
        } else {
            self.width
        };
        FeatureTensor::new(strides, width, vec![first as f32 / 255.0; strides * width])
    }

    fn render(
        &self,
        clip: &AudioClip,
        strides: usize,
        _kind: VisualizationKind,
    ) -> BackendResult<Vec<u8>> {
        heatmap_png(&self.extract(clip, strides)?)
    }
}

/// Every training step, in the order steps ran
#[derive(Clone, Default)]
pub struct TrainingLog {
    steps: Arc<Mutex<Vec<(String, Vec<ClipId>)>>>,
}

impl TrainingLog {
    pub fn batches(&self, vocab: &str) -> Vec<Vec<ClipId>> {
        self.steps
            .lock()
            .unwrap()
            .iter()
            .filter(|(v, _)| v == vocab)
            .map(|(_, ids)| ids.clone())
            .collect()
    }

    pub fn step_count(&self) -> usize {
        self.steps.lock().unwrap().len()
    }
}

/// Builds trainers that record their batches
///
/// Vocabularies named in `fail_save` refuse to checkpoint; those in
/// `fail_step` fail every training step.
#[derive(Clone, Default)]
pub struct RecordingFactory {
    pub log: TrainingLog,
    pub fail_save: HashSet<String>,
    pub fail_step: HashSet<String>,
}

impl TrainerFactory for RecordingFactory {
    fn create(
        &self,
        vocab: &Vocabulary,
        _feature_width: usize,
        checkpoint: Option<&[u8]>,
    ) -> BackendResult<Box<dyn TrainingBackend>> {
        let restored_steps = checkpoint
            .and_then(|blob| std::str::from_utf8(blob).ok())
            .and_then(|s| s.rsplit(':').next())
            .and_then(|n| n.parse().ok())
            .unwrap_or(0);

        Ok(Box::new(RecordingTrainer {
            vocab: vocab.name.to_string(),
            states: vocab.state_count(),
            log: self.log.clone(),
            steps: restored_steps,
            fail_save: self.fail_save.contains(vocab.name.as_str()),
            fail_step: self.fail_step.contains(vocab.name.as_str()),
        }))
    }
}

struct RecordingTrainer {
    vocab: String,
    states: usize,
    log: TrainingLog,
    steps: u64,
    fail_save: bool,
    fail_step: bool,
}

impl TrainingBackend for RecordingTrainer {
    fn step(&mut self, batch: &[TrainingExample]) -> BackendResult<f32> {
        if self.fail_step {
            return Err(BackendError::new("step refused"));
        }
        let ids = batch.iter().map(|e| e.clip_id).collect();
        self.log.steps.lock().unwrap().push((self.vocab.clone(), ids));
        self.steps += 1;
        Ok(0.0)
    }

    /// `<vocab>:<steps>`
    fn checkpoint(&self) -> BackendResult<Vec<u8>> {
        if self.fail_save {
            return Err(BackendError::new("checkpoint refused"));
        }
        Ok(format!("{}:{}", self.vocab, self.steps).into_bytes())
    }

    /// Every stride predicts state `steps % states` with certainty
    fn predict(&self, features: &FeatureTensor) -> BackendResult<Prediction> {
        let (strides, _) = features.shape();
        let winner = self.steps as usize % self.states;
        let mut probs = vec![0.0; strides * self.states];
        for stride in 0..strides {
            probs[stride * self.states + winner] = 1.0;
        }
        let probs = FeatureTensor::new(strides, self.states, probs)?;
        Ok(Prediction {
            logits: probs.clone(),
            probs,
        })
    }
}
