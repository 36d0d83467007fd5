//! Log-energy feature extractor
//!
//! Each stride is split into `feature_width` equal sub-frames; the feature is
//! the log RMS energy of each sub-frame, normalized to roughly [-1, 0].

use super::render::heatmap_png;
use super::{BackendError, BackendResult, FeatureExtractor, FeatureTensor, VisualizationKind};
use crate::models::AudioClip;

/// Floor added before the log so silence maps to a finite value
const ENERGY_FLOOR: f32 = 1e-5;

pub struct LogEnergyExtractor {
    feature_width: usize,
}

impl LogEnergyExtractor {
    pub fn new(feature_width: usize) -> Self {
        Self { feature_width }
    }

    fn mean_normalized(tensor: FeatureTensor) -> BackendResult<FeatureTensor> {
        let (strides, width) = tensor.shape();
        let mut means = vec![0.0f32; width];
        for row in tensor.rows() {
            for (mean, v) in means.iter_mut().zip(row) {
                *mean += v / strides as f32;
            }
        }
        let data = tensor
            .rows()
            .flat_map(|row| row.iter().zip(&means).map(|(v, mean)| v - mean))
            .collect();
        FeatureTensor::new(strides, width, data)
    }
}

impl FeatureExtractor for LogEnergyExtractor {
    fn feature_width(&self) -> usize {
        self.feature_width
    }

    fn extract(&self, clip: &AudioClip, strides: usize) -> BackendResult<FeatureTensor> {
        let samples: Vec<f32> = clip
            .samples()
            .map(|s| s as f32 / i16::MAX as f32)
            .collect();

        if strides == 0 {
            return Err(BackendError::new("stride count must be > 0"));
        }
        let stride_len = samples.len() / strides;
        let frame_len = stride_len / self.feature_width.max(1);
        if frame_len == 0 {
            return Err(BackendError(format!(
                "{} samples cannot be split into {} strides of {} frames",
                samples.len(),
                strides,
                self.feature_width
            )));
        }

        let norm = -ENERGY_FLOOR.ln();
        let mut data = Vec::with_capacity(strides * self.feature_width);
        for stride in 0..strides {
            let stride_start = stride * stride_len;
            for frame in 0..self.feature_width {
                let start = stride_start + frame * frame_len;
                let rms = calculate_rms_energy(&samples[start..start + frame_len]);
                data.push((rms + ENERGY_FLOOR).ln() / norm);
            }
        }

        FeatureTensor::new(strides, self.feature_width, data)
    }

    fn render(
        &self,
        clip: &AudioClip,
        strides: usize,
        kind: VisualizationKind,
    ) -> BackendResult<Vec<u8>> {
        let tensor = self.extract(clip, strides)?;
        match kind {
            VisualizationKind::Spectrogram => heatmap_png(&tensor),
            VisualizationKind::Mfcc => heatmap_png(&Self::mean_normalized(tensor)?),
            other => Err(BackendError(format!(
                "{} images are not rendered from audio features",
                other
            ))),
        }
    }
}

fn calculate_rms_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AUDIO_CLIP_LEN, STRIDES_PER_CLIP};

    fn clip_with_loud_second_half() -> AudioClip {
        let mut bytes = vec![0u8; AUDIO_CLIP_LEN];
        for pair in bytes[AUDIO_CLIP_LEN / 2..].chunks_exact_mut(2) {
            pair.copy_from_slice(&8000i16.to_le_bytes());
        }
        AudioClip::from_vec(bytes).unwrap()
    }

    #[test]
    fn test_shape_and_energy_ordering() {
        let extractor = LogEnergyExtractor::new(13);
        let tensor = extractor
            .extract(&clip_with_loud_second_half(), STRIDES_PER_CLIP)
            .unwrap();

        assert_eq!(tensor.shape(), (STRIDES_PER_CLIP, 13));
        // Silence sits at the floor, the loud half above it
        assert!((tensor.row(0)[0] + 1.0).abs() < 1e-4);
        assert!(tensor.row(99)[0] > tensor.row(0)[0]);
    }

    #[test]
    fn test_too_many_frames_rejected() {
        let extractor = LogEnergyExtractor::new(10_000);
        let clip = AudioClip::from_vec(vec![0u8; AUDIO_CLIP_LEN]).unwrap();
        assert!(extractor.extract(&clip, STRIDES_PER_CLIP).is_err());
    }

    #[test]
    fn test_render_kinds() {
        let extractor = LogEnergyExtractor::new(8);
        let clip = clip_with_loud_second_half();

        let png = extractor
            .render(&clip, STRIDES_PER_CLIP, VisualizationKind::Spectrogram)
            .unwrap();
        assert!(png.starts_with(&[0x89, b'P', b'N', b'G']));
        assert!(extractor
            .render(&clip, STRIDES_PER_CLIP, VisualizationKind::Mfcc)
            .is_ok());
        assert!(extractor
            .render(&clip, STRIDES_PER_CLIP, VisualizationKind::Labels)
            .is_err());
    }
}
