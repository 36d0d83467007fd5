//! PNG rendering helpers shared by the visualization endpoints

use super::{BackendError, BackendResult, FeatureTensor, Prediction, VisualizationKind};
use crate::models::{LabelSet, Vocabulary};
use image::{DynamicImage, GrayImage, ImageFormat, Luma, Rgb, RgbImage};
use std::io::Cursor;

/// Pixels per stride (horizontal) and per feature band (vertical)
const CELL: u32 = 4;

/// Label strip height in pixels
const STRIP_HEIGHT: u32 = 24;

/// Distinct colors for states 1..; state 0 ("nil") stays black
const PALETTE: [[u8; 3]; 8] = [
    [230, 25, 75],
    [60, 180, 75],
    [255, 225, 25],
    [0, 130, 200],
    [245, 130, 48],
    [145, 30, 180],
    [70, 240, 240],
    [240, 50, 230],
];

/// Grayscale heatmap with time on x and band 0 at the bottom
///
/// Values are scaled to the tensor's own min/max range.
pub fn heatmap_png(tensor: &FeatureTensor) -> BackendResult<Vec<u8>> {
    let (strides, width) = tensor.shape();
    if strides == 0 || width == 0 {
        return Err(BackendError::new("cannot render an empty tensor"));
    }

    let (min, max) = tensor
        .values()
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let range = (max - min).max(f32::EPSILON);

    let img = GrayImage::from_fn(strides as u32 * CELL, width as u32 * CELL, |x, y| {
        let stride = (x / CELL) as usize;
        let band = width - 1 - (y / CELL) as usize;
        let v = (tensor.row(stride)[band] - min) / range;
        Luma([(v * 255.0).round() as u8])
    });

    encode_png(DynamicImage::ImageLuma8(img))
}

/// One colored cell per stride, colored by state
pub fn state_strip_png(states: &[u32]) -> BackendResult<Vec<u8>> {
    if states.is_empty() {
        return Err(BackendError::new("cannot render an empty state sequence"));
    }

    let img = RgbImage::from_fn(states.len() as u32 * CELL, STRIP_HEIGHT, |x, _| {
        state_color(states[(x / CELL) as usize])
    });

    encode_png(DynamicImage::ImageRgb8(img))
}

/// Strip of a stored label set
pub fn label_strip_png(label_set: &LabelSet, vocab: &Vocabulary) -> BackendResult<Vec<u8>> {
    tracing::trace!(
        vocab = %vocab.name,
        spans = label_set.spans().len(),
        "Rendering label strip"
    );
    state_strip_png(&label_set.states)
}

/// Model views: probabilities and raw scores as heatmaps, argmax as a strip
pub fn prediction_png(prediction: &Prediction, kind: VisualizationKind) -> BackendResult<Vec<u8>> {
    match kind {
        VisualizationKind::Probs => heatmap_png(&prediction.probs),
        VisualizationKind::States => heatmap_png(&prediction.logits),
        VisualizationKind::Argmax => state_strip_png(&prediction.argmax()),
        other => Err(BackendError(format!(
            "{} images are not rendered from predictions",
            other
        ))),
    }
}

fn state_color(state: u32) -> Rgb<u8> {
    if state == 0 {
        return Rgb([0, 0, 0]);
    }
    Rgb(PALETTE[(state as usize - 1) % PALETTE.len()])
}

fn encode_png(img: DynamicImage) -> BackendResult<Vec<u8>> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .map_err(|e| BackendError(format!("PNG encoding failed: {}", e)))?;
    Ok(buf)
}
