//! Neural networks used to find faces and classify their emotion.
//!
use std::path::Path;

use anyhow::{bail, Context, Result};
use common::protocol::{EmotionLabel, EmotionScores};
use image::{imageops::FilterType, GrayImage, RgbImage};
use tract_onnx::prelude::*;

use crate::utils::ModelSource;

type NnModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Bounding box relative to the image size: `[x_top_left, y_top_left, x_bottom_right, y_bottom_right]`.
pub type RelBbox = [f32; 4];

/// Positive additive constant to avoid divide-by-zero.
const EPS: f32 = 1.0e-7;

/// Side length of the square grayscale input of the emotion network.
const EMOTION_INPUT_SIZE: u32 = 64;

/// Input resolutions the Ultraface network is published with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum UltrafaceVariant {
    #[value(name = "w640h480")]
    W640H480,
    #[value(name = "w320h240")]
    W320H240,
}

impl UltrafaceVariant {
    pub fn width(&self) -> u32 {
        match self {
            UltrafaceVariant::W640H480 => 640,
            UltrafaceVariant::W320H240 => 320,
        }
    }

    pub fn height(&self) -> u32 {
        match self {
            UltrafaceVariant::W640H480 => 480,
            UltrafaceVariant::W320H240 => 240,
        }
    }

    pub fn source(&self) -> ModelSource {
        match self {
            UltrafaceVariant::W640H480 => crate::utils::ULTRAFACE_640,
            UltrafaceVariant::W320H240 => crate::utils::ULTRAFACE_320,
        }
    }
}

/// Face localizer.
pub struct UltrafaceModel {
    model: NnModel,
    width: u32,
    height: u32,
    max_iou: f32,
    min_confidence: f32,
}

impl UltrafaceModel {
    pub fn new(
        model_path: &Path,
        variant: UltrafaceVariant,
        max_iou: f32,
        min_confidence: f32,
    ) -> Result<Self> {
        let (width, height) = (variant.width(), variant.height());
        let input_fact = InferenceFact::dt_shape(
            f32::datum_type(),
            tvec!(1, 3, height as usize, width as usize),
        );
        let model = load_model(model_path, input_fact)?;

        Ok(Self {
            model,
            width,
            height,
            max_iou,
            min_confidence,
        })
    }

    /// Find faces, most confident first.
    pub fn run(&self, input: &RgbImage) -> Result<Vec<(RelBbox, f32)>> {
        let raw_nn_out = self.model.run(tvec!(self.preproc(input).into()))?;

        // Output 0 holds [background, face] scores per anchor, output 1 the anchor boxes.
        let confidences = raw_nn_out[0]
            .to_array_view::<f32>()?
            .slice(tract_ndarray::s![0, .., 1])
            .to_vec();
        let bboxes: Vec<f32> = raw_nn_out[1].to_array_view::<f32>()?.iter().copied().collect();

        Ok(self.postproc(&confidences, &bboxes))
    }

    fn preproc(&self, input: &RgbImage) -> Tensor {
        let resized: RgbImage =
            image::imageops::resize(input, self.width, self.height, FilterType::Triangle);

        tract_ndarray::Array4::from_shape_fn(
            (1, 3, self.height as usize, self.width as usize),
            |(_, c, y, x)| {
                // Mean/std are from MobileNet, not from Ultraface, but work well
                let mean = [0.485, 0.456, 0.406][c];
                let std = [0.229, 0.224, 0.225][c];
                (resized[(x as _, y as _)][c] as f32 / 255.0 - mean) / std
            },
        )
        .into()
    }

    fn postproc(&self, confidences: &[f32], bboxes: &[f32]) -> Vec<(RelBbox, f32)> {
        let mut candidates: Vec<(RelBbox, f32)> = confidences
            .iter()
            .zip(bboxes.chunks_exact(4))
            .filter(|(confidence, _)| **confidence > self.min_confidence)
            .map(|(confidence, bbox)| ([bbox[0], bbox[1], bbox[2], bbox[3]], *confidence))
            .collect();

        candidates.sort_by(|a, b| a.1.total_cmp(&b.1));

        non_maximum_suppression(candidates, self.max_iou)
    }
}

/// Emotion classifier trained on FER+.
///
/// The network expects a 64x64 grayscale face with raw pixel values and returns unnormalized
/// scores for `neutral, happiness, surprise, sadness, anger, disgust, fear, contempt`.
pub struct EmotionModel {
    model: NnModel,
}

impl EmotionModel {
    pub fn new(model_path: &Path) -> Result<Self> {
        let side = EMOTION_INPUT_SIZE as usize;
        let input_fact = InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 1, side, side));
        let model = load_model(model_path, input_fact)?;

        Ok(Self { model })
    }

    /// Classify a cropped face.
    pub fn run(&self, face: &RgbImage) -> Result<EmotionScores> {
        let gray: GrayImage = image::imageops::grayscale(face);
        let raw_nn_out = self.model.run(tvec!(self.preproc(&gray).into()))?;

        let logits: Vec<f32> = raw_nn_out[0].to_array_view::<f32>()?.iter().copied().collect();
        if logits.len() != FERPLUS_LABELS.len() {
            bail!(
                "emotion network returned {} scores, expected {}",
                logits.len(),
                FERPLUS_LABELS.len()
            );
        }

        Ok(ferplus_to_scores(&softmax(&logits)))
    }

    fn preproc(&self, face: &GrayImage) -> Tensor {
        let resized: GrayImage = image::imageops::resize(
            face,
            EMOTION_INPUT_SIZE,
            EMOTION_INPUT_SIZE,
            FilterType::Triangle,
        );

        let side = EMOTION_INPUT_SIZE as usize;
        tract_ndarray::Array4::from_shape_fn((1, 1, side, side), |(_, _, y, x)| {
            resized[(x as _, y as _)][0] as f32
        })
        .into()
    }
}

/// FER+ output classes. `None` marks `contempt`, which has no counterpart in `EmotionLabel`.
const FERPLUS_LABELS: [Option<EmotionLabel>; 8] = [
    Some(EmotionLabel::Neutral),
    Some(EmotionLabel::Happy),
    Some(EmotionLabel::Surprise),
    Some(EmotionLabel::Sad),
    Some(EmotionLabel::Angry),
    Some(EmotionLabel::Disgust),
    Some(EmotionLabel::Fear),
    None,
];

/// Map FER+ probabilities onto the emotion labels, renormalized without `contempt`.
fn ferplus_to_scores(probabilities: &[f32]) -> EmotionScores {
    let kept: Vec<(EmotionLabel, f32)> = FERPLUS_LABELS
        .iter()
        .zip(probabilities)
        .filter_map(|(label, p)| label.map(|label| (label, *p)))
        .collect();
    let total: f32 = kept.iter().map(|(_, p)| p).sum::<f32>() + EPS;

    kept.into_iter().map(|(label, p)| (label, p / total)).collect()
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|x| (x - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.iter().map(|x| x / sum).collect()
}

fn load_model(model_path: &Path, input_fact: InferenceFact) -> Result<NnModel> {
    log::info!("Loading model {}", model_path.display());
    let model = tract_onnx::onnx()
        .model_for_path(model_path)
        .with_context(|| format!("failed to read model {}", model_path.display()))?
        .with_input_fact(0, input_fact)?
        .into_optimized()?
        .into_runnable()?;

    Ok(model)
}

/// Run non-maximum-suppression on candidate bounding boxes.
///
/// Candidates are expected in ascending order of confidence. Starting from the most confident
/// one, a candidate is selected only if its IoU with every already selected box is at most
/// `max_iou`. The result is ordered by descending confidence.
fn non_maximum_suppression(
    mut sorted_bboxes_with_confidences: Vec<(RelBbox, f32)>,
    max_iou: f32,
) -> Vec<(RelBbox, f32)> {
    let mut selected: Vec<(RelBbox, f32)> = vec![];
    while let Some((bbox, confidence)) = sorted_bboxes_with_confidences.pop() {
        if selected
            .iter()
            .all(|(selected_bbox, _)| iou(&bbox, selected_bbox) <= max_iou)
        {
            selected.push((bbox, confidence));
        }
    }

    selected
}

/// Calculate the intersection-over-union metric for two bounding boxes.
fn iou(bbox_a: &RelBbox, bbox_b: &RelBbox) -> f32 {
    // If the boxes do not overlap, the top left corner of the overlap box ends up below or to
    // the right of its bottom right corner and the area is zero.
    let overlap_box: RelBbox = [
        f32::max(bbox_a[0], bbox_b[0]),
        f32::max(bbox_a[1], bbox_b[1]),
        f32::min(bbox_a[2], bbox_b[2]),
        f32::min(bbox_a[3], bbox_b[3]),
    ];

    let overlap_area = bbox_area(&overlap_box);

    overlap_area / (bbox_area(bbox_a) + bbox_area(bbox_b) - overlap_area + EPS)
}

/// Area enclosed by a bounding box, zero for ill-defined boxes.
fn bbox_area(bbox: &RelBbox) -> f32 {
    let width = bbox[2] - bbox[0];
    let height = bbox[3] - bbox[1];
    if width < 0.0 || height < 0.0 {
        return 0.0;
    }

    width * height
}

#[cfg(test)]
mod test {

    use super::*;

    #[test]
    fn test_iou() {
        let a = [0.0, 0.0, 0.5, 0.5];
        let b = [0.25, 0.25, 0.75, 0.75];
        let c = [0.6, 0.6, 0.9, 0.9];

        assert!((iou(&a, &a) - 1.0).abs() < 1e-4);
        assert!((iou(&a, &b) - 0.0625 / 0.4375).abs() < 1e-4);
        assert_eq!(iou(&a, &c), 0.0);
    }

    #[test]
    fn test_non_maximum_suppression() {
        let candidates = vec![
            ([0.26, 0.26, 0.76, 0.76], 0.6),
            ([0.6, 0.6, 0.9, 0.9], 0.7),
            ([0.25, 0.25, 0.75, 0.75], 0.9),
        ];
        let selected = non_maximum_suppression(candidates, 0.5);

        assert_eq!(
            selected,
            vec![([0.25, 0.25, 0.75, 0.75], 0.9), ([0.6, 0.6, 0.9, 0.9], 0.7)]
        );
    }

    #[test]
    fn test_softmax() {
        let probabilities = softmax(&[1.0, 2.0, 3.0]);
        let sum: f32 = probabilities.iter().sum();

        assert!((sum - 1.0).abs() < 1e-5);
        assert!(probabilities[2] > probabilities[1] && probabilities[1] > probabilities[0]);
    }

    #[test]
    fn test_ferplus_mapping_drops_contempt() {
        let scores = ferplus_to_scores(&[0.1, 0.4, 0.0, 0.0, 0.0, 0.0, 0.0, 0.5]);

        assert_eq!(scores.len(), 7);
        assert_eq!(scores.dominant().map(|(label, _)| label), Some(EmotionLabel::Happy));
        assert!((scores.get(EmotionLabel::Happy).unwrap_or_default() - 0.8).abs() < 1e-4);
        assert!((scores.iter().map(|(_, p)| p).sum::<f32>() - 1.0).abs() < 1e-4);
    }
}
