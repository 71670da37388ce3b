//! Data exchanged between the detector, the renderers and the HTTP clients.
//!
use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Closed set of emotions a face can be classified as.
///
/// The declaration order is the order used for iteration, serialization and tie-breaking.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EmotionLabel {
    Angry,
    Disgust,
    Fear,
    Happy,
    Sad,
    Surprise,
    Neutral,
}

impl EmotionLabel {
    pub const ALL: [EmotionLabel; 7] = [
        EmotionLabel::Angry,
        EmotionLabel::Disgust,
        EmotionLabel::Fear,
        EmotionLabel::Happy,
        EmotionLabel::Sad,
        EmotionLabel::Surprise,
        EmotionLabel::Neutral,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EmotionLabel::Angry => "angry",
            EmotionLabel::Disgust => "disgust",
            EmotionLabel::Fear => "fear",
            EmotionLabel::Happy => "happy",
            EmotionLabel::Sad => "sad",
            EmotionLabel::Surprise => "surprise",
            EmotionLabel::Neutral => "neutral",
        }
    }
}

impl fmt::Display for EmotionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown emotion label {0:?}")]
pub struct UnknownLabel(pub String);

impl FromStr for EmotionLabel {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EmotionLabel::ALL
            .into_iter()
            .find(|label| label.as_str() == s)
            .ok_or_else(|| UnknownLabel(s.to_owned()))
    }
}

/// Probability per emotion for a single face.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(transparent)]
pub struct EmotionScores(BTreeMap<EmotionLabel, f32>);

impl EmotionScores {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, label: EmotionLabel, probability: f32) {
        self.0.insert(label, probability);
    }

    pub fn get(&self, label: EmotionLabel) -> Option<f32> {
        self.0.get(&label).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EmotionLabel, f32)> + '_ {
        self.0.iter().map(|(label, p)| (*label, *p))
    }

    /// Emotion with the highest probability. On ties the earlier label wins, non-finite
    /// probabilities are ignored.
    pub fn dominant(&self) -> Option<(EmotionLabel, f32)> {
        self.iter()
            .filter(|(_, p)| p.is_finite())
            .fold(None, |best, (label, p)| match best {
                Some((_, best_p)) if best_p >= p => best,
                _ => Some((label, p)),
            })
    }

    /// Emotions with a probability strictly above `threshold`, in label order.
    pub fn above(&self, threshold: f32) -> impl Iterator<Item = (EmotionLabel, f32)> + '_ {
        self.iter().filter(move |(_, p)| *p > threshold)
    }
}

impl FromIterator<(EmotionLabel, f32)> for EmotionScores {
    fn from_iter<T: IntoIterator<Item = (EmotionLabel, f32)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Face bounding box in pixel coordinates of the frame it was detected on.
///
/// Serialized as `[x, y, width, height]`.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(from = "(i32, i32, u32, u32)", into = "(i32, i32, u32, u32)")]
pub struct Bbox {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Bbox {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height as i32
    }
}

impl From<(i32, i32, u32, u32)> for Bbox {
    fn from((x, y, width, height): (i32, i32, u32, u32)) -> Self {
        Self::new(x, y, width, height)
    }
}

impl From<Bbox> for (i32, i32, u32, u32) {
    fn from(bbox: Bbox) -> Self {
        (bbox.x, bbox.y, bbox.width, bbox.height)
    }
}

/// One detected face.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Detection {
    #[serde(rename = "box")]
    pub bbox: Bbox,
    pub emotions: EmotionScores,
}

impl Detection {
    pub fn new(bbox: Bbox, emotions: EmotionScores) -> Self {
        Self { bbox, emotions }
    }

    pub fn dominant(&self) -> Option<(EmotionLabel, f32)> {
        self.emotions.dominant()
    }
}

/// Result reported for a single face.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct EmotionSummary {
    pub dominant_emotion: EmotionLabel,
    pub confidence: f32,
    pub all_emotions: EmotionScores,
}

impl EmotionSummary {
    /// Summarize a detection. `None` if the detection carries no scores.
    pub fn from_detection(detection: &Detection) -> Option<Self> {
        let (dominant_emotion, confidence) = detection.dominant()?;
        Some(Self {
            dominant_emotion,
            confidence,
            all_emotions: detection.emotions.clone(),
        })
    }
}

/// Body of a detection request. The image is a base64 encoded JPEG without data-URL prefix.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct DetectRequest {
    #[serde(default)]
    pub image: Option<String>,
}

/// Body of a detection response.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DetectResponse {
    Error { error: String },
    Summary(EmotionSummary),
}
