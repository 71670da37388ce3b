//! Command line options shared by the binaries.
//!
use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use env_logger::TimestampPrecision;
use log::LevelFilter;
use reqwest::Client;

use crate::{
    detector::OnnxEmotionDetector,
    nn::{EmotionModel, UltrafaceModel, UltrafaceVariant},
    utils::{resolve_model, EMOTION_FERPLUS},
};

/// Options selecting and tuning the detection models.
#[derive(Args, Clone, Debug)]
pub struct DetectorOpts {
    /// Ultraface ONNX model, downloaded to the cache directory if not given
    #[clap(long)]
    pub face_model: Option<PathBuf>,

    /// FER+ emotion ONNX model, downloaded to the cache directory if not given
    #[clap(long)]
    pub emotion_model: Option<PathBuf>,

    /// Input resolution of the face model
    #[clap(long, value_enum, default_value = "w320h240")]
    pub face_variant: UltrafaceVariant,

    /// Minimum confidence for a face candidate to be kept
    #[clap(long, default_value_t = 0.7)]
    pub min_face_confidence: f32,

    /// Maximum overlap between two detected faces
    #[clap(long, default_value_t = 0.5)]
    pub max_iou: f32,
}

impl DetectorOpts {
    /// Resolve the model files and load the detector.
    pub async fn build_detector(&self) -> Result<OnnxEmotionDetector> {
        let client = Client::new();
        let face_model_path = resolve_model(
            &client,
            &self.face_variant.source(),
            self.face_model.as_deref(),
        )
        .await?;
        let emotion_model_path =
            resolve_model(&client, &EMOTION_FERPLUS, self.emotion_model.as_deref()).await?;

        let faces = UltrafaceModel::new(
            &face_model_path,
            self.face_variant,
            self.max_iou,
            self.min_face_confidence,
        )?;
        let emotions = EmotionModel::new(&emotion_model_path)?;

        log::info!("Emotion detector initialized");

        Ok(OnnxEmotionDetector::new(faces, emotions))
    }
}

/// Setup logger. `RUST_LOG` takes precedence over the default level.
pub fn init_logger(debug: bool) {
    let default_level = match debug {
        true => LevelFilter::Debug,
        false => LevelFilter::Info,
    };

    env_logger::builder()
        .format_timestamp(Some(TimestampPrecision::Millis))
        .filter_level(default_level)
        .parse_default_env()
        .init();
}

#[cfg(test)]
mod test {

    use clap::Parser;

    use super::*;

    #[derive(Parser, Debug)]
    struct TestArgs {
        #[clap(flatten)]
        detector: DetectorOpts,
    }

    #[test]
    fn test_detector_defaults() {
        let args = TestArgs::parse_from(["test"]);

        assert!(args.detector.face_model.is_none());
        assert!(args.detector.emotion_model.is_none());
        assert_eq!(args.detector.face_variant, UltrafaceVariant::W320H240);
        assert_eq!(args.detector.min_face_confidence, 0.7);
        assert_eq!(args.detector.max_iou, 0.5);
    }

    #[test]
    fn test_detector_overrides() {
        let args = TestArgs::parse_from([
            "test",
            "--face-model",
            "faces.onnx",
            "--face-variant",
            "w640h480",
            "--min-face-confidence",
            "0.9",
        ]);

        assert_eq!(args.detector.face_model, Some(PathBuf::from("faces.onnx")));
        assert_eq!(args.detector.face_variant, UltrafaceVariant::W640H480);
        assert_eq!(args.detector.min_face_confidence, 0.9);
    }
}
