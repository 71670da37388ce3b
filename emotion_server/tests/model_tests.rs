use clap::Parser;
use common::protocol::EmotionLabel;
use emotion_server::{config::DetectorOpts, detector::EmotionDetector, utils::download_file};
use image::{Rgb, RgbImage};
use reqwest::Client;

/// Portrait with a single frontal face.
const FACE_PICTURE_URL: &str =
    "https://raw.githubusercontent.com/opencv/opencv/4.x/samples/data/lena.jpg";

#[derive(Parser, Debug)]
struct Args {
    #[clap(flatten)]
    detector: DetectorOpts,
}

#[tokio::test]
#[ignore = "downloads the pretrained models"]
async fn test_blank_frame_has_no_faces() -> anyhow::Result<()> {
    let args = Args::parse_from(["test"]);
    let detector = args.detector.build_detector().await?;

    let frame = RgbImage::from_pixel(640, 480, Rgb([128, 128, 128]));
    let detections = detector.detect(&frame)?;

    assert!(detections.is_empty());

    Ok(())
}

#[tokio::test]
#[ignore = "downloads the pretrained models and a test picture"]
async fn test_face_is_found_and_classified() -> anyhow::Result<()> {
    let args = Args::parse_from(["test"]);
    let detector = args.detector.build_detector().await?;

    let dir = tempfile::tempdir()?;
    let picture_path = dir.path().join("face.jpg");
    download_file(&Client::new(), FACE_PICTURE_URL, &picture_path).await?;
    let frame = image::open(&picture_path)?.to_rgb8();

    let detections = detector.detect(&frame)?;
    assert_eq!(detections.len(), 1);

    let face = &detections[0];
    assert!(face.bbox.width > 0 && face.bbox.height > 0);
    assert!(face.bbox.x >= 0 && face.bbox.y >= 0);
    assert!(face.bbox.x as u32 + face.bbox.width <= frame.width());
    assert!(face.bbox.y as u32 + face.bbox.height <= frame.height());

    assert_eq!(face.emotions.len(), EmotionLabel::ALL.len());
    let total: f32 = face.emotions.iter().map(|(_, p)| p).sum();
    assert!((total - 1.0).abs() < 1e-3);

    let (_, confidence) = face.dominant().expect("scores for every face");
    assert!((0.0..=1.0).contains(&confidence));

    Ok(())
}
