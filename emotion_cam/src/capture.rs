//! Real-time capture loop annotating camera frames with detected emotions.
//!
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime};
use common::protocol::Detection;
use emotion_server::{detector::EmotionDetector, frame::BgrFrame, overlay::draw_emotions};
use image::RgbImage;

use crate::meter::FrameMeter;

/// Detection runs on every n-th frame, the frames in between reuse its result.
pub const DETECTION_INTERVAL: u64 = 5;

pub const QUIT_KEY: char = 'q';
pub const SCREENSHOT_KEY: char = 's';

/// Source of camera frames.
pub trait FrameSource {
    /// Capture the next frame. `None` if no frame could be read.
    fn capture(&mut self) -> Result<Option<BgrFrame>>;
}

/// Displays annotated frames and reports key presses.
pub trait Viewer {
    fn show(&mut self, frame: &RgbImage) -> Result<()>;

    /// Key pressed since the last call, if any.
    fn poll_key(&mut self) -> Result<Option<char>>;
}

/// Why the capture loop stopped.
#[derive(Debug, PartialEq, Eq)]
pub enum LoopExit {
    Quit,
    CaptureFailed,
}

pub struct CaptureLoop<'a> {
    detector: &'a dyn EmotionDetector,
    last_detections: Vec<Detection>,
    frame_count: u64,
    screenshot_dir: PathBuf,
    meter: FrameMeter,
}

impl<'a> CaptureLoop<'a> {
    pub fn new(detector: &'a dyn EmotionDetector, screenshot_dir: impl Into<PathBuf>) -> Self {
        Self {
            detector,
            last_detections: vec![],
            frame_count: 0,
            screenshot_dir: screenshot_dir.into(),
            meter: FrameMeter::default(),
        }
    }

    /// Detections drawn onto the frames until the next detection run.
    pub fn last_detections(&self) -> &[Detection] {
        &self.last_detections
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Annotate a single frame, running the detector if this frame is due.
    pub fn step(&mut self, frame: &BgrFrame) -> RgbImage {
        let mut annotated = frame.to_rgb();

        if self.frame_count % DETECTION_INTERVAL == 0 {
            match self.detector.detect(&annotated) {
                Ok(detections) => {
                    self.meter.tick_detected();
                    self.last_detections = detections;
                }
                Err(err) => log::warn!("Detection on frame {} failed: {err:#}", self.frame_count),
            }
        }

        draw_emotions(&mut annotated, &self.last_detections);
        self.frame_count += 1;

        annotated
    }

    /// Capture, annotate and show frames until the quit key is pressed or capturing fails.
    pub fn run(
        &mut self,
        source: &mut impl FrameSource,
        viewer: &mut impl Viewer,
    ) -> Result<LoopExit> {
        loop {
            let Some(frame) = source.capture()? else {
                log::error!("Could not read frame");
                return Ok(LoopExit::CaptureFailed);
            };
            self.meter.tick_raw();

            let annotated = self.step(&frame);
            viewer.show(&annotated)?;

            match viewer.poll_key()? {
                Some(QUIT_KEY) => return Ok(LoopExit::Quit),
                Some(SCREENSHOT_KEY) => {
                    let timestamp = Local::now().naive_local();
                    match save_screenshot(&annotated, &self.screenshot_dir, timestamp) {
                        Ok(path) => log::info!("Screenshot saved as {}", path.display()),
                        Err(err) => log::error!("Failed to save screenshot: {err:#}"),
                    }
                }
                _ => (),
            }

            self.meter.maybe_log();
        }
    }
}

/// File name of a screenshot taken at the given time.
pub fn screenshot_file_name(timestamp: NaiveDateTime) -> String {
    format!("emotion_screenshot_{}.jpg", timestamp.format("%Y%m%d_%H%M%S"))
}

/// Write a frame as JPEG into `dir`, named after the time it was taken.
pub fn save_screenshot(frame: &RgbImage, dir: &Path, timestamp: NaiveDateTime) -> Result<PathBuf> {
    let path = dir.join(screenshot_file_name(timestamp));
    frame
        .save(&path)
        .with_context(|| format!("failed to write {}", path.display()))?;

    Ok(path)
}

#[cfg(test)]
mod test {

    use std::{collections::VecDeque, sync::Mutex};

    use anyhow::bail;
    use chrono::NaiveDate;
    use common::protocol::{Bbox, EmotionLabel, EmotionScores};

    use super::*;

    const FRAME_SIZE: u32 = 16;

    /// Frame whose pixels all carry its index, so the detector can tell which frame it got.
    fn marked_frame(index: u8) -> BgrFrame {
        let data = vec![index; (FRAME_SIZE * FRAME_SIZE * 3) as usize];
        BgrFrame::from_raw(FRAME_SIZE, FRAME_SIZE, data).expect("valid frame")
    }

    /// Detector recording the frames it is invoked on.
    #[derive(Default)]
    struct RecordingDetector {
        seen: Mutex<Vec<u8>>,
        fail_after: Option<usize>,
    }

    impl RecordingDetector {
        fn seen(&self) -> Vec<u8> {
            self.seen.lock().expect("lock").clone()
        }
    }

    impl EmotionDetector for RecordingDetector {
        fn detect(&self, frame: &RgbImage) -> Result<Vec<Detection>> {
            let mut seen = self.seen.lock().expect("lock");
            if self.fail_after.is_some_and(|n| seen.len() >= n) {
                bail!("inference failed");
            }
            let marker = frame.get_pixel(0, 0)[0];
            seen.push(marker);

            let emotions: EmotionScores = [(EmotionLabel::Happy, 0.8), (EmotionLabel::Sad, 0.2)]
                .into_iter()
                .collect();
            Ok(vec![Detection::new(
                Bbox::new(marker as i32, 2, 8, 8),
                emotions,
            )])
        }
    }

    struct FakeCamera {
        frames: VecDeque<BgrFrame>,
    }

    impl FakeCamera {
        fn with_frames(n: u8) -> Self {
            Self {
                frames: (0..n).map(marked_frame).collect(),
            }
        }
    }

    impl FrameSource for FakeCamera {
        fn capture(&mut self) -> Result<Option<BgrFrame>> {
            Ok(self.frames.pop_front())
        }
    }

    /// Viewer pressing the scripted key after the frame with the same index.
    struct ScriptedViewer {
        keys: Vec<(usize, char)>,
        shown: usize,
    }

    impl ScriptedViewer {
        fn new(keys: Vec<(usize, char)>) -> Self {
            Self { keys, shown: 0 }
        }
    }

    impl Viewer for ScriptedViewer {
        fn show(&mut self, _frame: &RgbImage) -> Result<()> {
            self.shown += 1;
            Ok(())
        }

        fn poll_key(&mut self) -> Result<Option<char>> {
            let frame_index = self.shown - 1;
            Ok(self
                .keys
                .iter()
                .find(|(index, _)| *index == frame_index)
                .map(|(_, key)| *key))
        }
    }

    #[test]
    fn test_detects_every_fifth_frame() -> Result<()> {
        let detector = RecordingDetector::default();
        let dir = tempfile::tempdir()?;
        let mut capture_loop = CaptureLoop::new(&detector, dir.path());
        let mut viewer = ScriptedViewer::new(vec![]);

        let exit = capture_loop.run(&mut FakeCamera::with_frames(12), &mut viewer)?;

        assert_eq!(exit, LoopExit::CaptureFailed);
        assert_eq!(detector.seen(), vec![0, 5, 10]);
        assert_eq!(viewer.shown, 12);
        assert_eq!(capture_loop.frame_count(), 12);

        Ok(())
    }

    #[test]
    fn test_frames_between_detections_reuse_last_result() {
        let detector = RecordingDetector::default();
        let mut capture_loop = CaptureLoop::new(&detector, ".");

        capture_loop.step(&marked_frame(0));
        let first = capture_loop.last_detections().to_vec();
        assert_eq!(first[0].bbox.x, 0);

        for index in 1..5 {
            capture_loop.step(&marked_frame(index));
            assert_eq!(capture_loop.last_detections(), first.as_slice());
        }

        capture_loop.step(&marked_frame(5));
        assert_eq!(capture_loop.last_detections()[0].bbox.x, 5);
    }

    #[test]
    fn test_failed_detection_keeps_previous_result() {
        let detector = RecordingDetector {
            fail_after: Some(1),
            ..Default::default()
        };
        let mut capture_loop = CaptureLoop::new(&detector, ".");

        for index in 0..6 {
            capture_loop.step(&marked_frame(index));
        }

        assert_eq!(detector.seen(), vec![0]);
        assert_eq!(capture_loop.last_detections()[0].bbox.x, 0);
        assert_eq!(capture_loop.frame_count(), 6);
    }

    #[test]
    fn test_screenshot_then_quit() -> Result<()> {
        let detector = RecordingDetector::default();
        let dir = tempfile::tempdir()?;
        let mut capture_loop = CaptureLoop::new(&detector, dir.path());
        let mut viewer = ScriptedViewer::new(vec![(2, SCREENSHOT_KEY), (3, QUIT_KEY)]);

        let exit = capture_loop.run(&mut FakeCamera::with_frames(10), &mut viewer)?;

        // The screenshot does not end the loop, the quit key does
        assert_eq!(exit, LoopExit::Quit);
        assert_eq!(viewer.shown, 4);

        let screenshots: Vec<String> = std::fs::read_dir(dir.path())?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(screenshots.len(), 1);
        assert!(screenshots[0].starts_with("emotion_screenshot_"));
        assert!(screenshots[0].ends_with(".jpg"));
        assert_eq!(screenshots[0].len(), "emotion_screenshot_YYYYMMDD_HHMMSS.jpg".len());

        Ok(())
    }

    #[test]
    fn test_screenshot_file_name() -> Result<()> {
        let timestamp = NaiveDate::from_ymd_opt(2024, 3, 9)
            .and_then(|date| date.and_hms_opt(7, 5, 3))
            .expect("valid timestamp");
        assert_eq!(
            screenshot_file_name(timestamp),
            "emotion_screenshot_20240309_070503.jpg"
        );

        let dir = tempfile::tempdir()?;
        let frame = RgbImage::new(FRAME_SIZE, FRAME_SIZE);
        let path = save_screenshot(&frame, dir.path(), timestamp)?;
        assert_eq!(path, dir.path().join("emotion_screenshot_20240309_070503.jpg"));
        assert_eq!(image::open(&path)?.width(), FRAME_SIZE);

        Ok(())
    }
}
