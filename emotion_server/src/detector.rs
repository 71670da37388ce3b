//! Face and emotion detection behind a single call.
//!
use anyhow::Result;
use common::protocol::{Bbox, Detection};
use image::RgbImage;

use crate::nn::{EmotionModel, RelBbox, UltrafaceModel};

/// Something that finds faces in a frame and classifies their emotion.
///
/// Frames are in RGB channel order. Faces are returned most confident first; a frame without
/// faces yields an empty list.
pub trait EmotionDetector: Send + Sync {
    fn detect(&self, frame: &RgbImage) -> Result<Vec<Detection>>;
}

/// Detector running an Ultraface face localizer followed by a FER+ emotion classifier.
pub struct OnnxEmotionDetector {
    faces: UltrafaceModel,
    emotions: EmotionModel,
}

impl OnnxEmotionDetector {
    pub fn new(faces: UltrafaceModel, emotions: EmotionModel) -> Self {
        Self { faces, emotions }
    }
}

impl EmotionDetector for OnnxEmotionDetector {
    fn detect(&self, frame: &RgbImage) -> Result<Vec<Detection>> {
        let (width, height) = frame.dimensions();
        let mut detections = vec![];

        for (rel_bbox, confidence) in self.faces.run(frame)? {
            let Some(bbox) = to_pixel_bbox(&rel_bbox, width, height) else {
                log::debug!("Skipping degenerate face box {rel_bbox:?}");
                continue;
            };

            let face = image::imageops::crop_imm(
                frame,
                bbox.x as u32,
                bbox.y as u32,
                bbox.width,
                bbox.height,
            )
            .to_image();
            let emotions = self.emotions.run(&face)?;
            log::debug!("Face {bbox:?} (confidence {confidence:.2}): {emotions:?}");

            detections.push(Detection::new(bbox, emotions));
        }

        Ok(detections)
    }
}

/// Scale a relative bounding box to pixels, clamped to the frame.
///
/// Returns `None` if nothing of the box is left inside the frame.
fn to_pixel_bbox(rel_bbox: &RelBbox, width: u32, height: u32) -> Option<Bbox> {
    let (w, h) = (width as f32, height as f32);
    let x_tl = (rel_bbox[0] * w).clamp(0.0, w) as u32;
    let y_tl = (rel_bbox[1] * h).clamp(0.0, h) as u32;
    let x_br = (rel_bbox[2] * w).clamp(0.0, w) as u32;
    let y_br = (rel_bbox[3] * h).clamp(0.0, h) as u32;

    match x_br > x_tl && y_br > y_tl {
        true => Some(Bbox::new(
            x_tl as i32,
            y_tl as i32,
            x_br - x_tl,
            y_br - y_tl,
        )),
        false => None,
    }
}

#[cfg(test)]
mod test {

    use super::*;

    #[test]
    fn test_pixel_bbox() {
        assert_eq!(
            to_pixel_bbox(&[0.25, 0.5, 0.75, 1.0], 640, 480),
            Some(Bbox::new(160, 240, 320, 240))
        );
    }

    #[test]
    fn test_pixel_bbox_is_clamped() {
        assert_eq!(
            to_pixel_bbox(&[-0.1, -0.2, 0.5, 1.3], 100, 100),
            Some(Bbox::new(0, 0, 50, 100))
        );
        assert_eq!(to_pixel_bbox(&[1.1, 0.0, 1.4, 0.5], 100, 100), None);
        assert_eq!(to_pixel_bbox(&[0.5, 0.5, 0.5, 0.6], 100, 100), None);
    }
}
