//! Drawing detection results onto frames.
//!
use common::protocol::{Bbox, Detection, EmotionLabel};
use image::{Rgb, RgbImage};
use imageproc::{
    drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size},
    rect::Rect,
};
use lazy_static::lazy_static;
use rusttype::Scale;

/// Probabilities up to this value are not listed below a face.
pub const MIN_LISTED_PROBABILITY: f32 = 0.10;

const LABEL_SCALE: f32 = 18.0;
const LINE_SCALE: f32 = 14.0;
const LINE_SPACING: i32 = 15;
const LABEL_PADDING: i32 = 10;
const BOX_THICKNESS: u32 = 2;
const LABEL_TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

/// Color used for faces showing an emotion.
pub fn emotion_color(label: EmotionLabel) -> Rgb<u8> {
    match label {
        EmotionLabel::Angry => Rgb([255, 0, 0]),
        EmotionLabel::Disgust => Rgb([0, 128, 0]),
        EmotionLabel::Fear => Rgb([128, 0, 128]),
        EmotionLabel::Happy => Rgb([0, 255, 0]),
        EmotionLabel::Sad => Rgb([0, 0, 255]),
        EmotionLabel::Surprise => Rgb([255, 255, 0]),
        EmotionLabel::Neutral => Rgb([128, 128, 128]),
    }
}

/// Text positioned by its top left corner.
#[derive(Clone, Debug, PartialEq)]
pub struct TextLine {
    pub text: String,
    pub x: i32,
    pub y: i32,
    pub scale: f32,
}

/// Everything drawn for one face.
#[derive(Clone, Debug, PartialEq)]
pub struct FaceOverlay {
    pub rect: Bbox,
    pub color: Rgb<u8>,
    /// Dominant emotion with its confidence, above the box.
    pub label: TextLine,
    pub label_background: Bbox,
    /// Every emotion above `MIN_LISTED_PROBABILITY`, stacked below the box.
    pub lines: Vec<TextLine>,
}

/// Compute what to draw for each detection. Detections without scores are skipped.
pub fn layout(detections: &[Detection]) -> Vec<FaceOverlay> {
    detections.iter().filter_map(layout_face).collect()
}

fn layout_face(detection: &Detection) -> Option<FaceOverlay> {
    let (dominant, confidence) = detection.dominant()?;
    let rect = detection.bbox;
    let color = emotion_color(dominant);

    let label_text = format!("{dominant}: {confidence:.2}");
    let (label_width, label_height) = text_size(scale(LABEL_SCALE), &DEJAVU_MONO, &label_text);
    let label_background = Bbox::new(
        rect.x,
        rect.y - label_height - LABEL_PADDING,
        label_width.max(1) as u32,
        (label_height + LABEL_PADDING) as u32,
    );
    let label = TextLine {
        text: label_text,
        x: rect.x,
        y: rect.y - label_height - LABEL_PADDING / 2,
        scale: LABEL_SCALE,
    };

    let lines = detection
        .emotions
        .above(MIN_LISTED_PROBABILITY)
        .zip((0..).map(|i| rect.bottom() + LABEL_PADDING / 2 + i * LINE_SPACING))
        .map(|((emotion, probability), y)| TextLine {
            text: format!("{emotion}: {probability:.2}"),
            x: rect.x,
            y,
            scale: LINE_SCALE,
        })
        .collect();

    Some(FaceOverlay {
        rect,
        color,
        label,
        label_background,
        lines,
    })
}

/// Draw boxes, labels and emotion probabilities of all detections onto the frame.
pub fn draw_emotions(frame: &mut RgbImage, detections: &[Detection]) {
    for overlay in layout(detections) {
        draw_face(frame, &overlay);
    }
}

fn draw_face(frame: &mut RgbImage, overlay: &FaceOverlay) {
    let rect = overlay.rect;
    for inset in 0..BOX_THICKNESS {
        if rect.width <= 2 * inset || rect.height <= 2 * inset {
            break;
        }
        let face_rect = Rect::at(rect.x + inset as i32, rect.y + inset as i32)
            .of_size(rect.width - 2 * inset, rect.height - 2 * inset);
        draw_hollow_rect_mut(frame, face_rect, overlay.color);
    }

    let background = overlay.label_background;
    draw_filled_rect_mut(
        frame,
        Rect::at(background.x, background.y).of_size(background.width, background.height),
        overlay.color,
    );
    draw_line(frame, &overlay.label, LABEL_TEXT_COLOR);

    for line in &overlay.lines {
        draw_line(frame, line, overlay.color);
    }
}

fn draw_line(frame: &mut RgbImage, line: &TextLine, color: Rgb<u8>) {
    draw_text_mut(
        frame,
        color,
        line.x,
        line.y,
        scale(line.scale),
        &DEJAVU_MONO,
        &line.text,
    );
}

fn scale(size: f32) -> Scale {
    Scale { x: size, y: size }
}

lazy_static! {
    static ref DEJAVU_MONO: rusttype::Font<'static> = {
        let font_data: &[u8] = include_bytes!("../resources/DejaVuSansMono.ttf");
        rusttype::Font::try_from_bytes(font_data).expect("failed to load font")
    };
}
