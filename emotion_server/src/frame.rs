//! Frames and the conversions needed before they reach the detector.
//!
//! The detector works on `RgbImage`s. Cameras opened through OpenCV deliver interleaved BGR
//! pixels and browsers deliver base64 encoded JPEGs; both are converted here.
use base64::prelude::*;
use image::RgbImage;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("invalid image data: {0}")]
    Image(#[from] image::ImageError),
}

/// Decode a base64 encoded image into an RGB frame.
///
/// Callers are expected to strip the `data:image/jpeg;base64,` prefix of a data URL, but a
/// payload that still carries it is accepted as well.
pub fn decode_base64_image(payload: &str) -> Result<RgbImage, DecodeError> {
    let payload = match payload.strip_prefix("data:") {
        Some(data_url) => data_url
            .split_once(',')
            .map(|(_, data)| data)
            .unwrap_or(data_url),
        None => payload,
    };

    let bytes = BASE64_STANDARD.decode(payload.trim())?;
    let image = image::load_from_memory(&bytes)?;

    Ok(image.to_rgb8())
}

/// Frame with interleaved pixels in BGR order, as captured by OpenCV.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BgrFrame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl BgrFrame {
    /// Wrap a raw buffer. Returns `None` if the buffer does not hold `width * height` pixels.
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        match data.len() == width as usize * height as usize * 3 {
            true => Some(Self {
                width,
                height,
                data,
            }),
            false => None,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn as_raw(&self) -> &[u8] {
        &self.data
    }

    /// Swap to the RGB channel order the detector expects.
    pub fn to_rgb(&self) -> RgbImage {
        let data = swap_red_blue(&self.data);
        RgbImage::from_raw(self.width, self.height, data)
            .unwrap_or_else(|| RgbImage::new(self.width, self.height))
    }
}

/// Convert an RGB frame back to interleaved BGR pixels for display with OpenCV.
pub fn rgb_to_bgr(frame: &RgbImage) -> Vec<u8> {
    swap_red_blue(frame.as_raw())
}

fn swap_red_blue(pixels: &[u8]) -> Vec<u8> {
    pixels
        .chunks_exact(3)
        .flat_map(|px| [px[2], px[1], px[0]])
        .collect()
}
