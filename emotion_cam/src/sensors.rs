//! Sensors module.
//!
//! Camera and window access through OpenCV.
use anyhow::Result;
use emotion_server::frame::{rgb_to_bgr, BgrFrame};
use image::RgbImage;
use opencv::{
    core::{self, Mat, Scalar},
    highgui, imgproc,
    prelude::*,
    videoio,
};

use crate::capture::{FrameSource, Viewer};

/// Camera opened through OpenCV. Released when dropped.
pub struct CameraSource {
    capture: videoio::VideoCapture,
}

impl CameraSource {
    /// Open the camera with the given device index. `None` if the device cannot be opened.
    pub fn open(index: i32) -> Result<Option<Self>> {
        let capture = videoio::VideoCapture::new(index, videoio::CAP_ANY)?;
        match capture.is_opened()? {
            true => {
                log::info!("Using camera {index}");
                Ok(Some(Self { capture }))
            }
            false => Ok(None),
        }
    }
}

impl FrameSource for CameraSource {
    fn capture(&mut self) -> Result<Option<BgrFrame>> {
        let mut frame = Mat::default();
        if !self.capture.read(&mut frame)? || frame.rows() <= 0 || frame.cols() <= 0 {
            return Ok(None);
        }
        let typ = frame.typ();
        let Some(frame) = to_bgr(frame)? else {
            log::error!("Unsupported frame type {typ}");
            return Ok(None);
        };

        let frame = match frame.is_continuous() {
            true => frame,
            false => frame.try_clone()?,
        };
        let data = frame.data_bytes()?.to_vec();

        Ok(BgrFrame::from_raw(
            frame.cols() as u32,
            frame.rows() as u32,
            data,
        ))
    }
}

/// Convert 8 bit gray or BGRA frames to BGR. `None` for any other pixel format.
fn to_bgr(frame: Mat) -> Result<Option<Mat>> {
    if frame.depth() != core::CV_8U {
        return Ok(None);
    }
    let code = match frame.channels() {
        3 => return Ok(Some(frame)),
        1 => imgproc::COLOR_GRAY2BGR,
        4 => imgproc::COLOR_BGRA2BGR,
        _ => return Ok(None),
    };

    let mut bgr = Mat::default();
    imgproc::cvt_color_def(&frame, &mut bgr, code)?;
    Ok(Some(bgr))
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        if let Err(err) = self.capture.release() {
            log::warn!("Failed to release camera: {err}");
        }
    }
}

/// Titled OpenCV window. Destroyed when dropped.
pub struct Window {
    name: String,
}

impl Window {
    pub fn new(name: &str) -> Result<Self> {
        highgui::named_window(name, highgui::WINDOW_AUTOSIZE)?;
        Ok(Self {
            name: name.to_owned(),
        })
    }
}

impl Viewer for Window {
    fn show(&mut self, frame: &RgbImage) -> Result<()> {
        let bgr = rgb_to_bgr(frame);
        let mut mat = Mat::new_rows_cols_with_default(
            frame.height() as i32,
            frame.width() as i32,
            core::CV_8UC3,
            Scalar::all(0.0),
        )?;
        mat.data_bytes_mut()?.copy_from_slice(&bgr);

        highgui::imshow(&self.name, &mat)?;
        Ok(())
    }

    fn poll_key(&mut self) -> Result<Option<char>> {
        let key = highgui::wait_key(1)?;
        match key {
            k if k < 0 => Ok(None),
            k => Ok(char::from_u32((k & 0xFF) as u32)),
        }
    }
}

impl Drop for Window {
    fn drop(&mut self) {
        if let Err(err) = highgui::destroy_window(&self.name) {
            log::warn!("Failed to close window: {err}");
        }
    }
}
