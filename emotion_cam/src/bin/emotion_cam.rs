//! Real-time emotion detection on the local camera.
//!
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use emotion_cam::{
    capture::CaptureLoop,
    sensors::{CameraSource, Window},
};
use emotion_server::config::{init_logger, DetectorOpts};

#[derive(Parser, Debug)]
#[clap(author, version)]
struct Args {
    /// Index of the camera device to open
    #[clap(long, default_value_t = 0)]
    camera: i32,

    /// Directory screenshots are written to
    #[clap(long, default_value = ".")]
    screenshot_dir: PathBuf,

    /// Title of the preview window
    #[clap(long, default_value = "Emotion Detection")]
    window_title: String,

    /// Log at debug level unless `RUST_LOG` says otherwise
    #[clap(long)]
    debug: bool,

    #[clap(flatten)]
    detector: DetectorOpts,
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logger(args.debug);

    // Models may have to be downloaded first, the capture loop itself is synchronous
    let detector = tokio::runtime::Runtime::new()?.block_on(args.detector.build_detector())?;

    let Some(mut camera) = CameraSource::open(args.camera)? else {
        log::error!("Could not open camera {}", args.camera);
        return Ok(());
    };
    let mut window = Window::new(&args.window_title)?;

    log::info!("Starting real-time emotion detection, press 'q' to quit, 's' to save a screenshot");

    let mut capture_loop = CaptureLoop::new(&detector, args.screenshot_dir);
    let exit = capture_loop.run(&mut camera, &mut window)?;

    log::info!("Real-time detection stopped ({exit:?})");

    Ok(())
}
