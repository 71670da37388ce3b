//! Emotion detection on webcam frames, served over HTTP.
//!
use std::{path::PathBuf, sync::Arc};

use axum::{
    routing::{get, post},
    Extension, Router,
};

use crate::{
    detector::EmotionDetector,
    endpoints::{detect, healthcheck, index, static_file, StaticDir},
};

pub mod config;
pub mod detector;
pub mod endpoints;
pub mod frame;
pub mod nn;
pub mod overlay;
pub mod utils;

/// Build the HTTP application around an initialized detector.
pub fn app(detector: Arc<dyn EmotionDetector>, static_dir: PathBuf) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/healthcheck", get(healthcheck))
        .route("/static/*file", get(static_file))
        .route("/detect", post(detect))
        .layer(Extension(detector))
        .layer(Extension(Arc::new(StaticDir(static_dir))))
}
