//! Endpoints of HTTP server.
//!
use std::{
    path::{Component, Path as FsPath, PathBuf},
    sync::Arc,
};

use axum::{
    extract::Path,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    Extension, Json,
};
use common::protocol::{DetectRequest, DetectResponse, EmotionSummary};
use thiserror::Error;

use crate::{
    detector::EmotionDetector,
    frame::{decode_base64_image, DecodeError},
};

const INDEX_HTML: &str = include_str!("../resources/index.html");

/// Directory served below `/static`.
#[derive(Clone, Debug)]
pub struct StaticDir(pub PathBuf);

/// Reasons a detection request produces no result.
#[derive(Debug, Error)]
pub enum DetectError {
    #[error("No image data")]
    MissingImage,
    #[error("Could not decode image: {0}")]
    Decode(#[from] DecodeError),
    #[error("No face detected")]
    NoFace,
    #[error("Detection failed: {0}")]
    Detector(String),
}

impl IntoResponse for DetectError {
    fn into_response(self) -> Response {
        // Problems with the submitted image are reported to the page, not as HTTP failures
        let status = match self {
            DetectError::Detector(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::OK,
        };
        let body = DetectResponse::Error {
            error: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

/// Health check endpoint.
pub async fn healthcheck() -> &'static str {
    "healthy"
}

/// Capture page.
pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// Static assets of the capture page.
pub async fn static_file(
    Extension(static_dir): Extension<Arc<StaticDir>>,
    Path(file): Path<String>,
) -> Response {
    let Some(path) = resolve_static_path(&static_dir.0, &file) else {
        log::warn!("Rejected static file request for {file:?}");
        return StatusCode::NOT_FOUND.into_response();
    };

    match tokio::fs::read(&path).await {
        Ok(content) => ([(header::CONTENT_TYPE, content_type(&path))], content).into_response(),
        Err(err) => {
            log::debug!("Static file {} not served: {err}", path.display());
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

/// Detect the emotion of the face in a base64 encoded image.
pub async fn detect(
    Extension(detector): Extension<Arc<dyn EmotionDetector>>,
    Json(request): Json<DetectRequest>,
) -> Result<Json<EmotionSummary>, DetectError> {
    let payload = match request.image {
        Some(image) if !image.is_empty() => image,
        _ => return Err(DetectError::MissingImage),
    };

    let summary = tokio::task::spawn_blocking(move || summarize(detector.as_ref(), &payload))
        .await
        .map_err(|err| DetectError::Detector(err.to_string()))??;

    log::info!(
        "Detected {} ({:.2})",
        summary.dominant_emotion,
        summary.confidence
    );

    Ok(Json(summary))
}

/// Decode the payload, run the detector and summarize the first face.
///
/// Faces come most confident first, so the first one is the one reported.
fn summarize(detector: &dyn EmotionDetector, payload: &str) -> Result<EmotionSummary, DetectError> {
    let frame = decode_base64_image(payload)?;
    log::debug!("Decoded frame of {}x{}", frame.width(), frame.height());

    let detections = detector
        .detect(&frame)
        .map_err(|err| DetectError::Detector(format!("{err:#}")))?;
    if detections.len() > 1 {
        log::debug!("{} faces detected, reporting the first", detections.len());
    }

    detections
        .first()
        .and_then(EmotionSummary::from_detection)
        .ok_or(DetectError::NoFace)
}

/// Join a requested file onto the static directory, refusing anything that escapes it.
fn resolve_static_path(root: &FsPath, file: &str) -> Option<PathBuf> {
    let relative = FsPath::new(file.trim_start_matches('/'));
    let is_plain = relative
        .components()
        .all(|component| matches!(component, Component::Normal(_)));

    match is_plain && relative.components().next().is_some() {
        true => Some(root.join(relative)),
        false => None,
    }
}

fn content_type(path: &FsPath) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("css") => "text/css",
        Some("js") => "text/javascript",
        Some("html") => "text/html; charset=utf-8",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("svg") => "image/svg+xml",
        Some("ico") => "image/x-icon",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod test {

    use super::*;

    #[test]
    fn test_static_paths() {
        let root = FsPath::new("/srv/static");

        assert_eq!(
            resolve_static_path(root, "styles.css"),
            Some(root.join("styles.css"))
        );
        assert_eq!(
            resolve_static_path(root, "css/site.css"),
            Some(root.join("css/site.css"))
        );
        assert_eq!(resolve_static_path(root, "../Cargo.toml"), None);
        assert_eq!(resolve_static_path(root, "css/../../secret"), None);
        assert_eq!(resolve_static_path(root, ""), None);
    }

    #[test]
    fn test_content_types() {
        assert_eq!(content_type(FsPath::new("a/styles.css")), "text/css");
        assert_eq!(content_type(FsPath::new("shot.JPG")), "application/octet-stream");
        assert_eq!(content_type(FsPath::new("shot.jpeg")), "image/jpeg");
    }
}
