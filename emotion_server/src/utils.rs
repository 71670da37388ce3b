//! Utility functions
//!
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use reqwest::Client;

/// Where a pretrained model can be fetched from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModelSource {
    pub file_name: &'static str,
    pub url: &'static str,
}

pub const ULTRAFACE_320: ModelSource = ModelSource {
    file_name: "version-RFB-320.onnx",
    url: "https://github.com/onnx/models/raw/main/validated/vision/body_analysis/ultraface/models/version-RFB-320.onnx",
};

pub const ULTRAFACE_640: ModelSource = ModelSource {
    file_name: "version-RFB-640.onnx",
    url: "https://github.com/onnx/models/raw/main/validated/vision/body_analysis/ultraface/models/version-RFB-640.onnx",
};

pub const EMOTION_FERPLUS: ModelSource = ModelSource {
    file_name: "emotion-ferplus-8.onnx",
    url: "https://github.com/onnx/models/raw/main/validated/vision/body_analysis/emotion_ferplus/model/emotion-ferplus-8.onnx",
};

/// Directory downloaded models are cached in.
pub fn model_cache_dir() -> Result<PathBuf> {
    dirs::cache_dir()
        .map(|dir| dir.join("emotion_detection").join("models"))
        .context("could not determine cache directory")
}

/// Get a local path to a model.
///
/// An explicitly given path has to exist. Otherwise the model is looked up in the cache
/// directory and downloaded there if it is missing.
pub async fn resolve_model(
    client: &Client,
    source: &ModelSource,
    explicit: Option<&Path>,
) -> Result<PathBuf> {
    match explicit {
        Some(path) => {
            if !path.is_file() {
                bail!("model file {} does not exist", path.display());
            }
            Ok(path.to_path_buf())
        }
        None => resolve_cached_model(client, source, &model_cache_dir()?).await,
    }
}

/// Look up a model in `cache_dir`, downloading it if it is not there yet.
pub async fn resolve_cached_model(
    client: &Client,
    source: &ModelSource,
    cache_dir: &Path,
) -> Result<PathBuf> {
    let cached_path = cache_dir.join(source.file_name);
    if cached_path.is_file() {
        log::debug!("Using cached model {}", cached_path.display());
        return Ok(cached_path);
    }

    tokio::fs::create_dir_all(cache_dir)
        .await
        .with_context(|| format!("failed to create {}", cache_dir.display()))?;

    log::info!("Downloading {} to {}", source.url, cached_path.display());

    // Write to a temporary file first so that an interrupted download is never picked up
    let part_path = cached_path.with_extension("part");
    download_file(client, source.url, &part_path).await?;
    tokio::fs::rename(&part_path, &cached_path).await?;

    Ok(cached_path)
}

/// Download a file from a URL to a given filepath.
pub async fn download_file(
    client: &Client,
    url: &str,
    filepath: impl AsRef<Path>,
) -> Result<()> {
    let resp = client.get(url).send().await?.error_for_status()?;
    let content = resp.bytes().await?;

    tokio::fs::write(filepath.as_ref(), &content)
        .await
        .with_context(|| format!("failed to write {}", filepath.as_ref().display()))?;

    Ok(())
}
