//! On-disk face samples.
//!
//! Layout: `<root>/<label>/<file>.png|.jpg`. Loose image files directly under `<root>` are not
//! samples; `predict_samples` treats them as faces to identify.

use anyhow::{Context, Result};
use image::GrayImage;
use std::path::{Path, PathBuf};

use super::lbph::normalize_face;
use crate::error::CamwatchError;
use crate::frame::random_name;

const SAMPLE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

pub fn is_sample_image(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                SAMPLE_EXTENSIONS
                    .iter()
                    .any(|known| ext.eq_ignore_ascii_case(known))
            })
            .unwrap_or(false)
}

/// Every `(label, path)` pair under `root`, sorted for stable training order.
pub fn collect_samples(root: &Path) -> Result<Vec<(String, PathBuf)>> {
    let entries = std::fs::read_dir(root)
        .map_err(|e| CamwatchError::training(format!("read samples root {}: {}", root.display(), e)))?;
    let mut samples = Vec::new();
    for entry in entries {
        let dir = entry?.path();
        if !dir.is_dir() {
            continue;
        }
        let Some(label) = dir.file_name().and_then(|name| name.to_str()) else {
            log::warn!("skipping sample directory with non UTF-8 name {}", dir.display());
            continue;
        };
        for file in std::fs::read_dir(&dir)? {
            let path = file?.path();
            if is_sample_image(&path) {
                samples.push((label.to_string(), path));
            }
        }
    }
    samples.sort();
    Ok(samples)
}

/// Load and grayscale every sample under `root`.
pub fn load_samples(root: &Path) -> Result<Vec<(String, GrayImage)>> {
    collect_samples(root)?
        .into_iter()
        .map(|(label, path)| {
            let image = image::open(&path).map_err(|e| {
                CamwatchError::training(format!("read sample {}: {}", path.display(), e))
            })?;
            Ok((label, image.into_luma8()))
        })
        .collect()
}

/// Image files directly under `root`.
pub fn loose_images(root: &Path) -> Result<Vec<PathBuf>> {
    let mut images = Vec::new();
    for entry in std::fs::read_dir(root)
        .with_context(|| format!("read samples root {}", root.display()))?
    {
        let path = entry?.path();
        if is_sample_image(&path) {
            images.push(path);
        }
    }
    images.sort();
    Ok(images)
}

/// Store `face`, normalized to the model size, as a new sample of `label`.
pub fn save_sample(root: &Path, label: &str, face: &GrayImage) -> Result<PathBuf> {
    let dir = root.join(label);
    save_face(&dir, face)
}

/// Write `face`, normalized to the model size, under `dir` with a random name.
pub fn save_face(dir: &Path, face: &GrayImage) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).with_context(|| format!("create face directory {}", dir.display()))?;
    let path = dir.join(format!("{}.png", random_name()));
    normalize_face(face)
        .save(&path)
        .with_context(|| format!("write face {}", path.display()))?;
    Ok(path)
}
