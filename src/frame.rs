//! Decoded camera frames.
//!
//! A `Frame` is one image read from a device: RGB24 (3 channels) or 8-bit grayscale
//! (1 channel). Devices hand out a fresh `Frame` per read; anything that keeps a frame past the
//! handler call (the recording buffer, the motion background) stores its own clone.

use anyhow::{anyhow, Context, Result};
use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use std::path::{Path, PathBuf};

use crate::detect::DetectedRegion;

const ANNOTATION_RGB: Rgb<u8> = Rgb([255, 255, 255]);
const ANNOTATION_LUMA: Luma<u8> = Luma([255]);
const ANNOTATION_THICKNESS: u32 = 2;

#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    channels: u8,
}

impl Frame {
    /// Wrap raw interleaved pixels. `channels` must be 1 (gray) or 3 (RGB).
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8) -> Result<Self> {
        if channels != 1 && channels != 3 {
            return Err(anyhow!("unsupported channel count {}", channels));
        }
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(channels as usize))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if data.len() != expected {
            return Err(anyhow!(
                "frame length mismatch: expected {} bytes for {}x{}x{}, got {}",
                expected,
                width,
                height,
                channels,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
            channels,
        })
    }

    pub fn from_rgb(image: RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            data: image.into_raw(),
            width,
            height,
            channels: 3,
        }
    }

    pub fn from_gray(image: GrayImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            data: image.into_raw(),
            width,
            height,
            channels: 1,
        }
    }

    /// Decode an encoded still (PNG/JPEG/GIF) into an RGB frame.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let image = image::load_from_memory(bytes).context("decode image bytes")?;
        Ok(Self::from_rgb(image.into_rgb8()))
    }

    pub fn open(path: &Path) -> Result<Self> {
        let image =
            image::open(path).with_context(|| format!("read image {}", path.display()))?;
        Ok(Self::from_rgb(image.into_rgb8()))
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    pub fn to_rgb_image(&self) -> RgbImage {
        match self.channels {
            3 => RgbImage::from_raw(self.width, self.height, self.data.clone())
                .unwrap_or_else(|| RgbImage::new(self.width, self.height)),
            _ => DynamicImage::ImageLuma8(self.to_gray_image()).into_rgb8(),
        }
    }

    pub fn to_gray_image(&self) -> GrayImage {
        match self.channels {
            1 => GrayImage::from_raw(self.width, self.height, self.data.clone())
                .unwrap_or_else(|| GrayImage::new(self.width, self.height)),
            _ => DynamicImage::ImageRgb8(self.to_rgb_image()).into_luma8(),
        }
    }

    /// Grayscale crop of `region`, clipped to the frame. `None` when nothing is left.
    pub fn crop_gray(&self, region: &DetectedRegion) -> Option<GrayImage> {
        let region = region.clamp_to(self.width, self.height);
        if region.is_empty() {
            return None;
        }
        let gray = self.to_gray_image();
        let view = image::imageops::crop_imm(
            &gray,
            region.left,
            region.top,
            region.width(),
            region.height(),
        );
        Some(view.to_image())
    }

    /// Draw a hollow box around `region`.
    pub fn annotate(&mut self, region: &DetectedRegion) {
        let region = region.clamp_to(self.width, self.height);
        if region.is_empty() {
            return;
        }
        let data = std::mem::take(&mut self.data);
        self.data = match self.channels {
            3 => match RgbImage::from_raw(self.width, self.height, data) {
                Some(mut image) => {
                    for inset in 0..ANNOTATION_THICKNESS {
                        if let Some(rect) = inset_rect(&region, inset) {
                            draw_hollow_rect_mut(&mut image, rect, ANNOTATION_RGB);
                        }
                    }
                    image.into_raw()
                }
                None => Vec::new(),
            },
            _ => match GrayImage::from_raw(self.width, self.height, data) {
                Some(mut image) => {
                    for inset in 0..ANNOTATION_THICKNESS {
                        if let Some(rect) = inset_rect(&region, inset) {
                            draw_hollow_rect_mut(&mut image, rect, ANNOTATION_LUMA);
                        }
                    }
                    image.into_raw()
                }
                None => Vec::new(),
            },
        };
        if let Some(label) = region.label.as_deref() {
            log::debug!(
                "annotated '{}' at ({}, {})-({}, {})",
                label,
                region.left,
                region.top,
                region.right,
                region.bottom
            );
        }
    }

    /// Write the frame as a PNG with a random file name under `dir`.
    pub fn save_png(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("create image directory {}", dir.display()))?;
        let path = dir.join(format!("{}.png", random_name()));
        let written = match self.channels {
            3 => self.to_rgb_image().save(&path),
            _ => self.to_gray_image().save(&path),
        };
        written.with_context(|| format!("write image {}", path.display()))?;
        Ok(path)
    }
}

fn inset_rect(region: &DetectedRegion, inset: u32) -> Option<Rect> {
    let width = region.width().checked_sub(inset * 2)?;
    let height = region.height().checked_sub(inset * 2)?;
    if width == 0 || height == 0 {
        return None;
    }
    Some(
        Rect::at((region.left + inset) as i32, (region.top + inset) as i32)
            .of_size(width, height),
    )
}

/// 128-bit random hex string, used to disambiguate generated file names.
pub(crate) fn random_name() -> String {
    format!("{:032x}", rand::random::<u128>())
}
