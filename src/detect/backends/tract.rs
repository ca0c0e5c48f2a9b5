#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::FilterType;
use tract_onnx::prelude::*;

use crate::detect::backend::RegionDetector;
use crate::detect::result::DetectedRegion;
use crate::error::CamwatchError;
use crate::frame::Frame;

const DEFAULT_INPUT_SIZE: u32 = 320;

/// ONNX region detector.
///
/// Expects a model taking `1x3xHxW` RGB in `0..1` and producing rows of
/// `[x1, y1, x2, y2, score]` with corners normalized to `0..1`
/// (shape `Nx5` or `1xNx5`).
pub struct TractDetector {
    name: String,
    model: TypedRunnableModel<TypedModel>,
    input_width: u32,
    input_height: u32,
    confidence_threshold: f32,
}

impl TractDetector {
    /// Load an ONNX model from disk with the default input size.
    pub fn new(model_path: &Path) -> Result<Self> {
        Self::with_input_size(model_path, DEFAULT_INPUT_SIZE, DEFAULT_INPUT_SIZE)
    }

    pub fn with_input_size(model_path: &Path, width: u32, height: u32) -> Result<Self> {
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .map_err(|err| {
                CamwatchError::classifier(format!(
                    "failed to load ONNX model from {}: {}",
                    model_path.display(),
                    err
                ))
            })?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, height as usize, width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            name: format!("tract:{}", model_path.display()),
            model,
            input_width: width,
            input_height: height,
            confidence_threshold: 0.5,
        })
    }

    /// Override the default confidence threshold.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    fn build_input(&self, frame: &Frame) -> Tensor {
        let rgb = image::imageops::resize(
            &frame.to_rgb_image(),
            self.input_width,
            self.input_height,
            FilterType::Triangle,
        );
        tract_ndarray::Array4::from_shape_fn(
            (1, 3, self.input_height as usize, self.input_width as usize),
            |(_, channel, y, x)| rgb.get_pixel(x as u32, y as u32).0[channel] as f32 / 255.0,
        )
        .into_tensor()
    }

    fn extract_regions(&self, outputs: TVec<TValue>, frame: &Frame) -> Result<Vec<DetectedRegion>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let rows = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let values: Vec<f32> = rows.iter().copied().collect();
        if values.len() % 5 != 0 {
            return Err(anyhow!(
                "model output has {} values, expected rows of 5",
                values.len()
            ));
        }

        let scale_x = frame.width as f32;
        let scale_y = frame.height as f32;
        Ok(values
            .chunks_exact(5)
            .filter(|row| row[4].is_finite() && row[4] >= self.confidence_threshold)
            .map(|row| {
                let to_px = |v: f32, scale: f32| (v.clamp(0.0, 1.0) * scale).round() as u32;
                DetectedRegion::new(
                    to_px(row[0], scale_x),
                    to_px(row[1], scale_y),
                    to_px(row[2], scale_x),
                    to_px(row[3], scale_y),
                )
            })
            .filter(|region| !region.is_empty())
            .collect())
    }
}

impl RegionDetector for TractDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<DetectedRegion>> {
        let input = self.build_input(frame);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.extract_regions(outputs, frame)
    }
}
