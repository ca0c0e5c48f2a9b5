//! Local binary pattern histogram (LBPH) recognizer.
//!
//! Every face is scaled to `FACE_SIZE` square and turned into an LBP image (radius 1, eight
//! neighbours). The LBP image is split into an 8x8 grid; the 256-bin histogram of each cell,
//! divided by the cell's pixel count, is concatenated into the face's feature vector.
//! Prediction is nearest neighbour under the chi-square distance `2 * sum((a-b)^2 / (a+b))`.

use anyhow::Result;
use image::imageops::FilterType;
use image::GrayImage;

use super::{Prediction, UNKNOWN_LABEL};
use crate::error::CamwatchError;

/// Side length faces are normalized to before feature extraction and when saved as samples.
pub const FACE_SIZE: u32 = 100;
/// Distances above this are reported as `UNKNOWN_LABEL`.
pub const DEFAULT_THRESHOLD: f64 = 130.0;

const GRID_X: u32 = 8;
const GRID_Y: u32 = 8;
const BINS: usize = 256;

// Clockwise from the top-left neighbour.
const NEIGHBOURS: [(i32, i32); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
];

/// Trained recognizer state. Immutable once built.
#[derive(Clone, Debug)]
pub struct LbphModel {
    labels: Vec<String>,
    samples: Vec<(usize, Vec<f32>)>,
    threshold: f64,
}

impl LbphModel {
    /// Build a model from labeled grayscale faces.
    pub fn train<'a>(samples: impl IntoIterator<Item = (&'a str, &'a GrayImage)>) -> Result<Self> {
        let mut labels: Vec<String> = Vec::new();
        let mut features = Vec::new();
        for (label, face) in samples {
            let index = match labels.iter().position(|known| known == label) {
                Some(index) => index,
                None => {
                    labels.push(label.to_string());
                    labels.len() - 1
                }
            };
            features.push((index, spatial_histogram(face)));
        }
        if features.is_empty() {
            return Err(CamwatchError::training("no face samples to train on"));
        }
        Ok(Self {
            labels,
            samples: features,
            threshold: DEFAULT_THRESHOLD,
        })
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn predict(&self, face: &GrayImage) -> Prediction {
        let query = spatial_histogram(face);
        let nearest = self
            .samples
            .iter()
            .map(|(label, hist)| (*label, chi_square(hist, &query)))
            .min_by(|a, b| a.1.total_cmp(&b.1));

        match nearest {
            Some((label, distance)) if distance <= self.threshold => Prediction {
                label: self.labels[label].clone(),
                distance,
            },
            Some((_, distance)) => Prediction {
                label: UNKNOWN_LABEL.to_string(),
                distance,
            },
            None => Prediction {
                label: UNKNOWN_LABEL.to_string(),
                distance: f64::MAX,
            },
        }
    }
}

/// Scale a face crop to the square size the model works on.
pub fn normalize_face(face: &GrayImage) -> GrayImage {
    if face.dimensions() == (FACE_SIZE, FACE_SIZE) {
        return face.clone();
    }
    image::imageops::resize(face, FACE_SIZE, FACE_SIZE, FilterType::Triangle)
}

fn lbp_image(face: &GrayImage) -> GrayImage {
    let (width, height) = face.dimensions();
    if width < 3 || height < 3 {
        return GrayImage::new(0, 0);
    }
    GrayImage::from_fn(width - 2, height - 2, |x, y| {
        let (cx, cy) = (x as i32 + 1, y as i32 + 1);
        let center = face.get_pixel(cx as u32, cy as u32).0[0];
        let mut code = 0u8;
        for (bit, (dx, dy)) in NEIGHBOURS.iter().enumerate() {
            let neighbour = face.get_pixel((cx + dx) as u32, (cy + dy) as u32).0[0];
            if neighbour >= center {
                code |= 1 << (7 - bit);
            }
        }
        image::Luma([code])
    })
}

fn spatial_histogram(face: &GrayImage) -> Vec<f32> {
    let lbp = lbp_image(&normalize_face(face));
    let cell_w = lbp.width() / GRID_X;
    let cell_h = lbp.height() / GRID_Y;
    let mut features = vec![0f32; (GRID_X * GRID_Y) as usize * BINS];
    if cell_w == 0 || cell_h == 0 {
        return features;
    }
    let cell_pixels = (cell_w * cell_h) as f32;

    for gy in 0..GRID_Y {
        for gx in 0..GRID_X {
            let offset = ((gy * GRID_X + gx) as usize) * BINS;
            for y in gy * cell_h..(gy + 1) * cell_h {
                for x in gx * cell_w..(gx + 1) * cell_w {
                    let code = lbp.get_pixel(x, y).0[0] as usize;
                    features[offset + code] += 1.0;
                }
            }
            for bin in &mut features[offset..offset + BINS] {
                *bin /= cell_pixels;
            }
        }
    }
    features
}

fn chi_square(a: &[f32], b: &[f32]) -> f64 {
    let sum: f64 = a
        .iter()
        .zip(b)
        .map(|(&a, &b)| {
            let total = (a + b) as f64;
            if total > 0.0 {
                let diff = (a - b) as f64;
                diff * diff / total
            } else {
                0.0
            }
        })
        .sum();
    2.0 * sum
}
