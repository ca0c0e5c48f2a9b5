//! Face recognition.
//!
//! `FaceEngine` owns the trained LBPH model. Training reads labeled samples from disk and only
//! replaces the current model once the whole run succeeded, so a failed `learn` leaves the
//! previous model in service. Prediction trains implicitly when no model exists yet.

pub mod lbph;
mod recognize;
pub mod samples;

use anyhow::{anyhow, Result};
use image::GrayImage;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

pub use lbph::{LbphModel, FACE_SIZE};
pub use recognize::{FaceRecognizer, IdentityPredictor, PredictionOutputs};

/// Label reported for faces that match no trained identity closely enough.
pub const UNKNOWN_LABEL: &str = "Unknown";

#[derive(Clone, Debug, PartialEq)]
pub struct Prediction {
    pub label: String,
    /// Non-negative; smaller is a closer match.
    pub distance: f64,
}

impl Prediction {
    pub fn is_known(&self) -> bool {
        self.label != UNKNOWN_LABEL
    }
}

pub struct FaceEngine {
    samples_root: PathBuf,
    threshold: f64,
    model: RwLock<Option<Arc<LbphModel>>>,
}

impl FaceEngine {
    pub fn new(samples_root: impl Into<PathBuf>) -> Self {
        Self {
            samples_root: samples_root.into(),
            threshold: lbph::DEFAULT_THRESHOLD,
            model: RwLock::new(None),
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn samples_root(&self) -> &Path {
        &self.samples_root
    }

    pub fn is_trained(&self) -> bool {
        self.model.read().map(|model| model.is_some()).unwrap_or(false)
    }

    /// Train from the configured samples root.
    pub fn learn(&self) -> Result<()> {
        self.learn_from(&self.samples_root)
    }

    /// Train from `root`: one label per immediate subdirectory.
    pub fn learn_from(&self, root: &Path) -> Result<()> {
        let samples = samples::load_samples(root)?;
        let model = LbphModel::train(samples.iter().map(|(label, face)| (label.as_str(), face)))?
            .with_threshold(self.threshold);
        log::info!(
            "face model trained on {} samples ({} labels) from {}",
            model.sample_count(),
            model.labels().len(),
            root.display()
        );
        let mut guard = self
            .model
            .write()
            .map_err(|_| anyhow!("face model lock poisoned"))?;
        *guard = Some(Arc::new(model));
        Ok(())
    }

    pub fn predict(&self, face: &GrayImage) -> Result<Prediction> {
        let model = match self.current_model()? {
            Some(model) => model,
            None => {
                self.learn()?;
                self.current_model()?
                    .ok_or_else(|| anyhow!("face model missing after training"))?
            }
        };
        Ok(model.predict(face))
    }

    fn current_model(&self) -> Result<Option<Arc<LbphModel>>> {
        let guard = self
            .model
            .read()
            .map_err(|_| anyhow!("face model lock poisoned"))?;
        Ok(guard.clone())
    }
}
