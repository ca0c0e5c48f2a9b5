use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;

use super::{samples, FaceEngine, Prediction};
use crate::detect::{ClassifierRegistry, DetectedRegion};
use crate::frame::Frame;

/// Names the identities visible in a frame. May annotate the frame.
pub trait IdentityPredictor: Send + Sync {
    fn predict_identities(&self, frame: &mut Frame) -> Result<Vec<String>>;
}

/// Where prediction side effects go. `None` disables an output.
#[derive(Clone, Debug, Default)]
pub struct PredictionOutputs {
    pub predicted_faces: Option<PathBuf>,
    pub predicted_images: Option<PathBuf>,
    /// Samples root that recognized faces are added to.
    pub reinforce_into: Option<PathBuf>,
}

/// Face detection followed by recognition of every detected face.
pub struct FaceRecognizer {
    engine: Arc<FaceEngine>,
    registry: Arc<ClassifierRegistry>,
    face_classifier: String,
    outputs: PredictionOutputs,
}

impl FaceRecognizer {
    pub fn new(
        engine: Arc<FaceEngine>,
        registry: Arc<ClassifierRegistry>,
        face_classifier: impl Into<String>,
    ) -> Self {
        Self {
            engine,
            registry,
            face_classifier: face_classifier.into(),
            outputs: PredictionOutputs::default(),
        }
    }

    pub fn with_outputs(mut self, outputs: PredictionOutputs) -> Self {
        self.outputs = outputs;
        self
    }

    pub fn engine(&self) -> &Arc<FaceEngine> {
        &self.engine
    }

    pub fn detect_faces(&self, frame: &Frame) -> Vec<DetectedRegion> {
        self.registry.detect_regions(frame, &self.face_classifier)
    }

    /// Predict every face in `frame`, annotating each with its label.
    pub fn predict_frame(&self, frame: &mut Frame) -> Result<Vec<Prediction>> {
        let regions = self.detect_faces(frame);
        let mut predictions = Vec::with_capacity(regions.len());
        for region in regions {
            let Some(face) = frame.crop_gray(&region) else {
                continue;
            };
            let prediction = self.engine.predict(&face)?;
            log::info!(
                "predicted face '{}' (distance {:.1})",
                prediction.label,
                prediction.distance
            );

            if let Some(dir) = &self.outputs.predicted_faces {
                if let Err(err) = samples::save_face(dir, &face) {
                    log::warn!("unable to save predicted face: {:#}", err);
                }
            }
            if prediction.is_known() {
                if let Some(root) = &self.outputs.reinforce_into {
                    if let Err(err) = samples::save_sample(root, &prediction.label, &face) {
                        log::warn!("unable to add sample for {}: {:#}", prediction.label, err);
                    }
                }
            }
            frame.annotate(&region.with_label(prediction.label.clone()));
            predictions.push(prediction);
        }

        if !predictions.is_empty() {
            if let Some(dir) = &self.outputs.predicted_images {
                if let Err(err) = frame.save_png(dir) {
                    log::warn!("unable to save predicted image: {:#}", err);
                }
            }
        }
        Ok(predictions)
    }
}

impl IdentityPredictor for FaceRecognizer {
    fn predict_identities(&self, frame: &mut Frame) -> Result<Vec<String>> {
        Ok(self
            .predict_frame(frame)?
            .into_iter()
            .map(|prediction| prediction.label)
            .collect())
    }
}
