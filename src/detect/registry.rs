use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};

use crate::config::ClassifierSettings;
use crate::detect::backend::RegionDetector;
use crate::detect::backends;
use crate::detect::result::DetectedRegion;
use crate::error::CamwatchError;
use crate::frame::Frame;

/// Thread-safe registry of region detectors, keyed by classifier id.
///
/// Detectors are wrapped in `Mutex` because `RegionDetector::detect` takes `&mut self`.
pub struct ClassifierRegistry {
    detectors: HashMap<String, Arc<Mutex<Box<dyn RegionDetector>>>>,
}

impl ClassifierRegistry {
    pub fn new() -> Self {
        Self {
            detectors: HashMap::new(),
        }
    }

    /// Load every classifier named in the settings. Ids are model paths.
    ///
    /// A classifier that fails to load is logged and left out; operations that need it
    /// report the failure when they start.
    pub fn load(settings: &ClassifierSettings) -> Self {
        let mut registry = Self::new();
        for id in [&settings.face, &settings.body] {
            if id.trim().is_empty() || registry.contains(id) {
                continue;
            }
            match backends::load_detector(Path::new(id)) {
                Ok(detector) => {
                    if let Err(err) = registry.register_boxed(id, detector) {
                        log::error!("classifier {} failed warm-up: {:#}", id, err);
                    }
                }
                Err(err) => log::error!("unable to load classifier {}: {:#}", id, err),
            }
        }
        registry
    }

    pub fn register<D: RegionDetector + 'static>(&mut self, id: &str, detector: D) -> Result<()> {
        self.register_boxed(id, Box::new(detector))
    }

    pub fn register_boxed(&mut self, id: &str, mut detector: Box<dyn RegionDetector>) -> Result<()> {
        detector.warm_up()?;
        log::info!("classifier {} registered ({})", id, detector.name());
        self.detectors
            .insert(id.to_string(), Arc::new(Mutex::new(detector)));
        Ok(())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.detectors.contains_key(id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.detectors.keys().cloned().collect()
    }

    /// Run the classifier `id` on `frame`, reporting failures.
    pub fn try_detect(&self, frame: &Frame, id: &str) -> Result<Vec<DetectedRegion>> {
        let detector = self
            .detectors
            .get(id)
            .ok_or_else(|| CamwatchError::classifier(format!("classifier '{}' not loaded", id)))?;
        let mut guard = detector
            .lock()
            .map_err(|_| anyhow!("classifier '{}' lock poisoned", id))?;
        let regions = guard.detect(frame)?;
        Ok(regions
            .into_iter()
            .map(|region| region.clamp_to(frame.width, frame.height))
            .filter(|region| !region.is_empty())
            .collect())
    }

    /// Run the classifier `id` on `frame`. Failures are logged and yield no regions.
    pub fn detect_regions(&self, frame: &Frame, id: &str) -> Vec<DetectedRegion> {
        match self.try_detect(frame, id) {
            Ok(regions) => regions,
            Err(err) => {
                log::error!("unable to retrieve regions with classifier {}: {:#}", id, err);
                Vec::new()
            }
        }
    }
}

impl Default for ClassifierRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    struct FixedDetector(Vec<DetectedRegion>);

    impl RegionDetector for FixedDetector {
        fn name(&self) -> &str {
            "fixed"
        }

        fn detect(&mut self, _frame: &Frame) -> Result<Vec<DetectedRegion>> {
            Ok(self.0.clone())
        }
    }

    struct BrokenDetector;

    impl RegionDetector for BrokenDetector {
        fn name(&self) -> &str {
            "broken"
        }

        fn detect(&mut self, _frame: &Frame) -> Result<Vec<DetectedRegion>> {
            Err(anyhow!("model file corrupt"))
        }
    }

    fn frame() -> Frame {
        Frame::from_rgb(RgbImage::new(64, 48))
    }

    #[test]
    fn regions_are_clipped_and_empty_ones_dropped() {
        let mut registry = ClassifierRegistry::new();
        registry
            .register(
                "face",
                FixedDetector(vec![
                    DetectedRegion::from_xywh(50, 40, 30, 30),
                    DetectedRegion::from_xywh(100, 100, 5, 5),
                ]),
            )
            .unwrap();
        let regions = registry.detect_regions(&frame(), "face");
        assert_eq!(regions, vec![DetectedRegion::new(50, 40, 64, 48)]);
    }

    #[test]
    fn failures_degrade_to_empty() {
        let mut registry = ClassifierRegistry::new();
        registry.register("body", BrokenDetector).unwrap();
        assert!(registry.detect_regions(&frame(), "body").is_empty());
        assert!(registry.detect_regions(&frame(), "missing").is_empty());

        let err = registry.try_detect(&frame(), "missing").unwrap_err();
        assert!(matches!(
            crate::error::category(&err),
            Some(CamwatchError::Classifier(_))
        ));
    }

    #[test]
    fn unloadable_classifiers_are_left_out() {
        let settings = ClassifierSettings {
            face: "/nonexistent/face.onnx".to_string(),
            body: String::new(),
        };
        let registry = ClassifierRegistry::load(&settings);
        assert!(registry.ids().is_empty());
    }
}
