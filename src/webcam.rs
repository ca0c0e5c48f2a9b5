//! Operations offered on top of the capture pipeline.
//!
//! `Webcam` owns the single capture session, the shared frame buffer, the authenticated
//! identity slot, the face engine, the classifiers, the user directory and the upload watcher.
//! Every long-running mode (authentication, motion recording, watching) is one capture
//! session with a different handler; starting a mode replaces whatever was running.

use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::capture::{CaptureController, FrameHandler};
use crate::config::CamwatchConfig;
use crate::detect::{ClassifierRegistry, MotionDetector};
use crate::error::CamwatchError;
use crate::face::{samples, FaceEngine, FaceRecognizer, Prediction, PredictionOutputs};
use crate::frame::Frame;
use crate::handlers::{AuthenticationHandler, MotionRecordHandler, WatchHandler};
use crate::identity::{
    Identity, InMemoryUserDirectory, JsonUserDirectory, SharedIdentity, UserDirectory,
};
use crate::ingest::{DeviceProvider, FrameSource, SystemDevices};
use crate::recording::{FrameBufferManager, SharedBuffer, VideoEncoder};
use crate::upload::{store_from_settings, RemoteStore, UploadService};

pub struct Webcam {
    config: CamwatchConfig,
    capture: CaptureController,
    buffer: SharedBuffer,
    identity: SharedIdentity,
    recording: Arc<AtomicBool>,
    engine: Arc<FaceEngine>,
    registry: Arc<ClassifierRegistry>,
    recognizer: Arc<FaceRecognizer>,
    users: Arc<dyn UserDirectory>,
    uploads: UploadService,
}

impl Webcam {
    /// Build from configuration: system camera devices, classifiers loaded from their model
    /// files, users from `users_path`, and the configured upload store.
    pub fn new(config: CamwatchConfig) -> Result<Self> {
        let provider: Arc<dyn DeviceProvider> = Arc::new(SystemDevices::new(&config.camera));
        let registry = ClassifierRegistry::load(&config.classifiers);
        let users: Arc<dyn UserDirectory> = match &config.users_path {
            Some(path) => Arc::new(JsonUserDirectory::new(path)),
            None => {
                log::warn!("no users file configured; authentication will find nobody");
                Arc::new(InMemoryUserDirectory::new())
            }
        };
        let store = store_from_settings(&config.upload)?;
        Ok(Self::from_parts(config, provider, registry, users, store))
    }

    pub fn from_parts(
        config: CamwatchConfig,
        provider: Arc<dyn DeviceProvider>,
        registry: ClassifierRegistry,
        users: Arc<dyn UserDirectory>,
        store: Option<Arc<dyn RemoteStore>>,
    ) -> Self {
        let encoder = VideoEncoder::new(&config.paths.videos, config.recording.fps);
        let buffer = Arc::new(Mutex::new(FrameBufferManager::new(
            encoder,
            config.recording.max_frames,
            (config.camera.width, config.camera.height),
        )));
        let engine = Arc::new(FaceEngine::new(&config.paths.faces));
        let registry = Arc::new(registry);
        let outputs = PredictionOutputs {
            predicted_faces: config.paths.predicted_faces.clone(),
            predicted_images: config.paths.predicted_images.clone(),
            reinforce_into: config
                .reinforce_samples
                .then(|| config.paths.faces.clone()),
        };
        let recognizer = Arc::new(
            FaceRecognizer::new(engine.clone(), registry.clone(), &config.classifiers.face)
                .with_outputs(outputs),
        );
        let uploads = UploadService::new(store, config.upload.poll_interval);

        Self {
            capture: CaptureController::new(provider),
            buffer,
            identity: SharedIdentity::default(),
            recording: Arc::new(AtomicBool::new(false)),
            engine,
            registry,
            recognizer,
            users,
            uploads,
            config,
        }
    }

    pub fn config(&self) -> &CamwatchConfig {
        &self.config
    }

    pub fn face_engine(&self) -> &Arc<FaceEngine> {
        &self.engine
    }

    pub fn buffer(&self) -> &SharedBuffer {
        &self.buffer
    }

    pub fn uploads(&self) -> &UploadService {
        &self.uploads
    }

    // -- capture sessions --

    /// Start capturing with the default (authentication) handler. Fails when the face
    /// classifier is not available.
    pub fn start_capture(&self) -> Result<()> {
        self.require_classifier(&self.config.classifiers.face, "face")?;
        self.start_capture_with(Box::new(self.authentication_handler()))
    }

    pub fn start_capture_with(&self, handler: Box<dyn FrameHandler>) -> Result<()> {
        self.capture
            .start(&self.config.camera.device, handler)
            .with_context(|| format!("start capture on {}", self.config.camera.device))?;
        if let Some((width, height)) = self.capture.frame_size() {
            if width > 0 && height > 0 {
                self.lock_buffer()?.set_frame_size(width, height);
            }
        }
        Ok(())
    }

    /// Returns false when no session was running.
    pub fn stop_capture(&self) -> Result<bool> {
        self.capture.stop()
    }

    pub fn is_capturing(&self) -> bool {
        self.capture.is_capturing()
    }

    pub fn frames_handled(&self) -> u64 {
        self.capture.frames_handled()
    }

    /// True while the watch handler is recording a sighting.
    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    pub fn authenticated_identity(&self) -> Option<Identity> {
        self.identity.lock().ok().and_then(|guard| guard.clone())
    }

    // -- recording modes --

    pub fn start_motion_detection(&self) -> Result<()> {
        self.start_capture_with(Box::new(self.motion_handler()))?;
        self.start_uploads()
    }

    /// Stop recording motion. Pending frames are written out; returns the video, if any.
    pub fn stop_motion_detection(&self) -> Result<Option<PathBuf>> {
        self.stop_recording_mode()
    }

    /// Record motion for `duration`, then stop and write out what was captured.
    pub fn record_motion(&self, duration: Duration) -> Result<Option<PathBuf>> {
        self.start_capture_with(Box::new(self.motion_handler()))?;
        std::thread::sleep(duration);
        self.stop_capture()?;
        self.lock_buffer()?.flush()
    }

    fn motion_handler(&self) -> MotionRecordHandler {
        MotionRecordHandler::new(MotionDetector::new(), self.buffer.clone())
            .with_snapshots(self.config.paths.motion_snapshots.clone())
    }

    /// Watch for bodies. Fails when the body classifier is not available.
    pub fn start_watching(&self) -> Result<()> {
        let body = &self.config.classifiers.body;
        self.require_classifier(body, "body")?;
        let handler = WatchHandler::new(
            self.registry.clone(),
            body.clone(),
            self.buffer.clone(),
            self.config.recording.sequence,
            self.recording.clone(),
        );
        self.start_capture_with(Box::new(handler))?;
        self.start_uploads()
    }

    pub fn stop_watching(&self) -> Result<Option<PathBuf>> {
        self.stop_recording_mode()
    }

    fn stop_recording_mode(&self) -> Result<Option<PathBuf>> {
        self.recording.store(false, Ordering::SeqCst);
        self.stop_capture()?;
        let flushed = self.lock_buffer()?.flush();
        if let Err(err) = self.uploads.stop_upload_watcher() {
            log::error!("unable to stop upload watcher: {:#}", err);
        }
        flushed
    }

    /// A watcher that fails to start takes the capture session down with it.
    fn start_uploads(&self) -> Result<()> {
        let videos = &self.config.paths.videos;
        match self.uploads.start_upload_watcher(videos) {
            Ok(true) => Ok(()),
            Ok(false) => {
                log::info!("recordings stay in {}", videos.display());
                Ok(())
            }
            Err(err) => {
                self.recording.store(false, Ordering::SeqCst);
                if let Err(stop_err) = self.stop_capture() {
                    log::error!("unable to stop capture: {:#}", stop_err);
                }
                Err(err.context("start upload watcher"))
            }
        }
    }

    // -- face recognition --

    pub fn authentication_handler(&self) -> AuthenticationHandler {
        AuthenticationHandler::new(
            self.recognizer.clone(),
            self.users.clone(),
            self.config.authentication.vote_threshold,
            self.identity.clone(),
        )
    }

    /// Run an authentication session until a user is resolved or the poll budget runs out.
    pub fn authenticate(&self) -> Result<Option<Identity>> {
        log::info!("starting authentication using face recognition");
        if !self.engine.is_trained() {
            if let Err(err) = self.engine.learn() {
                log::error!("unable to learn faces: {:#}", err);
            }
        }
        // The previous session may still write into the slot until it is joined.
        self.stop_capture()?;
        self.set_identity(None)?;
        self.start_capture()?;

        let settings = &self.config.authentication;
        for _ in 0..settings.poll_loops {
            if self.authenticated_identity().is_some() {
                break;
            }
            std::thread::sleep(settings.poll_interval);
        }
        self.stop_capture()?;

        let identity = self.authenticated_identity();
        match &identity {
            Some(user) => log::info!("user {} authenticated", user.name),
            None => log::info!("authentication failed"),
        }
        Ok(identity)
    }

    /// Authenticate from a single still: the first recognized face with a known user wins.
    pub fn authenticate_snapshot(&self) -> Result<Option<Identity>> {
        self.set_identity(None)?;
        let found = self
            .predict_snapshot()?
            .into_iter()
            .find(|identity| identity.user_id != 0);
        self.set_identity(found.clone())?;
        Ok(found)
    }

    pub fn learn_faces(&self) -> Result<()> {
        self.engine.learn()
    }

    pub fn snapshot(&self) -> Result<Frame> {
        FrameSource::new(self.capture.provider().clone(), &self.config.camera.device).capture()
    }

    /// Save every face of a still into the faces root, where `predict_samples` picks them up.
    pub fn capture_faces(&self) -> Result<Vec<PathBuf>> {
        let frame = self.snapshot()?;
        let mut saved = Vec::new();
        for region in self.recognizer.detect_faces(&frame) {
            if let Some(face) = frame.crop_gray(&region) {
                saved.push(samples::save_face(&self.config.paths.faces, &face)?);
            }
        }
        log::info!("saved {} faces", saved.len());
        Ok(saved)
    }

    /// Save the first face of a still as a new sample for `name`.
    pub fn capture_face(&self, name: &str) -> Result<Option<PathBuf>> {
        let name = name.trim();
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(anyhow!("invalid face label '{}'", name));
        }
        let frame = self.snapshot()?;
        let Some(face) = self
            .recognizer
            .detect_faces(&frame)
            .first()
            .and_then(|region| frame.crop_gray(region))
        else {
            log::info!("no face found; nothing saved for {}", name);
            return Ok(None);
        };
        samples::save_sample(&self.config.paths.faces, name, &face).map(Some)
    }

    pub fn predict_snapshot(&self) -> Result<Vec<Identity>> {
        let mut frame = self.snapshot()?;
        self.predict_frame(&mut frame)
    }

    pub fn predict_image(&self, bytes: &[u8]) -> Result<Vec<Identity>> {
        let mut frame = Frame::decode(bytes)?;
        self.predict_frame(&mut frame)
    }

    /// Predict every loose image in the faces root.
    pub fn predict_samples(&self) -> Result<Vec<(PathBuf, Vec<Identity>)>> {
        let mut results = Vec::new();
        for path in samples::loose_images(&self.config.paths.faces)? {
            let mut frame = Frame::open(&path)?;
            let identities = self.predict_frame(&mut frame)?;
            log::info!(
                "{} -> {:?}",
                path.display(),
                identities.iter().map(|i| i.name.as_str()).collect::<Vec<_>>()
            );
            results.push((path, identities));
        }
        Ok(results)
    }

    /// Recognize every face in `frame` and resolve it to a user. Faces without a user come
    /// back with user id 0 and the predicted label as name.
    pub fn predict_frame(&self, frame: &mut Frame) -> Result<Vec<Identity>> {
        let predictions = self.recognizer.predict_frame(frame)?;
        Ok(predictions
            .iter()
            .map(|prediction| self.resolve_prediction(prediction))
            .collect())
    }

    fn resolve_prediction(&self, prediction: &Prediction) -> Identity {
        if prediction.is_known() {
            match self.users.find_by_name(&prediction.label) {
                Ok(Some(user)) if user.user_id != 0 => return user.redacted(),
                Ok(_) => {}
                Err(err) => log::warn!("user lookup for '{}' failed: {:#}", prediction.label, err),
            }
        }
        Identity::new(0, prediction.label.clone())
    }

    fn require_classifier(&self, id: &str, kind: &str) -> Result<()> {
        if self.registry.contains(id) {
            return Ok(());
        }
        Err(CamwatchError::classifier(format!(
            "{} classifier '{}' is not loaded",
            kind, id
        )))
    }

    fn set_identity(&self, identity: Option<Identity>) -> Result<()> {
        let mut guard = self
            .identity
            .lock()
            .map_err(|_| anyhow!("identity lock poisoned"))?;
        *guard = identity;
        Ok(())
    }

    fn lock_buffer(&self) -> Result<MutexGuard<'_, FrameBufferManager>> {
        self.buffer
            .lock()
            .map_err(|_| anyhow!("frame buffer lock poisoned"))
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::DetectedRegion;
    use crate::RegionDetector;
    use std::time::Instant;

    struct WholeFrame;

    impl RegionDetector for WholeFrame {
        fn name(&self) -> &str {
            "whole-frame"
        }

        fn detect(&mut self, frame: &Frame) -> Result<Vec<DetectedRegion>> {
            Ok(vec![DetectedRegion::from_xywh(0, 0, frame.width, frame.height)])
        }
    }

    /// Keeps claiming a user on every frame.
    struct Stale(SharedIdentity);

    impl FrameHandler for Stale {
        fn name(&self) -> &'static str {
            "stale"
        }

        fn handle(&mut self, _frame: &mut Frame, _now: Instant) -> Result<()> {
            if let Ok(mut slot) = self.0.lock() {
                *slot = Some(Identity::new(9, "stale"));
            }
            Ok(())
        }
    }

    #[test]
    fn authenticate_ignores_identity_from_the_replaced_session() -> Result<()> {
        let root = tempfile::tempdir()?;
        let mut cfg = CamwatchConfig::default();
        cfg.camera.device = "stub://door?fps=200".to_string();
        cfg.camera.width = 64;
        cfg.camera.height = 48;
        cfg.paths.faces = root.path().join("faces");
        cfg.paths.videos = root.path().join("videos");
        cfg.paths.predicted_faces = None;
        cfg.paths.predicted_images = None;
        cfg.authentication.poll_loops = 5;
        cfg.authentication.poll_interval = Duration::from_millis(10);

        let mut registry = ClassifierRegistry::new();
        registry.register(&cfg.classifiers.face, WholeFrame)?;
        let provider = Arc::new(SystemDevices::new(&cfg.camera));
        let webcam = Webcam::from_parts(
            cfg,
            provider,
            registry,
            Arc::new(InMemoryUserDirectory::new()),
            None,
        );

        webcam.start_capture_with(Box::new(Stale(webcam.identity.clone())))?;
        let until = Instant::now() + Duration::from_secs(5);
        while webcam.authenticated_identity().is_none() && Instant::now() < until {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(webcam.authenticated_identity().is_some());

        // No enrolled faces, so only the old session could produce a user.
        assert_eq!(webcam.authenticate()?, None);
        assert_eq!(webcam.authenticated_identity(), None);
        assert!(!webcam.is_capturing());
        Ok(())
    }
}
