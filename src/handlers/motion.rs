use anyhow::{anyhow, Result};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::capture::FrameHandler;
use crate::detect::MotionDetector;
use crate::frame::Frame;
use crate::recording::SharedBuffer;

/// A background older than this is replaced by a still frame.
pub const BACKGROUND_REFRESH: Duration = Duration::from_secs(60);
/// Frames keep being recorded for this long after the last confirmed motion.
pub const MOTION_COOLDOWN: Duration = Duration::from_secs(2);

/// Records frames while motion is seen against a slowly refreshed background.
pub struct MotionRecordHandler {
    detector: MotionDetector,
    buffer: SharedBuffer,
    background: Option<Frame>,
    background_at: Option<Instant>,
    last_motion: Option<Instant>,
    snapshots: Option<PathBuf>,
}

impl MotionRecordHandler {
    pub fn new(detector: MotionDetector, buffer: SharedBuffer) -> Self {
        Self {
            detector,
            buffer,
            background: None,
            background_at: None,
            last_motion: None,
            snapshots: None,
        }
    }

    /// Save an annotated copy of every frame that confirms motion under `dir`.
    pub fn with_snapshots(mut self, dir: Option<PathBuf>) -> Self {
        self.snapshots = dir;
        self
    }

    pub fn background_refreshed_at(&self) -> Option<Instant> {
        self.background_at
    }

    /// Replace the background when there is none yet, or when it is stale and the candidate
    /// frame shows no motion against it.
    fn refresh_background(&mut self, frame: &Frame, now: Instant) {
        let refresh = match (&self.background, self.background_at) {
            (Some(background), Some(at)) => {
                now.saturating_duration_since(at) > BACKGROUND_REFRESH
                    && !self.detector.detect(background, frame)
            }
            _ => true,
        };
        if refresh {
            log::debug!("motion background refreshed");
            self.background = Some(frame.clone());
            self.background_at = Some(now);
        }
    }

    fn record(&self, frame: &Frame) -> Result<()> {
        let mut buffer = self
            .buffer
            .lock()
            .map_err(|_| anyhow!("frame buffer lock poisoned"))?;
        buffer.append(frame)
    }

    fn save_snapshot(&self, background: &Frame, frame: &Frame) {
        let Some(dir) = &self.snapshots else {
            return;
        };
        let mut annotated = frame.clone();
        self.detector.detect_and_annotate(background, &mut annotated);
        if let Err(err) = annotated.save_png(dir) {
            log::warn!("unable to save motion snapshot: {:#}", err);
        }
    }
}

impl FrameHandler for MotionRecordHandler {
    fn name(&self) -> &'static str {
        "motion-record"
    }

    fn handle(&mut self, frame: &mut Frame, now: Instant) -> Result<()> {
        self.refresh_background(frame, now);

        if let Some(at) = self.last_motion {
            if now.saturating_duration_since(at) < MOTION_COOLDOWN {
                return self.record(frame);
            }
        }
        self.last_motion = None;

        let Some(background) = self.background.as_ref() else {
            return Ok(());
        };
        if self.detector.detect(background, frame) {
            log::debug!("motion detected");
            self.save_snapshot(background, frame);
            self.last_motion = Some(now);
            return self.record(frame);
        }
        Ok(())
    }
}
