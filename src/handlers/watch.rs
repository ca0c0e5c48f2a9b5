use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, MutexGuard};
use std::time::{Duration, Instant};

use crate::capture::FrameHandler;
use crate::detect::ClassifierRegistry;
use crate::frame::Frame;
use crate::recording::{FrameBufferManager, SharedBuffer};

/// Minimum spacing between two body checks while nobody is in view.
pub const BODY_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Records a fixed-length sequence after each body sighting.
pub struct WatchHandler {
    registry: Arc<ClassifierRegistry>,
    body_classifier: String,
    buffer: SharedBuffer,
    sequence: Duration,
    recording: Arc<AtomicBool>,
    body_seen_at: Option<Instant>,
    body_checked_at: Option<Instant>,
}

impl WatchHandler {
    pub fn new(
        registry: Arc<ClassifierRegistry>,
        body_classifier: impl Into<String>,
        buffer: SharedBuffer,
        sequence: Duration,
        recording: Arc<AtomicBool>,
    ) -> Self {
        Self {
            registry,
            body_classifier: body_classifier.into(),
            buffer,
            sequence,
            recording,
            body_seen_at: None,
            body_checked_at: None,
        }
    }

    fn lock_buffer(&self) -> Result<MutexGuard<'_, FrameBufferManager>> {
        self.buffer
            .lock()
            .map_err(|_| anyhow!("frame buffer lock poisoned"))
    }

    fn check_for_bodies(&mut self, frame: &mut Frame, now: Instant) -> Result<()> {
        if let Some(at) = self.body_checked_at {
            if now.saturating_duration_since(at) < BODY_CHECK_INTERVAL {
                return Ok(());
            }
        }
        self.body_checked_at = Some(now);

        let bodies = self.registry.detect_regions(frame, &self.body_classifier);
        if bodies.is_empty() {
            self.recording.store(false, Ordering::SeqCst);
            return Ok(());
        }
        log::info!("{} bodies in view, recording", bodies.len());
        for body in &bodies {
            frame.annotate(body);
        }
        self.body_seen_at = Some(now);
        self.recording.store(true, Ordering::SeqCst);
        self.lock_buffer()?.append(frame)
    }
}

impl FrameHandler for WatchHandler {
    fn name(&self) -> &'static str {
        "watch"
    }

    fn handle(&mut self, frame: &mut Frame, now: Instant) -> Result<()> {
        let Some(seen_at) = self.body_seen_at else {
            return self.check_for_bodies(frame, now);
        };
        if now.saturating_duration_since(seen_at) > self.sequence {
            self.body_seen_at = None;
            self.recording.store(false, Ordering::SeqCst);
            if let Some(path) = self.lock_buffer()?.flush()? {
                log::info!("watch sequence saved to {}", path.display());
            }
            return Ok(());
        }
        self.lock_buffer()?.append(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{DetectedRegion, RegionDetector};
    use crate::recording::VideoEncoder;
    use image::RgbImage;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    struct Bodies {
        calls: Arc<AtomicUsize>,
        present: Arc<AtomicBool>,
    }

    impl RegionDetector for Bodies {
        fn name(&self) -> &str {
            "bodies"
        }

        fn detect(&mut self, _frame: &Frame) -> Result<Vec<DetectedRegion>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.present.load(Ordering::SeqCst) {
                Ok(vec![DetectedRegion::from_xywh(4, 4, 20, 30)])
            } else {
                Ok(Vec::new())
            }
        }
    }

    struct Fixture {
        handler: WatchHandler,
        buffer: SharedBuffer,
        calls: Arc<AtomicUsize>,
        present: Arc<AtomicBool>,
        recording: Arc<AtomicBool>,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let present = Arc::new(AtomicBool::new(false));
        let mut registry = ClassifierRegistry::new();
        registry
            .register(
                "body",
                Bodies {
                    calls: calls.clone(),
                    present: present.clone(),
                },
            )
            .unwrap();
        let buffer = Arc::new(Mutex::new(FrameBufferManager::new(
            VideoEncoder::new(dir.path(), 10),
            100,
            (64, 48),
        )));
        let recording = Arc::new(AtomicBool::new(false));
        let handler = WatchHandler::new(
            Arc::new(registry),
            "body",
            buffer.clone(),
            Duration::from_secs(5),
            recording.clone(),
        );
        Fixture {
            handler,
            buffer,
            calls,
            present,
            recording,
            _dir: dir,
        }
    }

    fn frame() -> Frame {
        Frame::from_rgb(RgbImage::new(64, 48))
    }

    #[test]
    fn body_checks_are_throttled() -> Result<()> {
        let mut f = fixture();
        let start = Instant::now();
        for ms in [0u64, 300, 900, 1100, 1500, 2200] {
            f.handler.handle(&mut frame(), start + Duration::from_millis(ms))?;
        }
        assert_eq!(f.calls.load(Ordering::SeqCst), 3);
        assert!(!f.recording.load(Ordering::SeqCst));
        assert_eq!(f.buffer.lock().unwrap().len(), 0);
        Ok(())
    }

    #[test]
    fn sighting_records_a_sequence_then_flushes() -> Result<()> {
        let mut f = fixture();
        let start = Instant::now();
        f.present.store(true, Ordering::SeqCst);
        let mut first = frame();
        f.handler.handle(&mut first, start)?;
        assert!(f.recording.load(Ordering::SeqCst));
        assert_ne!(first.pixels(), frame().pixels());
        assert_eq!(f.buffer.lock().unwrap().len(), 1);

        for s in 1..=5 {
            f.handler.handle(&mut frame(), start + Duration::from_secs(s))?;
        }
        assert_eq!(f.buffer.lock().unwrap().len(), 6);
        assert_eq!(f.calls.load(Ordering::SeqCst), 1);

        f.handler.handle(&mut frame(), start + Duration::from_millis(5100))?;
        let buffer = f.buffer.lock().unwrap();
        assert!(buffer.is_empty());
        assert_eq!(buffer.flush_count(), 1);
        assert!(!f.recording.load(Ordering::SeqCst));
        Ok(())
    }

    #[test]
    fn missing_classifier_records_nothing() -> Result<()> {
        let mut f = fixture();
        f.handler.body_classifier = "missing".to_string();
        f.present.store(true, Ordering::SeqCst);
        f.handler.handle(&mut frame(), Instant::now())?;
        assert!(!f.recording.load(Ordering::SeqCst));
        assert_eq!(f.buffer.lock().unwrap().len(), 0);
        Ok(())
    }
}
