use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;

use camwatch::capture::FrameHandler;
use camwatch::config::CamwatchConfig;
use camwatch::error::{category, CamwatchError};
use camwatch::ingest::{CameraDevice, DeviceProvider, SyntheticCamera, SystemDevices};
use camwatch::recording::read_video;
use camwatch::{ClassifierRegistry, Frame, InMemoryUserDirectory, Webcam};

fn config(root: &Path, device: &str) -> CamwatchConfig {
    let mut cfg = CamwatchConfig::default();
    cfg.camera.device = device.to_string();
    cfg.camera.width = 160;
    cfg.camera.height = 120;
    cfg.paths.faces = root.join("faces");
    cfg.paths.videos = root.join("videos");
    cfg.paths.predicted_faces = None;
    cfg.paths.predicted_images = None;
    cfg
}

fn webcam(cfg: CamwatchConfig, provider: Arc<dyn DeviceProvider>) -> Webcam {
    Webcam::from_parts(
        cfg,
        provider,
        ClassifierRegistry::new(),
        Arc::new(InMemoryUserDirectory::new()),
        None,
    )
}

fn wait_until(deadline: Duration, mut done: impl FnMut() -> bool) -> bool {
    let until = Instant::now() + deadline;
    while Instant::now() < until {
        if done() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    done()
}

#[derive(Default)]
struct Counts {
    opened: AtomicUsize,
    released: AtomicUsize,
}

struct TrackedCamera {
    inner: SyntheticCamera,
    counts: Arc<Counts>,
}

impl CameraDevice for TrackedCamera {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn frame_size(&self) -> (u32, u32) {
        self.inner.frame_size()
    }

    fn read_frame(&mut self) -> Result<Option<Frame>> {
        self.inner.read_frame()
    }

    fn release(&mut self) {
        self.counts.released.fetch_add(1, Ordering::SeqCst);
        self.inner.release();
    }
}

struct TrackedProvider {
    counts: Arc<Counts>,
}

impl DeviceProvider for TrackedProvider {
    fn open(&self, device: &str) -> Result<Box<dyn CameraDevice>> {
        self.counts.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(TrackedCamera {
            inner: SyntheticCamera::open(device, 80, 60)?,
            counts: self.counts.clone(),
        }))
    }
}

struct Counting(Arc<AtomicUsize>);

impl FrameHandler for Counting {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn handle(&mut self, _frame: &mut Frame, _now: Instant) -> Result<()> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[test]
fn camera_open_failure_fails_start() {
    let root = tempfile::tempdir().expect("tempdir");
    let cfg = config(root.path(), "/dev/video-missing");
    let provider = Arc::new(SystemDevices::new(&cfg.camera));
    let webcam = webcam(cfg, provider);

    let handled = Arc::new(AtomicUsize::new(0));
    let err = webcam
        .start_capture_with(Box::new(Counting(handled.clone())))
        .unwrap_err();
    assert!(matches!(category(&err), Some(CamwatchError::Device(_))));
    assert!(!webcam.is_capturing());
    assert!(!webcam.stop_capture().expect("stop"));
    assert_eq!(handled.load(Ordering::SeqCst), 0);
}

#[test]
fn authentication_capture_requires_the_face_classifier() {
    let root = tempfile::tempdir().expect("tempdir");
    let cfg = config(root.path(), "stub://desk?fps=0");
    let provider = Arc::new(SystemDevices::new(&cfg.camera));
    let webcam = webcam(cfg, provider);

    let err = webcam.start_capture().unwrap_err();
    assert!(matches!(category(&err), Some(CamwatchError::Classifier(_))));
    assert!(!webcam.is_capturing());
    assert!(webcam.authenticate().is_err());
}

#[test]
fn starting_again_replaces_the_active_session() -> Result<()> {
    let root = tempfile::tempdir()?;
    let counts = Arc::new(Counts::default());
    let webcam = webcam(
        config(root.path(), "stub://desk?fps=50"),
        Arc::new(TrackedProvider {
            counts: counts.clone(),
        }),
    );

    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));
    webcam.start_capture_with(Box::new(Counting(first.clone())))?;
    assert!(wait_until(Duration::from_secs(5), || first.load(Ordering::SeqCst) > 0));

    webcam.start_capture_with(Box::new(Counting(second.clone())))?;
    assert_eq!(counts.opened.load(Ordering::SeqCst), 2);
    assert_eq!(counts.released.load(Ordering::SeqCst), 1);
    let first_total = first.load(Ordering::SeqCst);

    assert!(wait_until(Duration::from_secs(5), || second.load(Ordering::SeqCst) > 0));
    assert!(webcam.is_capturing());
    assert_eq!(first.load(Ordering::SeqCst), first_total);
    assert_eq!(webcam.buffer().lock().unwrap().frame_size(), (80, 60));

    assert!(webcam.stop_capture()?);
    assert!(!webcam.is_capturing());
    assert_eq!(counts.released.load(Ordering::SeqCst), 2);
    Ok(())
}

#[test]
fn capture_ends_when_the_device_runs_dry() -> Result<()> {
    let root = tempfile::tempdir()?;
    let cfg = config(root.path(), "stub://desk?fps=0&frames=5");
    let provider = Arc::new(SystemDevices::new(&cfg.camera));
    let webcam = webcam(cfg, provider);

    let handled = Arc::new(AtomicUsize::new(0));
    webcam.start_capture_with(Box::new(Counting(handled.clone())))?;
    assert!(wait_until(Duration::from_secs(5), || !webcam.is_capturing()));
    assert_eq!(handled.load(Ordering::SeqCst), 5);
    assert!(webcam.stop_capture()?);
    Ok(())
}

#[test]
fn motion_detection_records_the_visitor() -> Result<()> {
    let root = tempfile::tempdir()?;
    let cfg = config(root.path(), "stub://yard?fps=0&frames=40&period=10&visit=6");
    let provider = Arc::new(SystemDevices::new(&cfg.camera));
    let webcam = webcam(cfg, provider);

    webcam.start_motion_detection()?;
    assert!(wait_until(Duration::from_secs(10), || !webcam.is_capturing()));
    let video = webcam
        .stop_motion_detection()?
        .expect("motion produced a recording");

    let frames = read_video(&video)?;
    // Nothing before the first visit is recorded.
    assert!(!frames.is_empty() && frames.len() <= 30);
    assert!(frames.iter().all(|f| (f.width, f.height) == (160, 120)));
    assert!(webcam.buffer().lock().unwrap().is_empty());
    assert_eq!(webcam.stop_motion_detection()?, None);
    Ok(())
}

#[test]
fn watching_requires_the_body_classifier() {
    let root = tempfile::tempdir().expect("tempdir");
    let cfg = config(root.path(), "stub://yard?fps=0");
    let provider = Arc::new(SystemDevices::new(&cfg.camera));
    let webcam = webcam(cfg, provider);

    let err = webcam.start_watching().unwrap_err();
    assert!(matches!(category(&err), Some(CamwatchError::Classifier(_))));
    assert!(!webcam.is_capturing());
    assert!(!webcam.is_recording());
}

#[test]
fn snapshot_releases_the_device() -> Result<()> {
    let root = tempfile::tempdir()?;
    let counts = Arc::new(Counts::default());
    let webcam = webcam(
        config(root.path(), "stub://desk?fps=0"),
        Arc::new(TrackedProvider {
            counts: counts.clone(),
        }),
    );
    let frame = webcam.snapshot()?;
    assert_eq!((frame.width, frame.height), (80, 60));
    assert_eq!(counts.opened.load(Ordering::SeqCst), 1);
    assert_eq!(counts.released.load(Ordering::SeqCst), 1);
    assert!(!webcam.is_capturing());
    Ok(())
}
