//! Camera devices.
//!
//! This module provides the device boundary of the pipeline:
//! - `DeviceProvider`: opens a device by its configured name
//! - `CameraDevice`: reads frames and releases the underlying handle
//! - `DeviceHandle`: owns an open device and releases it exactly once
//! - `FrameSource`: one-shot still capture (open, read one frame, release)
//!
//! Device names:
//! - `stub://<name>[?frames=N&fps=F]` synthetic scene (tests, demos)
//! - `0`, `1`, ... or `/dev/videoN` V4L2 devices (feature: ingest-v4l2)

#[cfg(feature = "ingest-v4l2")]
mod normalize;
pub mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

use anyhow::Result;
use std::sync::Arc;

use crate::config::CameraSettings;
use crate::error::CamwatchError;
use crate::frame::Frame;

pub use synthetic::SyntheticCamera;
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::V4l2Camera;

/// An open camera.
pub trait CameraDevice: Send {
    fn name(&self) -> &str;

    /// Negotiated frame size.
    fn frame_size(&self) -> (u32, u32);

    /// Blocking read of the next frame. `Ok(None)` means the device stopped producing frames.
    fn read_frame(&mut self) -> Result<Option<Frame>>;

    /// Release the underlying handle. Must be safe to call more than once.
    fn release(&mut self);
}

/// Opens camera devices by name.
pub trait DeviceProvider: Send + Sync {
    fn open(&self, device: &str) -> Result<Box<dyn CameraDevice>>;
}

/// Owns an open device and releases it exactly once, on `release()` or on drop.
pub struct DeviceHandle {
    device: Option<Box<dyn CameraDevice>>,
}

impl DeviceHandle {
    pub fn new(device: Box<dyn CameraDevice>) -> Self {
        Self {
            device: Some(device),
        }
    }

    pub fn name(&self) -> &str {
        self.device.as_ref().map(|d| d.name()).unwrap_or("released")
    }

    pub fn frame_size(&self) -> Option<(u32, u32)> {
        self.device.as_ref().map(|d| d.frame_size())
    }

    pub fn read_frame(&mut self) -> Result<Option<Frame>> {
        match self.device.as_mut() {
            Some(device) => device.read_frame(),
            None => Ok(None),
        }
    }

    pub fn release(&mut self) {
        if let Some(mut device) = self.device.take() {
            device.release();
            log::debug!("camera {} released", device.name());
        }
    }
}

impl Drop for DeviceHandle {
    fn drop(&mut self) {
        self.release();
    }
}

/// Opens configured devices: synthetic `stub://` scenes, and V4L2 devices when built with
/// the `ingest-v4l2` feature.
pub struct SystemDevices {
    width: u32,
    height: u32,
    #[cfg_attr(not(feature = "ingest-v4l2"), allow(dead_code))]
    target_fps: u32,
}

impl SystemDevices {
    pub fn new(settings: &CameraSettings) -> Self {
        Self {
            width: settings.width,
            height: settings.height,
            target_fps: settings.target_fps,
        }
    }
}

impl DeviceProvider for SystemDevices {
    fn open(&self, device: &str) -> Result<Box<dyn CameraDevice>> {
        if device.starts_with("stub://") {
            return Ok(Box::new(SyntheticCamera::open(
                device,
                self.width,
                self.height,
            )?));
        }
        let path = device_path(device);

        #[cfg(feature = "ingest-v4l2")]
        {
            let config = v4l2::V4l2Config {
                device: path,
                target_fps: self.target_fps,
                width: self.width,
                height: self.height,
            };
            Ok(Box::new(V4l2Camera::open(config)?))
        }
        #[cfg(not(feature = "ingest-v4l2"))]
        {
            Err(CamwatchError::device(format!(
                "device {} requires the ingest-v4l2 feature",
                path
            )))
        }
    }
}

/// Map a device index to its node path; other names pass through.
pub fn device_path(device: &str) -> String {
    match device.trim().parse::<u32>() {
        Ok(index) => format!("/dev/video{}", index),
        Err(_) => device.trim().to_string(),
    }
}

/// One-shot still capture: opens the device, reads one frame, releases the device.
pub struct FrameSource {
    provider: Arc<dyn DeviceProvider>,
    device: String,
}

impl FrameSource {
    pub fn new(provider: Arc<dyn DeviceProvider>, device: impl Into<String>) -> Self {
        Self {
            provider,
            device: device.into(),
        }
    }

    pub fn capture(&self) -> Result<Frame> {
        let mut handle = DeviceHandle::new(self.provider.open(&self.device)?);
        let frame = handle.read_frame()?;
        handle.release();
        frame.ok_or_else(|| {
            CamwatchError::device(format!("device {} produced no frame", self.device))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingDevice {
        releases: Arc<AtomicUsize>,
        frames: usize,
    }

    impl CameraDevice for CountingDevice {
        fn name(&self) -> &str {
            "counting"
        }

        fn frame_size(&self) -> (u32, u32) {
            (4, 4)
        }

        fn read_frame(&mut self) -> Result<Option<Frame>> {
            if self.frames == 0 {
                return Ok(None);
            }
            self.frames -= 1;
            Ok(Some(Frame::new(vec![0u8; 48], 4, 4, 3)?))
        }

        fn release(&mut self) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct CountingProvider {
        releases: Arc<AtomicUsize>,
        frames: usize,
    }

    impl DeviceProvider for CountingProvider {
        fn open(&self, _device: &str) -> Result<Box<dyn CameraDevice>> {
            Ok(Box::new(CountingDevice {
                releases: self.releases.clone(),
                frames: self.frames,
            }))
        }
    }

    #[test]
    fn handle_releases_once() {
        let releases = Arc::new(AtomicUsize::new(0));
        let mut handle = DeviceHandle::new(Box::new(CountingDevice {
            releases: releases.clone(),
            frames: 1,
        }));
        handle.release();
        handle.release();
        drop(handle);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn still_capture_releases_device() -> Result<()> {
        let releases = Arc::new(AtomicUsize::new(0));
        let provider = Arc::new(CountingProvider {
            releases: releases.clone(),
            frames: 3,
        });
        let source = FrameSource::new(provider, "0");
        let frame = source.capture()?;
        assert_eq!((frame.width, frame.height), (4, 4));
        assert_eq!(releases.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[test]
    fn still_capture_from_empty_device_fails_and_releases() {
        let releases = Arc::new(AtomicUsize::new(0));
        let provider = Arc::new(CountingProvider {
            releases: releases.clone(),
            frames: 0,
        });
        let err = FrameSource::new(provider, "0").capture().unwrap_err();
        assert!(matches!(
            crate::error::category(&err),
            Some(CamwatchError::Device(_))
        ));
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn device_indices_map_to_nodes() {
        assert_eq!(device_path("0"), "/dev/video0");
        assert_eq!(device_path(" 2 "), "/dev/video2");
        assert_eq!(device_path("/dev/video7"), "/dev/video7");
    }
}
