//! Continuous capture.
//!
//! A `CaptureSession` owns one open device and the thread that reads it, forwarding each frame
//! to the installed `FrameHandler`. `CaptureController` keeps at most one session alive:
//! starting a new one stops the previous session (thread joined, device released) first.

mod handler;
mod session;

use anyhow::{anyhow, Result};
use std::sync::{Arc, Mutex};

pub use handler::FrameHandler;
pub use session::{CaptureSession, JOIN_TIMEOUT};

use crate::ingest::DeviceProvider;

pub struct CaptureController {
    provider: Arc<dyn DeviceProvider>,
    session: Mutex<Option<CaptureSession>>,
}

impl CaptureController {
    pub fn new(provider: Arc<dyn DeviceProvider>) -> Self {
        Self {
            provider,
            session: Mutex::new(None),
        }
    }

    pub fn provider(&self) -> &Arc<dyn DeviceProvider> {
        &self.provider
    }

    /// Replace any active session with a new one on `device` running `handler`.
    ///
    /// The previous session is fully stopped before the device is opened again. When opening
    /// fails no session is left running.
    pub fn start(&self, device: &str, handler: Box<dyn FrameHandler>) -> Result<()> {
        let mut guard = self
            .session
            .lock()
            .map_err(|_| anyhow!("capture session lock poisoned"))?;
        if let Some(mut previous) = guard.take() {
            log::info!(
                "stopping {} capture before starting {}",
                previous.handler_name(),
                handler.name()
            );
            previous.stop();
        }
        let session = CaptureSession::start(self.provider.as_ref(), device, handler)?;
        *guard = Some(session);
        Ok(())
    }

    /// Stop the active session. Returns false when nothing was running.
    pub fn stop(&self) -> Result<bool> {
        let previous = self
            .session
            .lock()
            .map_err(|_| anyhow!("capture session lock poisoned"))?
            .take();
        match previous {
            Some(mut session) => {
                session.stop();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn is_capturing(&self) -> bool {
        self.session
            .lock()
            .map(|guard| guard.as_ref().map(|s| s.is_capturing()).unwrap_or(false))
            .unwrap_or(false)
    }

    /// Negotiated frame size of the active session.
    pub fn frame_size(&self) -> Option<(u32, u32)> {
        self.session
            .lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(|s| s.frame_size()))
    }

    pub fn frames_handled(&self) -> u64 {
        self.session
            .lock()
            .map(|guard| guard.as_ref().map(|s| s.frames_handled()).unwrap_or(0))
            .unwrap_or(0)
    }
}

impl Drop for CaptureController {
    fn drop(&mut self) {
        if let Ok(guard) = self.session.get_mut() {
            if let Some(mut session) = guard.take() {
                session.stop();
            }
        }
    }
}
