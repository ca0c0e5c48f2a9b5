use anyhow::{anyhow, Result};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::handler::FrameHandler;
use crate::ingest::{DeviceHandle, DeviceProvider};

/// Bounded wait for the capture thread after a stop request.
pub const JOIN_TIMEOUT: Duration = Duration::from_millis(1000);

type SharedDevice = Arc<Mutex<Option<DeviceHandle>>>;

/// One running capture: an open device, the thread reading it, and the installed handler.
///
/// Stopping signals the thread, waits up to `JOIN_TIMEOUT` for it, and then releases the
/// device whether or not the thread finished. Dropping a session stops it.
pub struct CaptureSession {
    device_name: String,
    handler_name: &'static str,
    frame_size: (u32, u32),
    device: SharedDevice,
    stop: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    frames: Arc<AtomicU64>,
    done: Receiver<()>,
    join: Option<JoinHandle<()>>,
}

impl CaptureSession {
    /// Open `device` and start forwarding its frames to `handler`.
    ///
    /// Fails without starting a thread when the device cannot be opened.
    pub fn start(
        provider: &dyn DeviceProvider,
        device: &str,
        handler: Box<dyn FrameHandler>,
    ) -> Result<Self> {
        let handle = DeviceHandle::new(provider.open(device)?);
        let frame_size = handle.frame_size().unwrap_or((0, 0));
        let device_name = handle.name().to_string();
        let handler_name = handler.name();

        let device: SharedDevice = Arc::new(Mutex::new(Some(handle)));
        let stop = Arc::new(AtomicBool::new(false));
        let running = Arc::new(AtomicBool::new(true));
        let frames = Arc::new(AtomicU64::new(0));
        let (done_tx, done) = mpsc::channel();

        let worker = CaptureLoop {
            device: device.clone(),
            stop: stop.clone(),
            frames: frames.clone(),
            handler,
        };
        let running_thread = running.clone();
        let join = std::thread::Builder::new()
            .name(format!("capture-{}", handler_name))
            .spawn(move || {
                worker.run();
                running_thread.store(false, Ordering::SeqCst);
                let _ = done_tx.send(());
            })
            .map_err(|e| anyhow!("spawn capture thread: {}", e))?;

        log::info!(
            "capture started on {} ({}x{}) with {} handler",
            device_name,
            frame_size.0,
            frame_size.1,
            handler_name
        );
        Ok(Self {
            device_name,
            handler_name,
            frame_size,
            device,
            stop,
            running,
            frames,
            done,
            join: Some(join),
        })
    }

    pub fn handler_name(&self) -> &'static str {
        self.handler_name
    }

    pub fn frame_size(&self) -> (u32, u32) {
        self.frame_size
    }

    /// Frames handed to the handler so far.
    pub fn frames_handled(&self) -> u64 {
        self.frames.load(Ordering::SeqCst)
    }

    /// True until stop is requested or the device stops producing frames.
    pub fn is_capturing(&self) -> bool {
        !self.stop.load(Ordering::SeqCst) && self.running.load(Ordering::SeqCst)
    }

    /// Stop the loop and release the device. Returns false when the thread did not finish in
    /// time; the device is released either way. Safe to call more than once.
    pub fn stop(&mut self) -> bool {
        self.stop.store(true, Ordering::SeqCst);
        let joined = match self.join.take() {
            Some(join) => match self.done.recv_timeout(JOIN_TIMEOUT) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    if join.join().is_err() {
                        log::error!("capture thread for {} panicked", self.device_name);
                    }
                    true
                }
                Err(RecvTimeoutError::Timeout) => {
                    log::warn!(
                        "capture thread for {} did not stop within {:?}; detaching",
                        self.device_name,
                        JOIN_TIMEOUT
                    );
                    false
                }
            },
            None => true,
        };
        self.release_device();
        joined
    }

    fn release_device(&self) {
        let mut guard = match self.device.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(mut handle) = guard.take() {
            handle.release();
            log::info!(
                "capture stopped on {} after {} frames",
                self.device_name,
                self.frames_handled()
            );
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.stop();
    }
}

struct CaptureLoop {
    device: SharedDevice,
    stop: Arc<AtomicBool>,
    frames: Arc<AtomicU64>,
    handler: Box<dyn FrameHandler>,
}

impl CaptureLoop {
    fn run(mut self) {
        loop {
            if self.stop.load(Ordering::SeqCst) {
                break;
            }
            let next = {
                let mut guard = match self.device.lock() {
                    Ok(guard) => guard,
                    Err(_) => {
                        log::error!("capture device lock poisoned");
                        break;
                    }
                };
                let read = match guard.as_mut() {
                    Some(handle) => handle.read_frame(),
                    None => Ok(None),
                };
                read
            };
            let mut frame = match next {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    log::info!("capture device stopped producing frames");
                    break;
                }
                Err(err) => {
                    log::error!("capture read failed: {:#}", err);
                    break;
                }
            };
            if self.stop.load(Ordering::SeqCst) {
                break;
            }

            let now = Instant::now();
            let handler = &mut self.handler;
            match catch_unwind(AssertUnwindSafe(|| handler.handle(&mut frame, now))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    log::error!("{} handler failed: {:#}", self.handler.name(), err)
                }
                Err(_) => log::error!("{} handler panicked", self.handler.name()),
            }
            self.frames.fetch_add(1, Ordering::SeqCst);
        }
    }
}
