//! camwatch
//!
//! Webcam capture with event-triggered recording and face-recognition authentication.
//!
//! # Architecture
//!
//! A capture session owns one camera device and a background thread that reads it. Every
//! frame goes, synchronously, to the session's frame handler:
//!
//! 1. **Authentication**: recognized faces vote; the first name to reach the threshold is
//!    looked up and becomes the authenticated identity.
//! 2. **Motion recording**: frames are buffered while motion is seen against a background.
//! 3. **Watching**: a body sighting starts a fixed-length recorded sequence.
//!
//! Buffered frames become video files, and an upload watcher pushes finished files to a
//! remote store.
//!
//! # Module Structure
//!
//! - `ingest`: camera devices (synthetic `stub://`, V4L2)
//! - `capture`: capture sessions and the `FrameHandler` trait
//! - `handlers`: authentication, motion-record and watch handlers
//! - `detect`: motion detection and the face/body classifier registry
//! - `face`: LBPH face recognition and on-disk samples
//! - `recording`: frame buffer and video encoder
//! - `upload`: upload watcher and remote stores
//! - `webcam`: the `Webcam` facade tying it together

pub mod capture;
pub mod config;
pub mod detect;
pub mod error;
pub mod face;
pub mod frame;
pub mod handlers;
pub mod identity;
pub mod ingest;
pub mod recording;
pub mod upload;
pub mod webcam;

pub use capture::{CaptureController, CaptureSession, FrameHandler};
pub use config::CamwatchConfig;
pub use detect::{ClassifierRegistry, DetectedRegion, MotionDetector, RegionDetector};
pub use error::CamwatchError;
pub use face::{FaceEngine, Prediction, UNKNOWN_LABEL};
pub use frame::Frame;
pub use identity::{Identity, InMemoryUserDirectory, JsonUserDirectory, UserDirectory};
pub use recording::{FrameBufferManager, VideoEncoder};
pub use webcam::Webcam;
