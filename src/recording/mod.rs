//! Event recording: frame buffering and video output.

mod buffer;
pub mod encoder;

use std::sync::{Arc, Mutex};

pub use buffer::FrameBufferManager;
pub use encoder::{read_video, VideoEncoder};

/// Frame buffer shared between the capture thread and callers.
pub type SharedBuffer = Arc<Mutex<FrameBufferManager>>;
