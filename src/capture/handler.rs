use anyhow::Result;
use std::time::Instant;

use crate::frame::Frame;

/// Per-frame behaviour installed on a capture session.
///
/// Runs synchronously on the capture thread. Each handler owns its own timing state; `now` is
/// the loop's clock reading for this frame.
pub trait FrameHandler: Send {
    fn name(&self) -> &'static str;

    fn handle(&mut self, frame: &mut Frame, now: Instant) -> Result<()>;
}
