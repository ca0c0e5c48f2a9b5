use anyhow::Result;

use crate::detect::result::DetectedRegion;
use crate::frame::Frame;

/// Pretrained object detector ("find every face/body in this frame").
///
/// The registry wraps each detector in a `Mutex`, so `detect` may keep scratch state.
/// Returned regions are in frame pixel coordinates.
pub trait RegionDetector: Send {
    /// Backend identifier, used in logs.
    fn name(&self) -> &str;

    fn detect(&mut self, frame: &Frame) -> Result<Vec<DetectedRegion>>;

    /// Optional warm-up hook, run once at registration.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
