use anyhow::Result;
use std::path::PathBuf;

use super::encoder::VideoEncoder;
use crate::frame::Frame;

/// Bounded, append-only run of frames waiting to become one video.
///
/// Appending to a full buffer flushes it first. Flushing always empties the buffer, even when
/// the video could not be written.
pub struct FrameBufferManager {
    frames: Vec<Frame>,
    capacity: usize,
    frame_size: (u32, u32),
    encoder: VideoEncoder,
    flushes: u64,
}

impl FrameBufferManager {
    pub fn new(encoder: VideoEncoder, capacity: usize, frame_size: (u32, u32)) -> Self {
        Self {
            frames: Vec::new(),
            capacity: capacity.max(1),
            frame_size,
            encoder,
            flushes: 0,
        }
    }

    /// Resolution videos are written at. Takes effect from the next flush.
    pub fn set_frame_size(&mut self, width: u32, height: u32) {
        self.frame_size = (width, height);
    }

    pub fn frame_size(&self) -> (u32, u32) {
        self.frame_size
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of flushes that wrote a file.
    pub fn flush_count(&self) -> u64 {
        self.flushes
    }

    /// Buffer a copy of `frame`.
    ///
    /// At capacity the pending frames are flushed first. The frame is kept even when that
    /// flush fails; the flush error is returned after the append.
    pub fn append(&mut self, frame: &Frame) -> Result<()> {
        let flushed = if self.frames.len() >= self.capacity {
            self.flush().map(|_| ())
        } else {
            Ok(())
        };
        self.frames.push(frame.clone());
        flushed
    }

    /// Encode the pending frames to one video. `Ok(None)` when nothing was pending.
    pub fn flush(&mut self) -> Result<Option<PathBuf>> {
        if self.frames.is_empty() {
            return Ok(None);
        }
        let frames = std::mem::take(&mut self.frames);
        let path = self.encoder.write(&frames, self.frame_size)?;
        self.flushes += 1;
        Ok(Some(path))
    }
}
