//! V4L2 camera device.
//!
//! Opens a local device node (e.g. /dev/video0), negotiates size and rate, and streams
//! memory-mapped buffers. Each read copies the driver buffer into a fresh RGB `Frame`, since
//! the driver reuses its buffers for the next capture.

use anyhow::{anyhow, Context, Result};
use ouroboros::self_referencing;

use super::normalize::{to_rgb24, PixelFormat};
use super::CameraDevice;
use crate::error::CamwatchError;
use crate::frame::Frame;

const STREAM_BUFFERS: u32 = 4;

#[derive(Clone, Debug)]
pub struct V4l2Config {
    /// Device path (e.g., "/dev/video0")
    pub device: String,
    /// Requested frame rate. Drivers may ignore it.
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
}

impl Default for V4l2Config {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            target_fps: 10,
            width: 640,
            height: 480,
        }
    }
}

pub struct V4l2Camera {
    config: V4l2Config,
    state: Option<V4l2State>,
    format: PixelFormat,
    active_width: u32,
    active_height: u32,
    frame_count: u64,
}

#[self_referencing]
struct V4l2State {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl V4l2Camera {
    pub fn open(config: V4l2Config) -> Result<Self> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device = v4l::Device::with_path(&config.device).map_err(|err| {
            CamwatchError::device(format!("open v4l2 device {}: {}", config.device, err))
        })?;
        let mut requested = device.format().context("read v4l2 format")?;
        requested.width = config.width;
        requested.height = config.height;
        requested.fourcc = v4l::FourCC::new(b"YUYV");

        let format = match device.set_format(&requested) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "V4l2Camera: failed to set format on {}: {}",
                    config.device,
                    err
                );
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };
        let pixel_format = PixelFormat::from_fourcc(&format.fourcc.repr).ok_or_else(|| {
            CamwatchError::device(format!(
                "v4l2 device {} negotiated unsupported format {}",
                config.device, format.fourcc
            ))
        })?;

        if config.target_fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(config.target_fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!(
                    "V4l2Camera: failed to set fps on {}: {}",
                    config.device,
                    err
                );
            }
        }

        let state = V4l2StateTryBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, STREAM_BUFFERS)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()
        .map_err(|err| CamwatchError::device(format!("{:#}", err)))?;

        log::info!(
            "V4l2Camera: opened {} ({}x{} {:?})",
            config.device,
            format.width,
            format.height,
            pixel_format
        );
        Ok(Self {
            active_width: format.width,
            active_height: format.height,
            format: pixel_format,
            config,
            state: Some(state),
            frame_count: 0,
        })
    }
}

impl CameraDevice for V4l2Camera {
    fn name(&self) -> &str {
        &self.config.device
    }

    fn frame_size(&self) -> (u32, u32) {
        (self.active_width, self.active_height)
    }

    fn read_frame(&mut self) -> Result<Option<Frame>> {
        use v4l::io::traits::CaptureStream;

        let Some(state) = self.state.as_mut() else {
            return Ok(None);
        };
        let (width, height, format) = (self.active_width, self.active_height, self.format);
        let rgb = state.with_mut(|fields| -> Result<Vec<u8>> {
            let (buf, _meta) = fields
                .stream
                .next()
                .map_err(|err| CamwatchError::device(format!("capture v4l2 frame: {}", err)))?;
            to_rgb24(buf, width, height, format)
        })?;
        self.frame_count += 1;
        Frame::new(rgb, width, height, 3)
            .map(Some)
            .map_err(|err| anyhow!("v4l2 frame {}: {:#}", self.frame_count, err))
    }

    fn release(&mut self) {
        if self.state.take().is_some() {
            log::info!(
                "V4l2Camera: released {} after {} frames",
                self.config.device,
                self.frame_count
            );
        }
    }
}
