//! Synthetic camera (`stub://`) for tests and demos.
//!
//! The scene is a static gradient. Every `period` frames a bright "visitor" square walks across
//! it for `visit` frames, which is enough to trigger motion-based recording.
//!
//! Query parameters:
//! - `frames=N` stop producing frames after N reads (default: unlimited)
//! - `fps=F` pace reads to F frames per second (default 10, 0 = unpaced)
//! - `period=P`, `visit=V` visitor schedule (defaults 50 and 20)

use anyhow::{anyhow, Result};
use image::{Rgb, RgbImage};
use std::time::{Duration, Instant};

use super::CameraDevice;
use crate::frame::Frame;

const DEFAULT_FPS: u32 = 10;
const DEFAULT_PERIOD: u64 = 50;
const DEFAULT_VISIT: u64 = 20;
const VISITOR_SIZE: u32 = 48;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyntheticConfig {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub frame_limit: Option<u64>,
    pub fps: u32,
    pub period: u64,
    pub visit: u64,
}

impl SyntheticConfig {
    /// Parse a `stub://name?key=value&...` device name.
    pub fn parse(device: &str, width: u32, height: u32) -> Result<Self> {
        let rest = device
            .strip_prefix("stub://")
            .ok_or_else(|| anyhow!("synthetic device must start with stub://"))?;
        let (name, query) = rest.split_once('?').unwrap_or((rest, ""));
        let mut config = Self {
            name: name.to_string(),
            width,
            height,
            frame_limit: None,
            fps: DEFAULT_FPS,
            period: DEFAULT_PERIOD,
            visit: DEFAULT_VISIT,
        };
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| anyhow!("malformed stub parameter '{}'", pair))?;
            let parsed: u64 = value
                .parse()
                .map_err(|_| anyhow!("stub parameter {} must be an integer", key))?;
            match key {
                "frames" => config.frame_limit = Some(parsed),
                "fps" => {
                    config.fps = u32::try_from(parsed)
                        .map_err(|_| anyhow!("stub parameter fps {} is out of range", parsed))?
                }
                "period" => config.period = parsed.max(1),
                "visit" => config.visit = parsed,
                other => return Err(anyhow!("unknown stub parameter '{}'", other)),
            }
        }
        Ok(config)
    }
}

pub struct SyntheticCamera {
    config: SyntheticConfig,
    frame_count: u64,
    next_frame_at: Option<Instant>,
    released: bool,
}

impl SyntheticCamera {
    pub fn open(device: &str, width: u32, height: u32) -> Result<Self> {
        let config = SyntheticConfig::parse(device, width, height)?;
        log::info!(
            "SyntheticCamera: opened {} ({}x{})",
            config.name,
            config.width,
            config.height
        );
        Ok(Self::new(config))
    }

    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            config,
            frame_count: 0,
            next_frame_at: None,
            released: false,
        }
    }

    pub fn frames_captured(&self) -> u64 {
        self.frame_count
    }

    fn pace(&mut self) {
        if self.config.fps == 0 {
            return;
        }
        let interval = Duration::from_millis(1000 / self.config.fps as u64);
        let now = Instant::now();
        if let Some(due) = self.next_frame_at {
            if due > now {
                std::thread::sleep(due - now);
            }
        }
        self.next_frame_at = Some(Instant::now() + interval);
    }

    fn render(&self) -> RgbImage {
        let (width, height) = (self.config.width, self.config.height);
        let mut image = RgbImage::from_fn(width, height, |x, y| {
            let shade = (40 + (x * 80) / width.max(1) + (y * 40) / height.max(1)) as u8;
            Rgb([shade, shade, shade.saturating_add(10)])
        });

        let phase = self.frame_count % self.config.period;
        if phase < self.config.visit && self.frame_count >= self.config.period {
            let size = VISITOR_SIZE.min(width).min(height);
            let travel = width.saturating_sub(size) as u64;
            let x0 = (travel * phase / self.config.visit.max(1)) as u32;
            let y0 = height.saturating_sub(size) / 2;
            for y in y0..(y0 + size).min(height) {
                for x in x0..(x0 + size).min(width) {
                    image.put_pixel(x, y, Rgb([230, 220, 200]));
                }
            }
        }
        image
    }
}

impl CameraDevice for SyntheticCamera {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn frame_size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    fn read_frame(&mut self) -> Result<Option<Frame>> {
        if self.released {
            return Ok(None);
        }
        if let Some(limit) = self.config.frame_limit {
            if self.frame_count >= limit {
                return Ok(None);
            }
        }
        self.pace();
        let frame = Frame::from_rgb(self.render());
        self.frame_count += 1;
        Ok(Some(frame))
    }

    fn release(&mut self) {
        if !self.released {
            log::info!(
                "SyntheticCamera: released {} after {} frames",
                self.config.name,
                self.frame_count
            );
        }
        self.released = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_parameters() -> Result<()> {
        let config = SyntheticConfig::parse("stub://porch?frames=12&fps=0&period=5", 64, 48)?;
        assert_eq!(config.name, "porch");
        assert_eq!(config.frame_limit, Some(12));
        assert_eq!(config.fps, 0);
        assert_eq!(config.period, 5);
        assert_eq!(config.visit, DEFAULT_VISIT);
        assert!(SyntheticConfig::parse("stub://x?colour=red", 64, 48).is_err());
        assert!(SyntheticConfig::parse("rtsp://x", 64, 48).is_err());
        Ok(())
    }

    #[test]
    fn rejects_fps_beyond_u32() -> Result<()> {
        let config = SyntheticConfig::parse("stub://x?fps=4294967295", 64, 48)?;
        assert_eq!(config.fps, u32::MAX);
        let err = SyntheticConfig::parse("stub://x?fps=4294967296", 64, 48).unwrap_err();
        assert!(err.to_string().contains("out of range"));
        Ok(())
    }

    #[test]
    fn stops_at_frame_limit() -> Result<()> {
        let mut camera = SyntheticCamera::open("stub://test?frames=3&fps=0", 64, 48)?;
        for _ in 0..3 {
            let frame = camera.read_frame()?.expect("frame");
            assert_eq!((frame.width, frame.height), (64, 48));
        }
        assert!(camera.read_frame()?.is_none());
        assert_eq!(camera.frames_captured(), 3);
        Ok(())
    }

    #[test]
    fn released_camera_produces_nothing() -> Result<()> {
        let mut camera = SyntheticCamera::open("stub://test?fps=0", 64, 48)?;
        camera.release();
        assert!(camera.read_frame()?.is_none());
        Ok(())
    }

    #[test]
    fn visitor_changes_the_scene() -> Result<()> {
        let mut camera =
            SyntheticCamera::open("stub://test?fps=0&period=4&visit=2", 160, 120)?;
        let empty = camera.read_frame()?.expect("frame");
        for _ in 1..4 {
            camera.read_frame()?;
        }
        let visited = camera.read_frame()?.expect("frame");
        assert_ne!(empty.pixels(), visited.pixels());
        Ok(())
    }
}
