//! Video files.
//!
//! Recordings are animated GIFs: every frame is scaled to the session resolution and shown
//! for `1 / fps` seconds. The file is written as `<name>.gif.part` and renamed once complete,
//! so directory watchers never pick up a partial video.

use anyhow::{Context, Result};
use image::codecs::gif::{GifDecoder, GifEncoder, Repeat};
use image::imageops::FilterType;
use image::{AnimationDecoder, Delay, DynamicImage, RgbaImage};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use crate::error::CamwatchError;
use crate::frame::{random_name, Frame};

pub const VIDEO_EXTENSION: &str = "gif";
pub const PARTIAL_EXTENSION: &str = "part";

#[derive(Clone, Debug)]
pub struct VideoEncoder {
    output_dir: PathBuf,
    fps: u32,
}

impl VideoEncoder {
    pub fn new(output_dir: impl Into<PathBuf>, fps: u32) -> Self {
        Self {
            output_dir: output_dir.into(),
            fps: fps.max(1),
        }
    }

    /// Encode `frames` in order at `size`. Returns the finished file's path.
    pub fn write(&self, frames: &[Frame], size: (u32, u32)) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.output_dir).map_err(|e| {
            CamwatchError::encode(format!(
                "create video directory {}: {}",
                self.output_dir.display(),
                e
            ))
        })?;
        let name = video_file_name();
        let path = self.output_dir.join(&name);
        let partial = self
            .output_dir
            .join(format!("{}.{}", name, PARTIAL_EXTENSION));

        if let Err(err) = self.encode(frames, size, &partial) {
            let _ = std::fs::remove_file(&partial);
            return Err(CamwatchError::encode(format!(
                "write video {}: {:#}",
                path.display(),
                err
            )));
        }
        std::fs::rename(&partial, &path).map_err(|e| {
            CamwatchError::encode(format!("finish video {}: {}", path.display(), e))
        })?;
        log::info!(
            "wrote {} frames to {} ({}x{} @ {} fps)",
            frames.len(),
            path.display(),
            size.0,
            size.1,
            self.fps
        );
        Ok(path)
    }

    fn encode(&self, frames: &[Frame], size: (u32, u32), path: &Path) -> Result<()> {
        let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
        let mut encoder = GifEncoder::new(BufWriter::new(file));
        encoder.set_repeat(Repeat::Infinite)?;
        let delay = Delay::from_numer_denom_ms(1000, self.fps);
        for frame in frames {
            let image = scaled_rgba(frame, size);
            encoder.encode_frame(image::Frame::from_parts(image, 0, 0, delay))?;
        }
        Ok(())
    }
}

fn scaled_rgba(frame: &Frame, (width, height): (u32, u32)) -> RgbaImage {
    let image = DynamicImage::ImageRgb8(frame.to_rgb_image()).into_rgba8();
    if image.dimensions() == (width, height) {
        image
    } else {
        image::imageops::resize(&image, width, height, FilterType::Triangle)
    }
}

/// `<local timestamp>-<random>.gif`
fn video_file_name() -> String {
    format!(
        "{}-{}.{}",
        chrono::Local::now().format("%Y%m%d-%H%M%S"),
        &random_name()[..12],
        VIDEO_EXTENSION
    )
}

/// Decode a recording back into frames.
pub fn read_video(path: &Path) -> Result<Vec<Frame>> {
    let file = File::open(path).with_context(|| format!("open video {}", path.display()))?;
    let decoder = GifDecoder::new(std::io::BufReader::new(file))
        .with_context(|| format!("decode video {}", path.display()))?;
    let frames = decoder
        .into_frames()
        .collect_frames()
        .with_context(|| format!("decode video frames {}", path.display()))?;
    Ok(frames
        .into_iter()
        .map(|frame| Frame::from_rgb(DynamicImage::ImageRgba8(frame.into_buffer()).into_rgb8()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn frames_keep_order_and_size() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let encoder = VideoEncoder::new(dir.path(), 5);
        let frames: Vec<Frame> = [0u8, 120, 250]
            .iter()
            .map(|&shade| Frame::from_rgb(RgbImage::from_pixel(32, 24, Rgb([shade; 3]))))
            .collect();
        let path = encoder.write(&frames, (16, 12))?;
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some(VIDEO_EXTENSION));

        let decoded = read_video(&path)?;
        assert_eq!(decoded.len(), 3);
        assert!(decoded.iter().all(|f| (f.width, f.height) == (16, 12)));
        let shades: Vec<u8> = decoded.iter().map(|f| f.pixels()[0]).collect();
        assert!(shades[0] < shades[1] && shades[1] < shades[2]);
        Ok(())
    }

    #[test]
    fn no_partial_file_is_left_behind() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let encoder = VideoEncoder::new(dir.path(), 10);
        encoder.write(&[Frame::from_rgb(RgbImage::new(8, 8))], (8, 8))?;
        let names: Vec<String> = std::fs::read_dir(dir.path())?
            .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
            .collect::<std::io::Result<_>>()?;
        assert_eq!(names.len(), 1);
        assert!(!names[0].ends_with(PARTIAL_EXTENSION));
        Ok(())
    }

    #[test]
    fn unwritable_directory_is_an_encode_error() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"not a directory")?;
        let encoder = VideoEncoder::new(blocker.join("videos"), 10);
        let err = encoder
            .write(&[Frame::from_rgb(RgbImage::new(8, 8))], (8, 8))
            .unwrap_err();
        assert!(matches!(
            crate::error::category(&err),
            Some(CamwatchError::Encode(_))
        ));
        Ok(())
    }
}
