use anyhow::{anyhow, Result};

/// Pixel layouts a V4L2 device may hand back after format negotiation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PixelFormat {
    Rgb24,
    Yuyv,
    Nv12,
}

impl PixelFormat {
    pub(crate) fn from_fourcc(fourcc: &[u8; 4]) -> Option<Self> {
        match fourcc {
            b"RGB3" => Some(Self::Rgb24),
            b"YUYV" => Some(Self::Yuyv),
            b"NV12" => Some(Self::Nv12),
            _ => None,
        }
    }
}

/// Convert one captured buffer into tightly packed RGB24.
pub(crate) fn to_rgb24(pixels: &[u8], width: u32, height: u32, format: PixelFormat) -> Result<Vec<u8>> {
    let w = width as usize;
    let h = height as usize;
    let area = w
        .checked_mul(h)
        .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
    let expected = match format {
        PixelFormat::Rgb24 => area * 3,
        PixelFormat::Yuyv => area * 2,
        PixelFormat::Nv12 => area + area / 2,
    };
    // Drivers may pad the last plane; anything shorter is a truncated buffer.
    if pixels.len() < expected {
        return Err(anyhow!(
            "{:?} buffer too short: expected {} bytes, got {}",
            format,
            expected,
            pixels.len()
        ));
    }

    match format {
        PixelFormat::Rgb24 => Ok(pixels[..expected].to_vec()),
        PixelFormat::Yuyv => {
            let mut rgb = Vec::with_capacity(area * 3);
            for chunk in pixels[..expected].chunks_exact(4) {
                let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
                rgb.extend_from_slice(&yuv_to_rgb(y0, u, v));
                rgb.extend_from_slice(&yuv_to_rgb(y1, u, v));
            }
            Ok(rgb)
        }
        PixelFormat::Nv12 => {
            let mut rgb = vec![0u8; area * 3];
            for j in 0..h {
                for i in 0..w {
                    let uv = area + (j / 2) * w + (i / 2) * 2;
                    let px = yuv_to_rgb(pixels[j * w + i], pixels[uv], pixels[uv + 1]);
                    let offset = (j * w + i) * 3;
                    rgb[offset..offset + 3].copy_from_slice(&px);
                }
            }
            Ok(rgb)
        }
    }
}

fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let y = y as f32;
    let u = u as f32 - 128.0;
    let v = v as f32 - 128.0;
    [
        clamp_to_u8(y + 1.402 * v),
        clamp_to_u8(y - 0.344_136 * u - 0.714_136 * v),
        clamp_to_u8(y + 1.772 * u),
    ]
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}
