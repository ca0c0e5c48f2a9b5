//! Pairwise frame-difference motion detection.
//!
//! Both frames go to grayscale and get a Gaussian blur so sensor noise does not register as
//! motion. The absolute difference is binarized and the external contours of the result are
//! measured; a single contour above the minimum area is enough to report motion.

use image::imageops::FilterType;
use image::{GrayImage, Luma};
use imageproc::contours::{find_contours, BorderType};
use imageproc::filter::gaussian_blur_f32;
use imageproc::geometry::contour_area;

use crate::detect::result::DetectedRegion;
use crate::frame::Frame;

/// Sigma matching a 21x21 Gaussian kernel.
pub const MOTION_BLUR_SIGMA: f32 = 3.5;
/// Per-pixel intensity difference above which a pixel counts as changed.
pub const MOTION_THRESHOLD: u8 = 25;
/// Minimum contour area, in square pixels, that counts as motion.
pub const MIN_CONTOUR_AREA: f64 = 700.0;

#[derive(Clone, Debug)]
pub struct MotionDetector {
    blur_sigma: f32,
    threshold: u8,
    min_area: f64,
}

impl MotionDetector {
    pub fn new() -> Self {
        Self {
            blur_sigma: MOTION_BLUR_SIGMA,
            threshold: MOTION_THRESHOLD,
            min_area: MIN_CONTOUR_AREA,
        }
    }

    pub fn with_min_area(mut self, min_area: f64) -> Self {
        self.min_area = min_area;
        self
    }

    /// True when `frame` differs from `background` by at least one large enough region.
    pub fn detect(&self, background: &Frame, frame: &Frame) -> bool {
        !self.motion_regions(background, frame).is_empty()
    }

    /// Bounding boxes of every qualifying changed region.
    pub fn motion_regions(&self, background: &Frame, frame: &Frame) -> Vec<DetectedRegion> {
        let mut base = background.to_gray_image();
        if base.dimensions() != (frame.width, frame.height) {
            log::debug!(
                "motion background is {}x{}, frame is {}x{}; rescaling background",
                base.width(),
                base.height(),
                frame.width,
                frame.height
            );
            base = image::imageops::resize(&base, frame.width, frame.height, FilterType::Triangle);
        }

        let base = gaussian_blur_f32(&base, self.blur_sigma);
        let current = gaussian_blur_f32(&frame.to_gray_image(), self.blur_sigma);
        let mask = self.difference_mask(&base, &current);

        find_contours::<i32>(&mask)
            .into_iter()
            .filter(|contour| contour.border_type == BorderType::Outer && contour.parent.is_none())
            .filter(|contour| contour_area(&contour.points).abs() > self.min_area)
            .filter_map(|contour| {
                let min_x = contour.points.iter().map(|p| p.x).min()?;
                let max_x = contour.points.iter().map(|p| p.x).max()?;
                let min_y = contour.points.iter().map(|p| p.y).min()?;
                let max_y = contour.points.iter().map(|p| p.y).max()?;
                Some(DetectedRegion::new(
                    min_x.max(0) as u32,
                    min_y.max(0) as u32,
                    (max_x + 1).max(0) as u32,
                    (max_y + 1).max(0) as u32,
                ))
            })
            .collect()
    }

    /// Detect and draw the qualifying regions onto `frame`.
    ///
    /// Regions are computed before anything is drawn, so the result matches `detect`.
    pub fn detect_and_annotate(&self, background: &Frame, frame: &mut Frame) -> bool {
        let regions = self.motion_regions(background, frame);
        for region in &regions {
            frame.annotate(region);
        }
        !regions.is_empty()
    }

    fn difference_mask(&self, a: &GrayImage, b: &GrayImage) -> GrayImage {
        let mut mask = GrayImage::new(a.width(), a.height());
        for ((out, pa), pb) in mask.pixels_mut().zip(a.pixels()).zip(b.pixels()) {
            if pa.0[0].abs_diff(pb.0[0]) > self.threshold {
                *out = Luma([255]);
            }
        }
        mask
    }
}

impl Default for MotionDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn scene(square: Option<(u32, u32, u32)>) -> Frame {
        let mut image = RgbImage::from_fn(160, 120, |x, y| {
            let shade = 60 + ((x / 20 + y / 20) % 2) as u8 * 20;
            Rgb([shade, shade, shade])
        });
        if let Some((x0, y0, size)) = square {
            for y in y0..y0 + size {
                for x in x0..x0 + size {
                    image.put_pixel(x, y, Rgb([240, 240, 240]));
                }
            }
        }
        Frame::from_rgb(image)
    }

    #[test]
    fn identical_frames_never_report_motion() {
        let detector = MotionDetector::new();
        let background = scene(None);
        assert!(!detector.detect(&background, &background));

        let busy = scene(Some((30, 30, 50)));
        assert!(!detector.detect(&busy, &busy.clone()));
    }

    #[test]
    fn large_object_is_motion() {
        let detector = MotionDetector::new();
        let background = scene(None);
        let frame = scene(Some((60, 40, 40)));
        let regions = detector.motion_regions(&background, &frame);
        assert_eq!(regions.len(), 1);
        let region = &regions[0];
        assert!(region.left <= 60 && region.right >= 100);
        assert!(region.top <= 40 && region.bottom >= 80);
    }

    #[test]
    fn small_change_is_below_area_threshold() {
        let detector = MotionDetector::new();
        let background = scene(None);
        let frame = scene(Some((70, 50, 8)));
        assert!(!detector.detect(&background, &frame));
        assert!(detector.with_min_area(10.0).detect(&background, &frame));
    }

    #[test]
    fn gray_and_rgb_inputs_agree() {
        let detector = MotionDetector::new();
        let background = Frame::from_gray(scene(None).to_gray_image());
        let frame = scene(Some((20, 20, 45)));
        assert!(detector.detect(&background, &frame));
    }

    #[test]
    fn annotation_does_not_change_the_answer() {
        let detector = MotionDetector::new();
        let background = scene(None);
        let mut frame = scene(Some((60, 40, 40)));
        assert!(detector.detect(&background, &frame));
        assert!(detector.detect_and_annotate(&background, &mut frame));

        let mut still = background.clone();
        assert!(!detector.detect_and_annotate(&background, &mut still));
        assert_eq!(still.pixels(), background.pixels());
    }
}
