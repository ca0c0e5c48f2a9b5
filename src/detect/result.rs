/// Axis-aligned region found in a frame, in pixel coordinates.
///
/// `right` and `bottom` are exclusive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DetectedRegion {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
    pub label: Option<String>,
}

impl DetectedRegion {
    pub fn new(left: u32, top: u32, right: u32, bottom: u32) -> Self {
        Self {
            left: left.min(right),
            top: top.min(bottom),
            right: right.max(left),
            bottom: bottom.max(top),
            label: None,
        }
    }

    pub fn from_xywh(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self::new(x, y, x.saturating_add(width), y.saturating_add(height))
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn width(&self) -> u32 {
        self.right - self.left
    }

    pub fn height(&self) -> u32 {
        self.bottom - self.top
    }

    pub fn area(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Clip the region to a `width` x `height` image.
    pub fn clamp_to(&self, width: u32, height: u32) -> Self {
        Self {
            left: self.left.min(width),
            top: self.top.min(height),
            right: self.right.min(width),
            bottom: self.bottom.min(height),
            label: self.label.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corners_are_normalized() {
        let region = DetectedRegion::new(40, 30, 10, 5);
        assert_eq!((region.left, region.top), (10, 5));
        assert_eq!((region.width(), region.height()), (30, 25));
        assert_eq!(region.area(), 750);
    }

    #[test]
    fn clamp_keeps_label() {
        let region = DetectedRegion::from_xywh(600, 400, 100, 100).with_label("body");
        let clipped = region.clamp_to(640, 480);
        assert_eq!(clipped.right, 640);
        assert_eq!(clipped.bottom, 480);
        assert_eq!(clipped.label.as_deref(), Some("body"));
        assert!(DetectedRegion::from_xywh(700, 0, 10, 10)
            .clamp_to(640, 480)
            .is_empty());
    }
}
