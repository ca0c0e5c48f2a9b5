mod backend;
pub mod backends;
mod motion;
mod registry;
mod result;

pub use backend::RegionDetector;
pub use motion::{MotionDetector, MIN_CONTOUR_AREA, MOTION_BLUR_SIGMA, MOTION_THRESHOLD};
pub use registry::ClassifierRegistry;
pub use result::DetectedRegion;
