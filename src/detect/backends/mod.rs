#[cfg(feature = "backend-tract")]
pub mod tract;

use std::path::Path;

use anyhow::Result;

use crate::detect::backend::RegionDetector;
use crate::error::CamwatchError;

#[cfg(feature = "backend-tract")]
pub use tract::TractDetector;

/// Load the detector model at `path` with the compiled-in backend.
pub fn load_detector(path: &Path) -> Result<Box<dyn RegionDetector>> {
    if !path.is_file() {
        return Err(CamwatchError::classifier(format!(
            "classifier file {} not found",
            path.display()
        )));
    }

    #[cfg(feature = "backend-tract")]
    {
        Ok(Box::new(TractDetector::new(path)?))
    }
    #[cfg(not(feature = "backend-tract"))]
    {
        Err(CamwatchError::classifier(format!(
            "classifier {} requires the backend-tract feature",
            path.display()
        )))
    }
}
