//! Failure categories for the capture pipeline.
//!
//! Public operations return `anyhow::Result`. When a failure belongs to one of the categories
//! below, the category is the root error of the chain so callers can tell them apart with
//! `err.downcast_ref::<CamwatchError>()`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CamwatchError {
    /// Camera open or read failure. Fails `start`, ends the capture loop.
    #[error("camera device error: {0}")]
    Device(String),

    /// Detector model missing or unusable. Detection degrades to "nothing found".
    #[error("classifier error: {0}")]
    Classifier(String),

    /// Video write failure. The buffered frames are dropped.
    #[error("video encode error: {0}")]
    Encode(String),

    /// Identity lookup failure. Treated as "not found".
    #[error("identity lookup error: {0}")]
    Lookup(String),

    /// Face model training failure. The previous model stays in place.
    #[error("face training error: {0}")]
    Training(String),
}

impl CamwatchError {
    pub fn device(msg: impl Into<String>) -> anyhow::Error {
        anyhow::Error::new(Self::Device(msg.into()))
    }

    pub fn classifier(msg: impl Into<String>) -> anyhow::Error {
        anyhow::Error::new(Self::Classifier(msg.into()))
    }

    pub fn encode(msg: impl Into<String>) -> anyhow::Error {
        anyhow::Error::new(Self::Encode(msg.into()))
    }

    pub fn lookup(msg: impl Into<String>) -> anyhow::Error {
        anyhow::Error::new(Self::Lookup(msg.into()))
    }

    pub fn training(msg: impl Into<String>) -> anyhow::Error {
        anyhow::Error::new(Self::Training(msg.into()))
    }
}

/// Returns the pipeline category of an error chain, if any link carries one.
pub fn category(err: &anyhow::Error) -> Option<&CamwatchError> {
    err.chain().find_map(|cause| cause.downcast_ref::<CamwatchError>())
}
