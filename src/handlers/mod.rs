//! Frame handlers installed on capture sessions.
//!
//! - `AuthenticationHandler`: votes on recognized faces until one user is authenticated
//! - `MotionRecordHandler`: records while motion is seen against a background frame
//! - `WatchHandler`: records a fixed-length sequence after each body sighting

mod auth;
mod motion;
mod watch;

pub use auth::AuthenticationHandler;
pub use motion::{MotionRecordHandler, BACKGROUND_REFRESH, MOTION_COOLDOWN};
pub use watch::{WatchHandler, BODY_CHECK_INTERVAL};
