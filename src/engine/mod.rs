//! Occupancy detection engine.
//!
//! One `DetectionSession` drives one lot: it reads frames, keeps every third,
//! classifies each zone (`FrameClassifier`), smooths the raw verdicts through a
//! per-zone `ZoneDebouncer`, and publishes the resulting status vector on a
//! `StatusBoard` that other threads read without blocking the loop.
//! `SessionHandle` runs a session on its own thread with cooperative stop.

mod classifier;
mod debounce;
mod handle;
mod session;
mod status;

use std::time::Duration;

use crate::error::OccupancyError;

pub use classifier::{texture_score, verdict, FrameClassifier, PreparedFrame, ZoneReading};
pub use debounce::ZoneDebouncer;
pub use handle::SessionHandle;
pub use session::{DetectionSession, SessionExit};
pub use status::{StatusBoard, StatusObserver};

/// How a session reacts to the end of its video.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopMode {
    /// Server mode: end-of-stream and read failures rewind to the start offset.
    Continuous,
    /// Run the video once: end-of-stream stops cleanly, read failures are fatal.
    OneShot,
}

/// Tunables shared by every session of a process.
#[derive(Clone, Debug, PartialEq)]
pub struct EngineSettings {
    /// Mean |Laplacian| below which a zone counts as a flat, empty surface.
    pub texture_threshold: f64,
    /// Playback seconds a differing verdict must persist before it is committed.
    pub detect_delay_secs: f64,
    /// Process one frame out of every `sample_every` read.
    pub sample_every: u64,
    /// Gaussian blur sigma applied before the texture test.
    pub blur_sigma: f32,
    /// Pause after each processed frame.
    pub frame_pause: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            texture_threshold: 1.2,
            detect_delay_secs: 1.0,
            sample_every: 3,
            blur_sigma: 3.0,
            frame_pause: Duration::from_millis(10),
        }
    }
}

impl EngineSettings {
    pub fn validate(&self) -> Result<(), OccupancyError> {
        if self.sample_every == 0 {
            return Err(OccupancyError::configuration("sample_every must be >= 1"));
        }
        if !(self.texture_threshold > 0.0) {
            return Err(OccupancyError::configuration(
                "texture_threshold must be greater than zero",
            ));
        }
        if !(self.detect_delay_secs >= 0.0) {
            return Err(OccupancyError::configuration(
                "detect_delay_secs must not be negative",
            ));
        }
        if !(self.blur_sigma >= 0.0) {
            return Err(OccupancyError::configuration("blur_sigma must not be negative"));
        }
        Ok(())
    }
}
