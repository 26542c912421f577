//! Error taxonomy at the engine and manager boundary.
//!
//! Frame sources, detector backends and stores report `anyhow::Error`; the
//! detection loop and the lot manager classify those failures here so callers
//! can tell a bad lot configuration from a broken video or classifier.

use crate::zone::ZoneId;

#[derive(Debug, thiserror::Error)]
pub enum OccupancyError {
    /// Malformed zone definitions, missing video/zone files, bad settings.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Frame source failure that the current loop mode cannot recover from.
    #[error("frame read failed: {0}")]
    FrameRead(String),

    /// Object-presence classifier failure for one zone of one frame.
    #[error("classifier failed on zone {zone}: {source:#}")]
    Classifier {
        zone: ZoneId,
        #[source]
        source: anyhow::Error,
    },

    /// Lot catalog or snapshot store failure.
    #[error("persistence failed: {0:#}")]
    Persistence(#[source] anyhow::Error),
}

impl OccupancyError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        OccupancyError::Configuration(msg.into())
    }

    pub fn frame_read(msg: impl Into<String>) -> Self {
        OccupancyError::FrameRead(msg.into())
    }
}
