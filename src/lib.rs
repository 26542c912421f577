//! Parking lot occupancy engine.
//!
//! This crate decides, frame by frame, whether each marked parking space in a
//! video feed is free, occupied, or undetermined, and keeps the latest counts
//! available for one or more independently configured lots.
//!
//! # Architecture
//!
//! Frame source -> detection session -> frame classifier (per zone, using the
//! precomputed zone mask) -> debouncer (per zone) -> published status vector ->
//! lot manager (periodic snapshot) -> lot store.
//!
//! # Module Structure
//!
//! - `zone`: zone definitions, zone files, bounding boxes and masks
//! - `frame` / `ingest`: decoded frames and frame sources (synthetic, FFmpeg)
//! - `detect`: object-presence classifier backends (stub, ONNX via tract)
//! - `engine`: frame classifier, debouncer, detection session and its thread handle
//! - `manager`: one detection loop per active lot plus the snapshot task
//! - `storage`: lot catalog and append-only snapshot log (SQLite, in-memory)
//! - `availability`: lightweight availability file for external readers

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

pub mod availability;
pub mod config;
pub mod detect;
pub mod engine;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod manager;
pub mod storage;
pub mod ui;
pub mod zone;

pub use availability::AvailabilityReport;
pub use config::OccupancyConfig;
pub use detect::{
    build_detector, Detection, DetectionResult, DetectorSettings, ObjectClass, ObjectDetector,
};
pub use engine::{
    DetectionSession, EngineSettings, FrameClassifier, LoopMode, SessionExit, SessionHandle,
    StatusBoard, StatusObserver, ZoneDebouncer,
};
pub use error::OccupancyError;
pub use frame::Frame;
pub use ingest::{open_source, FrameRead, FrameSource, SyntheticConfig, SyntheticSource};
pub use manager::{DetectorFactory, LotManager, ManagerSettings, SourceOpener};
pub use storage::{
    InMemoryLotStore, LotRecord, LotStore, NewLot, SqliteLotStore, StatusSnapshot,
};
pub use zone::{BoundingBox, ZoneDefinition, ZoneGeometry, ZoneId, ZoneMask};

// -------------------- Parking Status --------------------

/// Occupancy state of a single parking space.
///
/// Shared by value across every component; serialized in lowercase so stored
/// snapshots stay readable.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParkingStatus {
    Free,
    Occupied,
    #[default]
    NotDetermined,
}

impl ParkingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ParkingStatus::Free => "free",
            ParkingStatus::Occupied => "occupied",
            ParkingStatus::NotDetermined => "not_determined",
        }
    }
}

impl std::fmt::Display for ParkingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counts of each status over one status vector.
///
/// `free + occupied + unknown == total` holds by construction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusTally {
    pub total: usize,
    pub free: usize,
    pub occupied: usize,
    pub unknown: usize,
}

impl StatusTally {
    pub fn from_statuses(statuses: &[ParkingStatus]) -> Self {
        let mut tally = StatusTally {
            total: statuses.len(),
            ..StatusTally::default()
        };
        for status in statuses {
            match status {
                ParkingStatus::Free => tally.free += 1,
                ParkingStatus::Occupied => tally.occupied += 1,
                ParkingStatus::NotDetermined => tally.unknown += 1,
            }
        }
        tally
    }
}

/// Wall-clock seconds since the Unix epoch.
pub fn now_s() -> Result<u64> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tally_partitions_every_status() {
        let statuses = [
            ParkingStatus::Free,
            ParkingStatus::Occupied,
            ParkingStatus::NotDetermined,
            ParkingStatus::Free,
        ];
        let tally = StatusTally::from_statuses(&statuses);
        assert_eq!(tally.total, 4);
        assert_eq!(tally.free, 2);
        assert_eq!(tally.occupied, 1);
        assert_eq!(tally.unknown, 1);
        assert_eq!(tally.free + tally.occupied + tally.unknown, tally.total);
    }

    #[test]
    fn tally_of_empty_vector_is_zero() {
        assert_eq!(StatusTally::from_statuses(&[]), StatusTally::default());
    }

    #[test]
    fn status_serializes_as_snake_case() {
        let json = serde_json::to_string(&ParkingStatus::NotDetermined).unwrap();
        assert_eq!(json, "\"not_determined\"");
        let back: ParkingStatus = serde_json::from_str("\"occupied\"").unwrap();
        assert_eq!(back, ParkingStatus::Occupied);
    }
}
