//! Current-availability file for lightweight readers.
//!
//! Written as a small JSON document and swapped into place with a rename, so a
//! reader polling the file never sees a half-written report.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{ParkingStatus, StatusTally};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityReport {
    pub available_spaces: usize,
    pub occupied_spaces: usize,
    pub unknown_spaces: usize,
    pub total: usize,
}

impl AvailabilityReport {
    pub fn from_statuses(statuses: &[ParkingStatus]) -> Self {
        Self::from(StatusTally::from_statuses(statuses))
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let json = serde_json::to_vec_pretty(self)?;
        std::fs::write(&tmp, json)
            .with_context(|| format!("failed to write {}", Path::new(&tmp).display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("failed to replace {}", path.display()))?;
        Ok(())
    }

    pub fn read_from(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("invalid report {}", path.display()))
    }
}

impl From<StatusTally> for AvailabilityReport {
    fn from(tally: StatusTally) -> Self {
        Self {
            available_spaces: tally.free,
            occupied_spaces: tally.occupied,
            unknown_spaces: tally.unknown,
            total: tally.total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_counts_each_status() {
        let report = AvailabilityReport::from_statuses(&[
            ParkingStatus::Free,
            ParkingStatus::Free,
            ParkingStatus::Occupied,
            ParkingStatus::NotDetermined,
        ]);
        assert_eq!(
            report,
            AvailabilityReport {
                available_spaces: 2,
                occupied_spaces: 1,
                unknown_spaces: 1,
                total: 4,
            }
        );
    }

    #[test]
    fn write_replaces_previous_report() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("state").join("parking_lot_state.json");

        AvailabilityReport::from_statuses(&[ParkingStatus::Occupied]).write_to(&path)?;
        let latest = AvailabilityReport::from_statuses(&[ParkingStatus::Free]);
        latest.write_to(&path)?;

        assert_eq!(AvailabilityReport::read_from(&path)?, latest);
        let raw: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
        assert_eq!(raw["available_spaces"], 1);
        assert_eq!(raw["total"], 1);
        assert!(!dir.path().join("state/parking_lot_state.json.tmp").exists());
        Ok(())
    }
}
