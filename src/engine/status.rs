use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::ParkingStatus;

/// Callback invoked with the full status vector after every processed frame.
///
/// Runs on the detection thread; a slow observer slows the loop.
pub type StatusObserver = Box<dyn FnMut(&[ParkingStatus]) + Send>;

/// Latest published status vector of one detection loop.
///
/// The loop replaces the whole vector at once, so readers never see a mix of
/// two frames. Nothing is published before the first processed frame.
#[derive(Debug, Default)]
pub struct StatusBoard {
    latest: RwLock<Option<Arc<[ParkingStatus]>>>,
    frames_processed: AtomicU64,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, statuses: &[ParkingStatus]) {
        let snapshot: Arc<[ParkingStatus]> = Arc::from(statuses);
        let mut slot = match self.latest.write() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = Some(snapshot);
        self.frames_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn latest(&self) -> Option<Arc<[ParkingStatus]>> {
        match self.latest.read() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Number of frames published so far.
    pub fn frames_processed(&self) -> u64 {
        self.frames_processed.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_until_first_publish() {
        let board = StatusBoard::new();
        assert!(board.latest().is_none());
        assert_eq!(board.frames_processed(), 0);
    }

    #[test]
    fn publish_replaces_whole_vector() {
        let board = StatusBoard::new();
        board.publish(&[ParkingStatus::Free, ParkingStatus::Occupied]);
        let first = board.latest().unwrap();

        board.publish(&[ParkingStatus::Occupied, ParkingStatus::Occupied]);
        assert_eq!(&*first, &[ParkingStatus::Free, ParkingStatus::Occupied]);
        assert_eq!(
            &*board.latest().unwrap(),
            &[ParkingStatus::Occupied, ParkingStatus::Occupied]
        );
        assert_eq!(board.frames_processed(), 2);
    }
}
