use crate::ParkingStatus;

/// Temporal debounce for one zone.
///
/// A verdict that differs from the committed status must persist for
/// `delay_secs` of playback time before it replaces it. Any sample that agrees
/// with the committed status cancels the pending change.
#[derive(Clone, Debug)]
pub struct ZoneDebouncer {
    current: ParkingStatus,
    pending_since: Option<f64>,
    delay_secs: f64,
}

impl ZoneDebouncer {
    pub fn new(delay_secs: f64) -> Self {
        Self {
            current: ParkingStatus::NotDetermined,
            pending_since: None,
            delay_secs,
        }
    }

    /// Committed status.
    pub fn status(&self) -> ParkingStatus {
        self.current
    }

    /// Playback time at which the pending change was first observed.
    pub fn pending_since(&self) -> Option<f64> {
        self.pending_since
    }

    /// Feed one raw verdict observed at playback time `t` (seconds).
    ///
    /// Returns the new status when this sample commits a change.
    pub fn observe(&mut self, verdict: ParkingStatus, t: f64) -> Option<ParkingStatus> {
        if verdict == self.current {
            self.pending_since = None;
            return None;
        }
        match self.pending_since {
            None => {
                self.pending_since = Some(t);
                None
            }
            Some(since) if t - since >= self.delay_secs => {
                self.current = verdict;
                self.pending_since = None;
                Some(verdict)
            }
            Some(_) => None,
        }
    }

    /// Drop a pending change, e.g. after the playback clock jumps backwards.
    pub fn clear_pending(&mut self) {
        self.pending_since = None;
    }
}
