//! Lot manager.
//!
//! Keeps at most one continuous detection loop per lot, answers status
//! queries from the loops' published vectors, and runs a background task that
//! appends a snapshot of every running lot to the store at a fixed interval.
//! Loops that die on their own are reaped (joined and logged) on the next
//! snapshot tick or status query.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{anyhow, Result};

use crate::availability::AvailabilityReport;
use crate::detect::ObjectDetector;
use crate::engine::{DetectionSession, EngineSettings, LoopMode, SessionHandle, StatusObserver};
use crate::error::OccupancyError;
use crate::ingest::{is_synthetic_path, open_source, FrameSource};
use crate::storage::{LotRecord, LotStore, StatusSnapshot};
use crate::zone::load_zone_file;
use crate::ParkingStatus;

/// Builds one detector instance per started lot.
pub type DetectorFactory = Arc<dyn Fn() -> Result<Box<dyn ObjectDetector>> + Send + Sync>;

/// Opens the frame source for a lot's video path.
pub type SourceOpener = Arc<dyn Fn(&str) -> Result<Box<dyn FrameSource>> + Send + Sync>;

#[derive(Clone, Debug)]
pub struct ManagerSettings {
    pub engine: EngineSettings,
    pub snapshot_interval: Duration,
    /// When set, each running lot keeps `<dir>/<lot_id>.json` current.
    pub availability_dir: Option<PathBuf>,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            engine: EngineSettings::default(),
            snapshot_interval: Duration::from_secs(10),
            availability_dir: None,
        }
    }
}

type LoopMap = Mutex<HashMap<String, SessionHandle>>;

struct SnapshotTask {
    stop_tx: mpsc::Sender<()>,
    join: JoinHandle<()>,
}

pub struct LotManager<S: LotStore + 'static> {
    store: Arc<Mutex<S>>,
    loops: Arc<LoopMap>,
    settings: ManagerSettings,
    detectors: DetectorFactory,
    sources: SourceOpener,
    snapshot_task: Mutex<Option<SnapshotTask>>,
}

impl<S: LotStore + 'static> LotManager<S> {
    pub fn new(store: S, settings: ManagerSettings, detectors: DetectorFactory) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
            loops: Arc::new(Mutex::new(HashMap::new())),
            settings,
            detectors,
            sources: Arc::new(|path: &str| open_source(path)),
            snapshot_task: Mutex::new(None),
        }
    }

    pub fn with_source_opener(mut self, sources: SourceOpener) -> Self {
        self.sources = sources;
        self
    }

    pub fn settings(&self) -> &ManagerSettings {
        &self.settings
    }

    /// Shared handle to the lot store.
    pub fn store(&self) -> Arc<Mutex<S>> {
        Arc::clone(&self.store)
    }

    /// Start every active lot and the snapshot task. Calling it again is a no-op.
    ///
    /// A lot that fails to start is logged and skipped.
    pub fn initialize(&self) -> Result<(), OccupancyError> {
        let mut task = lock(&self.snapshot_task);
        if task.is_some() {
            return Ok(());
        }

        let lots = self.with_store(|store| store.list_lots(true))?;
        let mut started = 0usize;
        for lot in &lots {
            match self.start(&lot.id) {
                Ok(_) => started += 1,
                Err(e) => log::error!("lot {}: failed to start detector: {}", lot.id, e),
            }
        }
        log::info!("started {} of {} active lots", started, lots.len());

        *task = Some(self.spawn_snapshot_task()?);
        Ok(())
    }

    /// Start the detection loop for `lot_id`.
    ///
    /// Returns `Ok(false)` when a loop for the lot is already running.
    pub fn start(&self, lot_id: &str) -> Result<bool, OccupancyError> {
        if self.is_running(lot_id) {
            return Ok(false);
        }
        reap_finished(&self.loops);

        let lot = self
            .with_store(|store| store.lot(lot_id))?
            .ok_or_else(|| OccupancyError::configuration(format!("unknown lot {}", lot_id)))?;
        let session = self.build_session(&lot)?;

        let mut loops = lock(&self.loops);
        if loops.contains_key(&lot.id) {
            return Ok(false);
        }
        let handle = SessionHandle::spawn(session)?;
        loops.insert(lot.id.clone(), handle);
        log::info!("lot {}: detector started for '{}'", lot.id, lot.name);
        Ok(true)
    }

    /// Ask the lot's loop to stop; it ends at its next frame.
    ///
    /// Returns false when nothing was running for the lot.
    pub fn stop(&self, lot_id: &str) -> bool {
        let Some(handle) = lock(&self.loops).remove(lot_id) else {
            return false;
        };
        handle.request_stop();
        log::info!("lot {}: detector stop requested", lot_id);
        true
    }

    /// Most recent status vector of a running lot.
    ///
    /// `None` when the lot is not running or has not processed a frame yet.
    pub fn status_of(&self, lot_id: &str) -> Option<Arc<[ParkingStatus]>> {
        reap_finished(&self.loops);
        lock(&self.loops).get(lot_id).and_then(SessionHandle::status)
    }

    /// Ids of running lots, sorted.
    pub fn active_lots(&self) -> Vec<String> {
        reap_finished(&self.loops);
        let mut ids: Vec<String> = lock(&self.loops).keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Append one snapshot per running lot that has a status vector.
    ///
    /// Returns how many snapshots were written. Failures are logged per lot.
    pub fn snapshot_tick(&self) -> usize {
        snapshot_tick(&*self.store, &*self.loops)
    }

    /// Latest stored snapshot of every active lot.
    pub fn latest_snapshots(
        &self,
    ) -> Result<Vec<(LotRecord, Option<StatusSnapshot>)>, OccupancyError> {
        self.with_store(|store| store.latest_snapshots())
    }

    /// Stop the snapshot task and every loop, then wait for their threads.
    /// Safe to call more than once.
    pub fn shutdown(&self) {
        if let Some(task) = lock(&self.snapshot_task).take() {
            drop(task.stop_tx);
            if task.join.join().is_err() {
                log::error!("snapshot task panicked");
            }
        }

        let handles: Vec<SessionHandle> = lock(&self.loops).drain().map(|(_, h)| h).collect();
        if handles.is_empty() {
            return;
        }
        for handle in &handles {
            handle.request_stop();
        }
        for handle in handles {
            let lot_id = handle.label().to_string();
            match handle.join() {
                Ok(exit) => log::info!("lot {}: detector stopped ({:?})", lot_id, exit),
                Err(e) => log::error!("lot {}: detector ended with error: {:#}", lot_id, e),
            }
        }
    }

    fn is_running(&self, lot_id: &str) -> bool {
        lock(&self.loops)
            .get(lot_id)
            .is_some_and(|handle| !handle.is_finished())
    }

    fn build_session(&self, lot: &LotRecord) -> Result<DetectionSession, OccupancyError> {
        if !is_synthetic_path(&lot.video_path) && !Path::new(&lot.video_path).exists() {
            return Err(OccupancyError::configuration(format!(
                "lot {}: video file {} does not exist",
                lot.id, lot.video_path
            )));
        }
        let zones_path = Path::new(&lot.zones_path);
        if !zones_path.exists() {
            return Err(OccupancyError::configuration(format!(
                "lot {}: zone file {} does not exist",
                lot.id, lot.zones_path
            )));
        }
        let zones = load_zone_file(zones_path).map_err(|e| {
            OccupancyError::configuration(format!("lot {}: {:#}", lot.id, e))
        })?;
        let source = (self.sources)(&lot.video_path).map_err(|e| {
            OccupancyError::frame_read(format!("lot {}: cannot open video: {:#}", lot.id, e))
        })?;
        let detector = (self.detectors)().map_err(|e| {
            OccupancyError::configuration(format!("lot {}: cannot build detector: {:#}", lot.id, e))
        })?;

        let session = DetectionSession::new(
            lot.id.clone(),
            &zones,
            source,
            lot.start_frame,
            detector,
            self.settings.engine.clone(),
            LoopMode::Continuous,
        )?;
        Ok(match &self.settings.availability_dir {
            Some(dir) => session.with_observer(availability_observer(
                lot.id.clone(),
                dir.join(format!("{}.json", lot.id)),
            )),
            None => session,
        })
    }

    fn spawn_snapshot_task(&self) -> Result<SnapshotTask, OccupancyError> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let store = Arc::clone(&self.store);
        let loops = Arc::clone(&self.loops);
        let interval = self.settings.snapshot_interval;
        let join = thread::Builder::new()
            .name("snapshot".to_string())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        snapshot_tick(&*store, &*loops);
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })
            .map_err(|e| {
                OccupancyError::configuration(format!("failed to spawn snapshot task: {}", e))
            })?;
        Ok(SnapshotTask { stop_tx, join })
    }

    fn with_store<T>(
        &self,
        f: impl FnOnce(&mut S) -> Result<T>,
    ) -> Result<T, OccupancyError> {
        let mut store = self
            .store
            .lock()
            .map_err(|_| OccupancyError::Persistence(anyhow!("lot store lock poisoned")))?;
        f(&mut *store).map_err(OccupancyError::Persistence)
    }
}

impl<S: LotStore + 'static> Drop for LotManager<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn reap_finished(loops: &LoopMap) {
    let finished: Vec<SessionHandle> = {
        let mut loops = lock(loops);
        let ids: Vec<String> = loops
            .iter()
            .filter(|(_, handle)| handle.is_finished())
            .map(|(id, _)| id.clone())
            .collect();
        ids.iter().filter_map(|id| loops.remove(id)).collect()
    };
    for handle in finished {
        let lot_id = handle.label().to_string();
        match handle.join() {
            Ok(exit) => log::info!("lot {}: detection loop exited ({:?})", lot_id, exit),
            Err(e) => log::error!("lot {}: detection loop failed: {:#}", lot_id, e),
        }
    }
}

fn snapshot_tick<S: LotStore>(store: &Mutex<S>, loops: &LoopMap) -> usize {
    reap_finished(loops);
    let current: Vec<(String, Arc<[ParkingStatus]>)> = lock(loops)
        .iter()
        .filter_map(|(id, handle)| handle.status().map(|statuses| (id.clone(), statuses)))
        .collect();

    let mut written = 0;
    for (lot_id, statuses) in current {
        match persist_snapshot(store, &lot_id, &statuses) {
            Ok(snapshot) => {
                written += 1;
                log::debug!(
                    "lot {}: {} free, {} occupied, {} unknown of {}",
                    lot_id,
                    snapshot.free,
                    snapshot.occupied,
                    snapshot.unknown,
                    snapshot.total
                );
            }
            Err(e) => log::error!("lot {}: snapshot not stored: {}", lot_id, e),
        }
    }
    written
}

fn persist_snapshot<S: LotStore>(
    store: &Mutex<S>,
    lot_id: &str,
    statuses: &[ParkingStatus],
) -> Result<StatusSnapshot, OccupancyError> {
    let snapshot =
        StatusSnapshot::capture(lot_id, statuses).map_err(OccupancyError::Persistence)?;
    let mut store = store
        .lock()
        .map_err(|_| OccupancyError::Persistence(anyhow!("lot store lock poisoned")))?;
    store
        .append_snapshot(&snapshot)
        .map_err(OccupancyError::Persistence)?;
    Ok(snapshot)
}

/// Keeps a lot's availability file in step with its status vector.
fn availability_observer(lot_id: String, path: PathBuf) -> StatusObserver {
    let mut last_written: Option<AvailabilityReport> = None;
    let mut warned = false;
    Box::new(move |statuses: &[ParkingStatus]| {
        let report = AvailabilityReport::from_statuses(statuses);
        if last_written == Some(report) {
            return;
        }
        match report.write_to(&path) {
            Ok(()) => last_written = Some(report),
            Err(e) if !warned => {
                log::warn!("lot {}: availability file not written: {:#}", lot_id, e);
                warned = true;
            }
            Err(_) => {}
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn availability_observer_writes_on_change() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("lot.json");
        let mut observer = availability_observer("lot".to_string(), path.clone());

        observer(&[ParkingStatus::NotDetermined, ParkingStatus::Free]);
        let report = AvailabilityReport::read_from(&path)?;
        assert_eq!(report.available_spaces, 1);
        assert_eq!(report.unknown_spaces, 1);

        observer(&[ParkingStatus::Occupied, ParkingStatus::Free]);
        let report = AvailabilityReport::read_from(&path)?;
        assert_eq!(report.occupied_spaces, 1);
        assert_eq!(report.total, 2);
        Ok(())
    }

    #[test]
    fn default_settings_snapshot_every_ten_seconds() {
        let settings = ManagerSettings::default();
        assert_eq!(settings.snapshot_interval, Duration::from_secs(10));
        assert!(settings.availability_dir.is_none());
    }
}
