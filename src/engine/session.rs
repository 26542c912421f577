use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crate::detect::ObjectDetector;
use crate::error::OccupancyError;
use crate::frame::Frame;
use crate::ingest::{FrameRead, FrameSource};
use crate::zone::{build_geometries, ZoneDefinition, ZoneGeometry};
use crate::ParkingStatus;

use super::classifier::FrameClassifier;
use super::debounce::ZoneDebouncer;
use super::status::{StatusBoard, StatusObserver};
use super::{EngineSettings, LoopMode};

/// Rewinds allowed in a row without reading a single frame.
const MAX_EMPTY_REWINDS: u32 = 3;

/// Why a session ended without error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionExit {
    /// The stop flag was raised.
    Stopped,
    /// One-shot mode reached the end of the video.
    EndOfStream,
}

/// Detection loop for one lot.
///
/// Owns the frame source, the classifier and one debouncer per zone. Zone
/// geometry is computed once here and never changes for the session.
pub struct DetectionSession {
    label: String,
    zones: Vec<ZoneGeometry>,
    states: Vec<ZoneDebouncer>,
    source: Box<dyn FrameSource>,
    start_frame: u64,
    classifier: FrameClassifier,
    settings: EngineSettings,
    mode: LoopMode,
    board: Arc<StatusBoard>,
    observer: Option<StatusObserver>,
    stop: Arc<AtomicBool>,
    frames_read: u64,
}

impl DetectionSession {
    pub fn new(
        label: impl Into<String>,
        zones: &[ZoneDefinition],
        source: Box<dyn FrameSource>,
        start_frame: u64,
        detector: Box<dyn ObjectDetector>,
        settings: EngineSettings,
        mode: LoopMode,
    ) -> Result<Self, OccupancyError> {
        settings.validate()?;
        let label = label.into();
        let zones = build_geometries(zones)?;
        if zones.is_empty() {
            return Err(OccupancyError::configuration(format!(
                "lot {} has no zones",
                label
            )));
        }
        let states = vec![ZoneDebouncer::new(settings.detect_delay_secs); zones.len()];
        Ok(Self {
            label,
            zones,
            states,
            source,
            start_frame,
            classifier: FrameClassifier::new(detector, &settings),
            settings,
            mode,
            board: Arc::new(StatusBoard::new()),
            observer: None,
            stop: Arc::new(AtomicBool::new(false)),
            frames_read: 0,
        })
    }

    /// Call `observer` with the status vector after every processed frame.
    pub fn with_observer(mut self, observer: StatusObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn mode(&self) -> LoopMode {
        self.mode
    }

    pub fn zone_count(&self) -> usize {
        self.zones.len()
    }

    pub fn status_board(&self) -> Arc<StatusBoard> {
        Arc::clone(&self.board)
    }

    /// Raising this flag ends the loop before its next frame.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Committed status of every zone, in zone order.
    pub fn statuses(&self) -> Vec<ParkingStatus> {
        self.states.iter().map(ZoneDebouncer::status).collect()
    }

    /// Run until stopped, until the end of the video (one-shot), or until a
    /// fatal error. The source is closed on every exit path.
    pub fn run(mut self) -> Result<SessionExit, OccupancyError> {
        log::info!(
            "lot {}: detection started on {} ({} zones, detector {}, {:?})",
            self.label,
            self.source.describe(),
            self.zones.len(),
            self.classifier.detector_name(),
            self.mode
        );
        let result = self.drive();
        self.source.close();
        result
    }

    fn drive(&mut self) -> Result<SessionExit, OccupancyError> {
        self.classifier.warm_up()?;
        self.seek_to_start()?;

        let mut empty_rewinds = 0u32;
        loop {
            if self.stop.load(Ordering::SeqCst) {
                return Ok(SessionExit::Stopped);
            }
            match self.source.read_next() {
                FrameRead::Frame(frame) => {
                    empty_rewinds = 0;
                    self.frames_read += 1;
                    if self.frames_read % self.settings.sample_every != 0 {
                        continue;
                    }
                    let t = self.source.position_secs();
                    self.process(&frame, t)?;
                    if !self.settings.frame_pause.is_zero() {
                        thread::sleep(self.settings.frame_pause);
                    }
                }
                FrameRead::EndOfStream => match self.mode {
                    LoopMode::OneShot => return Ok(SessionExit::EndOfStream),
                    LoopMode::Continuous => {
                        log::debug!("lot {}: end of stream, rewinding", self.label);
                        self.rewind(&mut empty_rewinds, "end of stream")?;
                    }
                },
                FrameRead::Failed(reason) => match self.mode {
                    LoopMode::OneShot => return Err(OccupancyError::frame_read(reason)),
                    LoopMode::Continuous => {
                        log::warn!("lot {}: {}, rewinding", self.label, reason);
                        self.rewind(&mut empty_rewinds, &reason)?;
                    }
                },
            }
        }
    }

    fn process(&mut self, frame: &Frame, t: f64) -> Result<(), OccupancyError> {
        let prepared = self.classifier.prepare(frame);
        for (zone, state) in self.zones.iter().zip(self.states.iter_mut()) {
            let reading = self.classifier.classify(&prepared, zone)?;
            if let Some(status) = state.observe(reading.verdict, t) {
                log::debug!(
                    "lot {}: zone {} -> {} at {:.2}s (texture {:.2}, vehicle {})",
                    self.label,
                    zone.id,
                    status,
                    t,
                    reading.texture_score,
                    reading.vehicle_present
                );
            }
        }

        let statuses = self.statuses();
        self.board.publish(&statuses);
        if let Some(observer) = self.observer.as_mut() {
            observer(&statuses);
        }
        Ok(())
    }

    fn rewind(&mut self, empty_rewinds: &mut u32, reason: &str) -> Result<(), OccupancyError> {
        *empty_rewinds += 1;
        if *empty_rewinds > MAX_EMPTY_REWINDS {
            return Err(OccupancyError::frame_read(format!(
                "{}: no frames after {} rewinds to frame {} ({})",
                self.source.describe(),
                MAX_EMPTY_REWINDS,
                self.start_frame,
                reason
            )));
        }
        self.seek_to_start()?;
        // Playback time restarts, so pending windows no longer mean anything.
        for state in &mut self.states {
            state.clear_pending();
        }
        Ok(())
    }

    fn seek_to_start(&mut self) -> Result<(), OccupancyError> {
        self.source.seek(self.start_frame).map_err(|e| {
            OccupancyError::frame_read(format!(
                "{}: cannot seek to frame {}: {:#}",
                self.source.describe(),
                self.start_frame,
                e
            ))
        })
    }
}
