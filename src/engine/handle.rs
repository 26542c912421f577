use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, Result};

use crate::error::OccupancyError;
use crate::ParkingStatus;

use super::session::{DetectionSession, SessionExit};
use super::status::StatusBoard;

/// A detection session running on its own thread.
///
/// Dropping the handle without `join` detaches the thread; it still stops at
/// its next frame once `request_stop` has been called.
pub struct SessionHandle {
    label: String,
    stop: Arc<AtomicBool>,
    board: Arc<StatusBoard>,
    join: Option<JoinHandle<Result<SessionExit, OccupancyError>>>,
}

impl SessionHandle {
    pub fn spawn(session: DetectionSession) -> Result<Self, OccupancyError> {
        let label = session.label().to_string();
        let stop = session.stop_flag();
        let board = session.status_board();
        let thread_label = label.clone();
        let join = thread::Builder::new()
            .name(format!("lot-{}", label))
            .spawn(move || {
                let result = session.run();
                match &result {
                    Ok(exit) => log::info!("lot {}: detection ended ({:?})", thread_label, exit),
                    Err(e) => log::error!("lot {}: detection failed: {}", thread_label, e),
                }
                result
            })
            .map_err(|e| {
                OccupancyError::configuration(format!(
                    "failed to spawn detection thread for lot {}: {}",
                    label, e
                ))
            })?;
        Ok(Self {
            label,
            stop,
            board,
            join: Some(join),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Latest published status vector, if any frame was processed yet.
    pub fn status(&self) -> Option<Arc<[ParkingStatus]>> {
        self.board.latest()
    }

    pub fn board(&self) -> Arc<StatusBoard> {
        Arc::clone(&self.board)
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait for the thread and return how the session ended.
    ///
    /// Session errors come back as `OccupancyError` inside the `anyhow` error.
    pub fn join(mut self) -> Result<SessionExit> {
        let Some(join) = self.join.take() else {
            return Err(anyhow!("lot {}: detection thread already joined", self.label));
        };
        let result = join
            .join()
            .map_err(|_| anyhow!("lot {}: detection thread panicked", self.label))?;
        Ok(result?)
    }

    /// Raise the stop flag and wait for the thread.
    pub fn stop(self) -> Result<SessionExit> {
        self.request_stop();
        self.join()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::StubBackend;
    use crate::engine::{EngineSettings, LoopMode};
    use crate::ingest::{SyntheticConfig, SyntheticSource};
    use crate::zone::{ZoneDefinition, ZoneId};
    use std::time::{Duration, Instant};

    fn endless_session(fail_at: Option<u64>) -> DetectionSession {
        let source = SyntheticSource::new(SyntheticConfig {
            width: 16,
            height: 16,
            fps: 10,
            frames: None,
            fail_at,
            ..SyntheticConfig::default()
        });
        DetectionSession::new(
            "lot-b",
            &[ZoneDefinition {
                id: ZoneId::Name("A1".to_string()),
                coordinates: vec![[0, 0], [15, 0], [15, 15], [0, 15]],
            }],
            Box::new(source),
            0,
            Box::new(StubBackend::new()),
            EngineSettings {
                frame_pause: Duration::from_millis(1),
                ..EngineSettings::default()
            },
            LoopMode::OneShot,
        )
        .unwrap()
    }

    fn wait_until(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn publishes_then_stops_on_request() {
        let handle = SessionHandle::spawn(endless_session(None)).unwrap();
        assert_eq!(handle.label(), "lot-b");
        wait_until(|| handle.status().is_some());
        assert_eq!(handle.status().unwrap().len(), 1);
        assert_eq!(handle.stop().unwrap(), SessionExit::Stopped);
    }

    #[test]
    fn join_surfaces_session_errors() {
        let handle = SessionHandle::spawn(endless_session(Some(5))).unwrap();
        wait_until(|| handle.is_finished());
        let err = handle.join().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<OccupancyError>(),
            Some(OccupancyError::FrameRead(_))
        ));
    }
}
