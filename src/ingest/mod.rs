//! Frame sources.
//!
//! A detection session pulls decoded frames through the `FrameSource` trait:
//! - Local video files (feature: ingest-file-ffmpeg)
//! - Synthetic `stub://` sources (testing, demos)
//!
//! Sources MUST:
//! - Yield frames in playback order
//! - Support seeking back to a frame offset (continuous mode loops the video)
//! - Report the playback time of the most recently read frame
//!
//! Only local paths are accepted; remote URL schemes are rejected.

#[cfg(feature = "ingest-file-ffmpeg")]
pub(crate) mod file_ffmpeg;
pub mod synthetic;

use anyhow::{anyhow, Result};

use crate::frame::Frame;

pub use synthetic::{SyntheticConfig, SyntheticSource};

/// Outcome of one read. End-of-stream and failures are ordinary values the
/// loop must handle, not errors to unwind through.
pub enum FrameRead {
    Frame(Frame),
    EndOfStream,
    Failed(String),
}

pub trait FrameSource: Send {
    /// Human-readable origin (path or stub URL) for logs.
    fn describe(&self) -> String;

    /// Position the source so the next read yields frame `frame_offset`.
    fn seek(&mut self, frame_offset: u64) -> Result<()>;

    /// Decode the next frame.
    fn read_next(&mut self) -> FrameRead;

    /// Playback time of the most recently read frame, in seconds.
    fn position_secs(&self) -> f64;

    /// Release decoder resources. Reads after `close` report end-of-stream.
    fn close(&mut self) {}
}

/// Open a frame source for a lot's video path.
pub fn open_source(path: &str) -> Result<Box<dyn FrameSource>> {
    if !is_local_video_path(path) {
        return Err(anyhow!(
            "video path '{}' must be a local file (no URL schemes)",
            path
        ));
    }
    if path.starts_with(synthetic::STUB_SCHEME) {
        return Ok(Box::new(SyntheticSource::new(SyntheticConfig::from_url(
            path,
        )?)));
    }
    #[cfg(feature = "ingest-file-ffmpeg")]
    {
        Ok(Box::new(file_ffmpeg::FfmpegFileSource::open(path)?))
    }
    #[cfg(not(feature = "ingest-file-ffmpeg"))]
    {
        Err(anyhow!(
            "decoding '{}' requires the ingest-file-ffmpeg feature",
            path
        ))
    }
}

/// True for stub URLs, which never exist on disk.
pub fn is_synthetic_path(path: &str) -> bool {
    path.starts_with(synthetic::STUB_SCHEME)
}

fn is_local_video_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    if is_synthetic_path(path) {
        return true;
    }
    !path.contains("://")
}
