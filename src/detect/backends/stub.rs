use anyhow::Result;

use crate::detect::backend::ObjectDetector;
use crate::detect::result::DetectionResult;

/// Stub backend for testing and model-less deployments. Never reports objects,
/// so zones are judged on texture alone (flat -> free, textured -> undetermined).
#[derive(Default)]
pub struct StubBackend {
    calls: u64,
}

impl StubBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of regions submitted so far.
    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl ObjectDetector for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, _pixels: &[u8], _width: u32, _height: u32) -> Result<DetectionResult> {
        self.calls += 1;
        Ok(DetectionResult::empty())
    }
}
