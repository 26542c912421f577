use anyhow::Result;

use crate::detect::result::DetectionResult;

/// Object-presence classifier seam.
///
/// The engine hands a backend the packed RGB24 crop of one zone's bounding box
/// and only looks at the categories it reports. Backends apply their own
/// confidence threshold; the engine does not re-filter.
///
/// Calls are synchronous and may take as long as inference takes. Each lot's
/// detection loop owns its backend instance, so `detect` takes `&mut self`.
pub trait ObjectDetector: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Detect objects in a packed RGB24 image region.
    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<DetectionResult>;

    /// Optional warm-up hook, run once before the first frame.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
