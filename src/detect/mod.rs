mod backend;
mod backends;
mod result;

use anyhow::{anyhow, Result};
use std::path::PathBuf;

pub use backend::ObjectDetector;
pub use backends::StubBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use result::{Detection, DetectionResult, ObjectClass};

/// Which object-presence backend each detection loop gets.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectorSettings {
    /// `stub` or `tract`.
    pub backend: String,
    pub model_path: Option<PathBuf>,
    /// Square model input edge, in pixels.
    pub input_size: u32,
    pub confidence_threshold: f32,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            backend: "stub".to_string(),
            model_path: None,
            input_size: 640,
            confidence_threshold: 0.25,
        }
    }
}

/// Build a fresh backend instance from settings.
pub fn build_detector(settings: &DetectorSettings) -> Result<Box<dyn ObjectDetector>> {
    match settings.backend.as_str() {
        "stub" => Ok(Box::new(StubBackend::new())),
        "tract" => build_tract(settings),
        other => Err(anyhow!("unknown detector backend '{}'", other)),
    }
}

#[cfg(feature = "backend-tract")]
fn build_tract(settings: &DetectorSettings) -> Result<Box<dyn ObjectDetector>> {
    let model_path = settings
        .model_path
        .as_ref()
        .ok_or_else(|| anyhow!("tract backend requires a model path"))?;
    let backend = TractBackend::new(model_path, settings.input_size)?
        .with_threshold(settings.confidence_threshold);
    Ok(Box::new(backend))
}

#[cfg(not(feature = "backend-tract"))]
fn build_tract(_settings: &DetectorSettings) -> Result<Box<dyn ObjectDetector>> {
    Err(anyhow!("tract backend requires the backend-tract feature"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_stub_backend_by_default() {
        let detector = build_detector(&DetectorSettings::default()).unwrap();
        assert_eq!(detector.name(), "stub");
    }

    #[test]
    fn unknown_backend_is_rejected() {
        let settings = DetectorSettings {
            backend: "opencv".to_string(),
            ..DetectorSettings::default()
        };
        assert!(build_detector(&settings).is_err());
    }

    #[cfg(not(feature = "backend-tract"))]
    #[test]
    fn tract_backend_requires_feature() {
        let settings = DetectorSettings {
            backend: "tract".to_string(),
            model_path: Some(PathBuf::from("yolov8n.onnx")),
            ..DetectorSettings::default()
        };
        assert!(build_detector(&settings).is_err());
    }
}
