#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use image::RgbImage;
use tract_onnx::prelude::*;

use crate::detect::backend::ObjectDetector;
use crate::detect::result::{Detection, DetectionResult, ObjectClass};

/// Tract-based backend for YOLO-style ONNX detectors.
///
/// The model must take a `[1, 3, size, size]` f32 input in 0..1 and produce a
/// single `[1, 4 + classes, anchors]` output whose first four rows are
/// `cx, cy, w, h` in input pixels and whose remaining rows are class scores in
/// COCO order. Zone crops are stretched to the model input.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    input_size: u32,
    confidence_threshold: f32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, input_size: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let size = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, size, size)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            input_size,
            confidence_threshold: 0.25,
        })
    }

    /// Override the default confidence threshold.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    fn build_input(&self, pixels: &[u8], width: u32, height: u32) -> Result<Tensor> {
        let region = RgbImage::from_raw(width, height, pixels.to_vec()).ok_or_else(|| {
            anyhow!(
                "expected {} RGB bytes for {}x{}, received {}",
                width as usize * height as usize * 3,
                width,
                height,
                pixels.len()
            )
        })?;
        let resized = imageops::resize(
            &region,
            self.input_size,
            self.input_size,
            FilterType::Triangle,
        );

        let size = self.input_size as usize;
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, size, size),
            |(_, channel, y, x)| resized.get_pixel(x as u32, y as u32).0[channel] as f32 / 255.0,
        );

        Ok(input.into_tensor())
    }

    fn decode(&self, outputs: TVec<TValue>) -> Result<DetectionResult> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let scores = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = scores.shape().to_vec();
        if shape.len() != 3 || shape[0] != 1 || shape[1] <= 4 {
            return Err(anyhow!("unexpected detector output shape {:?}", shape));
        }
        let scores = scores
            .into_dimensionality::<tract_ndarray::Ix3>()
            .context("detector output is not rank 3")?;
        let rows = shape[1];
        let anchors = shape[2];
        let size = self.input_size as f32;

        let mut detections = Vec::new();
        for anchor in 0..anchors {
            let mut best_class = 0usize;
            let mut best_score = f32::NEG_INFINITY;
            for row in 4..rows {
                let score = scores[[0, row, anchor]];
                if score > best_score {
                    best_score = score;
                    best_class = row - 4;
                }
            }
            if !best_score.is_finite() || best_score < self.confidence_threshold {
                continue;
            }
            let cx = scores[[0, 0, anchor]];
            let cy = scores[[0, 1, anchor]];
            let w = scores[[0, 2, anchor]];
            let h = scores[[0, 3, anchor]];
            detections.push(Detection {
                x: ((cx - w / 2.0) / size).clamp(0.0, 1.0),
                y: ((cy - h / 2.0) / size).clamp(0.0, 1.0),
                w: (w / size).clamp(0.0, 1.0),
                h: (h / size).clamp(0.0, 1.0),
                confidence: best_score,
                class: ObjectClass::from_coco_index(best_class as u32),
            });
        }

        Ok(DetectionResult { detections })
    }
}

impl ObjectDetector for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<DetectionResult> {
        let input = self.build_input(pixels, width, height)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode(outputs)
    }

    fn warm_up(&mut self) -> Result<()> {
        let size = self.input_size;
        let len = usize::try_from(size)
            .ok()
            .and_then(|side| side.checked_mul(side))
            .and_then(|area| area.checked_mul(3))
            .ok_or_else(|| anyhow!("input size {size} is too large"))?;
        let blank = vec![0u8; len];
        self.detect(&blank, size, size).map(|_| ())
    }
}
