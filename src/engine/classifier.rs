use image::imageops;
use image::GrayImage;

use crate::detect::ObjectDetector;
use crate::error::OccupancyError;
use crate::frame::Frame;
use crate::zone::ZoneGeometry;
use crate::ParkingStatus;

use super::EngineSettings;

/// Taps of the smoothing kernel applied before the texture test.
const BLUR_TAPS: usize = 5;

/// Per-frame state shared by every zone of that frame.
pub struct PreparedFrame<'a> {
    frame: &'a Frame,
    smoothed: GrayImage,
}

impl<'a> PreparedFrame<'a> {
    pub fn frame(&self) -> &Frame {
        self.frame
    }

    pub fn smoothed(&self) -> &GrayImage {
        &self.smoothed
    }
}

/// Raw per-zone observation for one frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ZoneReading {
    pub texture_score: f64,
    pub vehicle_present: bool,
    pub verdict: ParkingStatus,
}

/// Combine the two cues. Only agreeing cues give a firm answer.
pub fn verdict(texture_low: bool, vehicle_present: bool) -> ParkingStatus {
    match (texture_low, vehicle_present) {
        (false, true) => ParkingStatus::Occupied,
        (true, false) => ParkingStatus::Free,
        _ => ParkingStatus::NotDetermined,
    }
}

/// Judges each zone of a frame from surface texture and the object detector.
pub struct FrameClassifier {
    detector: Box<dyn ObjectDetector>,
    kernel: [f32; BLUR_TAPS],
    blur: bool,
    texture_threshold: f64,
}

impl FrameClassifier {
    pub fn new(detector: Box<dyn ObjectDetector>, settings: &EngineSettings) -> Self {
        Self {
            detector,
            kernel: blur_kernel(settings.blur_sigma),
            blur: settings.blur_sigma > 0.0,
            texture_threshold: settings.texture_threshold,
        }
    }

    pub fn detector_name(&self) -> &'static str {
        self.detector.name()
    }

    pub fn warm_up(&mut self) -> Result<(), OccupancyError> {
        self.detector.warm_up().map_err(|e| {
            OccupancyError::configuration(format!(
                "detector '{}' failed to warm up: {:#}",
                self.detector.name(),
                e
            ))
        })
    }

    /// Grayscale and smooth a frame once; the result serves all zones.
    pub fn prepare<'a>(&self, frame: &'a Frame) -> PreparedFrame<'a> {
        let gray = imageops::grayscale(frame.image());
        let smoothed = if self.blur {
            imageproc::filter::separable_filter_equal(&gray, &self.kernel)
        } else {
            gray
        };
        PreparedFrame { frame, smoothed }
    }

    /// Classify one zone of a prepared frame.
    pub fn classify(
        &mut self,
        prepared: &PreparedFrame<'_>,
        zone: &ZoneGeometry,
    ) -> Result<ZoneReading, OccupancyError> {
        let frame = prepared.frame;
        if !zone.bounds.fits_within(frame.width(), frame.height()) {
            return Err(OccupancyError::configuration(format!(
                "zone {} bounds {:?} fall outside the {}x{} frame",
                zone.id,
                zone.bounds,
                frame.width(),
                frame.height()
            )));
        }

        let score = texture_score(&prepared.smoothed, zone);
        let crop = frame
            .crop_rgb(&zone.bounds)
            .map_err(|e| OccupancyError::configuration(format!("{:#}", e)))?;
        let result = self
            .detector
            .detect(&crop, zone.bounds.width, zone.bounds.height)
            .map_err(|source| OccupancyError::Classifier {
                zone: zone.id.clone(),
                source,
            })?;
        let vehicle_present = result.has_vehicle();

        Ok(ZoneReading {
            texture_score: score,
            vehicle_present,
            verdict: verdict(score < self.texture_threshold, vehicle_present),
        })
    }
}

/// Mean absolute 4-neighbour Laplacian over the zone's mask pixels.
///
/// The operator sees only the zone's bounding-box crop; neighbours past the
/// crop edge are mirrored without repeating the edge pixel. An empty mask
/// scores zero. `gray` must contain the zone's bounding box.
// imageproc's laplacian_filter clamps at the border, which changes scores along the crop edge.
pub fn texture_score(gray: &GrayImage, zone: &ZoneGeometry) -> f64 {
    let bounds = zone.bounds;
    let width = i64::from(bounds.width);
    let height = i64::from(bounds.height);
    let at = |x: i64, y: i64| -> f64 {
        let px = bounds.x as i64 + reflect_101(x, width);
        let py = bounds.y as i64 + reflect_101(y, height);
        f64::from(gray.get_pixel(px as u32, py as u32).0[0])
    };

    let mut sum = 0.0;
    let mut count = 0usize;
    for y in 0..height {
        for x in 0..width {
            if !zone.mask.get(x as u32, y as u32) {
                continue;
            }
            let laplacian =
                at(x - 1, y) + at(x + 1, y) + at(x, y - 1) + at(x, y + 1) - 4.0 * at(x, y);
            sum += laplacian.abs();
            count += 1;
        }
    }
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

fn reflect_101(i: i64, len: i64) -> i64 {
    if len <= 1 {
        return 0;
    }
    let mut i = i;
    if i < 0 {
        i = -i;
    }
    if i >= len {
        i = 2 * (len - 1) - i;
    }
    i.clamp(0, len - 1)
}

fn blur_kernel(sigma: f32) -> [f32; BLUR_TAPS] {
    let mut kernel = [0.0f32; BLUR_TAPS];
    if sigma <= 0.0 {
        kernel[BLUR_TAPS / 2] = 1.0;
        return kernel;
    }
    let half = (BLUR_TAPS / 2) as f32;
    for (i, weight) in kernel.iter_mut().enumerate() {
        let d = i as f32 - half;
        *weight = (-(d * d) / (2.0 * sigma * sigma)).exp();
    }
    let total: f32 = kernel.iter().sum();
    for weight in kernel.iter_mut() {
        *weight /= total;
    }
    kernel
}
