//! Decoded video frames.
//!
//! Sources hand the detection loop one `Frame` at a time. Pixels are packed
//! RGB; the frame index counts decoded frames from the start of the video.

use anyhow::{anyhow, Result};
use image::RgbImage;

use crate::zone::BoundingBox;

pub struct Frame {
    image: RgbImage,
    /// Zero-based index of this frame within the video.
    pub index: u64,
}

impl Frame {
    pub fn new(image: RgbImage, index: u64) -> Self {
        Self { image, index }
    }

    /// Wrap packed RGB24 bytes, validating the buffer length.
    pub fn from_rgb(pixels: Vec<u8>, width: u32, height: u32, index: u64) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                pixels.len()
            ));
        }
        let image = RgbImage::from_raw(width, height, pixels)
            .ok_or_else(|| anyhow!("RGB buffer does not match {}x{}", width, height))?;
        Ok(Self { image, index })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Copy the packed RGB bytes inside `bounds`, row by row.
    ///
    /// Callers check `bounds.fits_within` first; out-of-frame boxes are an error.
    pub fn crop_rgb(&self, bounds: &BoundingBox) -> Result<Vec<u8>> {
        if !bounds.fits_within(self.width(), self.height()) {
            return Err(anyhow!(
                "crop {:?} exceeds frame {}x{}",
                bounds,
                self.width(),
                self.height()
            ));
        }
        let row_bytes = bounds.width as usize * 3;
        let stride = self.width() as usize * 3;
        let raw = self.image.as_raw();
        let mut out = Vec::with_capacity(row_bytes * bounds.height as usize);
        for row in 0..bounds.height as usize {
            let start = (bounds.y as usize + row) * stride + bounds.x as usize * 3;
            out.extend_from_slice(&raw[start..start + row_bytes]);
        }
        Ok(out)
    }
}
