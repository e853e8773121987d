use crate::error::SegmentationError;
use image::{GrayImage, RgbImage};

/// Foreground confidence, one byte per sample: 0 = background, 255 = subject.
///
/// The resolution is whatever the model produced; the compositor rescales it
/// to the frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentationMask(GrayImage);

impl SegmentationMask {
    pub const MAX: u8 = u8::MAX;
    pub const MIN: u8 = 0;

    pub fn new(samples: GrayImage) -> Self {
        Self(samples)
    }

    /// Every sample set to `value`.
    pub fn filled(width: u32, height: u32, value: u8) -> Self {
        Self(GrayImage::from_pixel(width, height, image::Luma([value])))
    }

    /// Build from normalized [0, 1] confidences in row-major order.
    pub fn from_unit(width: u32, height: u32, values: &[f32]) -> Option<Self> {
        if values.len() != (width as usize) * (height as usize) {
            return None;
        }
        let bytes = values
            .iter()
            .map(|v| (v * 255.0).round().clamp(0.0, 255.0) as u8)
            .collect();
        GrayImage::from_raw(width, height, bytes).map(Self)
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.0.dimensions()
    }

    pub fn as_image(&self) -> &GrayImage {
        &self.0
    }
}

/// Trait for segmentation models
/// Allows swapping between different backends (RVM, synthetic test masks, ...)
pub trait Segmenter: Send {
    /// Produce a foreground mask for one frame.
    ///
    /// Errors are per-frame: callers skip the frame and carry on.
    fn segment(&mut self, frame: &RgbImage) -> Result<SegmentationMask, SegmentationError>;

    /// Reset internal state (for models with temporal/recurrent components)
    ///
    /// Called when the capture session stops.
    fn reset_state(&mut self) {
        // Default implementation: no-op for stateless models
    }

    /// Short name for logs.
    fn name(&self) -> &str;
}
