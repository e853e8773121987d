mod permission;
mod source;
#[cfg(feature = "camera")]
mod v4l_capture;

pub use permission::{resolve_permission, Authorization, CameraPermission, StaticPermission};
#[cfg(feature = "camera")]
pub use permission::DevicePermission;
pub use source::{CaptureOpener, FrameSource};
#[cfg(feature = "camera")]
pub use v4l_capture::WebcamCapture;

use anyhow::Result;
use image::RgbImage;
use std::time::Instant;

/// Trait for camera capture sources
pub trait CaptureSource {
    /// Capture a single frame
    fn capture_frame(&mut self) -> Result<RgbImage>;

    /// Get the resolution of captured frames
    fn resolution(&self) -> (u32, u32);

    /// Whether the sensor faces the user. Front-facing frames are mirrored.
    fn is_front_facing(&self) -> bool {
        true
    }
}

/// Fixed capture preset requested from the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapturePreset {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for CapturePreset {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fps: 30,
        }
    }
}

/// One captured image. Immutable once handed to the pipeline.
#[derive(Debug, Clone)]
pub struct Frame {
    sequence: u64,
    timestamp: Instant,
    image: RgbImage,
}

impl Frame {
    pub fn new(sequence: u64, image: RgbImage) -> Self {
        Self {
            sequence,
            timestamp: Instant::now(),
            image,
        }
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

/// Flip a frame left-to-right so the preview behaves like a mirror.
pub fn mirror(image: &mut RgbImage) {
    image::imageops::flip_horizontal_in_place(image);
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn mirror_swaps_columns() {
        let mut image = RgbImage::new(3, 1);
        image.put_pixel(0, 0, Rgb([255, 0, 0]));
        image.put_pixel(2, 0, Rgb([0, 0, 255]));

        mirror(&mut image);

        assert_eq!(image.get_pixel(0, 0), &Rgb([0, 0, 255]));
        assert_eq!(image.get_pixel(1, 0), &Rgb([0, 0, 0]));
        assert_eq!(image.get_pixel(2, 0), &Rgb([255, 0, 0]));
    }
}
