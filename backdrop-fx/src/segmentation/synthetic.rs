use super::types::{SegmentationMask, Segmenter};
use crate::error::SegmentationError;
use image::{GrayImage, Luma, RgbImage};

/// Shape drawn by [`SyntheticSegmenter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskShape {
    /// Whole frame is subject.
    Full,
    /// Whole frame is background.
    Empty,
    /// Uniform confidence.
    Constant(u8),
    /// Centered upright ellipse, a rough head-and-shoulders stand-in.
    Ellipse,
}

/// Deterministic segmenter that ignores frame content.
///
/// Used when no model is configured and as a test double.
#[derive(Debug, Clone)]
pub struct SyntheticSegmenter {
    shape: MaskShape,
    /// Output resolution; `None` follows the frame.
    size: Option<(u32, u32)>,
}

impl SyntheticSegmenter {
    pub fn new(shape: MaskShape) -> Self {
        Self { shape, size: None }
    }

    /// Emit masks at a fixed resolution regardless of the frame's.
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.size = Some((width, height));
        self
    }

    pub fn render(&self, width: u32, height: u32) -> SegmentationMask {
        match self.shape {
            MaskShape::Full => SegmentationMask::filled(width, height, SegmentationMask::MAX),
            MaskShape::Empty => SegmentationMask::filled(width, height, SegmentationMask::MIN),
            MaskShape::Constant(value) => SegmentationMask::filled(width, height, value),
            MaskShape::Ellipse => SegmentationMask::new(ellipse(width, height)),
        }
    }
}

fn ellipse(width: u32, height: u32) -> GrayImage {
    let cx = width as f32 / 2.0;
    let cy = height as f32 * 0.55;
    let rx = (width as f32 * 0.3).max(1.0);
    let ry = (height as f32 * 0.45).max(1.0);

    GrayImage::from_fn(width, height, |x, y| {
        let dx = (x as f32 + 0.5 - cx) / rx;
        let dy = (y as f32 + 0.5 - cy) / ry;
        if dx * dx + dy * dy <= 1.0 {
            Luma([SegmentationMask::MAX])
        } else {
            Luma([SegmentationMask::MIN])
        }
    })
}

impl Segmenter for SyntheticSegmenter {
    fn segment(&mut self, frame: &RgbImage) -> Result<SegmentationMask, SegmentationError> {
        let (width, height) = self.size.unwrap_or_else(|| frame.dimensions());
        Ok(self.render(width, height))
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn follows_frame_size_by_default() {
        let mut segmenter = SyntheticSegmenter::new(MaskShape::Full);
        let mask = segmenter.segment(&RgbImage::new(7, 5)).unwrap();
        assert_eq!(mask.dimensions(), (7, 5));
        assert!(mask.as_image().pixels().all(|p| p[0] == 255));
    }

    #[test]
    fn fixed_size_ignores_frame() {
        let mut segmenter = SyntheticSegmenter::new(MaskShape::Empty).with_size(4, 3);
        let mask = segmenter.segment(&RgbImage::new(64, 48)).unwrap();
        assert_eq!(mask.dimensions(), (4, 3));
        assert!(mask.as_image().pixels().all(|p| p[0] == 0));
    }

    #[test]
    fn ellipse_covers_center_not_corners() {
        let mask = SyntheticSegmenter::new(MaskShape::Ellipse).render(40, 40);
        let image = mask.as_image();
        assert_eq!(image.get_pixel(20, 22)[0], 255);
        assert_eq!(image.get_pixel(0, 0)[0], 0);
        assert_eq!(image.get_pixel(39, 0)[0], 0);
    }

    #[test]
    fn output_is_deterministic() {
        let segmenter = SyntheticSegmenter::new(MaskShape::Ellipse);
        assert_eq!(segmenter.render(33, 21), segmenter.render(33, 21));
    }
}
