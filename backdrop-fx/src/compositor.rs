//! Mask-weighted blending of the frame over a background.

use crate::error::CompositeError;
use crate::segmentation::SegmentationMask;
use image::{imageops, GrayImage, Luma, Rgb, RgbImage};
use rayon::prelude::*;

/// Blends a foreground over a background using a same-sized mask.
pub trait ImageCompositor: Send {
    fn blend(
        &self,
        foreground: &RgbImage,
        background: &RgbImage,
        mask: &GrayImage,
    ) -> Result<RgbImage, CompositeError>;
}

/// Row-parallel linear blend on the CPU.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuCompositor;

impl ImageCompositor for CpuCompositor {
    fn blend(
        &self,
        foreground: &RgbImage,
        background: &RgbImage,
        mask: &GrayImage,
    ) -> Result<RgbImage, CompositeError> {
        let expected = foreground.dimensions();
        check("background", expected, background.dimensions())?;
        check("mask", expected, mask.dimensions())?;

        let (width, height) = expected;
        let mut out = RgbImage::new(width, height);
        if width == 0 || height == 0 {
            return Ok(out);
        }

        let stride = width as usize * 3;
        out.par_chunks_mut(stride)
            .zip(foreground.par_chunks(stride))
            .zip(background.par_chunks(stride))
            .zip(mask.par_chunks(width as usize))
            .for_each(|(((dst, fg), bg), alpha)| {
                for (i, &m) in alpha.iter().enumerate() {
                    for c in 0..3 {
                        let at = i * 3 + c;
                        dst[at] = mix(fg[at], bg[at], m);
                    }
                }
            });

        Ok(out)
    }
}

fn check(
    what: &'static str,
    expected: (u32, u32),
    actual: (u32, u32),
) -> Result<(), CompositeError> {
    if expected == actual {
        Ok(())
    } else {
        Err(CompositeError::DimensionMismatch {
            what,
            expected,
            actual,
        })
    }
}

/// `fg * m + bg * (255 - m)`, rounded, exact at both ends.
#[inline]
fn mix(fg: u8, bg: u8, m: u8) -> u8 {
    let m = u32::from(m);
    ((u32::from(fg) * m + u32::from(bg) * (255 - m) + 127) / 255) as u8
}

/// Stretch a mask to `size`, scaling width and height independently.
pub fn scale_mask(mask: &SegmentationMask, size: (u32, u32)) -> GrayImage {
    let image = mask.as_image();
    if image.dimensions() == size {
        return image.clone();
    }
    if image.width() == 0 || image.height() == 0 {
        return GrayImage::new(size.0, size.1);
    }
    imageops::resize(image, size.0, size.1, imageops::FilterType::Triangle)
}

/// Grayscale view of a mask: white = subject, black = background.
pub fn mask_to_rgb(mask: &GrayImage) -> RgbImage {
    RgbImage::from_fn(mask.width(), mask.height(), |x, y| {
        let Luma([v]) = *mask.get_pixel(x, y);
        Rgb([v, v, v])
    })
}

/// The mask as the frame would see it: rescaled to `size`, shown in grayscale.
pub fn mask_view(mask: &SegmentationMask, size: (u32, u32)) -> RgbImage {
    mask_to_rgb(&scale_mask(mask, size))
}

/// Applies a segmentation mask to a frame.
pub struct Compositor {
    blender: Box<dyn ImageCompositor>,
}

impl Default for Compositor {
    fn default() -> Self {
        Self::new(Box::new(CpuCompositor))
    }
}

impl Compositor {
    pub fn new(blender: Box<dyn ImageCompositor>) -> Self {
        Self { blender }
    }

    /// Composite one frame. The result always has the frame's extent.
    ///
    /// With `debug_mask` the rescaled mask is returned and `background` is
    /// ignored. A failed blend yields the untouched frame.
    pub fn composite(
        &self,
        frame: &RgbImage,
        mask: &SegmentationMask,
        background: &RgbImage,
        debug_mask: bool,
    ) -> RgbImage {
        let _span = tracing::debug_span!("composite", debug_mask).entered();
        if debug_mask {
            return mask_view(mask, frame.dimensions());
        }
        let scaled = scale_mask(mask, frame.dimensions());

        match self.blender.blend(frame, background, &scaled) {
            Ok(image) => image,
            Err(e) => {
                tracing::warn!("Blend failed ({}), showing original frame", e);
                frame.clone()
            }
        }
    }
}
