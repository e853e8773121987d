#[cfg(feature = "onnx")]
mod preprocess;
#[cfg(feature = "onnx")]
mod rvm;
mod synthetic;
pub mod types;

#[cfg(feature = "onnx")]
pub use preprocess::Preprocessor;
#[cfg(feature = "onnx")]
pub use rvm::RobustVideoMatting;
pub use synthetic::{MaskShape, SyntheticSegmenter};
pub use types::{SegmentationMask, Segmenter};

use crate::error::SegmentationError;
use anyhow::Result;
use image::RgbImage;
use std::path::Path;

/// Create the segmenter for the given model path.
///
/// Without a model a synthetic silhouette keeps the pipeline demonstrable.
/// A model that cannot be loaded does not stop startup: every frame then
/// fails with [`SegmentationError::Unavailable`] and is skipped.
pub fn create_segmenter(model_path: Option<&Path>) -> Box<dyn Segmenter> {
    match model_path {
        Some(path) => match load_model(path) {
            Ok(segmenter) => segmenter,
            Err(e) => {
                tracing::warn!("Segmentation model {} unavailable: {:#}", path.display(), e);
                Box::new(Unavailable::new(format!("{}: {:#}", path.display(), e)))
            }
        },
        None => {
            tracing::info!("No segmentation model given, using synthetic mask");
            Box::new(SyntheticSegmenter::new(MaskShape::Ellipse))
        }
    }
}

#[cfg(feature = "onnx")]
fn load_model(path: &Path) -> Result<Box<dyn Segmenter>> {
    Ok(Box::new(RobustVideoMatting::new(path)?))
}

#[cfg(not(feature = "onnx"))]
fn load_model(_path: &Path) -> Result<Box<dyn Segmenter>> {
    anyhow::bail!("built without ONNX support")
}

/// Stands in for a model that failed to load.
pub struct Unavailable {
    reason: String,
}

impl Unavailable {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl Segmenter for Unavailable {
    fn segment(&mut self, _frame: &RgbImage) -> Result<SegmentationMask, SegmentationError> {
        Err(SegmentationError::Unavailable(self.reason.clone()))
    }

    fn name(&self) -> &str {
        "unavailable"
    }
}
