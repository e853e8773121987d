use super::preprocess::Preprocessor;
use super::types::{SegmentationMask, Segmenter};
use crate::error::SegmentationError;
use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use ndarray::{Array1, ArrayD, IxDyn};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;

/// Model input edge at balanced quality.
const BALANCED_INPUT: u32 = 512;

/// RobustVideoMatting segmentation model
///
/// This model uses recurrent connections to maintain temporal consistency.
/// Hidden states (r1-r4) are carried between frames for smooth results.
pub struct RobustVideoMatting {
    session: Session,
    preprocessor: Preprocessor,

    // Recurrent hidden states, fed back on the next frame
    recurrent: Option<[ArrayD<f32>; 4]>,

    // Downsample ratio the model applies internally
    downsample_ratio: f32,
}

impl RobustVideoMatting {
    /// Create a new RVM model from an ONNX file
    ///
    /// # Default Configuration
    /// - Input size: 512x512 (balanced quality/latency)
    /// - Downsample ratio: 0.25
    pub fn new<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        let path = model_path.as_ref();

        tracing::info!("Loading RVM model from {}", path.display());

        let session = Session::builder()
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|b| b.with_intra_threads(4))
            .map_err(|e| anyhow!("{e}"))?
            .commit_from_file(path)
            .map_err(|e| anyhow!("{e}"))
            .with_context(|| format!("Failed to load model from {}", path.display()))?;

        tracing::info!("RVM model loaded successfully");

        Ok(Self {
            session,
            preprocessor: Preprocessor::new(BALANCED_INPUT, BALANCED_INPUT),
            recurrent: None,
            downsample_ratio: 0.25,
        })
    }

    fn infer(&mut self, frame: &RgbImage) -> Result<SegmentationMask> {
        // RVM accepts 1x1x1x1 zero tensors as the initial recurrent state.
        let recurrent = self
            .recurrent
            .take()
            .unwrap_or_else(|| std::array::from_fn(|_| ArrayD::zeros(IxDyn(&[1, 1, 1, 1]))));

        let src = self.preprocessor.preprocess(frame);
        let ratio = Array1::from_elem(1, self.downsample_ratio);

        let _infer_span = tracing::debug_span!("inference").entered();
        let outputs = self.session.run(ort::inputs![
            "src" => TensorRef::from_array_view(src.view())?,
            "r1i" => TensorRef::from_array_view(recurrent[0].view())?,
            "r2i" => TensorRef::from_array_view(recurrent[1].view())?,
            "r3i" => TensorRef::from_array_view(recurrent[2].view())?,
            "r4i" => TensorRef::from_array_view(recurrent[3].view())?,
            "downsample_ratio" => TensorRef::from_array_view(ratio.view())?,
        ])?;

        // Outputs: fgr (foreground), pha (alpha), r1o..r4o.
        let (shape, alpha) = outputs["pha"].try_extract_tensor::<f32>()?;
        let (height, width) = match &shape[..] {
            [_, _, h, w] => (*h as u32, *w as u32),
            other => return Err(anyhow!("unexpected alpha shape {:?}", other)),
        };
        let mask = Preprocessor::alpha_to_mask(alpha, width, height)
            .context("alpha output does not match its shape")?;

        let mut next = Vec::with_capacity(4);
        for name in ["r1o", "r2o", "r3o", "r4o"] {
            let (shape, data) = outputs[name].try_extract_tensor::<f32>()?;
            let dims: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
            next.push(ArrayD::from_shape_vec(IxDyn(&dims), data.to_vec())?);
        }
        drop(outputs);
        self.recurrent = next.try_into().ok();

        Ok(mask)
    }
}

impl Segmenter for RobustVideoMatting {
    fn segment(&mut self, frame: &RgbImage) -> Result<SegmentationMask, SegmentationError> {
        let _span = tracing::debug_span!("rvm_segment").entered();
        self.infer(frame).map_err(SegmentationError::Inference)
    }

    fn reset_state(&mut self) {
        tracing::info!("Resetting RVM hidden states");
        self.recurrent = None;
    }

    fn name(&self) -> &str {
        "rvm"
    }
}
