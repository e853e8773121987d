use thiserror::Error;

/// Session-level failures. Both leave the pipeline offline until restarted.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("camera permission denied")]
    PermissionDenied,

    #[error("camera device unavailable: {0}")]
    DeviceUnavailable(String),
}

/// Per-frame segmentation failures. The frame is skipped.
#[derive(Debug, Error)]
pub enum SegmentationError {
    #[error("segmentation unavailable: {0}")]
    Unavailable(String),

    #[error("segmentation inference failed: {0}")]
    Inference(#[source] anyhow::Error),
}

/// Per-frame background failures. The gradient is used instead.
#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("background asset not found")]
    AssetMissing,

    #[error("failed to decode background asset: {0}")]
    AssetDecode(#[from] image::ImageError),

    #[error("background asset has zero area")]
    EmptyAsset,
}

/// Per-frame blend failures. The original frame is shown instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CompositeError {
    #[error("{what} is {actual:?}, expected {expected:?}")]
    DimensionMismatch {
        what: &'static str,
        expected: (u32, u32),
        actual: (u32, u32),
    },
}
