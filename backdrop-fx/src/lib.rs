//! Live background replacement for a camera feed.
//!
//! Frames flow one way: [`capture::FrameSource`] → [`segmentation::Segmenter`]
//! → [`background::BackgroundSynthesizer`] → [`compositor::Compositor`] →
//! [`output::PresentationSink`]. [`pipeline::Pipeline`] wires them onto a
//! capture thread and a worker thread.

pub mod background;
pub mod capture;
pub mod channel;
pub mod compositor;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod segmentation;
pub mod selection;
pub mod session;

pub use background::{BackgroundMode, BackgroundSynthesizer};
pub use compositor::{Compositor, CpuCompositor, ImageCompositor};
pub use pipeline::{FrameProcessor, Pipeline, PipelineHandle};
pub use selection::Selection;
