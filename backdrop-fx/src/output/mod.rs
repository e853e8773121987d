#[cfg(feature = "loopback")]
mod loopback;
mod yuyv;

#[cfg(feature = "loopback")]
pub use loopback::V4L2Output;
pub use yuyv::rgb_to_yuyv;

use crate::channel::{self, LatestSender};
use anyhow::Result;
use image::RgbImage;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::JoinHandle;

/// Trait for blocking output destinations
pub trait OutputSink {
    /// Write a frame to the output
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()>;

    /// Get the expected output resolution
    fn resolution(&self) -> (u32, u32);
}

/// Receives finished images from the worker.
///
/// `present` must return promptly: newer images supersede older ones and
/// nothing is queued for display.
pub trait PresentationSink: Send + Sync {
    fn present(&self, image: Arc<RgbImage>);
}

impl<S: PresentationSink + ?Sized> PresentationSink for Arc<S> {
    fn present(&self, image: Arc<RgbImage>) {
        (**self).present(image)
    }
}

impl<S: PresentationSink + ?Sized> PresentationSink for Box<S> {
    fn present(&self, image: Arc<RgbImage>) {
        (**self).present(image)
    }
}

/// An image handed to [`LatestImage`], numbered in presentation order.
#[derive(Debug, Clone)]
pub struct Presented {
    pub generation: u64,
    pub image: Arc<RgbImage>,
}

/// Most-recent-wins image slot for a display to poll.
#[derive(Debug, Default)]
pub struct LatestImage {
    slot: Mutex<Option<Presented>>,
}

impl LatestImage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self) -> Option<Presented> {
        self.slot.lock().clone()
    }

    /// Number of images presented so far.
    pub fn generation(&self) -> u64 {
        self.slot.lock().as_ref().map_or(0, |p| p.generation)
    }
}

impl PresentationSink for LatestImage {
    fn present(&self, image: Arc<RgbImage>) {
        let mut slot = self.slot.lock();
        let generation = slot.as_ref().map_or(0, |p| p.generation) + 1;
        *slot = Some(Presented { generation, image });
    }
}

/// Drives a blocking [`OutputSink`] on its own thread.
///
/// Images arriving while a write is in progress replace each other, so the
/// output only ever receives the newest one.
pub struct ThreadedSink {
    tx: Option<LatestSender<Arc<RgbImage>>>,
    handle: Option<JoinHandle<()>>,
}

impl ThreadedSink {
    pub fn spawn<O>(mut output: O) -> std::io::Result<Self>
    where
        O: OutputSink + Send + 'static,
    {
        let (tx, rx) = channel::latest::<Arc<RgbImage>>();
        let handle = std::thread::Builder::new()
            .name("sink-output".to_string())
            .spawn(move || {
                let (width, height) = output.resolution();
                tracing::info!("Output thread started ({}x{})", width, height);
                while let Ok(image) = rx.recv() {
                    if let Err(e) = output.write_frame(&image) {
                        tracing::warn!("Output write failed: {:#}", e);
                    }
                }
                tracing::info!("Output thread stopped");
            })?;

        Ok(Self {
            tx: Some(tx),
            handle: Some(handle),
        })
    }

    /// Images replaced before the output thread got to them.
    pub fn dropped(&self) -> u64 {
        self.tx.as_ref().map_or(0, |tx| tx.dropped())
    }
}

impl PresentationSink for ThreadedSink {
    fn present(&self, image: Arc<RgbImage>) {
        if let Some(tx) = &self.tx {
            tx.send(image);
        }
    }
}

impl Drop for ThreadedSink {
    fn drop(&mut self) {
        // Closing the channel ends the output loop.
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
