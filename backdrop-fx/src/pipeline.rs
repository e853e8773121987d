//! Capture → segment → composite → present.

use crate::background::{BackgroundMode, BackgroundSynthesizer};
use crate::capture::{Frame, FrameSource};
use crate::channel;
use crate::compositor::{mask_view, Compositor};
use crate::output::{LatestImage, PresentationSink, Presented};
use crate::segmentation::Segmenter;
use crate::selection::{Selection, SelectionSlot};
use crate::session::{SessionSnapshot, SessionState};
use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use image::RgbImage;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Frames between timing reports.
const STATS_INTERVAL: u64 = 30;

/// How often the idle worker re-checks the stop flag.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

struct CachedBackground {
    mode: BackgroundMode,
    size: (u32, u32),
    image: RgbImage,
}

#[derive(Default)]
struct StageTimings {
    frames: u64,
    skipped: u64,
    segment: Duration,
    synthesize: Duration,
    composite: Duration,
    latency: Duration,
}

/// Synchronous per-frame work. Owns the segmenter and the current selection.
pub struct FrameProcessor {
    segmenter: Box<dyn Segmenter>,
    synthesizer: BackgroundSynthesizer,
    compositor: Compositor,
    selection: Selection,
    background: Option<CachedBackground>,
    timings: StageTimings,
    failure_streak: u64,
}

impl FrameProcessor {
    pub fn new(
        segmenter: Box<dyn Segmenter>,
        synthesizer: BackgroundSynthesizer,
        compositor: Compositor,
        selection: Selection,
    ) -> Self {
        Self {
            segmenter,
            synthesizer,
            compositor,
            selection,
            background: None,
            timings: StageTimings::default(),
            failure_streak: 0,
        }
    }

    pub fn selection(&self) -> Selection {
        self.selection
    }

    pub fn apply(&mut self, selection: Selection) {
        if selection != self.selection {
            tracing::info!(
                "Background {} -> {}, debug mask {}",
                self.selection.mode,
                selection.mode,
                selection.debug_mask
            );
        }
        self.selection = selection;
    }

    /// Composite one frame, or `None` when segmentation failed and the
    /// previous output should stay on screen.
    pub fn process(&mut self, frame: &Frame) -> Option<RgbImage> {
        let _span = tracing::debug_span!("frame", sequence = frame.sequence()).entered();
        self.timings.frames += 1;

        let start = Instant::now();
        let mask = match self.segmenter.segment(frame.image()) {
            Ok(mask) => mask,
            Err(e) => {
                self.timings.skipped += 1;
                self.failure_streak += 1;
                let e = anyhow::Error::from(e);
                // Only the first failure of a run is worth a warning.
                if self.failure_streak == 1 {
                    tracing::warn!(
                        "Frame {}: {} failed: {:#}",
                        frame.sequence(),
                        self.segmenter.name(),
                        e
                    );
                } else {
                    tracing::debug!("Frame {}: segmentation failed again: {:#}", frame.sequence(), e);
                }
                return None;
            }
        };
        if self.failure_streak > 0 {
            tracing::info!("Segmentation recovered after {} skipped frames", self.failure_streak);
            self.failure_streak = 0;
        }
        self.timings.segment += start.elapsed();

        // The mask view needs no background.
        if self.selection.debug_mask {
            let start = Instant::now();
            let image = mask_view(&mask, frame.dimensions());
            self.timings.composite += start.elapsed();
            self.timings.latency += frame.timestamp().elapsed();
            return Some(image);
        }

        let start = Instant::now();
        let background = cached_background(
            &mut self.background,
            &self.synthesizer,
            self.selection.mode,
            frame.dimensions(),
        );
        self.timings.synthesize += start.elapsed();

        let start = Instant::now();
        let image = self
            .compositor
            .composite(frame.image(), &mask, background, false);
        self.timings.composite += start.elapsed();
        self.timings.latency += frame.timestamp().elapsed();

        Some(image)
    }

    /// Drop temporal model state.
    pub fn reset(&mut self) {
        self.segmenter.reset_state();
    }

    fn log_stats(&self, dropped: u64) {
        let t = &self.timings;
        if t.frames == 0 || t.frames % STATS_INTERVAL != 0 {
            return;
        }
        let processed = (t.frames - t.skipped).max(1) as f64;
        let avg_ms = |d: Duration| d.as_secs_f64() * 1000.0 / processed;
        let avg_segment_ms = avg_ms(t.segment);
        let avg_synth_ms = avg_ms(t.synthesize);
        let avg_composite_ms = avg_ms(t.composite);
        let total_ms = avg_segment_ms + avg_synth_ms + avg_composite_ms;

        tracing::info!(
            "Frame {}: segment={:.1}ms, background={:.1}ms, composite={:.1}ms, total={:.1}ms, latency={:.1}ms, skipped={}, dropped={}",
            t.frames,
            avg_segment_ms,
            avg_synth_ms,
            avg_composite_ms,
            total_ms,
            avg_ms(t.latency),
            t.skipped,
            dropped
        );
    }
}

/// Backgrounds only change with mode or size, so reuse the last one.
fn cached_background<'a>(
    cache: &'a mut Option<CachedBackground>,
    synthesizer: &BackgroundSynthesizer,
    mode: BackgroundMode,
    size: (u32, u32),
) -> &'a RgbImage {
    if !matches!(cache.as_ref(), Some(c) if c.mode == mode && c.size == size) {
        *cache = None;
    }
    &cache
        .get_or_insert_with(|| CachedBackground {
            mode,
            size,
            image: synthesizer.synthesize(mode, size),
        })
        .image
}

/// Consumer side of the capture channel.
struct Worker {
    processor: FrameProcessor,
    selection: Arc<SelectionSlot>,
    latest: Arc<LatestImage>,
    sink: Option<Box<dyn PresentationSink>>,
    running: Arc<AtomicBool>,
    dropped: Arc<AtomicU64>,
}

impl Worker {
    fn run(mut self, frames: Receiver<Frame>) {
        tracing::info!("Worker started");
        while self.running.load(Ordering::Acquire) {
            let frame = match frames.recv_timeout(POLL_INTERVAL) {
                Ok(frame) => frame,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            };
            self.handle(&frame);
        }
        self.processor.reset();
        tracing::info!("Worker stopped");
    }

    fn handle(&mut self, frame: &Frame) {
        if let Some(selection) = self.selection.take() {
            self.processor.apply(selection);
        }

        let output = self.processor.process(frame);

        // Stopped mid-frame: the result is stale.
        if !self.running.load(Ordering::Acquire) {
            tracing::debug!("Discarding frame {} after stop", frame.sequence());
            return;
        }

        if let Some(image) = output {
            let image = Arc::new(image);
            self.latest.present(Arc::clone(&image));
            if let Some(sink) = &self.sink {
                sink.present(image);
            }
        }

        self.processor.log_stats(self.dropped.load(Ordering::Relaxed));
    }
}

/// A configured, not yet started pipeline.
pub struct Pipeline {
    source: FrameSource,
    processor: FrameProcessor,
    sink: Option<Box<dyn PresentationSink>>,
}

impl Pipeline {
    pub fn new(source: FrameSource, processor: FrameProcessor) -> Self {
        Self {
            source,
            processor,
            sink: None,
        }
    }

    /// Also hand every composited image to `sink`.
    pub fn with_sink(mut self, sink: impl PresentationSink + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    /// Spawn the capture and worker threads.
    ///
    /// Returns immediately; permission and device opening resolve on the
    /// capture thread and show up in [`PipelineHandle::session`].
    pub fn start(self) -> Result<PipelineHandle> {
        let session = Arc::new(SessionState::new());
        let selection = Arc::new(SelectionSlot::new(self.processor.selection()));
        let latest = Arc::new(LatestImage::new());
        let running = Arc::new(AtomicBool::new(true));

        let (tx, rx) = channel::latest::<Frame>();
        let dropped = tx.dropped_counter();

        let worker = Worker {
            processor: self.processor,
            selection: Arc::clone(&selection),
            latest: Arc::clone(&latest),
            sink: self.sink,
            running: Arc::clone(&running),
            dropped: Arc::clone(&dropped),
        };
        let worker = std::thread::Builder::new()
            .name("frame-worker".to_string())
            .spawn(move || worker.run(rx))
            .context("Failed to spawn worker thread")?;

        let capture = match self
            .source
            .spawn(Arc::clone(&session), Arc::clone(&running), tx)
        {
            Ok(handle) => handle,
            Err(e) => {
                running.store(false, Ordering::Release);
                let _ = worker.join();
                return Err(e).context("Failed to spawn capture thread");
            }
        };

        Ok(PipelineHandle {
            session,
            selection,
            latest,
            running,
            dropped,
            capture: Some(capture),
            worker: Some(worker),
        })
    }
}

/// Control surface of a running pipeline, used from the UI thread.
pub struct PipelineHandle {
    session: Arc<SessionState>,
    selection: Arc<SelectionSlot>,
    latest: Arc<LatestImage>,
    running: Arc<AtomicBool>,
    dropped: Arc<AtomicU64>,
    capture: Option<JoinHandle<()>>,
    worker: Option<JoinHandle<()>>,
}

impl PipelineHandle {
    pub fn session(&self) -> SessionSnapshot {
        self.session.snapshot()
    }

    /// Background and debug-mask controls. Changes apply to the next frame.
    pub fn selection(&self) -> &SelectionSlot {
        &self.selection
    }

    /// Most recent composited image.
    pub fn latest(&self) -> Option<Presented> {
        self.latest.latest()
    }

    /// Frames discarded because the worker was busy.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Whether both threads have exited (stopped or gone offline).
    pub fn is_finished(&self) -> bool {
        let done = |h: &Option<JoinHandle<()>>| h.as_ref().map_or(true, JoinHandle::is_finished);
        done(&self.capture) && done(&self.worker)
    }

    /// Halt capture and processing. Safe to call repeatedly.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        for handle in [self.capture.take(), self.worker.take()].into_iter().flatten() {
            let name = handle.thread().name().unwrap_or("pipeline").to_string();
            if handle.join().is_err() {
                tracing::error!("{} thread panicked", name);
            }
        }
        self.session.mark_stopped();
    }
}

impl Drop for PipelineHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SegmentationError;
    use crate::segmentation::{MaskShape, SegmentationMask, SyntheticSegmenter};
    use image::Rgb;

    const RED: Rgb<u8> = Rgb([255, 0, 0]);

    /// Fails on the listed call numbers, full mask otherwise.
    struct Flaky {
        calls: u64,
        fail_on: Vec<u64>,
        resets: Arc<AtomicU64>,
    }

    impl Segmenter for Flaky {
        fn segment(&mut self, frame: &RgbImage) -> Result<SegmentationMask, SegmentationError> {
            self.calls += 1;
            if self.fail_on.contains(&self.calls) {
                return Err(SegmentationError::Unavailable("test".into()));
            }
            let (w, h) = frame.dimensions();
            Ok(SegmentationMask::filled(w, h, SegmentationMask::MAX))
        }

        fn reset_state(&mut self) {
            self.resets.fetch_add(1, Ordering::Relaxed);
        }

        fn name(&self) -> &str {
            "flaky"
        }
    }

    fn processor(segmenter: impl Segmenter + 'static, mode: BackgroundMode) -> FrameProcessor {
        FrameProcessor::new(
            Box::new(segmenter),
            BackgroundSynthesizer::new(),
            Compositor::default(),
            Selection {
                mode,
                debug_mask: false,
            },
        )
    }

    fn worker(processor: FrameProcessor) -> Worker {
        let selection = Arc::new(SelectionSlot::new(processor.selection()));
        Worker {
            processor,
            selection,
            latest: Arc::new(LatestImage::new()),
            sink: None,
            running: Arc::new(AtomicBool::new(true)),
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    fn frame(sequence: u64, color: Rgb<u8>) -> Frame {
        Frame::new(sequence, RgbImage::from_pixel(100, 100, color))
    }

    #[test]
    fn black_background_full_mask_shows_frame() {
        let mut p = processor(SyntheticSegmenter::new(MaskShape::Full), BackgroundMode::Black);
        let out = p.process(&frame(0, RED)).unwrap();
        assert_eq!(out, RgbImage::from_pixel(100, 100, RED));
    }

    #[test]
    fn white_background_empty_mask_shows_white() {
        let mut p = processor(SyntheticSegmenter::new(MaskShape::Empty), BackgroundMode::White);
        let out = p.process(&frame(0, RED)).unwrap();
        assert_eq!(out, RgbImage::from_pixel(100, 100, Rgb([255, 255, 255])));
    }

    #[test]
    fn output_matches_frame_extent_for_small_masks() {
        let segmenter = SyntheticSegmenter::new(MaskShape::Ellipse).with_size(16, 9);
        let mut p = processor(segmenter, BackgroundMode::Gradient);
        let image = RgbImage::from_pixel(64, 36, RED);
        let out = p.process(&Frame::new(0, image)).unwrap();
        assert_eq!(out.dimensions(), (64, 36));
    }

    #[test]
    fn segmentation_failure_keeps_previous_output() {
        let resets = Arc::new(AtomicU64::new(0));
        let flaky = Flaky {
            calls: 0,
            fail_on: vec![3],
            resets,
        };
        let mut w = worker(processor(flaky, BackgroundMode::Black));

        w.handle(&frame(1, RED));
        w.handle(&frame(2, Rgb([0, 255, 0])));
        let before = w.latest.latest().unwrap();

        w.handle(&frame(3, Rgb([0, 0, 255])));
        let after = w.latest.latest().unwrap();

        assert_eq!(after.generation, before.generation);
        assert!(Arc::ptr_eq(&after.image, &before.image));
        assert_eq!(after.image.get_pixel(0, 0), &Rgb([0, 255, 0]));

        w.handle(&frame(4, Rgb([0, 0, 255])));
        assert_eq!(w.latest.latest().unwrap().image.get_pixel(0, 0), &Rgb([0, 0, 255]));
    }

    #[test]
    fn debug_toggle_only_affects_later_frames() {
        let segmenter = SyntheticSegmenter::new(MaskShape::Constant(64));
        let mut w = worker(processor(segmenter, BackgroundMode::White));

        w.handle(&frame(1, RED));
        let delivered = w.latest.latest().unwrap();
        let delivered_pixels = (*delivered.image).clone();

        assert!(w.selection.toggle_debug_mask());
        w.handle(&frame(2, RED));
        let debug = w.latest.latest().unwrap();

        assert_eq!(*delivered.image, delivered_pixels);
        assert_ne!(delivered.image.get_pixel(0, 0), &Rgb([64, 64, 64]));
        assert_eq!(debug.image.get_pixel(0, 0), &Rgb([64, 64, 64]));
        assert_eq!(debug.generation, delivered.generation + 1);
    }

    #[test]
    fn selection_change_applies_to_next_frame() {
        let segmenter = SyntheticSegmenter::new(MaskShape::Empty);
        let mut w = worker(processor(segmenter, BackgroundMode::Black));

        w.handle(&frame(1, RED));
        assert_eq!(w.latest.latest().unwrap().image.get_pixel(5, 5), &Rgb([0, 0, 0]));

        w.selection.set_mode(BackgroundMode::White);
        w.handle(&frame(2, RED));
        assert_eq!(w.latest.latest().unwrap().image.get_pixel(5, 5), &Rgb([255, 255, 255]));
        assert_eq!(w.processor.selection().mode, BackgroundMode::White);
    }

    #[test]
    fn result_after_stop_is_discarded() {
        let segmenter = SyntheticSegmenter::new(MaskShape::Full);
        let mut w = worker(processor(segmenter, BackgroundMode::Black));
        w.running.store(false, Ordering::Release);

        w.handle(&frame(1, RED));
        assert!(w.latest.latest().is_none());
    }

    #[test]
    fn worker_exit_resets_segmenter() {
        let resets = Arc::new(AtomicU64::new(0));
        let flaky = Flaky {
            calls: 0,
            fail_on: vec![],
            resets: resets.clone(),
        };
        let w = worker(processor(flaky, BackgroundMode::Black));
        let (tx, rx) = channel::latest::<Frame>();
        tx.send(frame(1, RED));
        drop(tx);

        let latest = Arc::clone(&w.latest);
        w.run(rx);

        assert_eq!(resets.load(Ordering::Relaxed), 1);
        assert_eq!(latest.generation(), 1);
    }

    #[test]
    fn background_is_cached_per_mode_and_size() {
        let synth = BackgroundSynthesizer::new();
        let mut cache = None;
        let first = cached_background(&mut cache, &synth, BackgroundMode::Gradient, (8, 8)).clone();
        assert_eq!(first, synth.synthesize(BackgroundMode::Gradient, (8, 8)));

        let resized = cached_background(&mut cache, &synth, BackgroundMode::Gradient, (4, 2)).clone();
        assert_eq!(resized.dimensions(), (4, 2));

        let black = cached_background(&mut cache, &synth, BackgroundMode::Black, (4, 2)).clone();
        assert!(black.pixels().all(|p| *p == Rgb([0, 0, 0])));
    }

    #[test]
    fn debug_mask_skips_background_synthesis() {
        let segmenter = SyntheticSegmenter::new(MaskShape::Constant(64));
        let mut p = processor(segmenter, BackgroundMode::CustomImage);
        p.apply(Selection {
            mode: BackgroundMode::CustomImage,
            debug_mask: true,
        });

        let out = p.process(&frame(0, RED)).unwrap();
        assert_eq!(out.dimensions(), (100, 100));
        assert!(out.pixels().all(|px| *px == Rgb([64, 64, 64])));
        assert!(p.background.is_none());

        p.apply(Selection {
            mode: BackgroundMode::CustomImage,
            debug_mask: false,
        });
        p.process(&frame(1, RED)).unwrap();
        assert!(p.background.is_some());
    }

    #[test]
    fn unavailable_model_skips_every_frame() {
        let mut w = worker(processor(
            crate::segmentation::Unavailable::new("no model"),
            BackgroundMode::Black,
        ));
        for sequence in 0..3 {
            w.handle(&frame(sequence, RED));
        }
        assert!(w.latest.latest().is_none());
        assert_eq!(w.processor.timings.skipped, 3);
        assert_eq!(w.processor.failure_streak, 3);
    }
}
