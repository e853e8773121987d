use anyhow::{Context, Result};
use backdrop_fx::capture::{
    CaptureOpener, CapturePreset, CaptureSource, DevicePermission, FrameSource, WebcamCapture,
};
use backdrop_fx::output::PresentationSink;
use backdrop_fx::segmentation;
use backdrop_fx::{
    BackgroundMode, BackgroundSynthesizer, Compositor, FrameProcessor, Pipeline, PipelineHandle,
    Selection,
};
use clap::{Parser, ValueEnum};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input webcam device index
    #[arg(short, long, default_value_t = 0)]
    input_device: u32,

    /// Capture resolution width
    #[arg(long, default_value_t = 1280)]
    capture_width: u32,

    /// Capture resolution height
    #[arg(long, default_value_t = 720)]
    capture_height: u32,

    /// Requested capture frames per second
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Do not mirror the camera image
    #[arg(long)]
    no_mirror: bool,

    /// Output v4l2loopback device path (e.g. /dev/video10)
    #[arg(short, long)]
    output_device: Option<String>,

    /// Output resolution width
    #[arg(long, default_value_t = 1280)]
    output_width: u32,

    /// Output resolution height
    #[arg(long, default_value_t = 720)]
    output_height: u32,

    /// Path to segmentation model (ONNX file)
    /// If not provided, a synthetic silhouette mask is used;
    /// if it cannot be loaded, frames are skipped
    #[arg(long)]
    model: Option<PathBuf>,

    /// Initial background
    #[arg(short, long, value_enum, default_value_t = BackgroundMode::Blur)]
    background: BackgroundMode,

    /// Directory searched for the "background" image asset
    #[arg(long, default_value = "assets")]
    asset_dir: PathBuf,

    /// Custom background image, overrides --asset-dir
    #[arg(long)]
    background_image: Option<PathBuf>,

    /// Start with the mask visualization instead of the composite
    #[arg(long)]
    debug_mask: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Save the last composited image as PNG on exit
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Stop after this many seconds
    #[arg(long)]
    duration: Option<u64>,
}

/// Commands read from stdin, one per line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Background(BackgroundMode),
    ToggleDebug,
    Status,
    Quit,
}

fn parse_command(line: &str) -> Option<Command> {
    match line.trim().to_ascii_lowercase().as_str() {
        "" => None,
        "debug" => Some(Command::ToggleDebug),
        "status" => Some(Command::Status),
        "quit" | "q" | "exit" => Some(Command::Quit),
        other => BackgroundMode::from_str(other, true)
            .ok()
            .map(Command::Background),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    tracing::info!("backdrop-fx starting");
    tracing::info!(
        "Capture: {}x{}@{}",
        args.capture_width,
        args.capture_height,
        args.fps
    );

    let segmenter = segmentation::create_segmenter(args.model.as_deref());

    let synthesizer = match &args.background_image {
        Some(path) => BackgroundSynthesizer::from_path(path),
        None => BackgroundSynthesizer::from_asset_dir(&args.asset_dir),
    };

    let processor = FrameProcessor::new(
        segmenter,
        synthesizer,
        Compositor::default(),
        Selection {
            mode: args.background,
            debug_mask: args.debug_mask,
        },
    );

    let preset = CapturePreset {
        width: args.capture_width,
        height: args.capture_height,
        fps: args.fps,
    };
    let device = args.input_device;
    let opener: CaptureOpener = Box::new(move || -> Result<Box<dyn CaptureSource>> {
        Ok(Box::new(WebcamCapture::new(device, preset, true)?))
    });
    let mut source = FrameSource::new(opener, Box::new(DevicePermission::new(device)));
    if args.no_mirror {
        source = source.with_mirroring(false);
    }

    let mut pipeline = Pipeline::new(source, processor);
    if let Some(path) = &args.output_device {
        pipeline = pipeline.with_sink(open_output(path, args.output_width, args.output_height)?);
    }

    let mut handle = pipeline.start()?;
    tracing::info!("Commands: blur | black | white | gradient | image | debug | status | quit");

    run_controls(&handle, spawn_stdin_reader()?, args.duration.map(Duration::from_secs));

    handle.stop();
    print_status(&handle);

    if let Some(path) = &args.snapshot {
        save_snapshot(&handle, path)?;
    }

    Ok(())
}

#[cfg(feature = "loopback")]
fn open_output(path: &str, width: u32, height: u32) -> Result<Box<dyn PresentationSink>> {
    let output = backdrop_fx::output::V4L2Output::new(path, width, height)
        .context("Failed to initialize v4l2loopback output")?;
    let sink = backdrop_fx::output::ThreadedSink::spawn(output)
        .context("Failed to spawn output thread")?;
    Ok(Box::new(sink))
}

#[cfg(not(feature = "loopback"))]
fn open_output(path: &str, _width: u32, _height: u32) -> Result<Box<dyn PresentationSink>> {
    anyhow::bail!("built without loopback support, cannot open {}", path)
}

fn spawn_stdin_reader() -> Result<Receiver<Command>> {
    let (tx, rx) = crossbeam_channel::unbounded();
    std::thread::Builder::new()
        .name("stdin-controls".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                match parse_command(&line) {
                    Some(command) => {
                        if tx.send(command).is_err() {
                            break;
                        }
                    }
                    None if !line.trim().is_empty() => {
                        tracing::warn!("Unknown command: {}", line.trim());
                    }
                    None => {}
                }
            }
        })
        .context("Failed to spawn stdin reader")?;
    Ok(rx)
}

/// UI loop: forward user commands until quit, timeout, or the session dies.
fn run_controls(handle: &PipelineHandle, commands: Receiver<Command>, duration: Option<Duration>) {
    const TICK: Duration = Duration::from_millis(250);
    let deadline = duration.map(|d| Instant::now() + d);

    loop {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            tracing::info!("Duration elapsed");
            return;
        }
        if handle.is_finished() {
            if let Some(reason) = handle.session().offline {
                tracing::error!("Pipeline offline: {}", reason);
            }
            return;
        }

        match commands.recv_timeout(TICK) {
            Ok(Command::Background(mode)) => {
                tracing::info!("Selected background: {}", mode);
                handle.selection().set_mode(mode);
            }
            Ok(Command::ToggleDebug) => {
                let on = handle.selection().toggle_debug_mask();
                tracing::info!("Debug mask {}", if on { "on" } else { "off" });
            }
            Ok(Command::Status) => print_status(handle),
            Ok(Command::Quit) => return,
            Err(RecvTimeoutError::Timeout) => {}
            // stdin closed; keep running until the deadline or Ctrl+C.
            Err(RecvTimeoutError::Disconnected) => std::thread::sleep(TICK),
        }
    }
}

fn print_status(handle: &PipelineHandle) {
    let session = handle.session();
    let selection = handle.selection().current();
    let generation = handle.latest().map_or(0, |p| p.generation);
    tracing::info!(
        "Status: {} (permission {:?}), background={}, debug_mask={}, frames={}, dropped={}",
        session.label(),
        session.permission,
        selection.mode,
        selection.debug_mask,
        generation,
        handle.dropped_frames()
    );
}

fn save_snapshot(handle: &PipelineHandle, path: &Path) -> Result<()> {
    match handle.latest() {
        Some(presented) => {
            presented
                .image
                .save(path)
                .with_context(|| format!("Failed to save snapshot to {}", path.display()))?;
            tracing::info!("Saved snapshot to {}", path.display());
        }
        None => tracing::warn!("No composited frame to snapshot"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_background_commands() {
        assert_eq!(parse_command("black"), Some(Command::Background(BackgroundMode::Black)));
        assert_eq!(parse_command(" White \n"), Some(Command::Background(BackgroundMode::White)));
        assert_eq!(parse_command("image"), Some(Command::Background(BackgroundMode::CustomImage)));
        assert_eq!(
            parse_command("custom-image"),
            Some(Command::Background(BackgroundMode::CustomImage))
        );
    }

    #[test]
    fn parses_control_commands() {
        assert_eq!(parse_command("debug"), Some(Command::ToggleDebug));
        assert_eq!(parse_command("status"), Some(Command::Status));
        assert_eq!(parse_command("q"), Some(Command::Quit));
        assert_eq!(parse_command(""), None);
        assert_eq!(parse_command("sepia"), None);
    }

    #[test]
    fn cli_defaults() {
        let args = Args::parse_from(["backdrop-fx"]);
        assert_eq!(args.background, BackgroundMode::Blur);
        assert_eq!((args.capture_width, args.capture_height), (1280, 720));
        assert!(args.output_device.is_none());
    }

    #[test]
    fn cli_background_value() {
        let args = Args::parse_from(["backdrop-fx", "--background", "gradient", "--debug-mask"]);
        assert_eq!(args.background, BackgroundMode::Gradient);
        assert!(args.debug_mask);
    }
}
