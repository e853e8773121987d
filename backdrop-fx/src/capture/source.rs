use super::permission::{resolve_permission, CameraPermission};
use super::{mirror, CaptureSource, Frame};
use crate::channel::LatestSender;
use crate::error::SessionError;
use crate::session::SessionState;
use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Back-to-back capture failures before the device counts as lost
/// (about a second at the retry interval).
const MAX_CONSECUTIVE_ERRORS: u32 = 100;

const RETRY_INTERVAL: Duration = Duration::from_millis(10);

/// Opens the capture device. Runs on the capture thread, so the device
/// handle never has to cross threads.
pub type CaptureOpener = Box<dyn FnOnce() -> Result<Box<dyn CaptureSource>> + Send>;

/// Continuous capture on a dedicated thread, feeding a single consumer.
pub struct FrameSource {
    opener: CaptureOpener,
    permission: Box<dyn CameraPermission>,
    mirror: Option<bool>,
}

impl FrameSource {
    pub fn new(opener: CaptureOpener, permission: Box<dyn CameraPermission>) -> Self {
        Self {
            opener,
            permission,
            mirror: None,
        }
    }

    /// Force mirroring on or off instead of following the sensor's facing.
    pub fn with_mirroring(mut self, mirror: bool) -> Self {
        self.mirror = Some(mirror);
        self
    }

    pub(crate) fn spawn(
        self,
        session: Arc<SessionState>,
        running: Arc<AtomicBool>,
        frames: LatestSender<Frame>,
    ) -> std::io::Result<JoinHandle<()>> {
        std::thread::Builder::new()
            .name("frame-capture".to_string())
            .spawn(move || self.run(&session, &running, &frames))
    }

    fn run(self, session: &SessionState, running: &AtomicBool, frames: &LatestSender<Frame>) {
        let granted = resolve_permission(self.permission.as_ref());
        session.set_permission(granted);
        if !granted {
            session.go_offline(SessionError::PermissionDenied);
            return;
        }

        let mut source = match (self.opener)() {
            Ok(source) => source,
            Err(e) => {
                tracing::error!("Failed to open capture device: {:#}", e);
                session.go_offline(SessionError::DeviceUnavailable(format!("{:#}", e)));
                return;
            }
        };

        let mirrored = self.mirror.unwrap_or_else(|| source.is_front_facing());
        let (width, height) = source.resolution();
        tracing::info!("Capture running at {}x{}, mirrored={}", width, height, mirrored);
        session.mark_running();

        let mut sequence = 0u64;
        let mut errors = 0u32;
        while running.load(Ordering::Acquire) {
            match source.capture_frame() {
                Ok(mut image) => {
                    if errors > 0 {
                        tracing::info!("Capture recovered after {} errors", errors);
                        errors = 0;
                    }
                    if mirrored {
                        mirror(&mut image);
                    }
                    frames.send(Frame::new(sequence, image));
                    sequence += 1;
                }
                Err(e) => {
                    errors += 1;
                    if errors == 1 {
                        tracing::warn!("Capture error: {:#}", e);
                    } else {
                        tracing::debug!("Capture error ({} in a row): {:#}", errors, e);
                    }
                    if errors >= MAX_CONSECUTIVE_ERRORS {
                        session.go_offline(SessionError::DeviceUnavailable(format!(
                            "capture failed {} times in a row: {:#}",
                            errors, e
                        )));
                        tracing::info!("Capture stopped after {} frames", sequence);
                        return;
                    }
                    std::thread::sleep(RETRY_INTERVAL);
                }
            }
        }

        session.mark_stopped();
        tracing::info!("Capture stopped after {} frames", sequence);
    }
}
