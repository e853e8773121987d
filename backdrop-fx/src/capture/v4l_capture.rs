use super::{CapturePreset, CaptureSource};
use anyhow::{Context, Result};
use image::RgbImage;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution,
};
use nokhwa::Camera;

pub struct WebcamCapture {
    camera: Camera,
    width: u32,
    height: u32,
    front_facing: bool,
}

impl WebcamCapture {
    pub fn new(device_index: u32, preset: CapturePreset, front_facing: bool) -> Result<Self> {
        tracing::info!(
            "Initializing webcam {} at {}x{}@{}",
            device_index,
            preset.width,
            preset.height,
            preset.fps
        );

        let index = CameraIndex::Index(device_index);
        let closest = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(
            CameraFormat::new(
                Resolution::new(preset.width, preset.height),
                FrameFormat::MJPEG,
                preset.fps,
            ),
        ));

        let mut camera = match Camera::new(index.clone(), closest) {
            Ok(camera) => camera,
            Err(e) => {
                tracing::warn!("Preset format rejected ({}), using highest resolution", e);
                let highest =
                    RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestResolution);
                Camera::new(index, highest).context("Failed to open camera")?
            }
        };

        camera.open_stream()
            .context("Failed to open camera stream")?;

        let resolution = camera.resolution();
        tracing::info!(
            "Webcam initialized: {} ({}x{})",
            camera.info().human_name(),
            resolution.width(),
            resolution.height()
        );

        Ok(Self {
            camera,
            width: resolution.width(),
            height: resolution.height(),
            front_facing,
        })
    }
}

impl CaptureSource for WebcamCapture {
    fn capture_frame(&mut self) -> Result<RgbImage> {
        let frame = self
            .camera
            .frame()
            .context("Failed to capture frame")?;

        let decoded = frame.decode_image::<RgbFormat>()
            .context("Failed to decode frame")?;

        Ok(decoded)
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn is_front_facing(&self) -> bool {
        self.front_facing
    }
}

impl Drop for WebcamCapture {
    fn drop(&mut self) {
        if let Err(e) = self.camera.stop_stream() {
            tracing::warn!("Failed to stop camera stream: {}", e);
        }
    }
}
