//! V4L2 camera via nokhwa
//!
//! The device is opened on `start` and dropped on `stop`, so a restart
//! reopens it from scratch.

use image::RgbImage;
use nokhwa::{
    pixel_format::RgbFormat,
    utils::{
        ApiBackend, CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType,
        Resolution,
    },
    CallbackCamera,
};

use super::FrameSource;
use crate::config::CameraConfig;
use crate::errors::{Result, SentryError};

pub struct NokhwaFrameSource {
    camera: Option<CallbackCamera>,
    index: u32,
    width: u32,
    height: u32,
    frame_rate: u32,
}

impl NokhwaFrameSource {
    pub fn new(index: u32, width: u32, height: u32, frame_rate: u32) -> Self {
        Self {
            camera: None,
            index,
            width,
            height,
            frame_rate,
        }
    }

    pub fn from_config(config: &CameraConfig) -> Self {
        Self::new(
            config.video_device,
            config.width,
            config.height,
            config.frame_rate,
        )
    }

    /// Open the device asking for the closest MJPEG mode to the request.
    fn open(&self) -> Result<CallbackCamera> {
        let format = CameraFormat::new(
            Resolution::new(self.width, self.height),
            FrameFormat::MJPEG,
            self.frame_rate,
        );
        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(format));

        CallbackCamera::with_backend(
            CameraIndex::Index(self.index),
            requested,
            ApiBackend::Video4Linux,
            |_| {},
        )
        .map_err(|e| SentryError::Device(format!("Failed to open camera {}: {}", self.index, e)))
    }
}

impl FrameSource for NokhwaFrameSource {
    fn start(&mut self) -> Result<()> {
        let mut camera = match self.camera.take() {
            Some(camera) => camera,
            None => self.open()?,
        };
        camera.open_stream().map_err(|e| {
            SentryError::Device(format!("Failed to start camera {}: {}", self.index, e))
        })?;
        match camera.resolution() {
            Ok(actual) if (actual.width(), actual.height()) != (self.width, self.height) => {
                log::warn!(
                    "Camera {} negotiated {}x{} instead of {}x{}; frames will be scaled",
                    self.index,
                    actual.width(),
                    actual.height(),
                    self.width,
                    self.height
                );
            }
            Ok(_) => {}
            Err(e) => log::debug!("Camera {} resolution unknown: {}", self.index, e),
        }
        self.camera = Some(camera);
        log::info!(
            "Camera {} streaming, requested {}x{}@{}",
            self.index,
            self.width,
            self.height,
            self.frame_rate
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        let camera = self
            .camera
            .as_mut()
            .ok_or_else(|| SentryError::Frame(format!("Camera {} is not open", self.index)))?;

        let buffer = camera
            .poll_frame()
            .map_err(|e| SentryError::Frame(format!("Failed to capture frame: {}", e)))?;
        let decoded = buffer
            .decode_image::<RgbFormat>()
            .map_err(|e| SentryError::Frame(format!("Failed to decode frame: {}", e)))?;

        let (width, height) = (decoded.width(), decoded.height());
        RgbImage::from_raw(width, height, decoded.into_raw())
            .map(Some)
            .ok_or_else(|| SentryError::Frame(format!("Short frame buffer {}x{}", width, height)))
    }

    fn stop(&mut self) -> Result<()> {
        match self.camera.take() {
            Some(mut camera) => camera.stop_stream().map_err(|e| {
                SentryError::Device(format!("Failed to stop camera {}: {}", self.index, e))
            }),
            None => Ok(()),
        }
    }
}
