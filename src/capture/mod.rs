//! Frame acquisition and local preview

#[cfg(feature = "camera")]
mod camera;
mod preview;

#[cfg(feature = "camera")]
pub use camera::NokhwaFrameSource;
pub use preview::{write_jpeg, SnapshotPreview};

use image::imageops::{self, FilterType};
use image::RgbImage;

use crate::errors::Result;

/// Scale `frame` to `width`x`height` unless it already has that size.
///
/// Tracking geometry and the encoder both work in configured frame
/// coordinates, whatever mode the device negotiated.
pub fn fit_frame(frame: RgbImage, width: u32, height: u32) -> RgbImage {
    if frame.dimensions() == (width, height) {
        return frame;
    }
    imageops::resize(&frame, width, height, FilterType::Triangle)
}

/// One captured image stamped against the loop clock
#[derive(Debug, Clone)]
pub struct FrameSample {
    pub image: RgbImage,
    /// Milliseconds since loop start
    pub captured_at_ms: u64,
    /// Presentation timestamp, microseconds since loop start
    pub pts_us: u64,
}

impl FrameSample {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// A camera or any other producer of RGB frames.
///
/// `next_frame` returns `Ok(None)` once the source has ended for good.
pub trait FrameSource {
    fn start(&mut self) -> Result<()>;

    /// Stop then start again; a failed stop does not prevent the start.
    fn restart(&mut self) -> Result<()> {
        if let Err(e) = self.stop() {
            log::warn!("Frame source stop before restart failed: {}", e);
        }
        self.start()
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>>;

    fn stop(&mut self) -> Result<()>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn start(&mut self) -> Result<()> {
        (**self).start()
    }

    fn restart(&mut self) -> Result<()> {
        (**self).restart()
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        (**self).next_frame()
    }

    fn stop(&mut self) -> Result<()> {
        (**self).stop()
    }
}

/// Local monitor for the raw camera feed
pub trait PreviewSink {
    /// Whether frames should still be pushed
    fn is_visible(&self) -> bool;

    fn show(&mut self, frame: &RgbImage) -> Result<()>;

    fn release(&mut self) -> Result<()>;
}
