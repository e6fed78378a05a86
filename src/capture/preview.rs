//! Headless preview: periodically overwrites a JPEG snapshot on disk

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;

use super::PreviewSink;
use crate::config::PreviewConfig;
use crate::errors::{Result, SentryError};

const JPEG_QUALITY: u8 = 85;

pub struct SnapshotPreview {
    path: PathBuf,
    every_n_frames: u64,
    seen: u64,
    written: u64,
    released: bool,
}

impl SnapshotPreview {
    pub fn new<P: AsRef<Path>>(path: P, every_n_frames: u64) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            every_n_frames: every_n_frames.max(1),
            seen: 0,
            written: 0,
            released: false,
        }
    }

    pub fn from_config(config: &PreviewConfig) -> Self {
        Self::new(&config.path, u64::from(config.every_n_frames))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshots written so far
    pub fn written(&self) -> u64 {
        self.written
    }
}

/// Encode an RGB frame as JPEG at `path`
pub fn write_jpeg(frame: &RgbImage, path: &Path) -> Result<()> {
    let file = File::create(path)?;
    let encoder = JpegEncoder::new_with_quality(BufWriter::new(file), JPEG_QUALITY);
    frame
        .write_with_encoder(encoder)
        .map_err(|e| SentryError::Frame(format!("Failed to write {}: {}", path.display(), e)))
}

impl PreviewSink for SnapshotPreview {
    fn is_visible(&self) -> bool {
        !self.released
    }

    fn show(&mut self, frame: &RgbImage) -> Result<()> {
        let due = self.seen % self.every_n_frames == 0;
        self.seen += 1;
        if !due {
            return Ok(());
        }
        write_jpeg(frame, &self.path)?;
        self.written += 1;
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        if !self.released {
            self.released = true;
            log::debug!(
                "Preview released after {} snapshot(s) at {}",
                self.written,
                self.path.display()
            );
        }
        Ok(())
    }
}
