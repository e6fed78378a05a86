//! Recording/encoding sink interface

use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::audio::AudioChunk;
use crate::config::SentryConfig;
use crate::errors::Result;

/// Encoder and stream parameters passed to [`RecordingSink::start`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamSettings {
    pub destination: String,
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    /// Video bitrate in bits per second
    pub video_bitrate: u32,
    /// Keyframe interval in frames
    pub gop_size: u32,
    pub sample_rate: u32,
    pub channels: u16,
    /// Audio bitrate in bits per second
    pub audio_bitrate: u32,
}

impl StreamSettings {
    pub fn from_config(config: &SentryConfig) -> Self {
        let camera = &config.camera;
        Self {
            destination: config.recording.destination.clone(),
            width: camera.width,
            height: camera.height,
            frame_rate: camera.frame_rate,
            video_bitrate: camera.bitrate,
            gop_size: camera.frame_rate,
            sample_rate: camera.audio_sample_rate,
            channels: camera.audio_channels,
            audio_bitrate: camera.audio_bitrate,
        }
    }
}

/// Append-only media ingestion.
///
/// Video arrives from the capture loop and audio from the sampling thread,
/// so implementations must accept calls from both concurrently.
pub trait RecordingSink: Send + Sync {
    fn start(&self, settings: &StreamSettings) -> Result<()>;

    /// Submit one frame stamped with its presentation time in microseconds
    fn submit_video_frame(&self, frame: &RgbImage, pts_us: u64) -> Result<()>;

    fn submit_audio_samples(&self, chunk: &AudioChunk) -> Result<()>;

    /// Flush and close the output
    fn stop(&self) -> Result<()>;
}
