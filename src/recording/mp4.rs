//! Local archive sink: H.264 via openh264, MP4 via muxide
//!
//! Video is muxed into the destination file. Audio is appended as raw
//! interleaved s16le PCM to a sidecar next to it (`<destination>.pcm`),
//! ready to be muxed offline.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use image::RgbImage;
use muxide::api::{Metadata, MuxerBuilder, VideoCodec};
use openh264::encoder::{Encoder, FrameType};
use openh264::formats::YUVBuffer;

use super::sink::{RecordingSink, StreamSettings};
use crate::audio::AudioChunk;
use crate::errors::{Result, SentryError};

/// H.264 encoder using openh264
pub struct H264Encoder {
    encoder: Encoder,
    width: u32,
    height: u32,
    frame_count: u64,
}

impl H264Encoder {
    /// Dimensions must be even for 4:2:0 subsampling.
    pub fn new(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 || width % 2 != 0 || height % 2 != 0 {
            return Err(SentryError::Encoding(format!(
                "Unsupported frame size {}x{}",
                width, height
            )));
        }

        let encoder = Encoder::new()
            .map_err(|e| SentryError::Encoding(format!("Failed to create encoder: {}", e)))?;

        Ok(Self {
            encoder,
            width,
            height,
            frame_count: 0,
        })
    }

    /// Encode one frame; returns Annex B NAL units and whether it is a keyframe.
    pub fn encode(&mut self, frame: &RgbImage) -> Result<(Vec<u8>, bool)> {
        if frame.width() != self.width || frame.height() != self.height {
            return Err(SentryError::Encoding(format!(
                "Frame dimensions {}x{} don't match recording config {}x{}",
                frame.width(),
                frame.height(),
                self.width,
                self.height
            )));
        }

        let yuv = rgb_to_yuv420(frame);
        let buffer = YUVBuffer::from_vec(yuv, self.width as usize, self.height as usize);

        let bitstream = self
            .encoder
            .encode(&buffer)
            .map_err(|e| SentryError::Encoding(format!("Encoding failed: {}", e)))?;

        self.frame_count += 1;
        let keyframe = matches!(bitstream.frame_type(), FrameType::IDR | FrameType::I);
        Ok((bitstream.to_vec(), keyframe))
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn force_keyframe(&mut self) {
        self.encoder.force_intra_frame();
    }
}

/// BT.601 RGB24 to planar YUV 4:2:0
fn rgb_to_yuv420(frame: &RgbImage) -> Vec<u8> {
    let w = frame.width() as usize;
    let h = frame.height() as usize;
    let y_size = w * h;
    let uv_size = (w / 2) * (h / 2);
    let mut yuv = vec![0u8; y_size + uv_size * 2];

    let (y_plane, uv_planes) = yuv.split_at_mut(y_size);
    let (u_plane, v_plane) = uv_planes.split_at_mut(uv_size);

    for (x, y, pixel) in frame.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        let [r, g, b] = pixel.0.map(i32::from);

        let luma = ((66 * r + 129 * g + 25 * b + 128) >> 8) + 16;
        y_plane[y * w + x] = luma.clamp(0, 255) as u8;

        if y % 2 == 0 && x % 2 == 0 {
            let idx = (y / 2) * (w / 2) + (x / 2);
            let u = ((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128;
            let v = ((112 * r - 94 * g - 18 * b + 128) >> 8) + 128;
            u_plane[idx] = u.clamp(0, 255) as u8;
            v_plane[idx] = v.clamp(0, 255) as u8;
        }
    }

    yuv
}

struct VideoTrack {
    encoder: H264Encoder,
    muxer: muxide::api::Muxer<BufWriter<File>>,
    last_pts_us: Option<u64>,
    dropped: u64,
}

/// MP4 archive with a PCM sidecar
#[derive(Default)]
pub struct Mp4Sink {
    video: Mutex<Option<VideoTrack>>,
    audio: Mutex<Option<BufWriter<File>>>,
}

impl Mp4Sink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sidecar path for a destination
    pub fn audio_path(destination: &Path) -> PathBuf {
        let mut name = destination.as_os_str().to_owned();
        name.push(".pcm");
        PathBuf::from(name)
    }
}

impl RecordingSink for Mp4Sink {
    fn start(&self, settings: &StreamSettings) -> Result<()> {
        let destination = Path::new(&settings.destination);

        let file = File::create(destination).map_err(|e| {
            SentryError::Device(format!("Failed to create {}: {}", settings.destination, e))
        })?;
        let encoder = H264Encoder::new(settings.width, settings.height)?;
        let muxer = MuxerBuilder::new(BufWriter::new(file))
            .video(
                VideoCodec::H264,
                settings.width,
                settings.height,
                f64::from(settings.frame_rate),
            )
            .with_fast_start(true)
            .with_metadata(Metadata::new().with_title("sentrycam").with_current_time())
            .build()
            .map_err(|e| SentryError::Device(format!("Failed to create muxer: {}", e)))?;

        let sidecar = File::create(Self::audio_path(destination))?;

        *self.video.lock().map_err(|_| SentryError::Poisoned("video track"))? = Some(VideoTrack {
            encoder,
            muxer,
            last_pts_us: None,
            dropped: 0,
        });
        *self.audio.lock().map_err(|_| SentryError::Poisoned("audio sidecar"))? =
            Some(BufWriter::new(sidecar));

        log::info!(
            "Recording {}x{}@{} to {}",
            settings.width,
            settings.height,
            settings.frame_rate,
            settings.destination
        );
        Ok(())
    }

    fn submit_video_frame(&self, frame: &RgbImage, pts_us: u64) -> Result<()> {
        let mut guard = self
            .video
            .lock()
            .map_err(|_| SentryError::Poisoned("video track"))?;
        let track = guard
            .as_mut()
            .ok_or_else(|| SentryError::Frame("recording not started".to_string()))?;

        // The muxer requires strictly increasing timestamps
        if track.last_pts_us.is_some_and(|last| pts_us <= last) {
            track.dropped += 1;
            return Ok(());
        }

        let (data, keyframe) = track.encoder.encode(frame)?;
        if data.is_empty() {
            track.dropped += 1;
            return Ok(());
        }

        track
            .muxer
            .write_video(pts_us as f64 / 1_000_000.0, &data, keyframe)
            .map_err(|e| SentryError::Frame(format!("Failed to write frame: {}", e)))?;
        track.last_pts_us = Some(pts_us);
        Ok(())
    }

    fn submit_audio_samples(&self, chunk: &AudioChunk) -> Result<()> {
        let mut guard = self
            .audio
            .lock()
            .map_err(|_| SentryError::Poisoned("audio sidecar"))?;
        let writer = guard
            .as_mut()
            .ok_or_else(|| SentryError::Audio("recording not started".to_string()))?;
        writer.write_all(&chunk.to_le_bytes())?;
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        let audio = self
            .audio
            .lock()
            .map_err(|_| SentryError::Poisoned("audio sidecar"))?
            .take();
        let video = self
            .video
            .lock()
            .map_err(|_| SentryError::Poisoned("video track"))?
            .take();

        let audio_result = match audio {
            Some(mut writer) => writer.flush().map_err(SentryError::from),
            None => Ok(()),
        };

        if let Some(track) = video {
            let frames = track.encoder.frame_count();
            let stats = track
                .muxer
                .finish_with_stats()
                .map_err(|e| SentryError::Device(format!("Failed to finalize recording: {}", e)))?;
            log::info!(
                "Recording closed: {} frames encoded, {} written, {} dropped, {} bytes",
                frames,
                stats.video_frames,
                track.dropped,
                stats.bytes_written
            );
        }

        audio_result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use tempfile::tempdir;

    fn settings(destination: &Path) -> StreamSettings {
        StreamSettings {
            destination: destination.to_string_lossy().into_owned(),
            width: 320,
            height: 240,
            frame_rate: 25,
            video_bitrate: 500_000,
            gop_size: 25,
            sample_rate: 44_100,
            channels: 2,
            audio_bitrate: 192_000,
        }
    }

    #[test]
    fn test_rgb_to_yuv420_size() {
        let frame = RgbImage::from_pixel(64, 48, Rgb([128, 128, 128]));
        assert_eq!(rgb_to_yuv420(&frame).len(), 64 * 48 * 3 / 2);
    }

    #[test]
    fn test_odd_dimensions_rejected() {
        assert!(H264Encoder::new(321, 240).is_err());
    }

    #[test]
    fn test_record_frames_and_audio() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("archive.mp4");
        let sink = Mp4Sink::new();
        sink.start(&settings(&output)).unwrap();

        for i in 0..10u64 {
            let frame = RgbImage::from_pixel(320, 240, Rgb([(i * 20) as u8, 64, 64]));
            sink.submit_video_frame(&frame, (i + 1) * 40_000).unwrap();
        }
        sink.submit_audio_samples(&AudioChunk::new(44_100, 2, vec![1, -1, 2, -2]))
            .unwrap();
        sink.stop().unwrap();

        assert!(std::fs::metadata(&output).unwrap().len() > 0);
        let pcm = std::fs::read(Mp4Sink::audio_path(&output)).unwrap();
        assert_eq!(pcm, vec![1, 0, 255, 255, 2, 0, 254, 255]);
    }

    #[test]
    fn test_submit_before_start_is_frame_error() {
        let sink = Mp4Sink::new();
        let frame = RgbImage::new(320, 240);
        assert!(matches!(
            sink.submit_video_frame(&frame, 0),
            Err(SentryError::Frame(_))
        ));
    }
}
