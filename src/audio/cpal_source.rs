//! cpal microphone line
//!
//! The device callback converts whatever sample format the hardware delivers
//! to i16 and hands the buffer over a bounded channel; the sampling task
//! drains it on its own schedule.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use crossbeam_channel::{Receiver, Sender, TrySendError};

use super::AudioSource;
use crate::errors::{Result, SentryError};

/// Callback buffers held; while full, each new buffer is dropped
const MAX_BUFFERED_CALLBACKS: usize = 256;

pub struct CpalAudioSource {
    stream: Stream,
    receiver: Receiver<Vec<i16>>,
    running: Arc<AtomicBool>,
    dropped: Arc<AtomicU64>,
    reported_dropped: u64,
    sample_rate: u32,
    channels: u16,
}

impl CpalAudioSource {
    /// Open an input device by name, or the default input when `device` is
    /// `None` or "default".
    pub fn open(device: Option<&str>, sample_rate: u32, channels: u16) -> Result<Self> {
        let host = cpal::default_host();
        let device = match device {
            None | Some("") | Some("default") => host
                .default_input_device()
                .ok_or_else(|| SentryError::Audio("No default audio input".to_string()))?,
            Some(name) => host
                .input_devices()
                .map_err(|e| SentryError::Audio(format!("Failed to enumerate devices: {}", e)))?
                .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                .ok_or_else(|| SentryError::Audio(format!("Audio device not found: {}", name)))?,
        };

        let supported = device
            .default_input_config()
            .map_err(|e| SentryError::Audio(format!("No supported input config: {}", e)))?;

        let config = StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let (sender, receiver) = crossbeam_channel::bounded(MAX_BUFFERED_CALLBACKS);
        let running = Arc::new(AtomicBool::new(false));
        let dropped = Arc::new(AtomicU64::new(0));
        let shared = (running.clone(), dropped.clone());

        let stream = match supported.sample_format() {
            SampleFormat::I16 => build_stream::<i16>(&device, &config, sender, shared),
            SampleFormat::U16 => build_stream::<u16>(&device, &config, sender, shared),
            SampleFormat::I32 => build_stream::<i32>(&device, &config, sender, shared),
            SampleFormat::F32 => build_stream::<f32>(&device, &config, sender, shared),
            other => Err(SentryError::Audio(format!(
                "Unsupported sample format {:?}",
                other
            ))),
        }?;

        log::info!(
            "Audio line {} open: {} Hz, {} channel(s), device format {:?}",
            device.name().unwrap_or_else(|_| "<unnamed>".to_string()),
            sample_rate,
            channels,
            supported.sample_format()
        );

        Ok(Self {
            stream,
            receiver,
            running,
            dropped,
            reported_dropped: 0,
            sample_rate,
            channels,
        })
    }

    /// Callback buffers lost because the channel was full
    pub fn dropped_buffers(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Queue one callback buffer without blocking; a full channel loses it.
fn forward_buffer(sender: &Sender<Vec<i16>>, samples: Vec<i16>, dropped: &AtomicU64) {
    match sender.try_send(samples) {
        Ok(()) | Err(TrySendError::Disconnected(_)) => {}
        Err(TrySendError::Full(_)) => {
            dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    sender: Sender<Vec<i16>>,
    (running, dropped): (Arc<AtomicBool>, Arc<AtomicU64>),
) -> Result<Stream>
where
    T: SizedSample,
    i16: FromSample<T>,
{
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                if !running.load(Ordering::Relaxed) {
                    return;
                }
                let samples: Vec<i16> = data.iter().map(|s| s.to_sample::<i16>()).collect();
                forward_buffer(&sender, samples, &dropped);
            },
            |err| log::error!("Audio stream error: {}", err),
            None,
        )
        .map_err(|e| SentryError::Audio(format!("Failed to build stream: {}", e)))
}

impl AudioSource for CpalAudioSource {
    fn start(&mut self) -> Result<()> {
        if self.running.load(Ordering::Relaxed) {
            return Ok(());
        }
        self.stream
            .play()
            .map_err(|e| SentryError::Audio(format!("Failed to start stream: {}", e)))?;
        self.running.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn read_available(&mut self) -> Result<Vec<i16>> {
        let mut samples = Vec::new();
        for buffer in self.receiver.try_iter() {
            samples.extend_from_slice(&buffer);
        }

        let dropped = self.dropped_buffers();
        if dropped > self.reported_dropped {
            log::warn!(
                "Audio reader fell behind: {} callback buffer(s) dropped ({} total)",
                dropped - self.reported_dropped,
                dropped
            );
            self.reported_dropped = dropped;
        }
        Ok(samples)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn stop(&mut self) -> Result<()> {
        if !self.running.load(Ordering::Relaxed) {
            return Ok(());
        }
        self.stream
            .pause()
            .map_err(|e| SentryError::Audio(format!("Failed to stop stream: {}", e)))?;
        self.running.store(false, Ordering::Relaxed);
        Ok(())
    }
}

impl Drop for CpalAudioSource {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
