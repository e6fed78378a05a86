//! Test doubles for every collaborator seam
//!
//! Lets the whole capture loop run offline: scripted frames and detections,
//! an in-memory recorder, a pin logger instead of GPIO and counting
//! notification endpoints.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use image::{GrayImage, RgbImage};

use crate::audio::{AudioChunk, AudioSource};
use crate::capture::FrameSource;
use crate::detect::FaceDetector;
use crate::errors::{Result, SentryError};
use crate::gimbal::{ActuatorDriver, Axis};
use crate::notify::{Mail, MailSender, RecordingNotifier};
use crate::recording::{RecordingSink, StreamSettings};
use crate::tracking::FaceBox;

/// Gradient frame that changes with `frame_number`
pub fn synthetic_frame(frame_number: u64, width: u32, height: u32) -> RgbImage {
    let base = (frame_number % 256) as u8;
    RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([
            base.wrapping_add((x % 256) as u8),
            base.wrapping_add((y % 256) as u8),
            base.wrapping_add(((x + y) % 256) as u8),
        ])
    })
}

/// One pin transition seen by [`LoggingDriver`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinEvent {
    High(Axis),
    Low(Axis),
}

/// Actuator driver that records transitions instead of touching pins
#[derive(Debug, Default)]
pub struct LoggingDriver {
    events: Vec<PinEvent>,
}

impl LoggingDriver {
    pub fn events(&self) -> &[PinEvent] {
        &self.events
    }

    /// Completed high/low cycles on `axis`
    pub fn cycles(&self, axis: Axis) -> usize {
        self.events
            .iter()
            .filter(|e| **e == PinEvent::Low(axis))
            .count()
    }
}

impl ActuatorDriver for LoggingDriver {
    fn set_high(&mut self, axis: Axis) -> Result<()> {
        self.events.push(PinEvent::High(axis));
        Ok(())
    }

    fn set_low(&mut self, axis: Axis) -> Result<()> {
        self.events.push(PinEvent::Low(axis));
        Ok(())
    }
}

/// Lifecycle calls observed on a [`ScriptedFrameSource`]
#[derive(Debug, Default)]
pub struct SourceCalls {
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
    pub frames: AtomicUsize,
}

/// Frame source replaying a fixed script, then ending
pub struct ScriptedFrameSource {
    script: VecDeque<Result<RgbImage>>,
    frame_interval: Duration,
    failing_starts: usize,
    calls: Arc<SourceCalls>,
}

impl ScriptedFrameSource {
    pub fn new(frames: impl IntoIterator<Item = RgbImage>) -> Self {
        Self::from_results(frames.into_iter().map(Ok))
    }

    /// Script that may contain read failures
    pub fn from_results(script: impl IntoIterator<Item = Result<RgbImage>>) -> Self {
        Self {
            script: script.into_iter().collect(),
            frame_interval: Duration::ZERO,
            failing_starts: 0,
            calls: Arc::new(SourceCalls::default()),
        }
    }

    /// `count` synthetic frames of the given size
    pub fn synthetic(count: u64, width: u32, height: u32) -> Self {
        Self::new((0..count).map(|n| synthetic_frame(n, width, height)))
    }

    /// Sleep this long before handing out each frame, like a real camera
    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    /// Fail the first `n` start calls
    pub fn with_failing_starts(mut self, n: usize) -> Self {
        self.failing_starts = n;
        self
    }

    pub fn calls(&self) -> Arc<SourceCalls> {
        self.calls.clone()
    }
}

impl FrameSource for ScriptedFrameSource {
    fn start(&mut self) -> Result<()> {
        let n = self.calls.starts.fetch_add(1, Ordering::SeqCst);
        if n < self.failing_starts {
            return Err(SentryError::Device(format!("scripted start failure {}", n + 1)));
        }
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        if !self.frame_interval.is_zero() {
            std::thread::sleep(self.frame_interval);
        }
        match self.script.pop_front() {
            Some(frame) => {
                self.calls.frames.fetch_add(1, Ordering::SeqCst);
                frame.map(Some)
            }
            None => Ok(None),
        }
    }

    fn stop(&mut self) -> Result<()> {
        self.calls.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Detector answering from a per-frame script, then finding nothing
#[derive(Default)]
pub struct ScriptedDetector {
    script: VecDeque<Result<Vec<FaceBox>>>,
    calls: usize,
}

impl ScriptedDetector {
    pub fn new(script: impl IntoIterator<Item = Vec<FaceBox>>) -> Self {
        Self::from_results(script.into_iter().map(Ok))
    }

    pub fn from_results(script: impl IntoIterator<Item = Result<Vec<FaceBox>>>) -> Self {
        Self {
            script: script.into_iter().collect(),
            calls: 0,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls
    }
}

impl FaceDetector for ScriptedDetector {
    fn detect(&mut self, _gray: &GrayImage) -> Result<Vec<FaceBox>> {
        self.calls += 1;
        self.script.pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }
}

/// Recorder keeping everything in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    starts: Mutex<Vec<StreamSettings>>,
    video: Mutex<Vec<(u64, RgbImage)>>,
    audio: Mutex<Vec<AudioChunk>>,
    stops: AtomicUsize,
    failing_starts: AtomicUsize,
    fail_stop: bool,
}

impl MemorySink {
    /// Fail the first `n` start calls
    pub fn with_failing_starts(n: usize) -> Self {
        Self {
            failing_starts: AtomicUsize::new(n),
            ..Self::default()
        }
    }

    /// Every stop call fails
    pub fn with_failing_stop() -> Self {
        Self {
            fail_stop: true,
            ..Self::default()
        }
    }

    pub fn start_calls(&self) -> Vec<StreamSettings> {
        self.starts.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Presentation timestamps of submitted frames
    pub fn video_pts(&self) -> Vec<u64> {
        self.video
            .lock()
            .map(|v| v.iter().map(|(pts, _)| *pts).collect())
            .unwrap_or_default()
    }

    pub fn video_frames(&self) -> Vec<RgbImage> {
        self.video
            .lock()
            .map(|v| v.iter().map(|(_, f)| f.clone()).collect())
            .unwrap_or_default()
    }

    pub fn audio_chunks(&self) -> Vec<AudioChunk> {
        self.audio.lock().map(|a| a.clone()).unwrap_or_default()
    }

    pub fn stop_calls(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl RecordingSink for MemorySink {
    fn start(&self, settings: &StreamSettings) -> Result<()> {
        self.starts
            .lock()
            .map_err(|_| SentryError::Poisoned("sink starts"))?
            .push(settings.clone());
        let remaining = self.failing_starts.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_starts.store(remaining - 1, Ordering::SeqCst);
            return Err(SentryError::Device("scripted recorder failure".to_string()));
        }
        Ok(())
    }

    fn submit_video_frame(&self, frame: &RgbImage, pts_us: u64) -> Result<()> {
        self.video
            .lock()
            .map_err(|_| SentryError::Poisoned("sink video"))?
            .push((pts_us, frame.clone()));
        Ok(())
    }

    fn submit_audio_samples(&self, chunk: &AudioChunk) -> Result<()> {
        self.audio
            .lock()
            .map_err(|_| SentryError::Poisoned("sink audio"))?
            .push(chunk.clone());
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        if self.fail_stop {
            return Err(SentryError::Device("scripted stop failure".to_string()));
        }
        Ok(())
    }
}

/// Remote endpoint double counting calls and their times
#[derive(Debug, Default)]
pub struct CountingNotifier {
    locator: Option<String>,
    delay: Duration,
    start_calls: Mutex<Vec<Instant>>,
    stop_calls: Mutex<Vec<Instant>>,
}

impl CountingNotifier {
    pub fn with_locator(locator: &str) -> Self {
        Self {
            locator: Some(locator.to_string()),
            ..Self::default()
        }
    }

    /// Every call fails
    pub fn failing() -> Self {
        Self::default()
    }

    /// Hold every call for `delay` before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn starts(&self) -> usize {
        self.start_calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn stops(&self) -> usize {
        self.stop_calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn start_times(&self) -> Vec<Instant> {
        self.start_calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn stop_times(&self) -> Vec<Instant> {
        self.stop_calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    async fn answer(&self, calls: &Mutex<Vec<Instant>>) -> Result<String> {
        calls
            .lock()
            .map_err(|_| SentryError::Poisoned("notifier calls"))?
            .push(Instant::now());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.locator
            .clone()
            .ok_or_else(|| SentryError::Notification("endpoint unavailable".to_string()))
    }
}

#[async_trait]
impl RecordingNotifier for CountingNotifier {
    async fn notify_start(&self) -> Result<String> {
        self.answer(&self.start_calls).await
    }

    async fn notify_stop(&self) -> Result<String> {
        self.answer(&self.stop_calls).await
    }
}

/// Mail sender keeping every mail it is given
#[derive(Debug, Default)]
pub struct CapturingMailer {
    sent: Mutex<Vec<Mail>>,
}

impl CapturingMailer {
    pub fn sent(&self) -> Vec<Mail> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl MailSender for CapturingMailer {
    async fn send(&self, mail: Mail) -> Result<()> {
        self.sent
            .lock()
            .map_err(|_| SentryError::Poisoned("mailer"))?
            .push(mail);
        Ok(())
    }
}

/// Audio line replaying fixed reads, then returning silence
pub struct VecAudioSource {
    reads: VecDeque<Vec<i16>>,
    sample_rate: u32,
    channels: u16,
    running: bool,
}

impl VecAudioSource {
    pub fn new(sample_rate: u32, channels: u16, reads: Vec<Vec<i16>>) -> Self {
        Self {
            reads: reads.into(),
            sample_rate,
            channels,
            running: false,
        }
    }
}

impl AudioSource for VecAudioSource {
    fn start(&mut self) -> Result<()> {
        self.running = true;
        Ok(())
    }

    fn read_available(&mut self) -> Result<Vec<i16>> {
        if !self.running {
            return Err(SentryError::Audio("line not started".to_string()));
        }
        Ok(self.reads.pop_front().unwrap_or_default())
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn stop(&mut self) -> Result<()> {
        self.running = false;
        Ok(())
    }
}
