//! The capture, track and record loop
//!
//! # Per frame
//! 1. pull a frame and stamp it against the loop clock
//! 2. detect faces on an equalised grayscale copy
//! 3. turn the faces into gimbal moves
//! 4. feed the face count to the recording state machine and dispatch its
//!    side effects
//! 5. watermark the frame
//! 6. hand it to the recording sink
//! 7. push the raw frame to the preview, if any
//!
//! Audio is sampled on its own thread straight into the same sink.
//! Notifications run on the tokio pool; nothing here awaits them.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Local;
use image::RgbImage;

use crate::audio::{AudioSource, AudioTask, AudioTaskStats};
use crate::capture::{fit_frame, write_jpeg, FrameSample, FrameSource, PreviewSink};
use crate::config::SentryConfig;
use crate::detect::{equalized_grayscale, FaceDetector};
use crate::errors::Result;
use crate::gimbal::{ActuatorDriver, GimbalController};
use crate::notify::NotificationPool;
use crate::overlay::{draw_face_box, Watermark, FACE_BOX_COLOR, FACE_BOX_THICKNESS};
use crate::recording::{
    RecordingSink, RecordingStateMachine, SessionSnapshot, StreamSettings, Transition,
};
use crate::timing::PTSClock;
use crate::tracking::TrackingPolicy;

/// Cooperative stop signal checked once per frame
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle(Arc<AtomicBool>);

impl ShutdownHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Why the loop returned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopEnd {
    #[default]
    SourceEnded,
    Shutdown,
    /// Too many consecutive frame read failures
    FrameErrors,
}

/// What one run of the loop did
#[derive(Debug, Clone, Default)]
pub struct LoopStats {
    pub frames: u64,
    pub frame_errors: u64,
    pub detection_errors: u64,
    pub submit_errors: u64,
    /// Pulse trains issued by tracking and recentering
    pub gimbal_moves: u64,
    pub sessions_started: u64,
    pub sessions_stopped: u64,
    /// Most recent finished session
    pub last_stop: Option<SessionSnapshot>,
    /// Source or sink never came up, even after a retry
    pub degraded: bool,
    pub audio: Option<AudioTaskStats>,
    pub ended_by: LoopEnd,
}

type AudioSpawner = Box<dyn FnOnce(Arc<dyn RecordingSink>) -> Result<AudioTask> + Send>;

pub struct CaptureOrchestrator<S: FrameSource, D: FaceDetector, A: ActuatorDriver> {
    config: SentryConfig,
    source: S,
    detector: D,
    gimbal: GimbalController<A>,
    policy: TrackingPolicy,
    recording: RecordingStateMachine,
    sink: Arc<dyn RecordingSink>,
    notifications: Arc<NotificationPool>,
    preview: Option<Box<dyn PreviewSink>>,
    audio: Option<AudioSpawner>,
    watermark: Option<Watermark>,
    shutdown: ShutdownHandle,
}

impl<S: FrameSource, D: FaceDetector, A: ActuatorDriver> CaptureOrchestrator<S, D, A> {
    pub fn new(
        config: SentryConfig,
        source: S,
        detector: D,
        gimbal: GimbalController<A>,
        sink: Arc<dyn RecordingSink>,
        notifications: Arc<NotificationPool>,
    ) -> Self {
        let policy = TrackingPolicy::new(config.tracking.dead_zone, config.tracking.center);
        let recording = RecordingStateMachine::new(config.recording.quiet_timeout_ms);
        let watermark = config
            .overlay
            .timestamp
            .then(|| Watermark::from_config(&config.overlay));

        Self {
            config,
            source,
            detector,
            gimbal,
            policy,
            recording,
            sink,
            notifications,
            preview: None,
            audio: None,
            watermark,
            shutdown: ShutdownHandle::new(),
        }
    }

    pub fn with_preview(mut self, preview: Box<dyn PreviewSink>) -> Self {
        self.preview = Some(preview);
        self
    }

    /// Sample audio from the source `open` creates, at the configured cadence.
    pub fn with_audio_source<T, F>(mut self, open: F) -> Self
    where
        T: AudioSource,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let interval = self.config.camera.audio_interval();
        self.audio = Some(Box::new(move |sink: Arc<dyn RecordingSink>| {
            AudioTask::spawn(open, sink, interval)
        }));
        self
    }

    pub fn with_shutdown(mut self, shutdown: ShutdownHandle) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Run until the source ends, shutdown is triggered or reads keep failing.
    pub fn run(mut self) -> LoopStats {
        let mut stats = LoopStats::default();
        let clock = PTSClock::new();

        self.start_source(&mut stats);
        self.start_sink(&mut stats);

        let audio = self.audio.take().and_then(|spawn| match spawn(self.sink.clone()) {
            Ok(task) => Some(task),
            Err(e) => {
                log::error!("Audio sampling not started: {}", e);
                None
            }
        });

        let max_errors = u64::from(self.config.camera.max_consecutive_frame_errors.max(1));
        let mut consecutive_errors = 0u64;
        let (width, height) = (self.config.camera.width, self.config.camera.height);
        let mut size_warned = false;

        stats.ended_by = loop {
            if self.shutdown.is_triggered() {
                break LoopEnd::Shutdown;
            }

            let image = match self.source.next_frame() {
                Ok(Some(image)) => {
                    consecutive_errors = 0;
                    image
                }
                Ok(None) => break LoopEnd::SourceEnded,
                Err(e) => {
                    stats.frame_errors += 1;
                    consecutive_errors += 1;
                    log::warn!("Frame read failed ({} in a row): {}", consecutive_errors, e);
                    if consecutive_errors >= max_errors {
                        log::error!(
                            "Giving up on the frame source after {} failures",
                            consecutive_errors
                        );
                        break LoopEnd::FrameErrors;
                    }
                    continue;
                }
            };

            if image.dimensions() != (width, height) && !size_warned {
                log::warn!(
                    "Source delivers {}x{}, scaling to configured {}x{}",
                    image.width(),
                    image.height(),
                    width,
                    height
                );
                size_warned = true;
            }

            let pts_us = clock.elapsed_us();
            self.process(
                FrameSample {
                    image: fit_frame(image, width, height),
                    captured_at_ms: pts_us / 1_000,
                    pts_us,
                },
                &mut stats,
            );
        };

        log::info!(
            "Capture loop ended ({:?}) after {} frames, {} session(s)",
            stats.ended_by,
            stats.frames,
            stats.sessions_started
        );
        stats.audio = audio.map(AudioTask::cancel);
        self.release();
        stats
    }

    fn process(&mut self, sample: FrameSample, stats: &mut LoopStats) {
        let FrameSample {
            mut image,
            captured_at_ms,
            pts_us,
        } = sample;

        let raw = match &self.preview {
            Some(preview) if preview.is_visible() => Some(image.clone()),
            _ => None,
        };

        let gray = equalized_grayscale(&image);
        match self.detector.detect(&gray) {
            Ok(faces) => {
                if !faces.is_empty() {
                    log::debug!("{} face(s) at {} ms", faces.len(), captured_at_ms);
                }
                if self.config.overlay.draw_faces {
                    for face in &faces {
                        draw_face_box(&mut image, face, FACE_BOX_COLOR, FACE_BOX_THICKNESS);
                    }
                }

                let decision = self.policy.evaluate(&faces);
                stats.gimbal_moves += self.gimbal.apply(decision).len() as u64;

                if let Some(transition) = self.recording.observe(faces.len(), captured_at_ms) {
                    self.dispatch(transition, &image, stats);
                }
            }
            Err(e) => {
                stats.detection_errors += 1;
                log::warn!("Detection failed at {} ms: {}", captured_at_ms, e);
            }
        }

        if let Some(mark) = &self.watermark {
            mark.stamp(&mut image, Local::now());
        }

        if let Err(e) = self.sink.submit_video_frame(&image, pts_us) {
            stats.submit_errors += 1;
            log::warn!("Frame at {} us not recorded: {}", pts_us, e);
        }

        if let (Some(preview), Some(raw)) = (self.preview.as_mut(), raw) {
            if let Err(e) = preview.show(&raw) {
                log::warn!("Preview update failed: {}", e);
            }
        }

        stats.frames += 1;
    }

    fn dispatch(&mut self, transition: Transition, frame: &RgbImage, stats: &mut LoopStats) {
        match transition {
            Transition::Started(session) => {
                stats.sessions_started += 1;
                let still = self.capture_still(frame);
                self.notifications.spawn_start(session, still);
            }
            Transition::Stopped(session) => {
                stats.sessions_stopped += 1;
                stats.last_stop = Some(session);
                self.notifications.spawn_stop(session);
                stats.gimbal_moves += self.gimbal.recenter().len() as u64;
            }
        }
    }

    fn capture_still(&self, frame: &RgbImage) -> Option<PathBuf> {
        let path = &self.config.recording.screenshot_path;
        match write_jpeg(frame, path) {
            Ok(()) => Some(path.clone()),
            Err(e) => {
                log::warn!("Still not saved: {}", e);
                None
            }
        }
    }

    fn start_source(&mut self, stats: &mut LoopStats) {
        if let Err(e) = self.source.start() {
            log::warn!("Frame source failed to start, restarting: {}", e);
            if let Err(e) = self.source.restart() {
                log::error!("Frame source restart failed, continuing degraded: {}", e);
                stats.degraded = true;
            }
        }
    }

    fn start_sink(&mut self, stats: &mut LoopStats) {
        let settings = StreamSettings::from_config(&self.config);
        if let Err(e) = self.sink.start(&settings) {
            log::warn!("Recorder failed to start, retrying: {}", e);
            if let Err(e) = self.sink.stop() {
                log::debug!("Recorder stop before retry: {}", e);
            }
            if let Err(e) = self.sink.start(&settings) {
                log::error!("Recorder retry failed, continuing degraded: {}", e);
                stats.degraded = true;
            }
        }
    }

    /// Best effort: every resource is released even if another fails.
    fn release(&mut self) {
        if let Some(preview) = self.preview.as_mut() {
            if let Err(e) = preview.release() {
                log::error!("Failed to release preview: {}", e);
            }
        }
        if let Err(e) = self.sink.stop() {
            log::error!("Failed to stop recorder: {}", e);
        }
        if let Err(e) = self.source.stop() {
            log::error!("Failed to stop frame source: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gimbal::{PulseActuator, PulseCalibration, PulseWidth};
    use crate::testing::{
        CountingNotifier, LoggingDriver, MemorySink, ScriptedDetector, ScriptedFrameSource,
    };
    use crate::tracking::FaceBox;
    use tempfile::TempDir;
    use tokio::runtime::Runtime;

    fn quick_gimbal() -> GimbalController<LoggingDriver> {
        let w = PulseWidth::new(1_000, 1_000);
        let calibration = PulseCalibration {
            pulse_count: 1,
            left: w,
            right: w,
            center_horizontal: w,
            up: w,
            down: w,
            center_vertical: w,
        };
        GimbalController::new(PulseActuator::new(LoggingDriver::default()), calibration)
    }

    fn config(dir: &TempDir) -> SentryConfig {
        let mut config = SentryConfig::default();
        config.camera.width = 64;
        config.camera.height = 48;
        config.recording.screenshot_path = dir.path().join("still.jpg");
        config.recording.quiet_timeout_ms = 1_000;
        config.overlay.timestamp = false;
        config
    }

    fn pool(runtime: &Runtime, config: &SentryConfig) -> Arc<NotificationPool> {
        Arc::new(NotificationPool::new(
            runtime.handle().clone(),
            Arc::new(CountingNotifier::with_locator("rtmp://live/cam-1")),
            None,
            config,
        ))
    }

    #[test]
    fn test_every_frame_reaches_sink() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = Runtime::new().unwrap();
        let config = config(&dir);
        let sink = Arc::new(MemorySink::default());

        let stats = CaptureOrchestrator::new(
            config.clone(),
            ScriptedFrameSource::synthetic(5, 64, 48),
            ScriptedDetector::default(),
            quick_gimbal(),
            sink.clone(),
            pool(&runtime, &config),
        )
        .run();

        assert_eq!(stats.frames, 5);
        assert_eq!(stats.ended_by, LoopEnd::SourceEnded);
        let pts = sink.video_pts();
        assert_eq!(pts.len(), 5);
        assert!(pts.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(sink.start_calls().len(), 1);
        assert_eq!(sink.stop_calls(), 1);
    }

    #[test]
    fn test_off_size_frames_are_scaled_before_recording() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = Runtime::new().unwrap();
        let config = config(&dir);
        let sink = Arc::new(MemorySink::default());

        // Device negotiated a different mode than configured
        let stats = CaptureOrchestrator::new(
            config.clone(),
            ScriptedFrameSource::synthetic(3, 32, 24),
            ScriptedDetector::default(),
            quick_gimbal(),
            sink.clone(),
            pool(&runtime, &config),
        )
        .run();

        assert_eq!(stats.submit_errors, 0);
        let frames = sink.video_frames();
        assert_eq!(frames.len(), 3);
        assert!(frames.iter().all(|f| f.dimensions() == (64, 48)));
    }

    #[test]
    fn test_detection_error_still_forwards_frame() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = Runtime::new().unwrap();
        let config = config(&dir);
        let sink = Arc::new(MemorySink::default());
        let detector = ScriptedDetector::from_results(vec![
            Err(crate::errors::SentryError::Frame("bad frame".into())),
            Ok(vec![FaceBox::new(100, 100, 20, 20)]),
        ]);

        let stats = CaptureOrchestrator::new(
            config.clone(),
            ScriptedFrameSource::synthetic(2, 64, 48),
            detector,
            quick_gimbal(),
            sink.clone(),
            pool(&runtime, &config),
        )
        .run();

        assert_eq!(stats.detection_errors, 1);
        assert_eq!(stats.frames, 2);
        assert_eq!(sink.video_pts().len(), 2);
        assert_eq!(stats.sessions_started, 1);
        // Centroid (110, 110) is left of and above the center point
        assert_eq!(stats.gimbal_moves, 2);
        assert!(config.recording.screenshot_path.exists());
    }

    #[test]
    fn test_retries_start_once_then_runs_degraded() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = Runtime::new().unwrap();
        let config = config(&dir);
        let sink = Arc::new(MemorySink::with_failing_starts(2));
        let source = ScriptedFrameSource::synthetic(3, 64, 48).with_failing_starts(1);
        let calls = source.calls();

        let stats = CaptureOrchestrator::new(
            config.clone(),
            source,
            ScriptedDetector::default(),
            quick_gimbal(),
            sink.clone(),
            pool(&runtime, &config),
        )
        .run();

        assert!(stats.degraded);
        assert_eq!(calls.starts.load(Ordering::SeqCst), 2);
        assert_eq!(sink.start_calls().len(), 2);
        assert_eq!(stats.frames, 3);
    }

    #[test]
    fn test_consecutive_read_failures_end_loop() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = Runtime::new().unwrap();
        let mut config = config(&dir);
        config.camera.max_consecutive_frame_errors = 3;
        let script = (0..10).map(|_| Err(crate::errors::SentryError::Frame("usb reset".into())));

        let stats = CaptureOrchestrator::new(
            config.clone(),
            ScriptedFrameSource::from_results(script),
            ScriptedDetector::default(),
            quick_gimbal(),
            Arc::new(MemorySink::default()),
            pool(&runtime, &config),
        )
        .run();

        assert_eq!(stats.ended_by, LoopEnd::FrameErrors);
        assert_eq!(stats.frame_errors, 3);
        assert_eq!(stats.frames, 0);
    }

    #[test]
    fn test_triggered_shutdown_stops_before_first_frame() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = Runtime::new().unwrap();
        let config = config(&dir);
        let shutdown = ShutdownHandle::new();
        let source = ScriptedFrameSource::synthetic(100, 64, 48);
        let calls = source.calls();

        let orchestrator = CaptureOrchestrator::new(
            config.clone(),
            source,
            ScriptedDetector::default(),
            quick_gimbal(),
            Arc::new(MemorySink::with_failing_stop()),
            pool(&runtime, &config),
        )
        .with_shutdown(shutdown.clone());
        shutdown.trigger();
        let stats = orchestrator.run();

        assert_eq!(stats.ended_by, LoopEnd::Shutdown);
        assert_eq!(stats.frames, 0);
        // Source is stopped even though the recorder stop failed
        assert_eq!(calls.stops.load(Ordering::SeqCst), 1);
    }
}
