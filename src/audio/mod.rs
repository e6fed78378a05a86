//! Microphone sampling
//!
//! An [`AudioTask`] owns one [`AudioSource`] on a dedicated thread and, on a
//! fixed-rate schedule, drains whatever PCM the source has buffered into the
//! shared [`RecordingSink`].

#[cfg(feature = "audio")]
mod cpal_source;

#[cfg(feature = "audio")]
pub use cpal_source::CpalAudioSource;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::errors::{Result, SentryError};
use crate::recording::RecordingSink;

/// Interleaved signed 16-bit PCM read in one sampling tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl AudioChunk {
    pub fn new(sample_rate: u32, channels: u16, samples: Vec<i16>) -> Self {
        Self {
            sample_rate,
            channels,
            samples,
        }
    }

    /// Sample frames (one sample per channel) in the chunk
    pub fn frames(&self) -> usize {
        match self.channels {
            0 => 0,
            c => self.samples.len() / usize::from(c),
        }
    }

    /// Playback length of the chunk
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / f64::from(self.sample_rate))
    }

    /// Samples as s16le bytes
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// A capture line producing interleaved i16 samples
pub trait AudioSource {
    fn start(&mut self) -> Result<()>;

    /// Everything buffered since the previous call; never blocks.
    fn read_available(&mut self) -> Result<Vec<i16>>;

    fn sample_rate(&self) -> u32;

    fn channels(&self) -> u16;

    fn stop(&mut self) -> Result<()>;
}

impl<S: AudioSource + ?Sized> AudioSource for Box<S> {
    fn start(&mut self) -> Result<()> {
        (**self).start()
    }

    fn read_available(&mut self) -> Result<Vec<i16>> {
        (**self).read_available()
    }

    fn sample_rate(&self) -> u32 {
        (**self).sample_rate()
    }

    fn channels(&self) -> u16 {
        (**self).channels()
    }

    fn stop(&mut self) -> Result<()> {
        (**self).stop()
    }
}

/// Counters reported when the task is cancelled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AudioTaskStats {
    pub ticks: u64,
    pub chunks: u64,
    pub samples: u64,
    /// Set when a device error ended sampling early
    pub failed: bool,
}

/// Periodic sampling thread.
///
/// The schedule never ends on its own; call [`AudioTask::cancel`] (or drop
/// the task) to stop it. A device error stops the sampling but leaves the
/// thread parked until cancelled, so video recording is unaffected.
pub struct AudioTask {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<AudioTaskStats>>,
}

impl AudioTask {
    /// Spawn the sampling thread.
    ///
    /// `open` runs on the new thread so the source itself need not be `Send`.
    pub fn spawn<S, F>(open: F, sink: Arc<dyn RecordingSink>, interval: Duration) -> Result<Self>
    where
        S: AudioSource,
        F: FnOnce() -> Result<S> + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = stop.clone();
        let interval = interval.max(Duration::from_millis(1));

        let handle = std::thread::Builder::new()
            .name("sentrycam-audio".to_string())
            .spawn(move || run_sampling(open, sink, interval, &thread_stop))
            .map_err(|e| SentryError::Audio(format!("Failed to spawn audio thread: {}", e)))?;

        log::debug!("Audio sampling every {:?}", interval);
        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Stop the schedule and wait for the thread to exit.
    pub fn cancel(mut self) -> AudioTaskStats {
        self.shutdown()
    }

    fn shutdown(&mut self) -> AudioTaskStats {
        self.stop.store(true, Ordering::SeqCst);
        match self.handle.take() {
            Some(handle) => handle.join().unwrap_or_else(|_| {
                log::error!("Audio thread panicked");
                AudioTaskStats {
                    failed: true,
                    ..AudioTaskStats::default()
                }
            }),
            None => AudioTaskStats::default(),
        }
    }
}

impl Drop for AudioTask {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.shutdown();
        }
    }
}

fn run_sampling<S, F>(
    open: F,
    sink: Arc<dyn RecordingSink>,
    interval: Duration,
    stop: &AtomicBool,
) -> AudioTaskStats
where
    S: AudioSource,
    F: FnOnce() -> Result<S>,
{
    let mut stats = AudioTaskStats::default();

    let mut source = match open().and_then(|mut s| s.start().map(|_| s)) {
        Ok(source) => source,
        Err(e) => {
            log::error!("Audio line unavailable, recording video only: {}", e);
            stats.failed = true;
            park_until(stop, interval);
            return stats;
        }
    };

    let mut next_tick = Instant::now() + interval;
    while !stop.load(Ordering::SeqCst) {
        let now = Instant::now();
        if now < next_tick {
            std::thread::sleep(next_tick - now);
            continue;
        }
        // Fixed rate: the next deadline does not drift with read latency
        next_tick += interval;
        if next_tick < now {
            next_tick = now + interval;
        }
        stats.ticks += 1;

        let samples = match source.read_available() {
            Ok(samples) => samples,
            Err(e) => {
                log::error!("Audio read failed, sampling stopped: {}", e);
                stats.failed = true;
                break;
            }
        };
        if samples.is_empty() {
            continue;
        }

        let chunk = AudioChunk::new(source.sample_rate(), source.channels(), samples);
        stats.samples += chunk.samples.len() as u64;
        match sink.submit_audio_samples(&chunk) {
            Ok(()) => stats.chunks += 1,
            Err(e) => log::warn!("Audio chunk rejected by recorder: {}", e),
        }
    }

    if let Err(e) = source.stop() {
        log::warn!("Failed to close audio line: {}", e);
    }
    park_until(stop, interval);
    stats
}

fn park_until(stop: &AtomicBool, interval: Duration) {
    while !stop.load(Ordering::SeqCst) {
        std::thread::sleep(interval.min(Duration::from_millis(50)));
    }
}
