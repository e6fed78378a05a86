//! Timing utilities for presentation timestamps and servo pulses
//!
//! `PTSClock` is the single monotonic timebase the capture loop stamps frames
//! against. `spin_for` is the busy-wait used for sub-millisecond pulse widths.

use std::sync::Arc;
use std::time::{Duration, Instant};

/// Monotonic clock for presentation timestamps
///
/// All frame timestamps derive from this single source
/// to ensure monotonic ordering.
#[derive(Debug, Clone)]
pub struct PTSClock {
    start: Arc<Instant>,
}

impl PTSClock {
    /// Create a new PTS clock with the current instant as time zero
    pub fn new() -> Self {
        Self {
            start: Arc::new(Instant::now()),
        }
    }

    /// Create a PTS clock from an existing start instant
    ///
    /// Use this to share the same timebase between components.
    pub fn from_instant(start: Instant) -> Self {
        Self {
            start: Arc::new(start),
        }
    }

    /// Milliseconds elapsed since clock creation
    #[inline]
    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    /// Microseconds elapsed since clock creation
    #[inline]
    pub fn elapsed_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }

    /// Get the start instant for sharing with other components
    pub fn start_instant(&self) -> Instant {
        *self.start
    }
}

impl Default for PTSClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Busy-wait on the monotonic clock for `duration`.
///
/// OS sleep granularity is too coarse for servo PWM, so this never yields.
#[inline]
pub fn spin_for(duration: Duration) {
    let start = Instant::now();
    while start.elapsed() < duration {
        std::hint::spin_loop();
    }
}
