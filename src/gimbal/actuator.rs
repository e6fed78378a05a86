//! Servo pulse generation
//!
//! A servo here has no position feedback. Each call emits a fixed number of
//! high/low cycles whose duty cycle nudges the horn by one calibrated step.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::Result;
use crate::timing::spin_for;

/// Logical gimbal axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    /// Pan
    Horizontal,
    /// Tilt
    Vertical,
}

/// Pin-level output for each axis.
///
/// Implementations toggle one physical line per axis. The driver is owned
/// by exactly one [`PulseActuator`].
pub trait ActuatorDriver: Send {
    fn set_high(&mut self, axis: Axis) -> Result<()>;
    fn set_low(&mut self, axis: Axis) -> Result<()>;
}

impl<D: ActuatorDriver + ?Sized> ActuatorDriver for Box<D> {
    fn set_high(&mut self, axis: Axis) -> Result<()> {
        (**self).set_high(axis)
    }

    fn set_low(&mut self, axis: Axis) -> Result<()> {
        (**self).set_low(axis)
    }
}

/// High and low time of one PWM cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PulseWidth {
    pub high_ns: u64,
    pub low_ns: u64,
}

impl PulseWidth {
    pub const fn new(high_ns: u64, low_ns: u64) -> Self {
        Self { high_ns, low_ns }
    }

    pub fn high(&self) -> Duration {
        Duration::from_nanos(self.high_ns)
    }

    pub fn low(&self) -> Duration {
        Duration::from_nanos(self.low_ns)
    }
}

/// Generates pulse trains on an exclusively owned driver.
///
/// Taking `&mut self` for every train means two trains can never overlap.
pub struct PulseActuator<D: ActuatorDriver> {
    driver: D,
    trains: u64,
}

impl<D: ActuatorDriver> PulseActuator<D> {
    pub fn new(driver: D) -> Self {
        Self { driver, trains: 0 }
    }

    /// Drive `count` high/low cycles on `axis`, busy-waiting each phase.
    ///
    /// A driver failure aborts the train, forces the line low and is logged.
    /// Returns whether every cycle was driven.
    pub fn pulse(&mut self, axis: Axis, high: Duration, low: Duration, count: u32) -> bool {
        log::debug!(
            "Pulse train on {:?}: {} x ({:?} high, {:?} low)",
            axis,
            count,
            high,
            low
        );

        for cycle in 0..count {
            if let Err(e) = self.driver.set_high(axis) {
                log::error!("Pulse {} on {:?} failed going high: {}", cycle, axis, e);
                if let Err(e) = self.driver.set_low(axis) {
                    log::error!("Could not force {:?} low after failure: {}", axis, e);
                }
                return false;
            }
            spin_for(high);

            if let Err(e) = self.driver.set_low(axis) {
                log::error!("Pulse {} on {:?} failed going low: {}", cycle, axis, e);
                return false;
            }
            spin_for(low);
        }

        self.trains += 1;
        true
    }

    /// Pulse with a calibrated width
    pub fn pulse_width(&mut self, axis: Axis, width: PulseWidth, count: u32) -> bool {
        self.pulse(axis, width.high(), width.low(), count)
    }

    /// Completed pulse trains so far
    pub fn trains(&self) -> u64 {
        self.trains
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn into_driver(self) -> D {
        self.driver
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SentryError;
    use crate::testing::{LoggingDriver, PinEvent};
    use std::time::Instant;

    #[test]
    fn test_pulse_emits_alternating_levels() {
        let mut actuator = PulseActuator::new(LoggingDriver::default());
        assert!(actuator.pulse(
            Axis::Horizontal,
            Duration::from_micros(1),
            Duration::from_micros(1),
            3
        ));

        let events = actuator.driver().events();
        assert_eq!(events.len(), 6);
        for pair in events.chunks(2) {
            assert_eq!(pair[0], PinEvent::High(Axis::Horizontal));
            assert_eq!(pair[1], PinEvent::Low(Axis::Horizontal));
        }
        assert_eq!(actuator.trains(), 1);
    }

    #[test]
    fn test_pulse_holds_each_phase() {
        let mut actuator = PulseActuator::new(LoggingDriver::default());
        let start = Instant::now();
        actuator.pulse_width(Axis::Vertical, PulseWidth::new(200_000, 300_000), 4);
        assert!(start.elapsed() >= Duration::from_millis(2));
    }

    struct FailingDriver {
        highs: u32,
        lows: u32,
    }

    impl ActuatorDriver for FailingDriver {
        fn set_high(&mut self, _axis: Axis) -> Result<()> {
            self.highs += 1;
            if self.highs == 2 {
                return Err(SentryError::Device("line busy".into()));
            }
            Ok(())
        }

        fn set_low(&mut self, _axis: Axis) -> Result<()> {
            self.lows += 1;
            Ok(())
        }
    }

    #[test]
    fn test_driver_failure_aborts_train_low() {
        let mut actuator = PulseActuator::new(FailingDriver { highs: 0, lows: 0 });
        assert!(!actuator.pulse(Axis::Horizontal, Duration::ZERO, Duration::ZERO, 20));

        let driver = actuator.driver();
        assert_eq!(driver.highs, 2);
        assert_eq!(driver.lows, 2, "line must be left low");
        assert_eq!(actuator.trains(), 0);
    }
}
