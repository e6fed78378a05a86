//! Raspberry Pi GPIO driver via rppal
//!
//! Pins are BCM numbers. rppal maps them onto the right gpiochip lines, so
//! kernels with an offset line base need no special handling.

use rppal::gpio::{Gpio, OutputPin};

use super::actuator::{ActuatorDriver, Axis};
use crate::errors::{Result, SentryError};

/// One output pin for pan, one for tilt
pub struct RppalGpioDriver {
    horizontal: OutputPin,
    vertical: OutputPin,
}

impl RppalGpioDriver {
    /// Claim both BCM pins as outputs driven low.
    pub fn open(horizontal_pin: u32, vertical_pin: u32) -> Result<Self> {
        let (horizontal_pin, vertical_pin) = check_pins(horizontal_pin, vertical_pin)?;

        let gpio = Gpio::new()
            .map_err(|e| SentryError::Device(format!("GPIO unavailable: {}", e)))?;
        let claim = |pin: u8| -> Result<OutputPin> {
            gpio.get(pin)
                .map(|p| p.into_output_low())
                .map_err(|e| SentryError::Device(format!("Failed to claim GPIO {}: {}", pin, e)))
        };

        let driver = Self {
            horizontal: claim(horizontal_pin)?,
            vertical: claim(vertical_pin)?,
        };
        log::info!(
            "Servo lines ready: pan on BCM {}, tilt on BCM {}",
            horizontal_pin,
            vertical_pin
        );
        Ok(driver)
    }

    fn pin(&mut self, axis: Axis) -> &mut OutputPin {
        match axis {
            Axis::Horizontal => &mut self.horizontal,
            Axis::Vertical => &mut self.vertical,
        }
    }
}

impl ActuatorDriver for RppalGpioDriver {
    fn set_high(&mut self, axis: Axis) -> Result<()> {
        self.pin(axis).set_high();
        Ok(())
    }

    fn set_low(&mut self, axis: Axis) -> Result<()> {
        self.pin(axis).set_low();
        Ok(())
    }
}

/// Distinct pins that fit the BCM range
fn check_pins(horizontal: u32, vertical: u32) -> Result<(u8, u8)> {
    if horizontal == vertical {
        return Err(SentryError::Configuration(format!(
            "Both axes wired to GPIO {}",
            horizontal
        )));
    }
    let narrow = |pin: u32| {
        u8::try_from(pin)
            .map_err(|_| SentryError::Configuration(format!("GPIO {} is not a BCM pin", pin)))
    };
    Ok((narrow(horizontal)?, narrow(vertical)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_pin_rejected() {
        let err = check_pins(18, 18).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_pin_out_of_range_rejected() {
        assert!(matches!(
            check_pins(18, 300),
            Err(SentryError::Configuration(_))
        ));
        assert_eq!(check_pins(18, 17).unwrap(), (18, 17));
    }

    #[test]
    fn test_open_off_pi_is_device_error() {
        // On a Pi the pins are claimed; anywhere else GPIO is unavailable
        match RppalGpioDriver::open(18, 17) {
            Ok(mut driver) => {
                assert!(driver.set_high(Axis::Horizontal).is_ok());
                assert!(driver.set_low(Axis::Horizontal).is_ok());
            }
            Err(e) => assert!(matches!(e, SentryError::Device(_))),
        }
    }
}
