//! Two-axis servo gimbal
//!
//! - `actuator`: timed pulse trains over an [`ActuatorDriver`]
//! - `controller`: directional moves and per-axis position state
//! - `rpi`: Raspberry Pi GPIO driver (feature `gpio`)

mod actuator;
mod controller;
#[cfg(feature = "gpio")]
pub mod rpi;

pub use actuator::{ActuatorDriver, Axis, PulseActuator, PulseWidth};
pub use controller::{
    GimbalAction, GimbalController, HorizontalPosition, PulseCalibration, VerticalPosition,
};
#[cfg(feature = "gpio")]
pub use rpi::RppalGpioDriver;
