//! Directional gimbal moves with per-axis position state
//!
//! A move toward the side opposite the current position becomes a recenter
//! instead, so the servo never skips the center stop on its way across.

use serde::{Deserialize, Serialize};

use super::actuator::{ActuatorDriver, Axis, PulseActuator, PulseWidth};
use crate::tracking::{Horizontal, TrackingDecision, Vertical};

/// Calibrated pulse widths for every move
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PulseCalibration {
    /// Cycles per move
    pub pulse_count: u32,
    pub left: PulseWidth,
    pub right: PulseWidth,
    pub center_horizontal: PulseWidth,
    pub up: PulseWidth,
    pub down: PulseWidth,
    pub center_vertical: PulseWidth,
}

impl Default for PulseCalibration {
    fn default() -> Self {
        Self {
            pulse_count: 20,
            left: PulseWidth::new(50_000, 1_870_000),
            right: PulseWidth::new(2_100_000, 1_700_000),
            center_horizontal: PulseWidth::new(1_400_000, 1_800_000),
            up: PulseWidth::new(50_000, 1_860_000),
            down: PulseWidth::new(2_100_000, 1_700_000),
            center_vertical: PulseWidth::new(1_400_000, 1_800_000),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HorizontalPosition {
    Left,
    #[default]
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VerticalPosition {
    Up,
    #[default]
    Center,
    Down,
}

/// What a gimbal call attempted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GimbalAction {
    Left,
    Right,
    Up,
    Down,
    RecenterHorizontal,
    RecenterVertical,
}

/// Owns the actuator and the position state of both axes.
///
/// Every operation takes `&mut self`; the controller lives on the capture
/// loop's thread and is never shared.
pub struct GimbalController<D: ActuatorDriver> {
    actuator: PulseActuator<D>,
    calibration: PulseCalibration,
    horizontal: HorizontalPosition,
    vertical: VerticalPosition,
}

impl<D: ActuatorDriver> GimbalController<D> {
    /// Both axes are assumed centered at construction.
    pub fn new(actuator: PulseActuator<D>, calibration: PulseCalibration) -> Self {
        Self {
            actuator,
            calibration,
            horizontal: HorizontalPosition::Center,
            vertical: VerticalPosition::Center,
        }
    }

    pub fn horizontal_position(&self) -> HorizontalPosition {
        self.horizontal
    }

    pub fn vertical_position(&self) -> VerticalPosition {
        self.vertical
    }

    pub fn actuator(&self) -> &PulseActuator<D> {
        &self.actuator
    }

    pub fn move_left(&mut self) -> GimbalAction {
        if self.horizontal == HorizontalPosition::Right {
            return self.recenter_horizontal();
        }
        log::info!("Gimbal turning left");
        if self.drive(Axis::Horizontal, self.calibration.left) {
            self.horizontal = HorizontalPosition::Left;
        }
        GimbalAction::Left
    }

    pub fn move_right(&mut self) -> GimbalAction {
        if self.horizontal == HorizontalPosition::Left {
            return self.recenter_horizontal();
        }
        log::info!("Gimbal turning right");
        if self.drive(Axis::Horizontal, self.calibration.right) {
            self.horizontal = HorizontalPosition::Right;
        }
        GimbalAction::Right
    }

    pub fn move_up(&mut self) -> GimbalAction {
        if self.vertical == VerticalPosition::Down {
            return self.recenter_vertical();
        }
        log::info!("Gimbal tilting up");
        if self.drive(Axis::Vertical, self.calibration.up) {
            self.vertical = VerticalPosition::Up;
        }
        GimbalAction::Up
    }

    pub fn move_down(&mut self) -> GimbalAction {
        if self.vertical == VerticalPosition::Up {
            return self.recenter_vertical();
        }
        log::info!("Gimbal tilting down");
        if self.drive(Axis::Vertical, self.calibration.down) {
            self.vertical = VerticalPosition::Down;
        }
        GimbalAction::Down
    }

    /// Always pulses, whatever the current position.
    pub fn recenter_horizontal(&mut self) -> GimbalAction {
        log::info!("Gimbal recentering pan");
        if self.drive(Axis::Horizontal, self.calibration.center_horizontal) {
            self.horizontal = HorizontalPosition::Center;
        }
        GimbalAction::RecenterHorizontal
    }

    /// Always pulses, whatever the current position.
    pub fn recenter_vertical(&mut self) -> GimbalAction {
        log::info!("Gimbal recentering tilt");
        if self.drive(Axis::Vertical, self.calibration.center_vertical) {
            self.vertical = VerticalPosition::Center;
        }
        GimbalAction::RecenterVertical
    }

    /// Recenter both axes
    pub fn recenter(&mut self) -> [GimbalAction; 2] {
        [self.recenter_horizontal(), self.recenter_vertical()]
    }

    /// Execute a tracking decision, horizontal axis first.
    pub fn apply(&mut self, decision: TrackingDecision) -> Vec<GimbalAction> {
        let mut actions = Vec::with_capacity(decision.command_count());
        match decision.horizontal {
            Some(Horizontal::Left) => actions.push(self.move_left()),
            Some(Horizontal::Right) => actions.push(self.move_right()),
            None => {}
        }
        match decision.vertical {
            Some(Vertical::Up) => actions.push(self.move_up()),
            Some(Vertical::Down) => actions.push(self.move_down()),
            None => {}
        }
        actions
    }

    /// Position state may only follow a completed train.
    fn drive(&mut self, axis: Axis, width: PulseWidth) -> bool {
        let done = self
            .actuator
            .pulse_width(axis, width, self.calibration.pulse_count);
        if !done {
            log::warn!("{:?} pulse train incomplete, position unchanged", axis);
        }
        done
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{LoggingDriver, PinEvent};

    fn fast_calibration() -> PulseCalibration {
        let w = PulseWidth::new(1_000, 1_000);
        PulseCalibration {
            pulse_count: 2,
            left: w,
            right: w,
            center_horizontal: w,
            up: w,
            down: w,
            center_vertical: w,
        }
    }

    fn controller() -> GimbalController<LoggingDriver> {
        GimbalController::new(PulseActuator::new(LoggingDriver::default()), fast_calibration())
    }

    #[test]
    fn test_default_calibration_matches_servo_steps() {
        let cal = PulseCalibration::default();
        assert_eq!(cal.pulse_count, 20);
        assert_eq!(cal.left, PulseWidth::new(50_000, 1_870_000));
        assert_eq!(cal.center_horizontal, PulseWidth::new(1_400_000, 1_800_000));
        assert_eq!(cal.up, PulseWidth::new(50_000, 1_860_000));
    }

    #[test]
    fn test_move_from_center_sets_state() {
        let mut gimbal = controller();
        assert_eq!(gimbal.move_left(), GimbalAction::Left);
        assert_eq!(gimbal.horizontal_position(), HorizontalPosition::Left);
        assert_eq!(gimbal.move_left(), GimbalAction::Left);
        assert_eq!(gimbal.horizontal_position(), HorizontalPosition::Left);
    }

    #[test]
    fn test_opposite_move_recenters_first() {
        let mut gimbal = controller();
        gimbal.move_left();
        assert_eq!(gimbal.move_right(), GimbalAction::RecenterHorizontal);
        assert_eq!(gimbal.horizontal_position(), HorizontalPosition::Center);
        assert_eq!(gimbal.move_right(), GimbalAction::Right);

        assert_eq!(gimbal.move_left(), GimbalAction::RecenterHorizontal);
        assert_eq!(gimbal.horizontal_position(), HorizontalPosition::Center);
    }

    #[test]
    fn test_vertical_axis_is_symmetric() {
        let mut gimbal = controller();
        assert_eq!(gimbal.move_up(), GimbalAction::Up);
        assert_eq!(gimbal.move_down(), GimbalAction::RecenterVertical);
        assert_eq!(gimbal.vertical_position(), VerticalPosition::Center);
        assert_eq!(gimbal.move_down(), GimbalAction::Down);
        assert_eq!(gimbal.move_up(), GimbalAction::RecenterVertical);
    }

    #[test]
    fn test_recenter_from_center_still_pulses() {
        let mut gimbal = controller();
        gimbal.recenter_horizontal();
        assert_eq!(gimbal.actuator().driver().events().len(), 4);
        assert_eq!(gimbal.horizontal_position(), HorizontalPosition::Center);
    }

    #[test]
    fn test_apply_drives_horizontal_then_vertical() {
        let mut gimbal = controller();
        let actions = gimbal.apply(TrackingDecision {
            horizontal: Some(Horizontal::Right),
            vertical: Some(Vertical::Up),
        });
        assert_eq!(actions, vec![GimbalAction::Right, GimbalAction::Up]);

        let events = gimbal.actuator().driver().events();
        assert_eq!(events.first(), Some(&PinEvent::High(Axis::Horizontal)));
        assert_eq!(events.last(), Some(&PinEvent::Low(Axis::Vertical)));
        assert_eq!(gimbal.actuator().trains(), 2);
    }

    struct DeadDriver;

    impl ActuatorDriver for DeadDriver {
        fn set_high(&mut self, _axis: Axis) -> crate::errors::Result<()> {
            Err(crate::errors::SentryError::Device("line not exported".into()))
        }

        fn set_low(&mut self, _axis: Axis) -> crate::errors::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_failed_train_keeps_position() {
        let mut gimbal = GimbalController::new(PulseActuator::new(DeadDriver), fast_calibration());

        assert_eq!(gimbal.move_left(), GimbalAction::Left);
        assert_eq!(gimbal.horizontal_position(), HorizontalPosition::Center);
        assert_eq!(gimbal.move_down(), GimbalAction::Down);
        assert_eq!(gimbal.vertical_position(), VerticalPosition::Center);
        assert_eq!(gimbal.actuator().trains(), 0);

        // Still centered, so a right move is a raw pulse rather than a recenter
        assert_eq!(gimbal.move_right(), GimbalAction::Right);
    }

    #[test]
    fn test_failed_recenter_keeps_side() {
        let mut gimbal = GimbalController::new(
            PulseActuator::new(FlakyDriver { fail_after: 2, highs: 0 }),
            fast_calibration(),
        );
        gimbal.move_left();
        assert_eq!(gimbal.horizontal_position(), HorizontalPosition::Left);

        gimbal.recenter_horizontal();
        assert_eq!(gimbal.horizontal_position(), HorizontalPosition::Left);
    }

    /// Succeeds for `fail_after` high edges, then fails every one
    struct FlakyDriver {
        fail_after: u32,
        highs: u32,
    }

    impl ActuatorDriver for FlakyDriver {
        fn set_high(&mut self, _axis: Axis) -> crate::errors::Result<()> {
            self.highs += 1;
            if self.highs > self.fail_after {
                return Err(crate::errors::SentryError::Device("brownout".into()));
            }
            Ok(())
        }

        fn set_low(&mut self, _axis: Axis) -> crate::errors::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_apply_hold_does_nothing() {
        let mut gimbal = controller();
        assert!(gimbal.apply(TrackingDecision::hold()).is_empty());
        assert!(gimbal.actuator().driver().events().is_empty());
    }
}
