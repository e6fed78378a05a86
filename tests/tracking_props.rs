//! Property-based tests for tracking, gimbal state and recording debounce
//!
//! Run with: cargo test --test tracking_props

use proptest::prelude::*;

use sentrycam::gimbal::{
    GimbalAction, GimbalController, HorizontalPosition, PulseActuator, PulseCalibration,
    PulseWidth, VerticalPosition,
};
use sentrycam::recording::{RecordingStateMachine, Transition};
use sentrycam::testing::LoggingDriver;
use sentrycam::tracking::{CenterPoint, DeadZone, FaceBox, Horizontal, TrackingPolicy, Vertical};

fn reference_policy() -> TrackingPolicy {
    TrackingPolicy::new(
        DeadZone {
            left: 400,
            right: 600,
            top: 300,
            down: 400,
        },
        CenterPoint { x: 500, y: 350 },
    )
}

/// Box of the given size whose integer center is `(cx, cy)`
fn centered_box(cx: i32, cy: i32, w: i32, h: i32) -> FaceBox {
    FaceBox::new(cx - w / 2, cy - h / 2, w, h)
}

fn instant_gimbal() -> GimbalController<LoggingDriver> {
    let w = PulseWidth::new(0, 0);
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

#[derive(Debug, Clone, Copy)]
enum Command {
    Left,
    Right,
    Up,
    Down,
    Recenter,
}

fn command() -> impl Strategy<Value = Command> {
    prop_oneof![
        Just(Command::Left),
        Just(Command::Right),
        Just(Command::Up),
        Just(Command::Down),
        Just(Command::Recenter),
    ]
}

proptest! {
    /// INVARIANT: a centroid inside the dead zone issues no move
    #[test]
    fn centroid_in_dead_zone_holds(
        cx in 400i32..=600,
        cy in 300i32..=400,
        w in 1i32..200,
        h in 1i32..200,
        copies in 1usize..5,
    ) {
        let faces = vec![centered_box(cx, cy, w, h); copies];
        let decision = reference_policy().evaluate(&faces);
        prop_assert!(decision.is_hold(), "{:?} at ({}, {})", decision, cx, cy);
    }

    /// INVARIANT: left of and above the center point yields exactly left + up
    #[test]
    fn centroid_left_and_above_moves_left_up(
        cx in 0i32..400,
        cy in 0i32..350,
        w in 1i32..200,
        h in 1i32..200,
    ) {
        let decision = reference_policy().evaluate(&[centered_box(cx, cy, w, h)]);
        prop_assert_eq!(decision.horizontal, Some(Horizontal::Left));
        prop_assert_eq!(decision.vertical, Some(Vertical::Up));
        prop_assert_eq!(decision.command_count(), 2);
    }

    /// INVARIANT: outside the dead zone both axes are always corrected
    #[test]
    fn outside_dead_zone_moves_both_axes(
        cx in -2000i32..3000,
        cy in -2000i32..3000,
    ) {
        prop_assume!(!(400..=600).contains(&cx) || !(300..=400).contains(&cy));
        let decision = reference_policy().evaluate(&[centered_box(cx, cy, 2, 2)]);
        prop_assert_eq!(decision.command_count(), 2);
    }

    /// INVARIANT: the centroid is the truncated mean of the box centers
    #[test]
    fn two_boxes_average_their_centers(
        ax in 0i32..1280, ay in 0i32..720,
        bx in 0i32..1280, by in 0i32..720,
    ) {
        let faces = [centered_box(ax, ay, 2, 2), centered_box(bx, by, 2, 2)];
        let mid_x = (ax + bx) / 2;
        let mid_y = (ay + by) / 2;
        let expected = reference_policy().evaluate(&[centered_box(mid_x, mid_y, 2, 2)]);
        prop_assert_eq!(reference_policy().evaluate(&faces), expected);
    }

    /// INVARIANT: no raw pulse ever crosses from one side to the other
    #[test]
    fn gimbal_never_skips_center(commands in prop::collection::vec(command(), 1..60)) {
        let mut gimbal = instant_gimbal();
        for cmd in commands {
            let before_h = gimbal.horizontal_position();
            let before_v = gimbal.vertical_position();
            match cmd {
                Command::Left => {
                    let action = gimbal.move_left();
                    if before_h == HorizontalPosition::Right {
                        prop_assert_eq!(action, GimbalAction::RecenterHorizontal);
                        prop_assert_eq!(gimbal.horizontal_position(), HorizontalPosition::Center);
                    } else {
                        prop_assert_eq!(action, GimbalAction::Left);
                    }
                }
                Command::Right => {
                    let action = gimbal.move_right();
                    if before_h == HorizontalPosition::Left {
                        prop_assert_eq!(action, GimbalAction::RecenterHorizontal);
                        prop_assert_eq!(gimbal.horizontal_position(), HorizontalPosition::Center);
                    } else {
                        prop_assert_eq!(action, GimbalAction::Right);
                    }
                }
                Command::Up => {
                    let action = gimbal.move_up();
                    if before_v == VerticalPosition::Down {
                        prop_assert_eq!(action, GimbalAction::RecenterVertical);
                    } else {
                        prop_assert_eq!(action, GimbalAction::Up);
                    }
                }
                Command::Down => {
                    let action = gimbal.move_down();
                    if before_v == VerticalPosition::Up {
                        prop_assert_eq!(action, GimbalAction::RecenterVertical);
                    } else {
                        prop_assert_eq!(action, GimbalAction::Down);
                    }
                }
                Command::Recenter => {
                    gimbal.recenter();
                    prop_assert_eq!(gimbal.horizontal_position(), HorizontalPosition::Center);
                    prop_assert_eq!(gimbal.vertical_position(), VerticalPosition::Center);
                }
            }
        }
    }

    /// INVARIANT: recording stops only once the quiet gap exceeds the threshold
    #[test]
    fn quiet_gap_must_exceed_threshold(
        t0 in 0u64..1_000_000,
        threshold in 1u64..60_000,
        gap in 0u64..120_000,
    ) {
        let mut sm = RecordingStateMachine::new(threshold);
        prop_assert!(matches!(sm.observe(1, t0), Some(Transition::Started(_))));
        let result = sm.observe(0, t0 + gap);
        if gap > threshold {
            prop_assert!(matches!(result, Some(Transition::Stopped(_))));
            prop_assert!(!sm.is_active());
        } else {
            prop_assert_eq!(result, None);
            prop_assert!(sm.is_active());
        }
    }

    /// INVARIANT: each session produces exactly one start and at most one stop
    #[test]
    fn transitions_alternate(faces in prop::collection::vec(0usize..3, 1..200)) {
        let mut sm = RecordingStateMachine::new(100);
        let mut last: Option<bool> = None;
        for (i, count) in faces.into_iter().enumerate() {
            if let Some(t) = sm.observe(count, i as u64 * 40) {
                let started = matches!(t, Transition::Started(_));
                if let Some(prev) = last {
                    prop_assert_ne!(prev, started, "two identical transitions in a row");
                } else {
                    prop_assert!(started, "first transition must be a start");
                }
                last = Some(started);
            }
        }
    }
}

#[test]
fn reference_center_is_inside_dead_zone() {
    let decision = reference_policy().evaluate(&[centered_box(500, 350, 40, 40)]);
    assert!(decision.is_hold());
}

#[test]
fn dead_zone_corners_are_inclusive() {
    let policy = reference_policy();
    for (x, y) in [(400, 300), (600, 300), (400, 400), (600, 400)] {
        assert!(policy.evaluate(&[centered_box(x, y, 2, 2)]).is_hold(), "({}, {})", x, y);
    }
    assert!(!policy.evaluate(&[centered_box(399, 350, 2, 2)]).is_hold());
    assert!(!policy.evaluate(&[centered_box(500, 401, 2, 2)]).is_hold());
}
