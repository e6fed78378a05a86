//! Face tracking policy
//!
//! Turns the face boxes of one frame into at most one horizontal and one
//! vertical gimbal move. The policy is pure: it never touches hardware.

use serde::{Deserialize, Serialize};

/// Axis-aligned face rectangle in frame pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl FaceBox {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Integer center of the box
    pub fn center(&self) -> (i32, i32) {
        (self.x + self.width / 2, self.y + self.height / 2)
    }
}

/// Rectangle around the frame center where no correction is issued.
///
/// `left`/`right` are x coordinates, `top`/`down` are y coordinates.
/// All four bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadZone {
    pub left: i32,
    pub right: i32,
    pub top: i32,
    pub down: i32,
}

impl DeadZone {
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.left && x <= self.right && y >= self.top && y <= self.down
    }
}

/// Reference point the tracked centroid is compared against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CenterPoint {
    pub x: i32,
    pub y: i32,
}

/// Centroid of all face centers in one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackingTarget {
    pub center_x: i32,
    pub center_y: i32,
}

impl TrackingTarget {
    /// Average the box centers with integer truncation.
    ///
    /// Returns `None` for an empty set.
    pub fn from_faces(faces: &[FaceBox]) -> Option<Self> {
        if faces.is_empty() {
            return None;
        }
        let n = faces.len() as i64;
        let (sx, sy) = faces.iter().fold((0i64, 0i64), |(sx, sy), face| {
            let (cx, cy) = face.center();
            (sx + i64::from(cx), sy + i64::from(cy))
        });
        Some(Self {
            center_x: (sx / n) as i32,
            center_y: (sy / n) as i32,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Horizontal {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vertical {
    Up,
    Down,
}

/// Gimbal moves requested for one frame.
///
/// Either both axes are set or neither is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrackingDecision {
    pub horizontal: Option<Horizontal>,
    pub vertical: Option<Vertical>,
}

impl TrackingDecision {
    pub fn hold() -> Self {
        Self::default()
    }

    pub fn is_hold(&self) -> bool {
        self.horizontal.is_none() && self.vertical.is_none()
    }

    /// Number of gimbal commands this decision issues
    pub fn command_count(&self) -> usize {
        usize::from(self.horizontal.is_some()) + usize::from(self.vertical.is_some())
    }
}

/// Maps face boxes to gimbal moves relative to a dead zone and center point
#[derive(Debug, Clone, Copy)]
pub struct TrackingPolicy {
    dead_zone: DeadZone,
    center: CenterPoint,
}

impl TrackingPolicy {
    pub fn new(dead_zone: DeadZone, center: CenterPoint) -> Self {
        Self { dead_zone, center }
    }

    pub fn dead_zone(&self) -> DeadZone {
        self.dead_zone
    }

    pub fn center(&self) -> CenterPoint {
        self.center
    }

    /// Decide the moves for one frame's detections
    pub fn evaluate(&self, faces: &[FaceBox]) -> TrackingDecision {
        match TrackingTarget::from_faces(faces) {
            Some(target) => self.classify(target),
            None => TrackingDecision::hold(),
        }
    }

    /// Classify an already computed centroid
    pub fn classify(&self, target: TrackingTarget) -> TrackingDecision {
        let TrackingTarget { center_x, center_y } = target;

        if self.dead_zone.contains(center_x, center_y) {
            return TrackingDecision::hold();
        }

        let horizontal = if center_x < self.center.x {
            Horizontal::Left
        } else {
            Horizontal::Right
        };
        let vertical = if center_y < self.center.y {
            Vertical::Up
        } else {
            Vertical::Down
        };

        TrackingDecision {
            horizontal: Some(horizontal),
            vertical: Some(vertical),
        }
    }
}
