//! Lane slot classification of vehicle detections

use tracing::debug;

use crate::config::ClassifierConfig;
use crate::geometry::{MotionDelta, Observation, Point};
use crate::queue::LaneSlot;

/// Why a detection was not placed in a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Smaller than the configured noise floor
    BelowNoiseFloor,
    /// Right-hand detection too small to be a car (usually the stop sign)
    SignSizedOnRight,
}

/// Result of classifying one detection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Slot(LaneSlot),
    /// At the stop line the camera no longer sees the far left, so left and
    /// middle traffic share one band and are told apart by tracking
    LeftOrMiddle,
    Ignored(IgnoreReason),
}

impl Placement {
    /// Slots a detection with this placement may belong to
    pub fn candidates(&self) -> &'static [LaneSlot] {
        match self {
            Placement::Slot(LaneSlot::Left) => &[LaneSlot::Left],
            Placement::Slot(LaneSlot::Middle) => &[LaneSlot::Middle],
            Placement::Slot(LaneSlot::Right) => &[LaneSlot::Right],
            Placement::LeftOrMiddle => &[LaneSlot::Left, LaneSlot::Middle],
            Placement::Ignored(_) => &[],
        }
    }
}

/// Maps detection centers to lane slots.
///
/// Before arrival the slots are wide so a vehicle entering anywhere in view
/// is picked up. Once stopped at the line only a narrow central band matters.
pub struct PositionClassifier {
    config: ClassifierConfig,
}

impl PositionClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    /// Classify a detection given whether we are stopped at the line
    pub fn classify(&self, obs: &Observation, stop_line_arrived: bool) -> Placement {
        let c = &self.config;
        let x = obs.center.x;

        if obs.area < c.min_area {
            return Placement::Ignored(IgnoreReason::BelowNoiseFloor);
        }

        if stop_line_arrived {
            if x >= c.frame_center_x + c.arrived_right_offset {
                Placement::Slot(LaneSlot::Right)
            } else if x <= c.frame_center_x - c.arrived_left_offset {
                Placement::Slot(LaneSlot::Left)
            } else {
                Placement::LeftOrMiddle
            }
        } else if x <= c.frame_center_x - c.approach_left_offset {
            Placement::Slot(LaneSlot::Left)
        } else if x >= c.frame_center_x + c.approach_right_offset {
            if obs.area > c.min_right_area {
                Placement::Slot(LaneSlot::Right)
            } else {
                debug!(x, area = obs.area, "Right-hand detection too small, likely the stop sign");
                Placement::Ignored(IgnoreReason::SignSizedOnRight)
            }
        } else {
            Placement::Slot(LaneSlot::Middle)
        }
    }

    /// Whether a detection is the 12 o'clock vehicle sliding into the left
    /// of the frame as we close in on the stop line, rather than a new car
    /// at 9 o'clock.
    ///
    /// `reference` is the last known position of the tracked vehicle the
    /// delta was measured against.
    pub fn is_twelve_oclock_drift(
        &self,
        obs: &Observation,
        reference: &Point,
        delta: &MotionDelta,
    ) -> bool {
        let c = &self.config;
        obs.center.x < c.frame_center_x - c.twelve_oclock_offset
            && c.twelve_oclock_dx.contains(delta.dx)
            && delta.dy > 0.0
            && reference.x >= c.twelve_oclock_min_prev_x
    }
}

impl Default for PositionClassifier {
    fn default() -> Self {
        Self::new(ClassifierConfig::default())
    }
}
