//! Evidence that a queued vehicle has left the intersection

use kiwi_bus::stamp;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{DepartureConfig, DistanceBands};
use crate::geometry::{MotionDelta, Observation};
use crate::queue::LaneSlot;

/// How a vehicle was seen leaving
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeparturePath {
    /// Turned toward our lane, exiting bottom left
    EgoLane,
    /// Went straight across, shrinking into the distance
    TwelveOClock,
    /// Drove off horizontally to the left
    NineOClock,
    /// Drove off horizontally to the right
    ThreeOClock,
    /// Front ultrasonic saw it pass in front of us
    FrontSensor,
    /// Left ultrasonic saw it pass beside us
    SideSensor,
}

/// A counted departure
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Departure {
    pub path: DeparturePath,
    /// Slot that was cleared, if any was occupied
    pub slot: Option<LaneSlot>,
    /// `cars_in_queue` after the departure
    pub remaining: u32,
}

/// Evaluates motion and distance evidence against the departure thresholds
pub struct DepartureDetector {
    motion: DepartureConfig,
    distance: DistanceBands,
}

impl DepartureDetector {
    pub fn new(motion: DepartureConfig, distance: DistanceBands) -> Self {
        Self { motion, distance }
    }

    /// Departure evidence from a tracked vehicle's latest observation.
    ///
    /// `band` is where the observation falls now, which differs from the
    /// vehicle's queued slot once it drives across the frame.
    pub fn from_motion(
        &self,
        band: LaneSlot,
        obs: &Observation,
        delta: &MotionDelta,
    ) -> Option<DeparturePath> {
        let c = &self.motion;
        let (x, y) = (obs.center.x, obs.center.y);

        match band {
            LaneSlot::Left | LaneSlot::Middle => {
                if c.ego_lane_dx.contains(delta.dx) && c.ego_lane_dy.contains(delta.dy) {
                    // Closing in and drifting left
                    if obs.area > c.ego_lane_min_area {
                        debug!(x, y, "Closing in toward our lane");
                        if x < c.ego_lane_max_x && y > c.ego_lane_min_y {
                            return Some(DeparturePath::EgoLane);
                        }
                    }
                } else if c.twelve_oclock_dy.contains(delta.dy)
                    && c.twelve_oclock_dx.contains(delta.dx)
                {
                    // Roughly straight on
                    if x > c.twelve_oclock_min_x {
                        debug!(area = obs.area, "Heading straight across");
                        if obs.area < c.twelve_oclock_max_area {
                            return Some(DeparturePath::TwelveOClock);
                        }
                    }
                } else if c.nine_oclock_dx.contains(delta.dx) && c.nine_oclock_dy.contains(delta.dy)
                {
                    debug!(x, y, "Heading off to the left");
                    if x < c.nine_oclock_max_x && y > c.nine_oclock_min_y && y <= c.nine_oclock_max_y {
                        return Some(DeparturePath::NineOClock);
                    }
                }
                None
            }
            LaneSlot::Right => {
                if c.three_oclock_dx.contains(delta.dx) && c.three_oclock_dy.contains(delta.dy) {
                    debug!(x, "Heading off to the right");
                    if x > c.three_oclock_min_x {
                        return Some(DeparturePath::ThreeOClock);
                    }
                }
                None
            }
        }
    }

    /// Departure evidence from an ultrasonic reading
    pub fn from_distance(&self, sender_stamp: u16, distance: f32) -> Option<DeparturePath> {
        let distance = f64::from(distance);
        match sender_stamp {
            stamp::FRONT_ULTRASONIC if self.distance.front.contains(distance) => {
                Some(DeparturePath::FrontSensor)
            }
            stamp::LEFT_ULTRASONIC if self.distance.side.contains(distance) => {
                Some(DeparturePath::SideSensor)
            }
            _ => None,
        }
    }
}

impl Default for DepartureDetector {
    fn default() -> Self {
        Self::new(DepartureConfig::default(), DistanceBands::default())
    }
}
