//! Observation geometry

use serde::{Deserialize, Serialize};
use vision::BoundingBox;

/// Point in frame pixels
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Frame-to-frame movement of a tracked vehicle
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MotionDelta {
    pub dx: f64,
    pub dy: f64,
}

impl MotionDelta {
    pub fn between(previous: &Point, current: &Point) -> Self {
        Self {
            dx: current.x - previous.x,
            dy: current.y - previous.y,
        }
    }
}

/// One vehicle detection, reduced to what the arbiter needs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub center: Point,
    /// Bounding box area (pixels squared)
    pub area: f64,
}

impl Observation {
    pub fn new(x: f64, y: f64, area: f64) -> Self {
        Self {
            center: Point::new(x, y),
            area,
        }
    }
}

impl From<&BoundingBox> for Observation {
    fn from(bbox: &BoundingBox) -> Self {
        let (x, y) = bbox.center();
        Self::new(x, y, bbox.area())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observation_from_box() {
        let obs = Observation::from(&BoundingBox::new(20.0, 170.0, 60.0, 60.0));
        assert_eq!(obs.center, Point::new(50.0, 200.0));
        assert_eq!(obs.area, 3600.0);
    }

    #[test]
    fn test_delta() {
        let delta = MotionDelta::between(&Point::new(50.0, 200.0), &Point::new(40.0, 230.0));
        assert_eq!(delta, MotionDelta { dx: -10.0, dy: 30.0 });
    }
}
