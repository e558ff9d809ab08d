//! Intersection arbitration configuration

use serde::{Deserialize, Serialize};

use crate::IntersectionError;

/// Open interval `(low, high)`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub low: f64,
    pub high: f64,
}

impl Band {
    pub const fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    /// Strictly between the bounds
    pub fn contains(&self, value: f64) -> bool {
        value > self.low && value < self.high
    }

    fn is_empty(&self) -> bool {
        self.low >= self.high
    }
}

/// Lane slot boundaries (pixels, frame coordinates)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Horizontal split of the frame
    pub frame_center_x: f64,

    /// Left slot boundary before arrival, measured left of center
    pub approach_left_offset: f64,
    /// Right slot boundary before arrival, measured right of center
    pub approach_right_offset: f64,

    /// Left boundary once stopped at the line
    pub arrived_left_offset: f64,
    /// Right boundary once stopped at the line
    pub arrived_right_offset: f64,

    /// Detections left of `center - offset` are checked for a 12 o'clock
    /// vehicle drifting left
    pub twelve_oclock_offset: f64,
    /// Horizontal delta window of a drifting 12 o'clock vehicle
    pub twelve_oclock_dx: Band,
    /// The tracked vehicle must have been at least this far right
    pub twelve_oclock_min_prev_x: f64,

    /// Smaller right-hand detections are taken for the stop sign
    pub min_right_area: f64,
    /// Detections below this area are noise
    pub min_area: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            frame_center_x: 320.0,
            approach_left_offset: 270.0,
            approach_right_offset: 50.0,
            arrived_left_offset: 320.0,
            arrived_right_offset: 25.0,
            twelve_oclock_offset: 220.0,
            twelve_oclock_dx: Band::new(-200.0, 0.0),
            twelve_oclock_min_prev_x: 30.0,
            min_right_area: 10_000.0,
            min_area: 0.0,
        }
    }
}

/// Motion evidence thresholds for vehicles leaving the intersection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DepartureConfig {
    // Toward our lane / 9 o'clock, closing in on the bottom left
    pub ego_lane_dx: Band,
    pub ego_lane_dy: Band,
    pub ego_lane_min_area: f64,
    pub ego_lane_max_x: f64,
    pub ego_lane_min_y: f64,

    // Straight on, away from us (12 o'clock)
    pub twelve_oclock_dx: Band,
    pub twelve_oclock_dy: Band,
    pub twelve_oclock_min_x: f64,
    pub twelve_oclock_max_area: f64,

    // Horizontal leftward exit (9 o'clock)
    pub nine_oclock_dx: Band,
    pub nine_oclock_dy: Band,
    pub nine_oclock_max_x: f64,
    pub nine_oclock_min_y: f64,
    pub nine_oclock_max_y: f64,

    // Horizontal rightward exit (3 o'clock)
    pub three_oclock_dx: Band,
    pub three_oclock_dy: Band,
    pub three_oclock_min_x: f64,
}

impl Default for DepartureConfig {
    fn default() -> Self {
        Self {
            ego_lane_dx: Band::new(-30.0, 0.0),
            ego_lane_dy: Band::new(0.0, 40.0),
            ego_lane_min_area: 10_000.0,
            ego_lane_max_x: 220.0,
            ego_lane_min_y: 230.0,

            twelve_oclock_dx: Band::new(-20.0, 10.0),
            twelve_oclock_dy: Band::new(-0.5, 200.0),
            twelve_oclock_min_x: 210.0,
            twelve_oclock_max_area: 15_000.0,

            nine_oclock_dx: Band::new(-200.0, -0.5),
            nine_oclock_dy: Band::new(-5.0, 5.0),
            nine_oclock_max_x: 180.0,
            nine_oclock_min_y: 150.0,
            nine_oclock_max_y: 240.0,

            three_oclock_dx: Band::new(0.5, 200.0),
            three_oclock_dy: Band::new(-5.0, 5.0),
            three_oclock_min_x: 510.0,
        }
    }
}

/// Ultrasonic "just passed" bands (meters)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DistanceBands {
    /// Front sensor: a car crossed in front of us
    pub front: Band,
    /// Left sensor: a car turned into our lane
    pub side: Band,
}

impl Default for DistanceBands {
    fn default() -> Self {
        Self {
            front: Band::new(0.1, 0.4),
            side: Band::new(0.05, 0.4),
        }
    }
}

/// Intersection arbitration configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntersectionConfig {
    pub classifier: ClassifierConfig,
    pub departure: DepartureConfig,
    pub distance: DistanceBands,

    /// Seconds to wait at the line before trusting departure geometry
    pub arrival_debounce_ticks: u32,

    /// Seconds after a departure before another one can be counted
    pub car_leave_cooldown_ticks: u32,
}

impl Default for IntersectionConfig {
    fn default() -> Self {
        Self {
            classifier: ClassifierConfig::default(),
            departure: DepartureConfig::default(),
            distance: DistanceBands::default(),
            arrival_debounce_ticks: 4,
            car_leave_cooldown_ticks: 5,
        }
    }
}

impl IntersectionConfig {
    /// Reject settings the arbiter cannot work with
    pub fn validate(&self) -> Result<(), IntersectionError> {
        if self.arrival_debounce_ticks == 0 {
            return Err(IntersectionError::InvalidConfig(
                "arrival_debounce_ticks must be at least 1".into(),
            ));
        }
        if self.classifier.frame_center_x <= 0.0 {
            return Err(IntersectionError::InvalidConfig(format!(
                "frame_center_x must be positive, got {}",
                self.classifier.frame_center_x
            )));
        }

        let bands = [
            ("distance.front", self.distance.front),
            ("distance.side", self.distance.side),
            ("departure.ego_lane_dx", self.departure.ego_lane_dx),
            ("departure.ego_lane_dy", self.departure.ego_lane_dy),
            ("departure.twelve_oclock_dx", self.departure.twelve_oclock_dx),
            ("departure.twelve_oclock_dy", self.departure.twelve_oclock_dy),
            ("departure.nine_oclock_dx", self.departure.nine_oclock_dx),
            ("departure.nine_oclock_dy", self.departure.nine_oclock_dy),
            ("departure.three_oclock_dx", self.departure.three_oclock_dx),
            ("departure.three_oclock_dy", self.departure.three_oclock_dy),
            ("classifier.twelve_oclock_dx", self.classifier.twelve_oclock_dx),
        ];
        if let Some((name, band)) = bands.iter().find(|(_, band)| band.is_empty()) {
            return Err(IntersectionError::InvalidConfig(format!(
                "{} is empty: ({}, {})",
                name, band.low, band.high
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_is_open() {
        let band = Band::new(0.1, 0.4);
        assert!(band.contains(0.25));
        assert!(!band.contains(0.1));
        assert!(!band.contains(0.4));
    }

    #[test]
    fn test_default_is_valid() {
        assert!(IntersectionConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_empty_band() {
        let mut config = IntersectionConfig::default();
        config.distance.front = Band::new(0.4, 0.1);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("distance.front"));
    }

    #[test]
    fn test_rejects_zero_debounce() {
        let config = IntersectionConfig {
            arrival_debounce_ticks: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_frame_center() {
        let mut config = IntersectionConfig::default();
        config.classifier.frame_center_x = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config: IntersectionConfig =
            serde_json::from_str(r#"{"car_leave_cooldown_ticks": 3}"#).unwrap();
        assert_eq!(config.car_leave_cooldown_ticks, 3);
        assert_eq!(config.arrival_debounce_ticks, 4);
        assert_eq!(config.classifier.frame_center_x, 320.0);
    }
}
