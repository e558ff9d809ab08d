//! Intersection Arbitration
//!
//! Decides when the Kiwi car may leave a 4-way stop. Combines:
//! - Vehicle detections (bounding boxes per frame)
//! - Ultrasonic distance readings
//! - Leading-vehicle and stop sign signals from the bus
//! - A 1 Hz tick for debounce and cooldown counters
//!
//! and emits a single `SafeToGo` per intersection encounter.

pub mod arbiter;
pub mod classifier;
pub mod config;
pub mod departure;
pub mod geometry;
pub mod queue;

pub use arbiter::{ArbiterReport, ArbiterSnapshot, ArbitrationState, IntersectionArbiter};
pub use classifier::{IgnoreReason, Placement, PositionClassifier};
pub use config::{Band, ClassifierConfig, DepartureConfig, DistanceBands, IntersectionConfig};
pub use departure::{Departure, DepartureDetector, DeparturePath};
pub use geometry::{MotionDelta, Observation, Point};
pub use queue::{DepartureOutcome, LaneSlot, TrackedVehicle, VehicleQueue};

use thiserror::Error;

/// Intersection error types
#[derive(Error, Debug)]
pub enum IntersectionError {
    #[error("Invalid intersection configuration: {0}")]
    InvalidConfig(String),
}
