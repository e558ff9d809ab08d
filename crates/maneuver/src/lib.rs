//! Direction Execution
//!
//! Turns a chosen direction into a fixed, open-loop sequence of steering and
//! pedal requests: steer, drive for a set time, straighten, brake.

mod controller;

pub use controller::{DirectionController, Maneuver, ManeuverConfig};

use kiwi_bus::BusError;
use thiserror::Error;

/// Maneuver error types
#[derive(Error, Debug)]
pub enum ManeuverError {
    #[error("Failed to publish actuator request: {0}")]
    Bus(#[from] BusError),

    #[error("Invalid maneuver configuration: {0}")]
    InvalidConfig(String),
}
