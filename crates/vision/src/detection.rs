//! Per-frame detector output

use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box in frame pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Left edge
    pub x: f64,
    /// Top edge
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Center point `(x, y)`
    pub fn center(&self) -> (f64, f64) {
        (self.x + 0.5 * self.width, self.y + 0.5 * self.height)
    }

    /// Area in pixels squared
    pub fn area(&self) -> f64 {
        self.width * self.height
    }
}

/// Everything the detectors found in one camera frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameDetections {
    /// Candidate vehicles
    #[serde(default)]
    pub vehicles: Vec<BoundingBox>,

    /// Summed area of stop sign detections in this frame
    #[serde(default)]
    pub stop_sign_area: f64,
}
