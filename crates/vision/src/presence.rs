//! Presence debouncing over a look-back window of frames

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Presence debouncer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceConfig {
    /// Number of most recent frames considered
    pub window: usize,
    /// Frames within the window that must contain the object
    pub required: usize,
    /// Minimum summed detection area for a frame to count (pixels squared)
    pub min_area: f64,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            window: 20,
            required: 5,
            min_area: 200.0,
        }
    }
}

/// Turns noisy per-frame detections into a stable present/absent signal.
///
/// The object counts as present once at least `required` of the last
/// `window` frames contained it. Only changes are reported.
pub struct PresenceDebouncer {
    config: PresenceConfig,
    seen: VecDeque<bool>,
    present: bool,
}

impl PresenceDebouncer {
    pub fn new(config: PresenceConfig) -> Self {
        Self {
            seen: VecDeque::with_capacity(config.window),
            config,
            present: false,
        }
    }

    /// Feed the summed detection area of one frame
    pub fn push_area(&mut self, area: f64) -> Option<bool> {
        self.push(area > self.config.min_area)
    }

    /// Feed one frame; returns the new state if it changed
    pub fn push(&mut self, seen_this_frame: bool) -> Option<bool> {
        if self.seen.len() >= self.config.window {
            self.seen.pop_front();
        }
        self.seen.push_back(seen_this_frame);

        let frames_seen = self.seen.iter().filter(|&&s| s).count();
        let present = frames_seen >= self.config.required;

        if present != self.present {
            debug!(present, frames_seen, "Presence changed");
            self.present = present;
            Some(present)
        } else {
            None
        }
    }

    /// Current debounced state
    pub fn is_present(&self) -> bool {
        self.present
    }
}

impl Default for PresenceDebouncer {
    fn default() -> Self {
        Self::new(PresenceConfig::default())
    }
}
