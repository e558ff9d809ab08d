//! Vision
//!
//! The detectors themselves (Haar cascades, color blob pipelines) run
//! outside this workspace. This crate defines what they hand over:
//! - Per-frame vehicle bounding boxes and stop sign area
//! - Debounced presence reporting (look-back window over frames)
//! - Recorded or piped detection streams (newline-delimited JSON)

pub mod detection;
pub mod presence;
pub mod stream;

pub use detection::{BoundingBox, FrameDetections};
pub use presence::{PresenceConfig, PresenceDebouncer};
pub use stream::{DetectionStream, StreamItem, StreamRecord};

use thiserror::Error;

/// Detection source error types
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Failed to read detection stream: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed record on line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}
