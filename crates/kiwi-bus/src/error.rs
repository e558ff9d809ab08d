//! Bus Error Types

use thiserror::Error;

/// Errors that can occur while publishing or receiving bus messages
#[derive(Debug, Error)]
pub enum BusError {
    /// Every receiver has been dropped
    #[error("No subscriber is listening on the bus")]
    NoSubscribers,

    /// The bus was shut down
    #[error("Bus closed")]
    Closed,

    /// A direction code outside 1..=3 was received
    #[error("Invalid direction code: {0}")]
    InvalidDirection(u8),
}
