//! Kiwi Car Message Bus
//!
//! Logical messages exchanged between the Kiwi car programs and a small
//! in-process publish/subscribe bus that carries them. The real transport
//! (sessions, wire encoding) lives outside this crate; everything here is
//! expressed in terms of typed [`Message`]s wrapped in [`Envelope`]s.

mod bus;
mod error;
mod message;

pub use bus::{LocalBus, Subscription, DEFAULT_CAPACITY};
pub use error::BusError;
pub use message::{Direction, Envelope, Message};

/// Sender stamps used to tell apart instances of the same message type
pub mod stamp {
    /// Front-facing ultrasonic distance sensor
    pub const FRONT_ULTRASONIC: u16 = 0;
    /// Left-facing ultrasonic distance sensor
    pub const LEFT_ULTRASONIC: u16 = 1;
}
