//! Logical bus messages

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::BusError;

/// Direction chosen for leaving the intersection
///
/// On the wire the direction is carried as the code typed by the operator:
/// 1 = right, 2 = straight, 3 = left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Direction {
    Right,
    Straight,
    Left,
}

impl Direction {
    /// Wire code of this direction
    pub fn code(self) -> u8 {
        match self {
            Direction::Right => 1,
            Direction::Straight => 2,
            Direction::Left => 3,
        }
    }
}

impl TryFrom<u8> for Direction {
    type Error = BusError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(Direction::Right),
            2 => Ok(Direction::Straight),
            3 => Ok(Direction::Left),
            other => Err(BusError::InvalidDirection(other)),
        }
    }
}

impl From<Direction> for u8 {
    fn from(direction: Direction) -> Self {
        direction.code()
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Direction::Right => "right",
            Direction::Straight => "straight",
            Direction::Left => "left",
        };
        f.write_str(name)
    }
}

/// Messages exchanged between the Kiwi car programs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    /// Debounced stop sign visibility. The intersection program reads
    /// `present == false` as "we have pulled up to the stop line".
    StopSignPresenceUpdate { present: bool },

    /// Ultrasonic distance reading in meters; the envelope's sender stamp
    /// identifies the sensor
    DistanceReading { distance: f32 },

    /// The vehicle we were following has left the camera's view
    CarOutOfSight,

    /// Debounced vehicle visibility
    CarPresenceUpdate { present: bool },

    /// Debounced yield sign visibility
    YieldPresenceUpdate { present: bool },

    /// The intersection is clear; a direction may be chosen
    SafeToGo,

    /// Direction picked for the next maneuver
    ChooseDirectionRequest { direction: Direction },

    /// Pedal position (forward speed), 0.0 brakes to a stop
    PedalPositionRequest { position: f32 },

    /// Ground steering angle in radians, positive steers left
    GroundSteeringRequest { angle: f32 },

    /// Speed correction requested by a proportional controller
    SpeedCorrectionRequest { amount: f32 },

    /// Steering correction requested by a proportional controller
    SteeringCorrectionRequest { amount: f32 },
}

impl Message {
    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Message::StopSignPresenceUpdate { .. } => "StopSignPresenceUpdate",
            Message::DistanceReading { .. } => "DistanceReading",
            Message::CarOutOfSight => "CarOutOfSight",
            Message::CarPresenceUpdate { .. } => "CarPresenceUpdate",
            Message::YieldPresenceUpdate { .. } => "YieldPresenceUpdate",
            Message::SafeToGo => "SafeToGo",
            Message::ChooseDirectionRequest { .. } => "ChooseDirectionRequest",
            Message::PedalPositionRequest { .. } => "PedalPositionRequest",
            Message::GroundSteeringRequest { .. } => "GroundSteeringRequest",
            Message::SpeedCorrectionRequest { .. } => "SpeedCorrectionRequest",
            Message::SteeringCorrectionRequest { .. } => "SteeringCorrectionRequest",
        }
    }
}

/// A message together with its delivery metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Distinguishes several senders of the same message type
    #[serde(default)]
    pub sender_stamp: u16,
    /// Time the message was published
    #[serde(default = "Utc::now")]
    pub sent_at: DateTime<Utc>,
    /// Payload
    pub message: Message,
}

impl Envelope {
    /// Wrap a message with sender stamp 0
    pub fn new(message: Message) -> Self {
        Self::stamped(0, message)
    }

    /// Wrap a message with an explicit sender stamp
    pub fn stamped(sender_stamp: u16, message: Message) -> Self {
        Self {
            sender_stamp,
            sent_at: Utc::now(),
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_codes() {
        assert_eq!(Direction::try_from(1).unwrap(), Direction::Right);
        assert_eq!(Direction::try_from(2).unwrap(), Direction::Straight);
        assert_eq!(Direction::try_from(3).unwrap(), Direction::Left);
        assert!(matches!(
            Direction::try_from(4),
            Err(BusError::InvalidDirection(4))
        ));
        assert_eq!(Direction::Left.code(), 3);
    }

    #[test]
    fn test_direction_on_the_wire() {
        let msg = Message::ChooseDirectionRequest {
            direction: Direction::Straight,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"type":"ChooseDirectionRequest","direction":2}"#);

        let bad = r#"{"type":"ChooseDirectionRequest","direction":7}"#;
        assert!(serde_json::from_str::<Message>(bad).is_err());
    }

    #[test]
    fn test_envelope_defaults() {
        let json = r#"{"message":{"type":"CarOutOfSight"}}"#;
        let envelope: Envelope = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.sender_stamp, 0);
        assert_eq!(envelope.message, Message::CarOutOfSight);

        let json = r#"{"sender_stamp":1,"message":{"type":"DistanceReading","distance":0.25}}"#;
        let envelope: Envelope = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.sender_stamp, 1);
        assert_eq!(envelope.message.name(), "DistanceReading");
    }
}
