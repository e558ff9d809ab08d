//! Timed maneuver execution

use std::time::Duration;

use kiwi_bus::{BusError, Direction, LocalBus, Message, Subscription};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::ManeuverError;

/// Configuration for the direction controller
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ManeuverConfig {
    /// Pedal position while crossing (default: 0.14)
    pub speed: f32,
    /// Steering magnitude for turns, radians (default: 0.3)
    pub steering_angle: f32,
    /// Seconds driven for a left turn
    pub left_secs: f64,
    /// Seconds driven going straight
    pub straight_secs: f64,
    /// Seconds driven for a right turn
    pub right_secs: f64,
}

impl Default for ManeuverConfig {
    fn default() -> Self {
        Self {
            speed: 0.14,
            steering_angle: 0.3,
            left_secs: 3.0,
            straight_secs: 2.5,
            right_secs: 2.0,
        }
    }
}

impl ManeuverConfig {
    /// The maneuver executed for `direction`
    pub fn maneuver(&self, direction: Direction) -> Maneuver {
        let (steering_angle, secs) = match direction {
            Direction::Left => (self.steering_angle, self.left_secs),
            Direction::Straight => (0.0, self.straight_secs),
            Direction::Right => (-self.steering_angle, self.right_secs),
        };
        Maneuver {
            direction,
            steering_angle,
            speed: self.speed,
            duration: Duration::from_secs_f64(secs),
        }
    }

    pub fn validate(&self) -> Result<(), ManeuverError> {
        if !(self.speed > 0.0 && self.speed <= 1.0) {
            return Err(ManeuverError::InvalidConfig(format!(
                "speed must be in (0, 1], got {}",
                self.speed
            )));
        }
        for (name, secs) in [
            ("left_secs", self.left_secs),
            ("straight_secs", self.straight_secs),
            ("right_secs", self.right_secs),
        ] {
            if !secs.is_finite() || secs <= 0.0 {
                return Err(ManeuverError::InvalidConfig(format!(
                    "{} must be positive, got {}",
                    name, secs
                )));
            }
        }
        Ok(())
    }
}

/// One open-loop maneuver
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Maneuver {
    pub direction: Direction,
    /// Positive steers left
    pub steering_angle: f32,
    pub speed: f32,
    pub duration: Duration,
}

/// Executes chosen directions by publishing actuator requests on the bus
pub struct DirectionController {
    bus: LocalBus,
    config: ManeuverConfig,
}

impl DirectionController {
    pub fn new(bus: LocalBus, config: ManeuverConfig) -> Result<Self, ManeuverError> {
        config.validate()?;
        Ok(Self { bus, config })
    }

    /// Drive through the intersection in `direction`, returning once the car
    /// has been braked to a stop
    pub async fn execute(&self, direction: Direction) -> Result<Maneuver, ManeuverError> {
        let maneuver = self.config.maneuver(direction);
        info!(
            %direction,
            angle = maneuver.steering_angle,
            speed = maneuver.speed,
            secs = maneuver.duration.as_secs_f64(),
            "Executing maneuver"
        );

        self.bus.send(Message::GroundSteeringRequest {
            angle: maneuver.steering_angle,
        })?;
        self.bus.send(Message::PedalPositionRequest {
            position: maneuver.speed,
        })?;

        tokio::time::sleep(maneuver.duration).await;

        // Brake even if straightening the wheels could not be published
        let straighten = self.bus.send(Message::GroundSteeringRequest { angle: 0.0 });
        self.bus.send(Message::PedalPositionRequest { position: 0.0 })?;
        straighten?;

        info!(%direction, "Maneuver complete");
        Ok(maneuver)
    }

    /// Execute every `ChooseDirectionRequest` seen on `subscription`.
    ///
    /// Maneuvers never overlap: a request arriving while one is running is
    /// dropped.
    pub async fn run(self, mut subscription: Subscription) -> Result<(), ManeuverError> {
        info!("Starting direction controller");

        loop {
            let direction = match subscription.recv().await {
                Ok(envelope) => match envelope.message {
                    Message::ChooseDirectionRequest { direction } => direction,
                    _ => continue,
                },
                Err(BusError::Closed) => break,
                Err(e) => return Err(e.into()),
            };

            let maneuver = self.execute(direction);
            tokio::pin!(maneuver);

            loop {
                tokio::select! {
                    result = &mut maneuver => {
                        if let Err(e) = result {
                            warn!("Maneuver {} failed: {}", direction, e);
                        }
                        break;
                    }
                    received = subscription.recv() => match received {
                        Ok(envelope) => {
                            if let Message::ChooseDirectionRequest { direction: dropped } = envelope.message {
                                warn!(
                                    running = %direction,
                                    %dropped,
                                    "Direction request dropped, maneuver in progress"
                                );
                            }
                        }
                        Err(e) => {
                            debug!("Subscription ended during maneuver: {}", e);
                            (&mut maneuver).await?;
                            info!("Direction controller stopped");
                            return Ok(());
                        }
                    }
                }
            }
        }

        info!("Direction controller stopped");
        Ok(())
    }
}
