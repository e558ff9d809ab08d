//! Intersection arbitration state machine
//!
//! ```text
//! NotArrived --(leading car gone + stop sign gone)--> ArrivedWaiting(N)
//! ArrivedWaiting(n) --(tick)--> ArrivedWaiting(n-1) ... --> Arrived
//! Arrived --(queue drained)--> SafeToGoSent
//! SafeToGoSent --(car out of sight)--> NotArrived
//! ```

use kiwi_bus::{Envelope, Message};
use serde::Serialize;
use tracing::{debug, info, warn};
use vision::BoundingBox;

use crate::classifier::{Placement, PositionClassifier};
use crate::config::IntersectionConfig;
use crate::departure::{Departure, DepartureDetector, DeparturePath};
use crate::geometry::Observation;
use crate::queue::{DepartureOutcome, LaneSlot, VehicleQueue};
use crate::IntersectionError;

/// Where we are in the current intersection encounter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ArbitrationState {
    /// Approaching, or waiting behind the leading vehicle
    NotArrived,
    /// At the line, letting the car settle before trusting departures
    ArrivedWaiting { ticks_remaining: u32 },
    /// Stopped at the line, counting departing vehicles
    Arrived,
    /// SafeToGo has been emitted for this encounter
    SafeToGoSent,
}

/// What a single event changed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArbiterReport {
    /// Vehicles counted as gone while handling the event
    pub departures: Vec<Departure>,
    /// SafeToGo must be published
    pub safe_to_go: bool,
}

/// Point-in-time view of the arbiter
#[derive(Debug, Clone, Serialize)]
pub struct ArbiterSnapshot {
    pub state: ArbitrationState,
    pub leading_vehicle_gone: bool,
    pub cars_in_queue: u32,
    pub car_leave_timeout: u32,
    pub occupied: Vec<LaneSlot>,
}

/// Owns all per-encounter state. Every input arrives through one of the
/// `on_*` handlers; callers must serialize calls.
pub struct IntersectionArbiter {
    config: IntersectionConfig,
    classifier: PositionClassifier,
    detector: DepartureDetector,
    queue: VehicleQueue,
    state: ArbitrationState,
    leading_vehicle_gone: bool,
    /// The far-left detection is the 12 o'clock car closing in, not a 9
    /// o'clock arrival; suppresses new left-slot assignments
    twelve_oclock_car: bool,
}

impl IntersectionArbiter {
    /// Create an arbiter in `NotArrived`
    pub fn new(config: IntersectionConfig) -> Result<Self, IntersectionError> {
        config.validate()?;
        info!(
            debounce_ticks = config.arrival_debounce_ticks,
            cooldown_ticks = config.car_leave_cooldown_ticks,
            frame_center_x = config.classifier.frame_center_x,
            "Creating intersection arbiter"
        );
        Ok(Self {
            classifier: PositionClassifier::new(config.classifier.clone()),
            detector: DepartureDetector::new(config.departure.clone(), config.distance.clone()),
            queue: VehicleQueue::new(config.car_leave_cooldown_ticks),
            state: ArbitrationState::NotArrived,
            leading_vehicle_gone: false,
            twelve_oclock_car: false,
            config,
        })
    }

    /// Route a bus envelope to its handler; unrelated messages are ignored
    pub fn handle_envelope(&mut self, envelope: &Envelope) -> ArbiterReport {
        match &envelope.message {
            Message::StopSignPresenceUpdate { present } => self.on_stop_sign_update(*present),
            Message::DistanceReading { distance } => {
                self.on_distance_reading(envelope.sender_stamp, *distance)
            }
            Message::CarOutOfSight => self.on_car_out_of_sight(),
            _ => ArbiterReport::default(),
        }
    }

    /// Stop sign visibility changed. Losing sight of the sign after the
    /// leading car left means we pulled up to the line.
    pub fn on_stop_sign_update(&mut self, present: bool) -> ArbiterReport {
        if present {
            debug!("Stop sign visible");
            return ArbiterReport::default();
        }

        if !self.leading_vehicle_gone {
            warn!("Stop sign message received, but leading car has not left yet");
            return ArbiterReport::default();
        }

        match self.state {
            ArbitrationState::NotArrived => {
                let ticks = self.config.arrival_debounce_ticks;
                info!(settle_secs = ticks, "Arrived at the stop line");
                self.twelve_oclock_car = true;
                self.transition(ArbitrationState::ArrivedWaiting {
                    ticks_remaining: ticks,
                });
            }
            state => debug!(?state, "Repeated stop line signal ignored"),
        }
        self.finish(ArbiterReport::default())
    }

    /// Ultrasonic reading; inside a "just passed" band it counts as one
    /// departure regardless of what the camera saw
    pub fn on_distance_reading(&mut self, sender_stamp: u16, distance: f32) -> ArbiterReport {
        let mut report = ArbiterReport::default();
        if self.state != ArbitrationState::Arrived || self.queue.car_leave_timeout() > 0 {
            return report;
        }

        let Some(path) = self.detector.from_distance(sender_stamp, distance) else {
            return report;
        };
        info!(?path, distance, "Ultrasonic saw a car pass");

        if let Some(departure) = self.depart(None, path) {
            report.departures.push(departure);
        }
        self.finish(report)
    }

    /// The leading vehicle left the view. After SafeToGo this marks the end
    /// of the encounter.
    pub fn on_car_out_of_sight(&mut self) -> ArbiterReport {
        match self.state {
            ArbitrationState::SafeToGoSent => {
                info!("Intersection passed, resetting");
                self.queue.reset();
                self.twelve_oclock_car = false;
                self.leading_vehicle_gone = true;
                self.transition(ArbitrationState::NotArrived);
            }
            ArbitrationState::NotArrived => {
                if !self.leading_vehicle_gone {
                    info!("Leading car out of sight");
                    self.leading_vehicle_gone = true;
                }
            }
            state => debug!(?state, "Car out of sight while at the line, ignored"),
        }
        ArbiterReport::default()
    }

    /// Vehicle detections of one camera frame
    pub fn on_frame(&mut self, vehicles: &[BoundingBox]) -> ArbiterReport {
        let mut report = ArbiterReport::default();
        if !self.leading_vehicle_gone || self.state == ArbitrationState::SafeToGoSent {
            return report;
        }

        for bbox in vehicles {
            let obs = Observation::from(bbox);
            if let Some(departure) = self.observe(&obs) {
                report.departures.push(departure);
            }
        }
        self.finish(report)
    }

    /// One wall-clock second elapsed
    pub fn on_second_tick(&mut self) -> ArbiterReport {
        if let ArbitrationState::ArrivedWaiting { ticks_remaining } = self.state {
            let ticks_remaining = ticks_remaining.saturating_sub(1);
            debug!(ticks_remaining, "Settling at the stop line");
            if ticks_remaining == 0 {
                self.transition(ArbitrationState::Arrived);
            } else {
                self.state = ArbitrationState::ArrivedWaiting { ticks_remaining };
            }
        }
        self.queue.tick();
        self.finish(ArbiterReport::default())
    }

    pub fn state(&self) -> ArbitrationState {
        self.state
    }

    /// Stopped at the line and past the settle time
    pub fn stop_line_arrived(&self) -> bool {
        matches!(
            self.state,
            ArbitrationState::Arrived | ArbitrationState::SafeToGoSent
        )
    }

    pub fn leading_vehicle_gone(&self) -> bool {
        self.leading_vehicle_gone
    }

    pub fn cars_in_queue(&self) -> u32 {
        self.queue.cars_in_queue()
    }

    pub fn queue(&self) -> &VehicleQueue {
        &self.queue
    }

    pub fn snapshot(&self) -> ArbiterSnapshot {
        ArbiterSnapshot {
            state: self.state,
            leading_vehicle_gone: self.leading_vehicle_gone,
            cars_in_queue: self.queue.cars_in_queue(),
            car_leave_timeout: self.queue.car_leave_timeout(),
            occupied: LaneSlot::ALL
                .into_iter()
                .filter(|&slot| self.queue.is_occupied(slot))
                .collect(),
        }
    }

    fn observe(&mut self, obs: &Observation) -> Option<Departure> {
        debug!(
            x = obs.center.x,
            y = obs.center.y,
            area = obs.area,
            state = ?self.state,
            "Vehicle observation"
        );
        if self.state == ArbitrationState::Arrived {
            self.observe_at_line(obs)
        } else {
            self.observe_approaching(obs);
            None
        }
    }

    /// Before the settle time ends: fill slots and track the high-water mark
    fn observe_approaching(&mut self, obs: &Observation) {
        let slot = match self.classifier.classify(obs, false) {
            Placement::Slot(slot) => slot,
            Placement::LeftOrMiddle => LaneSlot::Middle,
            Placement::Ignored(reason) => {
                debug!(?reason, "Detection ignored");
                return;
            }
        };

        // A far-left detection is compared against the middle car when the
        // left slot is still empty: it may be that car sliding over.
        let reference = if self.queue.is_occupied(slot) {
            slot
        } else {
            LaneSlot::Middle
        };
        if let (Some(delta), Some(tracked)) = (
            self.queue.delta_from(reference, obs),
            self.queue.get(reference).copied(),
        ) {
            if !self.twelve_oclock_car
                && self
                    .classifier
                    .is_twelve_oclock_drift(obs, &tracked.last, &delta)
            {
                info!("Detected car on left side, probably the 12 o'clock car closing in");
                self.twelve_oclock_car = true;
            }
        }

        if slot == LaneSlot::Left && self.twelve_oclock_car {
            debug!("Left detection belongs to the 12 o'clock car, not assigned");
        } else if !self.queue.assign_if_empty(slot, obs) {
            self.queue.track(slot, obs);
        }

        self.queue.record_high_water();
    }

    /// At the line: match the detection to a queued vehicle and look for
    /// evidence it is leaving
    fn observe_at_line(&mut self, obs: &Observation) -> Option<Departure> {
        let placement = self.classifier.classify(obs, true);
        let band = match placement {
            Placement::Slot(slot) => slot,
            Placement::LeftOrMiddle => LaneSlot::Middle,
            Placement::Ignored(reason) => {
                debug!(?reason, "Detection ignored");
                return None;
            }
        };

        // A car crossing the frame leaves its own band; follow it from
        // whichever queued vehicle is closest.
        let slot = match self
            .queue
            .nearest_occupied(placement.candidates(), &obs.center)
        {
            Some(slot) => slot,
            None => {
                let slot = self.queue.nearest_occupied(&LaneSlot::ALL, &obs.center)?;
                debug!(%slot, ?placement, "Queued vehicle seen outside its band");
                slot
            }
        };

        let delta = self.queue.track(slot, obs)?;
        debug!(%slot, dx = delta.dx, dy = delta.dy, "Tracked vehicle moved");

        if self.queue.car_leave_timeout() > 0 {
            return None;
        }
        let path = self.detector.from_motion(band, obs, &delta)?;
        info!(?path, %slot, "Vehicle left the intersection");
        self.depart(Some(slot), path)
    }

    fn depart(&mut self, evidence: Option<LaneSlot>, path: DeparturePath) -> Option<Departure> {
        match self.queue.try_depart(evidence) {
            DepartureOutcome::Departed { slot, remaining } => Some(Departure {
                path,
                slot,
                remaining,
            }),
            DepartureOutcome::CoolingDown { .. } | DepartureOutcome::Empty => None,
        }
    }

    /// Latch SafeToGo once the queue has drained at the line
    fn finish(&mut self, mut report: ArbiterReport) -> ArbiterReport {
        if self.state == ArbitrationState::Arrived && self.queue.cars_in_queue() == 0 {
            info!("Intersection clear, waiting for direction");
            self.transition(ArbitrationState::SafeToGoSent);
            report.safe_to_go = true;
        }
        report
    }

    fn transition(&mut self, next: ArbitrationState) {
        info!(from = ?self.state, to = ?next, "Arbitration state change");
        self.state = next;
    }
}
