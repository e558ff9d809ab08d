//! Lane slot occupancy and the cars-in-queue counter

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::geometry::{MotionDelta, Observation, Point};

/// Position of a waiting vehicle relative to us
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LaneSlot {
    Left,
    Middle,
    Right,
}

impl LaneSlot {
    /// All slots, in the order departures are attributed when ambiguous
    pub const ALL: [LaneSlot; 3] = [LaneSlot::Left, LaneSlot::Middle, LaneSlot::Right];

    fn index(self) -> usize {
        match self {
            LaneSlot::Left => 0,
            LaneSlot::Middle => 1,
            LaneSlot::Right => 2,
        }
    }
}

impl fmt::Display for LaneSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LaneSlot::Left => "left",
            LaneSlot::Middle => "middle",
            LaneSlot::Right => "right",
        };
        f.write_str(name)
    }
}

/// Vehicle occupying a slot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackedVehicle {
    /// Most recent center
    pub last: Point,
    /// Most recent bounding box area
    pub last_area: f64,
}

impl TrackedVehicle {
    fn new(obs: &Observation) -> Self {
        Self {
            last: obs.center,
            last_area: obs.area,
        }
    }
}

/// Result of a departure attempt
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DepartureOutcome {
    /// A vehicle left; `slot` is `None` when no slot was occupied
    Departed {
        slot: Option<LaneSlot>,
        remaining: u32,
    },
    /// A departure was counted too recently
    CoolingDown { ticks_left: u32 },
    /// Nobody is queued
    Empty,
}

/// Occupancy of the three lane slots for one intersection encounter.
///
/// `cars_in_queue` is a high-water mark of simultaneously occupied slots; it
/// grows through [`record_high_water`](Self::record_high_water) and shrinks
/// only through [`try_depart`](Self::try_depart).
#[derive(Debug, Clone)]
pub struct VehicleQueue {
    slots: [Option<TrackedVehicle>; 3],
    cars_in_queue: u32,
    car_leave_timeout: u32,
    cooldown_ticks: u32,
}

impl VehicleQueue {
    /// Create an empty queue; departures arm a cooldown of `cooldown_ticks`
    pub fn new(cooldown_ticks: u32) -> Self {
        Self {
            slots: [None; 3],
            cars_in_queue: 0,
            car_leave_timeout: 0,
            cooldown_ticks,
        }
    }

    /// Occupy `slot` if it is empty. An occupied slot keeps tracking the
    /// vehicle it already has.
    pub fn assign_if_empty(&mut self, slot: LaneSlot, obs: &Observation) -> bool {
        let entry = &mut self.slots[slot.index()];
        if entry.is_some() {
            return false;
        }
        *entry = Some(TrackedVehicle::new(obs));
        info!(%slot, x = obs.center.x, y = obs.center.y, "Vehicle added to queue");
        true
    }

    /// Motion of `obs` relative to the vehicle in `slot`, without updating it
    pub fn delta_from(&self, slot: LaneSlot, obs: &Observation) -> Option<MotionDelta> {
        self.slots[slot.index()]
            .as_ref()
            .map(|vehicle| MotionDelta::between(&vehicle.last, &obs.center))
    }

    /// Update the vehicle in `slot` with a new observation, returning how far
    /// it moved since the last one
    pub fn track(&mut self, slot: LaneSlot, obs: &Observation) -> Option<MotionDelta> {
        let vehicle = self.slots[slot.index()].as_mut()?;
        let delta = MotionDelta::between(&vehicle.last, &obs.center);
        vehicle.last = obs.center;
        vehicle.last_area = obs.area;
        Some(delta)
    }

    /// Occupied slot among `candidates` whose vehicle is closest to `point`
    pub fn nearest_occupied(&self, candidates: &[LaneSlot], point: &Point) -> Option<LaneSlot> {
        candidates
            .iter()
            .filter_map(|&slot| self.get(slot).map(|v| (slot, v.last.distance_to(point))))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(slot, _)| slot)
    }

    /// Raise `cars_in_queue` to the current number of occupied slots
    pub fn record_high_water(&mut self) -> u32 {
        let occupied = self.occupied_count();
        if occupied > self.cars_in_queue {
            self.cars_in_queue = occupied;
            info!(cars_in_queue = self.cars_in_queue, "Queue grew");
        }
        self.cars_in_queue
    }

    /// Remove one departed vehicle.
    ///
    /// `evidence` names the slot the departure was observed in, if known.
    /// Without it the first occupied slot (left, middle, right) is cleared;
    /// with several cars queued that attribution is a guess.
    pub fn try_depart(&mut self, evidence: Option<LaneSlot>) -> DepartureOutcome {
        if self.car_leave_timeout > 0 {
            debug!(ticks_left = self.car_leave_timeout, "Departure ignored, cooling down");
            return DepartureOutcome::CoolingDown {
                ticks_left: self.car_leave_timeout,
            };
        }
        if self.cars_in_queue == 0 {
            return DepartureOutcome::Empty;
        }

        let slot = match evidence {
            Some(slot) if self.is_occupied(slot) => Some(slot),
            Some(slot) => {
                warn!(%slot, "Departure seen in an empty slot, attributing to first occupied");
                self.first_occupied()
            }
            None => {
                if self.occupied_count() > 1 {
                    info!(
                        "{} cars queued, cannot tell which one left; removing first occupied slot",
                        self.occupied_count()
                    );
                }
                self.first_occupied()
            }
        };

        if let Some(slot) = slot {
            self.slots[slot.index()] = None;
            info!(%slot, "Vehicle removed from queue");
        }

        self.cars_in_queue -= 1;
        self.car_leave_timeout = self.cooldown_ticks;
        info!(
            remaining = self.cars_in_queue,
            cooldown = self.car_leave_timeout,
            "Departure counted"
        );

        DepartureOutcome::Departed {
            slot,
            remaining: self.cars_in_queue,
        }
    }

    /// Advance the cooldown by one second; true when it just expired
    pub fn tick(&mut self) -> bool {
        if self.car_leave_timeout == 0 {
            return false;
        }
        self.car_leave_timeout -= 1;
        if self.car_leave_timeout == 0 {
            info!("Departure cooldown expired");
            return true;
        }
        false
    }

    /// Forget everything for the next encounter
    pub fn reset(&mut self) {
        self.slots = [None; 3];
        self.cars_in_queue = 0;
        self.car_leave_timeout = 0;
    }

    pub fn get(&self, slot: LaneSlot) -> Option<&TrackedVehicle> {
        self.slots[slot.index()].as_ref()
    }

    pub fn is_occupied(&self, slot: LaneSlot) -> bool {
        self.slots[slot.index()].is_some()
    }

    pub fn occupied_count(&self) -> u32 {
        self.slots.iter().filter(|s| s.is_some()).count() as u32
    }

    pub fn cars_in_queue(&self) -> u32 {
        self.cars_in_queue
    }

    pub fn car_leave_timeout(&self) -> u32 {
        self.car_leave_timeout
    }

    fn first_occupied(&self) -> Option<LaneSlot> {
        LaneSlot::ALL.into_iter().find(|&slot| self.is_occupied(slot))
    }
}
