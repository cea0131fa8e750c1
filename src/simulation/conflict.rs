//! Yield decisions for every vehicle in a tick
//!
//! Vehicles are evaluated oldest first. A vehicle that is allowed to enter
//! the intersection box commits its axis for the rest of the tick, so a later
//! vehicle on the perpendicular axis sees the box as taken. That ordering is
//! the only tie-break; nothing here is random.

use ordered_float::OrderedFloat;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::ops::Bound;

use super::signal::TrafficLightState;
use super::types::{Axis, Direction, LightColor, VehicleId, VehicleStatus, STOP_LINE};
use super::vehicle::SimVehicle;
use crate::config::TrafficConfig;

/// Why a vehicle has to yield
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YieldReason {
    VehicleAhead,
    RedLight,
    YellowLight,
    IntersectionOccupied,
}

impl YieldReason {
    pub fn as_str(self) -> &'static str {
        match self {
            YieldReason::VehicleAhead => "vehicle ahead",
            YieldReason::RedLight => "red light",
            YieldReason::YellowLight => "yellow light",
            YieldReason::IntersectionOccupied => "intersection occupied",
        }
    }
}

impl fmt::Display for YieldReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of conflict detection for one vehicle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Verdict {
    pub yield_reason: Option<YieldReason>,
    /// Progress the vehicle's front must not pass this tick
    pub stop_at: Option<f32>,
    /// Vehicle is travelling a granted emergency corridor
    pub priority: bool,
}

impl Verdict {
    pub fn proceed(limit: Option<f32>, priority: bool) -> Self {
        Self {
            yield_reason: None,
            stop_at: limit,
            priority,
        }
    }

    pub fn yield_at(reason: YieldReason, stop_at: f32, priority: bool) -> Self {
        Self {
            yield_reason: Some(reason),
            stop_at: Some(stop_at),
            priority,
        }
    }

    pub fn must_yield(&self) -> bool {
        self.yield_reason.is_some()
    }
}

/// Signal-side input to conflict detection
pub trait RightOfWay {
    /// Light currently shown to an approach
    fn light_for(&self, direction: Direction) -> LightColor;

    /// Whether the vehicle rides a granted emergency corridor and may ignore
    /// lights and cross traffic
    fn has_priority(&self, vehicle: &SimVehicle) -> bool;
}

/// Right-of-way backed by the live signal state and preemption grant
pub struct SignalView<'a> {
    pub lights: &'a TrafficLightState,
    pub granted: Option<Axis>,
}

impl RightOfWay for SignalView<'_> {
    fn light_for(&self, direction: Direction) -> LightColor {
        self.lights.color(direction)
    }

    fn has_priority(&self, vehicle: &SimVehicle) -> bool {
        vehicle.vehicle_type.is_emergency() && self.granted == Some(vehicle.direction.axis())
    }
}

/// Vehicles per lane ordered by progress, for leader lookups
struct LaneIndex<'v> {
    lanes: HashMap<Direction, BTreeMap<(OrderedFloat<f32>, VehicleId), &'v SimVehicle>>,
}

impl<'v> LaneIndex<'v> {
    fn build(vehicles: &[&'v SimVehicle]) -> Self {
        let mut lanes: HashMap<Direction, BTreeMap<_, _>> = HashMap::new();
        for vehicle in vehicles {
            lanes
                .entry(vehicle.direction)
                .or_default()
                .insert((OrderedFloat(vehicle.progress), vehicle.id), *vehicle);
        }
        Self { lanes }
    }

    /// The nearest vehicle ahead in the same lane
    fn leader(&self, vehicle: &SimVehicle) -> Option<&'v SimVehicle> {
        let key = (OrderedFloat(vehicle.progress), vehicle.id);
        self.lanes
            .get(&vehicle.direction)?
            .range((Bound::Excluded(key), Bound::Unbounded))
            .next()
            .map(|(_, leader)| *leader)
    }
}

pub struct ConflictDetector<'a> {
    traffic: &'a TrafficConfig,
    delta_secs: f32,
}

impl<'a> ConflictDetector<'a> {
    pub fn new(traffic: &'a TrafficConfig, delta_secs: f32) -> Self {
        Self {
            traffic,
            delta_secs,
        }
    }

    /// Decide for each vehicle, in the given order, whether it must yield
    ///
    /// `vehicles` must be in creation order; the returned verdicts line up
    /// with it index for index.
    pub fn evaluate(&self, vehicles: &[&SimVehicle], view: &impl RightOfWay) -> Vec<Verdict> {
        let lanes = LaneIndex::build(vehicles);

        let occupied: HashSet<Axis> = vehicles
            .iter()
            .filter(|v| v.is_inside_box())
            .map(|v| v.direction.axis())
            .collect();
        let mut committed: HashSet<Axis> = HashSet::new();

        vehicles
            .iter()
            .map(|vehicle| self.judge(vehicle, &lanes, &occupied, &mut committed, view))
            .collect()
    }

    /// Leader's rear after this tick if it brakes as hard as it can. A leader
    /// that is already yielding is taken to stand still. The world still
    /// clamps each follower to where its leader actually ended up.
    fn projected_rear(&self, leader: &SimVehicle) -> f32 {
        if leader.status == VehicleStatus::Stopped {
            return leader.rear();
        }
        let slowest = (leader.speed - self.traffic.deceleration * self.delta_secs).max(0.0);
        leader.rear() + slowest * self.traffic.distance_per_kmh * self.delta_secs
    }

    fn judge(
        &self,
        vehicle: &SimVehicle,
        lanes: &LaneIndex<'_>,
        occupied: &HashSet<Axis>,
        committed: &mut HashSet<Axis>,
        view: &impl RightOfWay,
    ) -> Verdict {
        let priority = view.has_priority(vehicle);
        let leader = lanes.leader(vehicle);
        let leader_rear = leader.map(|l| self.projected_rear(l));
        let leader_limit = leader_rear.map(|rear| rear - self.traffic.min_gap);

        // Car ahead
        if let (Some(leader), Some(rear)) = (leader, leader_rear) {
            let gap = rear - vehicle.progress;
            let following = self.traffic.min_following_distance
                + self.traffic.braking_distance(vehicle.speed, self.delta_secs);
            let closing = leader.speed < vehicle.speed || leader.status == VehicleStatus::Stopped;
            if gap <= self.traffic.min_gap || (gap < following && closing) {
                return Verdict::yield_at(
                    YieldReason::VehicleAhead,
                    rear - self.traffic.min_gap,
                    priority,
                );
            }
        }

        if !vehicle.is_approaching() {
            return Verdict::proceed(leader_limit, priority);
        }

        let room = STOP_LINE - vehicle.progress;
        let horizon = self.traffic.braking_distance(vehicle.speed, self.delta_secs)
            + self.traffic.decision_margin;
        if room > horizon {
            return Verdict::proceed(leader_limit, priority);
        }

        let axis = vehicle.direction.axis();
        let stop_line = leader_limit.map_or(STOP_LINE, |limit| limit.min(STOP_LINE));

        if !priority {
            // Red / yellow light
            match view.light_for(vehicle.direction) {
                LightColor::Red => {
                    return Verdict::yield_at(YieldReason::RedLight, stop_line, priority);
                }
                LightColor::Yellow => {
                    // Too close to stop comfortably: clear the box instead
                    if room >= self.traffic.braking_distance(vehicle.speed, 0.0) {
                        return Verdict::yield_at(YieldReason::YellowLight, stop_line, priority);
                    }
                }
                LightColor::Green => {}
            }

            // Intersection occupancy
            let cross = axis.perpendicular();
            if occupied.contains(&cross) || committed.contains(&cross) {
                return Verdict::yield_at(YieldReason::IntersectionOccupied, stop_line, priority);
            }
        }

        committed.insert(axis);
        Verdict::proceed(leader_limit, priority)
    }
}
