//! Main simulation world that ties everything together
//!
//! `SimWorld` owns every piece of mutable state: the vehicle set and its
//! entry queue, the signal controller, the preemption manager and the event
//! log. It has no notion of
//! wall-clock time; callers drive it one `tick` at a time.

use log::{debug, info};
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::Rng;
use rand::SeedableRng;
use std::collections::{BTreeMap, VecDeque};

use super::conflict::{ConflictDetector, SignalView, Verdict};
use super::events::{EventLog, EventType, SimulationEvent};
use super::preemption::PreemptionManager;
use super::seed::{self, VehicleSeed};
use super::signal::{SignalController, SignalPhase, TrafficLightState};
use super::snapshot::{StateSnapshot, VehicleSnapshot};
use super::stats::SimulationStats;
use super::types::{Direction, Telemetry, VehicleId, VehicleType};
use super::vehicle::{SimVehicle, VehicleUpdateResult};
use crate::config::SimConfig;
use crate::error::EngineError;

/// What a single tick changed
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    /// Vehicles removed after passing the far boundary
    pub exited: Vec<VehicleId>,
    /// Events appended since the previous tick
    pub events: Vec<SimulationEvent>,
    /// New signal phase, if the cycle moved on
    pub phase_change: Option<SignalPhase>,
}

/// A created vehicle that is not on its approach yet
#[derive(Debug, Clone)]
struct EntryRequest {
    id: VehicleId,
    vehicle_type: VehicleType,
    direction: Direction,
    speed: f32,
    telemetry: Option<Telemetry>,
}

/// Free spot on an approach
#[derive(Debug, Clone, Copy)]
struct EntrySlot {
    progress: f32,
    /// Fastest entry speed that can still stop behind the vehicle ahead
    speed_cap: f32,
}

/// The main simulation world
pub struct SimWorld {
    config: SimConfig,

    /// Active vehicles, keyed (and therefore ordered) by creation
    vehicles: BTreeMap<VehicleId, SimVehicle>,

    /// Vehicles that found no room on their approach yet, oldest first
    waiting: VecDeque<EntryRequest>,

    signals: SignalController,

    preemption: PreemptionManager,

    events: EventLog,

    /// Whether the clock should be ticking this world
    running: bool,

    /// Next ID to assign
    next_id: u64,

    /// Simulated seconds since creation
    pub time: f32,

    /// Ticks applied since creation
    ticks: u64,

    /// Optional seeded RNG for reproducible simulations
    rng: Option<StdRng>,

    total_spawned: u64,
    total_exited: u64,
}

impl Default for SimWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl SimWorld {
    pub fn new() -> Self {
        Self::with_config(SimConfig::default())
    }

    /// Create a new SimWorld with a seeded RNG for reproducible simulations
    pub fn new_with_seed(seed: u64) -> Self {
        let mut config = SimConfig::default();
        config.engine.seed = Some(seed);
        Self::with_config(config)
    }

    pub fn with_config(config: SimConfig) -> Self {
        let rng = config.engine.seed.map(StdRng::seed_from_u64);
        Self {
            signals: SignalController::new(&config.signals),
            preemption: PreemptionManager::new(config.engine.emergency_priority),
            events: EventLog::with_capacity(config.events.capacity),
            vehicles: BTreeMap::new(),
            waiting: VecDeque::new(),
            running: false,
            next_id: 1,
            time: 0.0,
            ticks: 0,
            rng,
            total_spawned: 0,
            total_exited: 0,
            config,
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Get a random value in the given range, using seeded RNG if available
    fn random_range(&mut self, range: std::ops::Range<f32>) -> f32 {
        match &mut self.rng {
            Some(rng) => rng.random_range(range),
            None => rand::rng().random_range(range),
        }
    }

    /// Choose a random element from a slice, using seeded RNG if available
    fn choose_random<'a, T>(&mut self, slice: &'a [T]) -> Option<&'a T> {
        match &mut self.rng {
            Some(rng) => slice.choose(rng),
            None => slice.choose(&mut rand::rng()),
        }
    }

    fn random_speed(&mut self, vehicle_type: VehicleType) -> f32 {
        match &mut self.rng {
            Some(rng) => seed::random_speed(rng, vehicle_type),
            None => seed::random_speed(&mut rand::rng(), vehicle_type),
        }
    }

    fn random_telemetry(&mut self) -> Telemetry {
        match &mut self.rng {
            Some(rng) => seed::random_telemetry(rng),
            None => seed::random_telemetry(&mut rand::rng()),
        }
    }

    fn next_vehicle_id(&mut self) -> VehicleId {
        let id = VehicleId(self.next_id);
        self.next_id += 1;
        id
    }

    // ---------------------------------------------------------------------
    // Commands
    // ---------------------------------------------------------------------

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Mark the world as running. Repeated calls are no-ops.
    pub fn start(&mut self) {
        if self.running {
            return;
        }
        self.running = true;
        info!("Simulation started at {:.1}s", self.time);
        self.events
            .append(self.time, EventType::Resumed, "Simulation started");
    }

    /// Mark the world as stopped, keeping every vehicle and light as it is.
    /// Repeated calls are no-ops.
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;
        info!("Simulation stopped at {:.1}s", self.time);
        self.events
            .append(self.time, EventType::Stopped, "Simulation stopped");
    }

    /// Remove every vehicle, waiting ones included. Lights and the running
    /// flag are untouched; an open emergency corridor is released on the next
    /// tick.
    pub fn clear_all(&mut self) {
        let removed = self.vehicles.len() + self.waiting.len();
        self.vehicles.clear();
        self.waiting.clear();
        info!("Cleared {removed} vehicles");
    }

    /// Add `count` civilian vehicles to the named approach
    pub fn add_vehicles(
        &mut self,
        direction: &str,
        count: usize,
    ) -> Result<Vec<VehicleId>, EngineError> {
        let direction: Direction = direction.parse()?;
        self.add_vehicles_to(direction, count)
    }

    pub fn add_vehicles_to(
        &mut self,
        direction: Direction,
        count: usize,
    ) -> Result<Vec<VehicleId>, EngineError> {
        let limit = self.config.traffic.max_vehicles_per_command;
        if count > limit {
            return Err(EngineError::InvalidCount {
                requested: count,
                limit,
            });
        }
        if count == 0 {
            return Ok(Vec::new());
        }

        let mut ids = Vec::with_capacity(count);
        for _ in 0..count {
            let vehicle_type = *self
                .choose_random(&VehicleType::CIVILIAN)
                .unwrap_or(&VehicleType::Sedan);
            let speed = self.random_speed(vehicle_type);
            let telemetry = self.random_telemetry();
            ids.push(self.spawn(direction, vehicle_type, speed, Some(telemetry)));
        }

        info!("Added {count} vehicles to the {direction} approach");
        self.events.append(
            self.time,
            EventType::VehiclesAdded,
            format!("Added {count} vehicles heading {direction}"),
        );
        Ok(ids)
    }

    /// Add an ambulance to the named approach and request its corridor
    pub fn add_ambulance(&mut self, direction: &str) -> Result<VehicleId, EngineError> {
        let direction: Direction = direction.parse()?;
        Ok(self.add_ambulance_to(direction))
    }

    pub fn add_ambulance_to(&mut self, direction: Direction) -> VehicleId {
        let speed = self.random_speed(VehicleType::Ambulance);
        let telemetry = self.random_telemetry();
        let id = self.spawn(direction, VehicleType::Ambulance, speed, Some(telemetry));

        info!("Ambulance {id} dispatched heading {direction}");
        self.events.append(
            self.time,
            EventType::AmbulanceAdded,
            format!("Ambulance {id} dispatched heading {direction}"),
        );
        self.preemption.on_ambulance_added(
            id,
            direction,
            &mut self.signals,
            &mut self.events,
            self.time,
        );
        id
    }

    /// Remove one vehicle, on the road or still waiting, releasing its
    /// emergency corridor if it held one. Returns whether it existed.
    pub fn remove_vehicle(&mut self, id: VehicleId) -> bool {
        let removed = self.vehicles.remove(&id).map(|v| v.vehicle_type).or_else(|| {
            let index = self.waiting.iter().position(|w| w.id == id)?;
            self.waiting.remove(index).map(|w| w.vehicle_type)
        });
        let Some(vehicle_type) = removed else {
            return false;
        };
        if vehicle_type.is_emergency() {
            self.preemption.on_ambulance_cleared(
                id,
                &mut self.signals,
                &mut self.events,
                self.time,
            );
        }
        true
    }

    /// Synthetic vehicle descriptors for an initial population
    pub fn vehicle_seed(&mut self, count: usize) -> Vec<VehicleSeed> {
        match &mut self.rng {
            Some(rng) => seed::generate_seeds(rng, count),
            None => seed::generate_seeds(&mut rand::rng(), count),
        }
    }

    /// Place seeded vehicles, spreading them over the approaches in turn
    pub fn populate(&mut self, seeds: Vec<VehicleSeed>) -> Vec<VehicleId> {
        let count = seeds.len();
        let mut ids = Vec::with_capacity(count);
        for (i, seed) in seeds.into_iter().enumerate() {
            let direction = Direction::ALL[i % Direction::ALL.len()];
            let id = self.spawn(
                direction,
                seed.vehicle_type,
                seed.speed,
                Some(seed.telemetry),
            );
            if seed.vehicle_type.is_emergency() {
                self.preemption.on_ambulance_added(
                    id,
                    direction,
                    &mut self.signals,
                    &mut self.events,
                    self.time,
                );
            }
            ids.push(id);
        }
        if count > 0 {
            info!("Populated {count} seeded vehicles");
            self.events.append(
                self.time,
                EventType::VehiclesAdded,
                format!("Seeded {count} vehicles across all approaches"),
            );
        }
        ids
    }

    /// Populate `vehicles_per_road` seeded vehicles on every approach
    pub fn seed_initial(&mut self) -> Vec<VehicleId> {
        let seeds = self.vehicle_seed(self.config.engine.vehicles_per_road * Direction::ALL.len());
        self.populate(seeds)
    }

    /// Runtime-adjustable settings
    pub fn update_settings(
        &mut self,
        vehicles_per_road: Option<usize>,
        emergency_priority: Option<bool>,
    ) {
        if let Some(per_road) = vehicles_per_road {
            self.config.engine.vehicles_per_road = per_road;
        }
        if let Some(enabled) = emergency_priority {
            self.config.engine.emergency_priority = enabled;
            self.preemption.set_enabled(enabled);
        }
        info!(
            "Settings updated: vehicles_per_road={}, emergency_priority={}",
            self.config.engine.vehicles_per_road, self.config.engine.emergency_priority
        );
    }

    /// Create a vehicle and put it on its approach, or in the entry queue
    /// when the approach is backed up past the entry
    fn spawn(
        &mut self,
        direction: Direction,
        vehicle_type: VehicleType,
        speed: f32,
        telemetry: Option<Telemetry>,
    ) -> VehicleId {
        let id = self.next_vehicle_id();
        self.total_spawned += 1;
        let request = EntryRequest {
            id,
            vehicle_type,
            direction,
            speed,
            telemetry,
        };

        // Vehicles enter an approach in the order they were created
        if self.waiting.iter().any(|w| w.direction == direction) {
            debug!("{id} joins the entry queue heading {direction}");
            self.waiting.push_back(request);
            return id;
        }

        let traffic = &self.config.traffic;
        let (spawn_min, spawn_max) = (traffic.spawn_min, traffic.spawn_max);
        let candidate = if spawn_max > spawn_min {
            self.random_range(spawn_min..spawn_max)
        } else {
            spawn_min
        };
        if let Err(request) = self.try_enter(request, candidate) {
            debug!("No room heading {direction}; {id} waits to enter");
            self.waiting.push_back(request);
        }
        id
    }

    fn try_enter(&mut self, request: EntryRequest, candidate: f32) -> Result<(), EntryRequest> {
        let length = request.vehicle_type.length();
        let Some(slot) = self.entry_slot(request.direction, candidate, length) else {
            return Err(request);
        };

        let mut vehicle = SimVehicle::new(
            request.id,
            request.vehicle_type,
            request.direction,
            slot.progress,
            request.speed,
            request.telemetry,
        );
        vehicle.speed = vehicle.speed.min(slot.speed_cap);
        debug!(
            "Spawned {} ({:?}) heading {} at progress {:.1}, {:.1} km/h",
            vehicle.id, vehicle.vehicle_type, vehicle.direction, vehicle.progress, vehicle.speed
        );
        self.vehicles.insert(vehicle.id, vehicle);
        Ok(())
    }

    /// Let waiting vehicles onto approaches that have room again
    fn admit_waiting(&mut self) {
        let candidate = self.config.traffic.spawn_min;
        let mut blocked: Vec<Direction> = Vec::new();
        let mut still_waiting = VecDeque::with_capacity(self.waiting.len());

        while let Some(request) = self.waiting.pop_front() {
            if blocked.contains(&request.direction) {
                still_waiting.push_back(request);
                continue;
            }
            if let Err(request) = self.try_enter(request, candidate) {
                blocked.push(request.direction);
                still_waiting.push_back(request);
            }
        }
        self.waiting = still_waiting;
    }

    /// Walk `candidate` backwards until a body of `length` fits in the lane.
    ///
    /// Ahead of the new vehicle there must be the following distance; its
    /// entry speed is capped so it can stop within whatever is left. Behind
    /// it, the vehicle already there must keep its full following distance
    /// at its current speed. `None` when the spot would lie further behind
    /// the entry than the queue allows.
    fn entry_slot(&self, direction: Direction, candidate: f32, length: f32) -> Option<EntrySlot> {
        let traffic = &self.config.traffic;
        let delta_secs = self.config.clock.delta_secs;
        let mut lane: Vec<&SimVehicle> = self
            .vehicles
            .values()
            .filter(|v| v.direction == direction)
            .collect();
        lane.sort_by(|a, b| b.progress.total_cmp(&a.progress));

        let mut front = candidate;
        for other in &lane {
            let clear_behind = front + traffic.min_following_distance <= other.rear();
            let clear_ahead = front - length
                - traffic.min_following_distance
                - traffic.braking_distance(other.speed, delta_secs)
                >= other.progress;
            if !clear_behind && !clear_ahead {
                front = other.rear() - traffic.min_following_distance;
            }
        }

        if front - length < -traffic.entry_queue_length {
            return None;
        }

        let speed_cap = lane
            .iter()
            .filter(|v| v.rear() >= front)
            .map(|v| v.rear() - front)
            .reduce(f32::min)
            .map_or(f32::INFINITY, |gap| {
                traffic.speed_within(gap - traffic.min_following_distance, delta_secs)
            });
        Some(EntrySlot {
            progress: front,
            speed_cap,
        })
    }

    // ---------------------------------------------------------------------
    // Tick
    // ---------------------------------------------------------------------

    /// Advance the world by `delta_secs` simulated seconds
    ///
    /// Order: entry queue, signals and preemption, conflict detection,
    /// kinematics, removal of exited vehicles, event flush.
    pub fn tick(&mut self, delta_secs: f32) -> TickReport {
        self.time += delta_secs;
        self.ticks += 1;

        self.admit_waiting();

        // Signals and preemption
        let (vehicles, waiting) = (&self.vehicles, &self.waiting);
        self.preemption.sync(
            |id| {
                waiting.iter().any(|w| w.id == id)
                    || vehicles.get(&id).is_some_and(|v| !v.has_cleared_box())
            },
            &mut self.signals,
            &mut self.events,
            self.time,
        );
        let phase_change = self.signals.advance(delta_secs);

        // Conflict detection over a consistent view of the vehicle set
        let verdicts: BTreeMap<VehicleId, Verdict> = {
            let ordered: Vec<&SimVehicle> = self.vehicles.values().collect();
            let view = SignalView {
                lights: self.signals.lights(),
                granted: self.preemption.granted(),
            };
            let verdicts =
                ConflictDetector::new(&self.config.traffic, delta_secs).evaluate(&ordered, &view);
            ordered.iter().map(|v| v.id).zip(verdicts).collect()
        };

        // Kinematics, front to back in every lane so each follower is held
        // behind where its leader actually ended up
        let mut lane_order: Vec<(Direction, f32, VehicleId)> = self
            .vehicles
            .values()
            .map(|v| (v.direction, v.progress, v.id))
            .collect();
        lane_order.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.total_cmp(&a.1)));

        let min_gap = self.config.traffic.min_gap;
        let mut exited = Vec::new();
        let mut leader_rear: Option<(Direction, f32)> = None;
        for (direction, _, id) in lane_order {
            let (Some(vehicle), Some(verdict)) = (self.vehicles.get_mut(&id), verdicts.get(&id))
            else {
                continue;
            };
            let mut verdict = *verdict;
            if let Some((_, rear)) = leader_rear.filter(|(lane, _)| *lane == direction) {
                let limit = rear - min_gap;
                verdict.stop_at = Some(verdict.stop_at.map_or(limit, |stop| stop.min(limit)));
            }
            if vehicle.update(&verdict, delta_secs, &self.config.traffic)
                == VehicleUpdateResult::ExitedBounds
            {
                exited.push(id);
            }
            leader_rear = Some((direction, vehicle.rear()));
        }
        exited.sort();

        // Removals
        for id in &exited {
            if let Some(vehicle) = self.vehicles.remove(id) {
                self.total_exited += 1;
                debug!("{id} left the simulation heading {}", vehicle.direction);
                if vehicle.vehicle_type.is_emergency() {
                    self.preemption.on_ambulance_cleared(
                        *id,
                        &mut self.signals,
                        &mut self.events,
                        self.time,
                    );
                }
            }
        }

        TickReport {
            exited,
            events: self.flush_events(),
            phase_change,
        }
    }

    /// Take the events appended since the last flush, logging each
    pub fn flush_events(&mut self) -> Vec<SimulationEvent> {
        let events = self.events.flush();
        for event in &events {
            info!("[{:.1}s] {:?}: {}", event.timestamp, event.event_type, event.message);
        }
        events
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    pub fn vehicles(&self) -> impl Iterator<Item = &SimVehicle> {
        self.vehicles.values()
    }

    pub fn vehicle(&self, id: VehicleId) -> Option<&SimVehicle> {
        self.vehicles.get(&id)
    }

    pub fn vehicle_count(&self) -> usize {
        self.vehicles.len()
    }

    /// Vehicles created but still waiting to enter their approach
    pub fn waiting_count(&self) -> usize {
        self.waiting.len()
    }

    pub fn lights(&self) -> &TrafficLightState {
        self.signals.lights()
    }

    pub fn signal_phase(&self) -> SignalPhase {
        self.signals.phase()
    }

    pub fn emergency_active(&self) -> bool {
        self.preemption.is_active()
    }

    pub fn preemption(&self) -> &PreemptionManager {
        &self.preemption
    }

    pub fn event_log(&self) -> &EventLog {
        &self.events
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            vehicles: self.vehicles.values().map(VehicleSnapshot::from).collect(),
            traffic_lights: *self.signals.lights(),
            events: self.events.recent(self.events.capacity()),
            waiting_vehicles: self.waiting.len(),
            emergency_active: self.preemption.is_active(),
            running: self.running,
            signal_phase: self.signals.phase(),
            time: self.time,
            tick: self.ticks,
        }
    }

    pub fn stats(&self) -> SimulationStats {
        SimulationStats::collect(
            self.vehicles.values(),
            self.waiting.len(),
            self.total_spawned,
            self.total_exited,
            self.time,
        )
    }

    /// Print a summary of the simulation state
    pub fn print_summary(&self) {
        let lights = self.signals.lights();
        println!("=== Intersection Simulation Summary ===");
        println!("Time: {:.2}s ({} ticks)", self.time, self.ticks);
        println!("Running: {}", self.running);
        println!("Signal phase: {}", self.signals.phase());
        println!(
            "Lights: N={:?} S={:?} E={:?} W={:?}",
            lights.north, lights.south, lights.east, lights.west
        );
        println!("Emergency active: {}", self.preemption.is_active());
        println!(
            "Vehicles: {} ({} waiting to enter)",
            self.vehicles.len(),
            self.waiting.len()
        );
        println!();

        if !self.vehicles.is_empty() {
            println!("--- Active Vehicles ---");
            for vehicle in self.vehicles.values() {
                println!(
                    "  {} {:?} heading {}: pos=({:.0}, {:.0}) speed={:.1}/{:.1} {:?} ({})",
                    vehicle.id,
                    vehicle.vehicle_type,
                    vehicle.direction,
                    vehicle.position.x,
                    vehicle.position.y,
                    vehicle.speed,
                    vehicle.original_speed(),
                    vehicle.status,
                    vehicle.status_reason
                );
            }
            println!();
        }

        let recent = self.events.recent(5);
        if !recent.is_empty() {
            println!("--- Recent Events ---");
            for event in recent {
                println!("  [{:.1}s] {}", event.timestamp, event.message);
            }
        }
    }
}
