//! Simulation configuration
//!
//! Every value has a default, so an empty TOML file (or no file at all) yields
//! a working setup. Distances are in plane units, speeds in km/h.

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::simulation::{Axis, STOP_LINE};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub clock: ClockConfig,
    pub signals: SignalConfig,
    pub traffic: TrafficConfig,
    pub events: EventConfig,
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    /// Wall-clock cadence of the tick loop
    pub tick_interval_ms: u64,
    /// Simulated seconds advanced per tick
    pub delta_secs: f32,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100,
            delta_secs: 0.1,
        }
    }
}

impl ClockConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    /// Green dwell per axis, simulated seconds
    pub green_secs: f32,
    /// Yellow dwell, simulated seconds
    pub yellow_secs: f32,
    /// Axis that starts green
    pub initial_green: Axis,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            green_secs: 10.0,
            yellow_secs: 3.0,
            initial_green: Axis::EastWest,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrafficConfig {
    /// Gap kept behind a slower or stopped leader on top of braking distance
    pub min_following_distance: f32,
    /// Bumper-to-bumper gap no vehicle may close below
    pub min_gap: f32,
    /// Slack added to braking distance when deciding to yield at the stop line
    pub decision_margin: f32,
    /// km/h gained per simulated second while recovering cruising speed
    pub acceleration: f32,
    /// km/h shed per simulated second while yielding
    pub deceleration: f32,
    /// Plane units travelled per simulated second per km/h
    pub distance_per_kmh: f32,
    /// Spawn progress range measured from the lane's entry edge
    pub spawn_min: f32,
    pub spawn_max: f32,
    /// How far behind the lane entry vehicles may queue before further
    /// arrivals wait off the road
    pub entry_queue_length: f32,
    /// Upper bound on vehicles added by one command
    pub max_vehicles_per_command: usize,
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            min_following_distance: 25.0,
            min_gap: 8.0,
            decision_margin: 10.0,
            acceleration: 30.0,
            deceleration: 80.0,
            distance_per_kmh: 2.0,
            spawn_min: 50.0,
            spawn_max: 200.0,
            entry_queue_length: 400.0,
            max_vehicles_per_command: 50,
        }
    }
}

impl TrafficConfig {
    /// Distance needed to stop from `speed` km/h, including one tick of travel
    pub fn braking_distance(&self, speed: f32, delta_secs: f32) -> f32 {
        let travel = speed * self.distance_per_kmh;
        let braking = speed * speed * self.distance_per_kmh / (2.0 * self.deceleration);
        braking + travel * delta_secs
    }

    /// Highest speed whose braking distance fits in `room`
    pub fn speed_within(&self, room: f32, delta_secs: f32) -> f32 {
        if room <= 0.0 {
            return 0.0;
        }
        // Positive root of braking_distance(v) = room
        let a = self.distance_per_kmh / (2.0 * self.deceleration);
        let b = self.distance_per_kmh * delta_secs;
        (-b + (b * b + 4.0 * a * room).sqrt()) / (2.0 * a)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventConfig {
    /// Number of events retained before the oldest are dropped
    pub capacity: usize,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self { capacity: 50 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Ambulances preempt the signals when set
    pub emergency_priority: bool,
    /// Seed vehicles generated per approach at startup
    pub vehicles_per_road: usize,
    /// Fixed RNG seed for reproducible runs
    pub seed: Option<u64>,
    /// Upper bound on a single hook invocation
    pub hook_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            emergency_priority: true,
            vehicles_per_road: 5,
            seed: None,
            hook_timeout_ms: 500,
        }
    }
}

impl EngineConfig {
    pub fn hook_timeout(&self) -> Duration {
        Duration::from_millis(self.hook_timeout_ms)
    }
}

impl SimConfig {
    /// Load and validate a TOML configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: SimConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.clock.tick_interval_ms > 0, "clock.tick_interval_ms must be positive");
        ensure!(self.clock.delta_secs > 0.0, "clock.delta_secs must be positive");
        ensure!(self.signals.green_secs > 0.0, "signals.green_secs must be positive");
        ensure!(self.signals.yellow_secs > 0.0, "signals.yellow_secs must be positive");

        let traffic = &self.traffic;
        ensure!(traffic.acceleration > 0.0, "traffic.acceleration must be positive");
        ensure!(traffic.deceleration > 0.0, "traffic.deceleration must be positive");
        ensure!(traffic.distance_per_kmh > 0.0, "traffic.distance_per_kmh must be positive");
        ensure!(traffic.min_gap >= 0.0, "traffic.min_gap must not be negative");
        ensure!(
            traffic.min_following_distance >= traffic.min_gap,
            "traffic.min_following_distance must be at least traffic.min_gap"
        );
        ensure!(
            traffic.spawn_min <= traffic.spawn_max,
            "traffic.spawn_min must not exceed traffic.spawn_max"
        );
        ensure!(
            traffic.spawn_max < STOP_LINE,
            "traffic.spawn_max must place vehicles before the stop line ({STOP_LINE})"
        );
        ensure!(
            traffic.entry_queue_length >= 0.0,
            "traffic.entry_queue_length must not be negative"
        );
        ensure!(
            traffic.max_vehicles_per_command > 0,
            "traffic.max_vehicles_per_command must be positive"
        );

        ensure!(self.events.capacity > 0, "events.capacity must be positive");
        Ok(())
    }
}
