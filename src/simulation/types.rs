//! Core types for the intersection simulation
//!
//! Geometry lives on a 1000x1000 plane with y growing downwards. The
//! intersection box spans [400, 600] on both axes and every approach has a
//! single lane offset from the centre line.

use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::EngineError;

/// Side length of the simulation plane
pub const WORLD_SIZE: f32 = 1000.0;

/// Progress at which a vehicle's front reaches the intersection box (stop line)
pub const STOP_LINE: f32 = 400.0;

/// Progress at which the far edge of the intersection box lies
pub const BOX_EXIT: f32 = 600.0;

/// Lane centre offsets: travel on the right-hand side of the centre line
const LANE_NEAR: f32 = 450.0;
const LANE_FAR: f32 = 550.0;

/// A unique, monotonically assigned vehicle identifier
///
/// Ordering follows creation order, which is what the conflict detector
/// relies on to break ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VehicleId(pub u64);

impl fmt::Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "V{:04}", self.0)
    }
}

impl Serialize for VehicleId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Direction of travel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    North,
    South,
    East,
    West,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::North,
        Direction::South,
        Direction::East,
        Direction::West,
    ];

    pub fn axis(self) -> Axis {
        match self {
            Direction::North | Direction::South => Axis::NorthSouth,
            Direction::East | Direction::West => Axis::EastWest,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::North => "north",
            Direction::South => "south",
            Direction::East => "east",
            Direction::West => "west",
        }
    }

    /// Map lane progress to a point on the plane
    pub fn position_at(self, progress: f32) -> Position {
        match self {
            Direction::North => Position::new(LANE_FAR, WORLD_SIZE - progress),
            Direction::South => Position::new(LANE_NEAR, progress),
            Direction::East => Position::new(progress, LANE_FAR),
            Direction::West => Position::new(WORLD_SIZE - progress, LANE_NEAR),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "north" => Ok(Direction::North),
            "south" => Ok(Direction::South),
            "east" => Ok(Direction::East),
            "west" => Ok(Direction::West),
            _ => Err(EngineError::InvalidDirection(s.to_string())),
        }
    }
}

/// A pair of opposing approaches that share a signal phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    NorthSouth,
    EastWest,
}

impl Axis {
    pub fn perpendicular(self) -> Axis {
        match self {
            Axis::NorthSouth => Axis::EastWest,
            Axis::EastWest => Axis::NorthSouth,
        }
    }

    pub fn contains(self, direction: Direction) -> bool {
        direction.axis() == self
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::NorthSouth => f.write_str("north-south"),
            Axis::EastWest => f.write_str("east-west"),
        }
    }
}

/// Type of vehicle in the simulation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VehicleType {
    Motorcycle,
    Sedan,
    #[serde(rename = "SUV")]
    Suv,
    Truck,
    Ambulance,
    Bus,
}

impl VehicleType {
    /// Vehicle types handed out by the seed generator and bulk adds
    pub const CIVILIAN: [VehicleType; 5] = [
        VehicleType::Motorcycle,
        VehicleType::Sedan,
        VehicleType::Suv,
        VehicleType::Truck,
        VehicleType::Bus,
    ];

    /// Body length along the lane, in plane units
    pub fn length(self) -> f32 {
        match self {
            VehicleType::Motorcycle => 20.0,
            VehicleType::Sedan => 40.0,
            VehicleType::Suv => 45.0,
            VehicleType::Truck => 60.0,
            VehicleType::Ambulance => 50.0,
            VehicleType::Bus => 70.0,
        }
    }

    /// Range of nominal cruising speeds in km/h
    pub fn speed_range(self) -> std::ops::Range<f32> {
        match self {
            VehicleType::Motorcycle => 40.0..80.0,
            VehicleType::Sedan => 40.0..70.0,
            VehicleType::Suv => 35.0..65.0,
            VehicleType::Truck => 30.0..50.0,
            VehicleType::Ambulance => 70.0..90.0,
            VehicleType::Bus => 30.0..45.0,
        }
    }

    pub fn is_emergency(self) -> bool {
        self == VehicleType::Ambulance
    }
}

/// Light color for a single approach
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LightColor {
    Red,
    Yellow,
    Green,
}

/// Vehicle status as reported to the presentation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleStatus {
    Moving,
    Stopped,
    Emergency,
}

/// A 2D position on the simulation plane
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommunicationMode {
    V2V,
    V2I,
    V2X,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SliceType {
    #[serde(rename = "eMBB")]
    Embb,
    #[serde(rename = "URLLC")]
    Urllc,
    #[serde(rename = "mMTC")]
    Mmtc,
}

/// Network telemetry carried by a vehicle record
///
/// The engine never reads these values; they pass through to snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    pub communication_mode: CommunicationMode,
    pub slice_type: SliceType,
    /// dBm
    pub signal_strength: f32,
    /// Mbps
    pub allocated_bandwidth: f32,
    /// ms
    pub latency: f32,
}
