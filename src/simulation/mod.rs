//! Standalone intersection simulation
//!
//! Everything here is synchronous and single-owner: `SimWorld` is advanced by
//! whoever holds it. The async clock and command surface live in
//! [`crate::engine`].

mod conflict;
mod events;
mod preemption;
mod seed;
mod signal;
mod snapshot;
mod stats;
mod types;
mod vehicle;
mod world;

pub use conflict::{ConflictDetector, RightOfWay, SignalView, Verdict, YieldReason};
pub use events::{EventLog, EventType, SimulationEvent, DEFAULT_EVENT_CAPACITY};
pub use preemption::{PreemptionManager, PreemptionRequest};
pub use seed::{generate_seeds, random_speed, random_telemetry, VehicleSeed};
pub use signal::{SignalController, SignalPhase, TrafficLightState};
pub use snapshot::{StateSnapshot, VehicleSnapshot};
pub use stats::SimulationStats;
pub use types::{
    Axis, CommunicationMode, Direction, LightColor, Position, SliceType, Telemetry, VehicleId,
    VehicleStatus, VehicleType, BOX_EXIT, STOP_LINE, WORLD_SIZE,
};
pub use vehicle::{SimVehicle, VehicleUpdateResult, CLEAR_ROAD_REASON, PRIORITY_REASON};
pub use world::{SimWorld, TickReport};
