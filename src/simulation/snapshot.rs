//! Serializable views of the simulation handed to the presentation layer

use serde::Serialize;

use super::events::SimulationEvent;
use super::signal::{SignalPhase, TrafficLightState};
use super::types::{Direction, Telemetry, VehicleId, VehicleStatus, VehicleType};
use super::vehicle::SimVehicle;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleSnapshot {
    pub id: VehicleId,
    #[serde(rename = "type")]
    pub vehicle_type: VehicleType,
    pub direction: Direction,
    pub x: f32,
    pub y: f32,
    pub speed: f32,
    pub original_speed: f32,
    pub status: VehicleStatus,
    pub status_reason: String,
    #[serde(flatten)]
    pub telemetry: Option<Telemetry>,
}

impl From<&SimVehicle> for VehicleSnapshot {
    fn from(vehicle: &SimVehicle) -> Self {
        Self {
            id: vehicle.id,
            vehicle_type: vehicle.vehicle_type,
            direction: vehicle.direction,
            x: vehicle.position.x,
            y: vehicle.position.y,
            speed: vehicle.speed,
            original_speed: vehicle.original_speed(),
            status: vehicle.status,
            status_reason: vehicle.status_reason.clone(),
            telemetry: vehicle.telemetry.clone(),
        }
    }
}

/// Complete, consistent picture of the world between two ticks
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    pub vehicles: Vec<VehicleSnapshot>,
    pub traffic_lights: TrafficLightState,
    pub events: Vec<SimulationEvent>,
    /// Vehicles created but not yet on the plane
    pub waiting_vehicles: usize,
    pub emergency_active: bool,
    pub running: bool,
    pub signal_phase: SignalPhase,
    /// Simulated seconds
    pub time: f32,
    pub tick: u64,
}

impl StateSnapshot {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
