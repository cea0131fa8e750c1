//! Synthetic vehicle descriptors for populating a fresh simulation

use rand::seq::IndexedRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::types::{CommunicationMode, SliceType, Telemetry, VehicleType};

/// A vehicle waiting to be placed on an approach
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleSeed {
    #[serde(rename = "type")]
    pub vehicle_type: VehicleType,
    /// Baseline cruising speed in km/h
    pub speed: f32,
    #[serde(flatten)]
    pub telemetry: Telemetry,
}

const COMMUNICATION_MODES: [CommunicationMode; 3] = [
    CommunicationMode::V2V,
    CommunicationMode::V2I,
    CommunicationMode::V2X,
];

const SLICE_TYPES: [SliceType; 3] = [SliceType::Embb, SliceType::Urllc, SliceType::Mmtc];

pub fn random_speed<R: Rng + ?Sized>(rng: &mut R, vehicle_type: VehicleType) -> f32 {
    rng.random_range(vehicle_type.speed_range())
}

pub fn random_telemetry<R: Rng + ?Sized>(rng: &mut R) -> Telemetry {
    Telemetry {
        communication_mode: *COMMUNICATION_MODES
            .choose(rng)
            .unwrap_or(&CommunicationMode::V2X),
        slice_type: *SLICE_TYPES.choose(rng).unwrap_or(&SliceType::Embb),
        signal_strength: rng.random_range(-90.0..-60.0),
        allocated_bandwidth: rng.random_range(100.0..300.0),
        latency: rng.random_range(10.0..60.0),
    }
}

/// Generate `count` civilian vehicle descriptors
pub fn generate_seeds<R: Rng + ?Sized>(rng: &mut R, count: usize) -> Vec<VehicleSeed> {
    (0..count)
        .map(|_| {
            let vehicle_type = *VehicleType::CIVILIAN
                .choose(rng)
                .unwrap_or(&VehicleType::Sedan);
            VehicleSeed {
                vehicle_type,
                speed: random_speed(rng, vehicle_type),
                telemetry: random_telemetry(rng),
            }
        })
        .collect()
}
