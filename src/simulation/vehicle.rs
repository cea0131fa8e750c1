//! Vehicle state and per-tick kinematics
//!
//! A vehicle is tracked by its progress along its approach lane: the distance
//! of its front bumper from the lane's entry edge. Plane coordinates are
//! derived from progress and direction.

use super::conflict::Verdict;
use super::types::{
    Direction, Position, Telemetry, VehicleId, VehicleStatus, VehicleType, BOX_EXIT, STOP_LINE,
    WORLD_SIZE,
};
use crate::config::TrafficConfig;

/// Status reason shown while a vehicle moves freely
pub const CLEAR_ROAD_REASON: &str = "Clear road ahead";

/// Status reason shown while an ambulance uses its corridor
pub const PRIORITY_REASON: &str = "Emergency priority passage";

/// Result of a vehicle update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VehicleUpdateResult {
    /// Vehicle stays in the simulation
    Continue,
    /// Vehicle passed the far boundary and should be removed
    ExitedBounds,
}

/// A vehicle in the simulation
#[derive(Debug, Clone)]
pub struct SimVehicle {
    pub id: VehicleId,
    pub vehicle_type: VehicleType,
    pub direction: Direction,
    /// Front bumper distance from the lane entry edge
    pub progress: f32,
    pub position: Position,
    /// Current speed in km/h
    pub speed: f32,
    original_speed: f32,
    pub status: VehicleStatus,
    pub status_reason: String,
    pub telemetry: Option<Telemetry>,
}

impl SimVehicle {
    pub fn new(
        id: VehicleId,
        vehicle_type: VehicleType,
        direction: Direction,
        progress: f32,
        speed: f32,
        telemetry: Option<Telemetry>,
    ) -> Self {
        let speed = speed.max(0.0);
        Self {
            id,
            vehicle_type,
            direction,
            progress,
            position: direction.position_at(progress),
            speed,
            original_speed: speed,
            status: VehicleStatus::Moving,
            status_reason: CLEAR_ROAD_REASON.to_string(),
            telemetry,
        }
    }

    /// Nominal cruising speed fixed at creation
    pub fn original_speed(&self) -> f32 {
        self.original_speed
    }

    pub fn length(&self) -> f32 {
        self.vehicle_type.length()
    }

    /// Progress of the rear bumper
    pub fn rear(&self) -> f32 {
        self.progress - self.length()
    }

    /// Front has not yet crossed the stop line
    pub fn is_approaching(&self) -> bool {
        self.progress <= STOP_LINE
    }

    /// Some part of the body is inside the intersection box
    pub fn is_inside_box(&self) -> bool {
        self.progress > STOP_LINE && self.rear() < BOX_EXIT
    }

    /// Rear bumper is past the far edge of the box
    pub fn has_cleared_box(&self) -> bool {
        self.rear() >= BOX_EXIT
    }

    fn place_at(&mut self, progress: f32) {
        self.progress = progress;
        self.position = self.direction.position_at(progress);
    }

    /// Apply a conflict verdict and advance one tick
    pub fn update(
        &mut self,
        verdict: &Verdict,
        delta_secs: f32,
        traffic: &TrafficConfig,
    ) -> VehicleUpdateResult {
        match verdict.yield_reason {
            Some(reason) => {
                self.speed = (self.speed - traffic.deceleration * delta_secs).max(0.0);
                self.status = VehicleStatus::Stopped;
                self.status_reason = reason.to_string();
            }
            None => {
                if self.speed < self.original_speed {
                    self.speed =
                        (self.speed + traffic.acceleration * delta_secs).min(self.original_speed);
                }
                if verdict.priority {
                    self.status = VehicleStatus::Emergency;
                    self.status_reason = PRIORITY_REASON.to_string();
                } else {
                    self.status = VehicleStatus::Moving;
                    self.status_reason = CLEAR_ROAD_REASON.to_string();
                }
            }
        }

        // Speed only ever changes at the bounded rates above; the stop target
        // limits distance, not speed
        let mut advance = self.speed * traffic.distance_per_kmh * delta_secs;
        if let Some(limit) = verdict.stop_at {
            advance = advance.min((limit - self.progress).max(0.0));
        }

        self.place_at(self.progress + advance);

        if self.rear() >= WORLD_SIZE {
            VehicleUpdateResult::ExitedBounds
        } else {
            VehicleUpdateResult::Continue
        }
    }
}
