//! Aggregate statistics over the active vehicle set

use log::info;
use serde::Serialize;

use super::types::VehicleStatus;
use super::vehicle::SimVehicle;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SimulationStats {
    pub active_vehicles: usize,
    pub stopped_vehicles: usize,
    /// Created but still queued behind the lane entry
    pub waiting_vehicles: usize,
    /// km/h
    pub avg_speed: f32,
    /// ms, over vehicles carrying telemetry
    pub avg_latency: f32,
    /// dBm, over vehicles carrying telemetry
    pub avg_signal: f32,
    pub total_spawned: u64,
    pub total_exited: u64,
    pub elapsed_time: f32,
}

impl SimulationStats {
    pub fn collect<'a>(
        vehicles: impl Iterator<Item = &'a SimVehicle>,
        waiting_vehicles: usize,
        total_spawned: u64,
        total_exited: u64,
        elapsed_time: f32,
    ) -> Self {
        let mut stats = Self {
            waiting_vehicles,
            total_spawned,
            total_exited,
            elapsed_time,
            ..Self::default()
        };

        let mut speed_sum = 0.0;
        let mut latency_sum = 0.0;
        let mut signal_sum = 0.0;
        let mut with_telemetry = 0usize;

        for vehicle in vehicles {
            stats.active_vehicles += 1;
            if vehicle.status == VehicleStatus::Stopped {
                stats.stopped_vehicles += 1;
            }
            speed_sum += vehicle.speed;
            if let Some(telemetry) = &vehicle.telemetry {
                latency_sum += telemetry.latency;
                signal_sum += telemetry.signal_strength;
                with_telemetry += 1;
            }
        }

        if stats.active_vehicles > 0 {
            stats.avg_speed = speed_sum / stats.active_vehicles as f32;
        }
        if with_telemetry > 0 {
            stats.avg_latency = latency_sum / with_telemetry as f32;
            stats.avg_signal = signal_sum / with_telemetry as f32;
        }
        stats
    }

    /// Share of spawned vehicles that made it through, in percent
    pub fn throughput_rate(&self) -> f32 {
        if self.total_spawned > 0 {
            (self.total_exited as f32 / self.total_spawned as f32) * 100.0
        } else {
            0.0
        }
    }

    pub fn log_completion(&self) {
        info!("=== SIMULATION COMPLETE ===");
        info!("Elapsed time: {:.2}s", self.elapsed_time);
        info!("Total vehicles spawned: {}", self.total_spawned);
        info!("Total vehicles exited: {}", self.total_exited);
        info!("Active vehicles: {}", self.active_vehicles);
        info!("Stopped vehicles: {}", self.stopped_vehicles);
        info!("Waiting vehicles: {}", self.waiting_vehicles);
        info!("Average speed: {:.1} km/h", self.avg_speed);
        info!("Throughput rate: {:.1}%", self.throughput_rate());
    }
}
