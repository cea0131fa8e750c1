//! Emergency-vehicle preemption
//!
//! Requests are kept in arrival order. The axis of the oldest pending request
//! holds the green corridor; requests on the other axis wait until every
//! ambulance on the granted axis has cleared the box or left the simulation.

use log::info;
use std::collections::VecDeque;

use super::events::{EventLog, EventType};
use super::signal::SignalController;
use super::types::{Axis, Direction, VehicleId};

#[derive(Debug, Clone, PartialEq)]
pub struct PreemptionRequest {
    pub vehicle: VehicleId,
    pub direction: Direction,
    /// Simulated time the ambulance was added
    pub requested_at: f32,
}

impl PreemptionRequest {
    /// Simulated seconds since the request was made
    pub fn waited(&self, now: f32) -> f32 {
        (now - self.requested_at).max(0.0)
    }
}

#[derive(Debug, Default)]
pub struct PreemptionManager {
    enabled: bool,
    requests: VecDeque<PreemptionRequest>,
    granted: Option<Axis>,
}

impl PreemptionManager {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            ..Self::default()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Disabling stops new ambulances from requesting a corridor; a corridor
    /// already granted runs until its ambulances clear.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Axis currently holding the emergency corridor
    pub fn granted(&self) -> Option<Axis> {
        self.granted
    }

    pub fn is_active(&self) -> bool {
        self.granted.is_some()
    }

    pub fn pending(&self) -> impl Iterator<Item = &PreemptionRequest> {
        self.requests.iter()
    }

    /// Register an ambulance and open (or queue) its corridor
    pub fn on_ambulance_added(
        &mut self,
        vehicle: VehicleId,
        direction: Direction,
        signals: &mut SignalController,
        events: &mut EventLog,
        now: f32,
    ) {
        if !self.enabled {
            events.append(
                now,
                EventType::Emergency,
                format!("Emergency priority disabled; ambulance {vehicle} follows normal signals"),
            );
            return;
        }

        self.requests.push_back(PreemptionRequest {
            vehicle,
            direction,
            requested_at: now,
        });

        let axis = direction.axis();
        match self.granted {
            None => self.grant(signals, events, now),
            Some(granted) if granted == axis => {
                events.append(
                    now,
                    EventType::Emergency,
                    format!("Ambulance {vehicle} on {direction} joins the open {axis} corridor"),
                );
            }
            Some(granted) => {
                events.append(
                    now,
                    EventType::Emergency,
                    format!(
                        "Ambulance {vehicle} on {direction} queued until the {granted} corridor clears"
                    ),
                );
            }
        }
    }

    /// Withdraw the request for an ambulance that is gone
    pub fn on_ambulance_cleared(
        &mut self,
        vehicle: VehicleId,
        signals: &mut SignalController,
        events: &mut EventLog,
        now: f32,
    ) {
        self.requests.retain(|r| r.vehicle != vehicle);
        self.settle(signals, events, now);
    }

    /// Drop requests for ambulances `still_approaching` no longer reports,
    /// then re-evaluate
    pub fn sync(
        &mut self,
        still_approaching: impl Fn(VehicleId) -> bool,
        signals: &mut SignalController,
        events: &mut EventLog,
        now: f32,
    ) {
        self.requests.retain(|r| still_approaching(r.vehicle));
        self.settle(signals, events, now);
    }

    fn settle(&mut self, signals: &mut SignalController, events: &mut EventLog, now: f32) {
        match self.granted {
            Some(axis) if self.requests.iter().any(|r| r.direction.axis() == axis) => {}
            Some(axis) => {
                if self.requests.is_empty() {
                    self.granted = None;
                    signals.release();
                    info!("Emergency corridor on {axis} released");
                    events.append(
                        now,
                        EventType::Emergency,
                        format!("Emergency cleared on {axis}; normal signal cycling resumes"),
                    );
                } else {
                    self.grant(signals, events, now);
                }
            }
            None if !self.requests.is_empty() => self.grant(signals, events, now),
            None => {}
        }
    }

    /// Give the corridor to the axis of the oldest pending request
    fn grant(&mut self, signals: &mut SignalController, events: &mut EventLog, now: f32) {
        let Some(request) = self.requests.front() else {
            return;
        };
        let axis = request.direction.axis();
        self.granted = Some(axis);
        signals.preempt(axis);
        info!(
            "Emergency corridor granted to {axis} for ambulance {} after {:.1}s",
            request.vehicle,
            request.waited(now)
        );
        events.append(
            now,
            EventType::PriorityGiven,
            format!(
                "Priority given to ambulance {} on {}: {axis} green",
                request.vehicle, request.direction
            ),
        );
    }
}
