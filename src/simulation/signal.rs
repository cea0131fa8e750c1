//! Fixed-time signal controller for the four approaches
//!
//! Normal rotation is `Green(NS) -> Yellow(NS) -> Green(EW) -> Yellow(EW)`.
//! Preemption jumps straight to a held green for the requested axis; release
//! settles that axis through yellow before the perpendicular axis gets green.

use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::types::{Axis, Direction, LightColor};
use crate::config::SignalConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "axis", rename_all = "snake_case")]
pub enum SignalPhase {
    Green(Axis),
    Yellow(Axis),
    /// Emergency override holding the axis green
    Preempted(Axis),
}

impl fmt::Display for SignalPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalPhase::Green(axis) => write!(f, "{axis} green"),
            SignalPhase::Yellow(axis) => write!(f, "{axis} yellow"),
            SignalPhase::Preempted(axis) => write!(f, "{axis} green (preempted)"),
        }
    }
}

/// Light color shown to every approach
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficLightState {
    pub north: LightColor,
    pub south: LightColor,
    pub east: LightColor,
    pub west: LightColor,
}

impl TrafficLightState {
    pub fn for_phase(phase: SignalPhase) -> Self {
        let (axis, color) = match phase {
            SignalPhase::Green(axis) | SignalPhase::Preempted(axis) => (axis, LightColor::Green),
            SignalPhase::Yellow(axis) => (axis, LightColor::Yellow),
        };
        let pick = |direction: Direction| {
            if axis.contains(direction) {
                color
            } else {
                LightColor::Red
            }
        };
        let state = Self {
            north: pick(Direction::North),
            south: pick(Direction::South),
            east: pick(Direction::East),
            west: pick(Direction::West),
        };
        state.assert_invariant();
        state
    }

    pub fn color(&self, direction: Direction) -> LightColor {
        match direction {
            Direction::North => self.north,
            Direction::South => self.south,
            Direction::East => self.east,
            Direction::West => self.west,
        }
    }

    /// Axis showing green on any approach, if one does
    pub fn green_axis(&self) -> Option<Axis> {
        Direction::ALL
            .iter()
            .find(|d| self.color(**d) == LightColor::Green)
            .map(|d| d.axis())
    }

    /// Panics if both axes show green, or a green axis faces a non-red one.
    /// Reaching this is a controller bug, not a runtime condition.
    pub fn assert_invariant(&self) {
        let shows_green = |axis: Axis| {
            Direction::ALL
                .iter()
                .any(|d| axis.contains(*d) && self.color(*d) == LightColor::Green)
        };
        let all_red = |axis: Axis| {
            Direction::ALL
                .iter()
                .filter(|d| axis.contains(**d))
                .all(|d| self.color(*d) == LightColor::Red)
        };
        for axis in [Axis::NorthSouth, Axis::EastWest] {
            assert!(
                !shows_green(axis) || all_red(axis.perpendicular()),
                "signal invariant violated: {axis} green while {} is not red ({self:?})",
                axis.perpendicular()
            );
        }
    }
}

pub struct SignalController {
    phase: SignalPhase,
    elapsed: f32,
    green_secs: f32,
    yellow_secs: f32,
    lights: TrafficLightState,
}

impl SignalController {
    pub fn new(config: &SignalConfig) -> Self {
        let phase = SignalPhase::Green(config.initial_green);
        Self {
            phase,
            elapsed: 0.0,
            green_secs: config.green_secs,
            yellow_secs: config.yellow_secs,
            lights: TrafficLightState::for_phase(phase),
        }
    }

    pub fn phase(&self) -> SignalPhase {
        self.phase
    }

    pub fn lights(&self) -> &TrafficLightState {
        &self.lights
    }

    /// Seconds spent in the current phase
    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    pub fn is_preempted(&self) -> bool {
        matches!(self.phase, SignalPhase::Preempted(_))
    }

    /// Advance the dwell timer, switching phase when it expires
    ///
    /// Returns the new phase on a transition. A preempted phase never expires.
    pub fn advance(&mut self, delta_secs: f32) -> Option<SignalPhase> {
        self.elapsed += delta_secs;
        let next = match self.phase {
            SignalPhase::Green(axis) if self.elapsed >= self.green_secs => {
                SignalPhase::Yellow(axis)
            }
            SignalPhase::Yellow(axis) if self.elapsed >= self.yellow_secs => {
                SignalPhase::Green(axis.perpendicular())
            }
            _ => return None,
        };
        self.set_phase(next);
        Some(next)
    }

    /// Force `axis` green and everything else red, skipping any yellow
    pub fn preempt(&mut self, axis: Axis) {
        if self.phase != SignalPhase::Preempted(axis) {
            self.set_phase(SignalPhase::Preempted(axis));
        }
    }

    /// End an override by settling the held axis through yellow
    pub fn release(&mut self) {
        if let SignalPhase::Preempted(axis) = self.phase {
            self.set_phase(SignalPhase::Yellow(axis));
        }
    }

    fn set_phase(&mut self, phase: SignalPhase) {
        debug!("Signal phase {} -> {}", self.phase, phase);
        self.phase = phase;
        self.elapsed = 0.0;
        self.lights = TrafficLightState::for_phase(phase);
    }
}
