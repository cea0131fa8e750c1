//! Bounded, append-only record of notable simulation occurrences

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Kind of event, serialized with the names the presentation layer styles on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    VehiclesAdded,
    AmbulanceAdded,
    PriorityGiven,
    Emergency,
    Stopped,
    Resumed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationEvent {
    /// Simulated seconds since the world was created
    pub timestamp: f32,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub message: String,
    /// Position in the log's total order; survives trimming
    #[serde(skip)]
    pub seq: u64,
}

/// Default number of events retained
pub const DEFAULT_EVENT_CAPACITY: usize = 50;

#[derive(Debug, Clone)]
pub struct EventLog {
    entries: VecDeque<SimulationEvent>,
    capacity: usize,
    next_seq: u64,
    flushed_seq: u64,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventLog {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            next_seq: 0,
            flushed_seq: 0,
        }
    }

    /// Append an event, dropping the oldest once the cap is exceeded
    pub fn append(&mut self, timestamp: f32, event_type: EventType, message: impl Into<String>) {
        let event = SimulationEvent {
            timestamp,
            event_type,
            message: message.into(),
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.entries.push_back(event);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// The last `n` events, oldest first
    pub fn recent(&self, n: usize) -> Vec<SimulationEvent> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }

    /// Events appended since the previous flush
    ///
    /// Events trimmed before they were flushed are not recoverable.
    pub fn flush(&mut self) -> Vec<SimulationEvent> {
        let fresh: Vec<SimulationEvent> = self
            .entries
            .iter()
            .filter(|e| e.seq >= self.flushed_seq)
            .cloned()
            .collect();
        self.flushed_seq = self.next_seq;
        fresh
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total number of events ever appended
    pub fn total_appended(&self) -> u64 {
        self.next_seq
    }

    pub fn iter(&self) -> impl Iterator<Item = &SimulationEvent> {
        self.entries.iter()
    }
}
