//! The event bus: how the run controller talks to everything else.
//!
//! RULE: Surrounding surfaces learn about the run ONLY through events.
//! Nothing outside the controller reads its state to detect mode changes;
//! they subscribe and react.

use crate::{
    analyzer::Confidence,
    policy::SchedulingPolicy,
    types::RunId,
};
use serde::{Deserialize, Serialize};
use std::{cell::RefCell, sync::mpsc};

/// Every event emitted by the run controller.
/// Variants are appended, never removed or reordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SimEvent {
    /// `true` when a synthetic population exists, `false` after cleanup.
    SimulationModeChanged {
        active: bool,
    },
    RunPrepared {
        run_id: RunId,
        seed: u64,
        total_requests: usize,
    },
    PhaseCompleted {
        run_id: RunId,
        phase: String,
        policy: SchedulingPolicy,
        processed_count: usize,
        completed_count: usize,
        avg_wait_minutes: f64,
    },
    PolicySwitched {
        run_id: RunId,
        from: SchedulingPolicy,
        to: SchedulingPolicy,
    },
    RecommendationIssued {
        run_id: RunId,
        current: SchedulingPolicy,
        recommended: SchedulingPolicy,
        confidence: Confidence,
    },
    RunCompleted {
        run_id: RunId,
        processed_count: usize,
        completed_count: usize,
    },
    RunReset {
        run_id: Option<RunId>,
        deleted_requests: usize,
    },
}

impl SimEvent {
    /// Stable string name, used for the event_type column in event_log.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::SimulationModeChanged { .. } => "simulation_mode_changed",
            Self::RunPrepared { .. } => "run_prepared",
            Self::PhaseCompleted { .. } => "phase_completed",
            Self::PolicySwitched { .. } => "policy_switched",
            Self::RecommendationIssued { .. } => "recommendation_issued",
            Self::RunCompleted { .. } => "run_completed",
            Self::RunReset { .. } => "run_reset",
        }
    }
}

/// Fire-and-forget fan-out to any number of subscribers.
/// Subscribers that have dropped their receiver are pruned on publish.
#[derive(Default)]
pub struct EventBus {
    subscribers: RefCell<Vec<mpsc::Sender<SimEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> mpsc::Receiver<SimEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.borrow_mut().push(tx);
        rx
    }

    pub fn publish(&self, event: &SimEvent) {
        self.subscribers
            .borrow_mut()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}

/// The event log entry as persisted to SQLite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id: Option<i64>,
    pub run_id: RunId,
    /// Checkpoint index within the run: 0 = prepare, 1..=3 = phases.
    pub step: u64,
    pub source: String,
    pub event_type: String,
    pub payload: String, // JSON-serialized SimEvent
}
