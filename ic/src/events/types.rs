//! Event types for irrigation run progress

use serde::{Deserialize, Serialize};

use crate::valve::ValveCommand;

/// What the sequencer is doing within a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Sending the open command (with retries)
    Opening,
    /// Valve open, watering
    Holding,
    /// Sending the close command (with retries)
    Closing,
    /// Valve closed, waiting before the next step
    Settling,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Opening => write!(f, "opening"),
            Self::Holding => write!(f, "holding"),
            Self::Closing => write!(f, "closing"),
            Self::Settling => write!(f, "settling"),
        }
    }
}

/// Progress notifications published while a program runs
///
/// Observability only: the run's outcome is the return value of
/// [`crate::sequencer::Sequencer::run`], not these events. Steps are 0-based.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RunEvent {
    RunStarted {
        run_id: String,
        program_id: i64,
        program_name: String,
        address: String,
        total_steps: usize,
    },
    StepStarted {
        run_id: String,
        step: usize,
        total_steps: usize,
        duration_secs: u32,
    },
    PhaseChanged {
        run_id: String,
        step: usize,
        phase: Phase,
    },
    /// One valve command attempt failed and may be retried
    AttemptFailed {
        run_id: String,
        step: usize,
        command: ValveCommand,
        attempt: u32,
        max_attempts: u32,
        error: String,
    },
    StepCompleted {
        run_id: String,
        step: usize,
    },
    RunCompleted {
        run_id: String,
        steps_run: usize,
    },
    RunAborted {
        run_id: String,
        step: usize,
        command: ValveCommand,
        attempts: u32,
        message: String,
    },
}

impl RunEvent {
    /// Get the run ID for this event
    pub fn run_id(&self) -> &str {
        match self {
            RunEvent::RunStarted { run_id, .. }
            | RunEvent::StepStarted { run_id, .. }
            | RunEvent::PhaseChanged { run_id, .. }
            | RunEvent::AttemptFailed { run_id, .. }
            | RunEvent::StepCompleted { run_id, .. }
            | RunEvent::RunCompleted { run_id, .. }
            | RunEvent::RunAborted { run_id, .. } => run_id,
        }
    }

    /// Get the event type name
    pub fn event_type(&self) -> &'static str {
        match self {
            RunEvent::RunStarted { .. } => "RunStarted",
            RunEvent::StepStarted { .. } => "StepStarted",
            RunEvent::PhaseChanged { .. } => "PhaseChanged",
            RunEvent::AttemptFailed { .. } => "AttemptFailed",
            RunEvent::StepCompleted { .. } => "StepCompleted",
            RunEvent::RunCompleted { .. } => "RunCompleted",
            RunEvent::RunAborted { .. } => "RunAborted",
        }
    }

    /// Whether this is the last event of a run
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunEvent::RunCompleted { .. } | RunEvent::RunAborted { .. })
    }
}
