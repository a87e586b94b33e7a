//! In-memory valve actuator
//!
//! The device owns exactly one valve. The server task holds it by value, so
//! there is no shared mutable state: commands are applied one connection at
//! a time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Physical valve position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ValveState {
    Open,
    #[default]
    Closed,
}

impl std::fmt::Display for ValveState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// One applied command, recorded in the valve's journal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actuation {
    /// State the valve was left in
    pub state: ValveState,
    /// State before the command was applied
    pub previous: ValveState,
    pub at: DateTime<Utc>,
}

/// The single valve driven by the device
#[derive(Debug, Default)]
pub struct Valve {
    state: ValveState,
    journal: Vec<Actuation>,
}

impl Valve {
    /// Create a valve in its power-on state (closed)
    pub fn new() -> Self {
        debug!("Valve::new: called");
        Self::default()
    }

    /// Open the valve. Opening an open valve is a no-op success.
    pub fn open(&mut self) {
        self.apply(ValveState::Open);
    }

    /// Close the valve. Closing a closed valve is a no-op success.
    pub fn close(&mut self) {
        self.apply(ValveState::Closed);
    }

    pub fn state(&self) -> ValveState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == ValveState::Open
    }

    /// Every command applied since power-on, oldest first
    pub fn journal(&self) -> &[Actuation] {
        &self.journal
    }

    /// States the valve has passed through, starting with the power-on state.
    ///
    /// Repeated commands that did not change the position are collapsed.
    pub fn transitions(&self) -> Vec<ValveState> {
        let mut states = vec![ValveState::default()];
        for actuation in &self.journal {
            if actuation.previous != actuation.state {
                states.push(actuation.state);
            }
        }
        states
    }

    fn apply(&mut self, next: ValveState) {
        let previous = self.state;
        self.state = next;
        self.journal.push(Actuation {
            state: next,
            previous,
            at: Utc::now(),
        });
        if previous == next {
            debug!(state = %next, "Valve::apply: already in requested state");
        } else {
            info!(from = %previous, to = %next, "valve actuated");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_valve_is_closed() {
        let valve = Valve::new();
        assert_eq!(valve.state(), ValveState::Closed);
        assert!(!valve.is_open());
        assert!(valve.journal().is_empty());
    }

    #[test]
    fn test_open_then_close() {
        let mut valve = Valve::new();
        valve.open();
        assert!(valve.is_open());
        valve.close();
        assert_eq!(valve.state(), ValveState::Closed);
        assert_eq!(valve.journal().len(), 2);
    }

    #[test]
    fn test_repeated_open_is_idempotent() {
        let mut valve = Valve::new();
        valve.open();
        valve.open();
        assert!(valve.is_open());
        assert_eq!(valve.journal().len(), 2);
        assert_eq!(valve.transitions(), vec![ValveState::Closed, ValveState::Open]);
    }

    #[test]
    fn test_transitions_collapse_noops() {
        let mut valve = Valve::new();
        valve.close();
        valve.open();
        valve.close();
        valve.close();
        assert_eq!(
            valve.transitions(),
            vec![ValveState::Closed, ValveState::Open, ValveState::Closed]
        );
    }

    #[test]
    fn test_state_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&ValveState::Open).unwrap(), r#""open""#);
        assert_eq!(serde_json::to_string(&ValveState::Closed).unwrap(), r#""closed""#);
    }
}
