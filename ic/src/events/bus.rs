//! Event Bus - pub/sub for run progress
//!
//! Uses a tokio broadcast channel; the sequencer emits, the CLI and tests
//! subscribe.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::debug;

use super::types::{Phase, RunEvent};
use crate::valve::ValveCommand;

/// Default channel capacity (events)
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1_024;

/// Central event bus for run progress
pub struct EventBus {
    tx: broadcast::Sender<RunEvent>,
}

impl EventBus {
    /// Create a new event bus with the given capacity
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "EventBus::new: creating event bus");
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Create a new event bus with default capacity
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Emit an event to all subscribers
    ///
    /// If there are no subscribers the event is dropped.
    pub fn emit(&self, event: RunEvent) {
        let _ = self.tx.send(event);
    }

    /// Subscribe to events emitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        debug!("EventBus::subscribe: new subscriber");
        self.tx.subscribe()
    }

    /// Create an emitter handle bound to one run
    pub fn emitter_for(&self, run_id: impl Into<String>) -> EventEmitter {
        let run_id = run_id.into();
        debug!(%run_id, "EventBus::emitter_for: creating emitter");
        EventEmitter {
            tx: self.tx.clone(),
            run_id,
        }
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

/// Handle for emitting events of one run without owning the bus
#[derive(Clone)]
pub struct EventEmitter {
    tx: broadcast::Sender<RunEvent>,
    run_id: String,
}

impl EventEmitter {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Emit a raw event
    pub fn emit(&self, event: RunEvent) {
        debug!(event_type = event.event_type(), run_id = %self.run_id, "EventEmitter::emit");
        let _ = self.tx.send(event);
    }

    // === Convenience methods ===

    pub fn run_started(&self, program_id: i64, program_name: &str, address: &str, total_steps: usize) {
        self.emit(RunEvent::RunStarted {
            run_id: self.run_id.clone(),
            program_id,
            program_name: program_name.to_string(),
            address: address.to_string(),
            total_steps,
        });
    }

    pub fn step_started(&self, step: usize, total_steps: usize, duration_secs: u32) {
        self.emit(RunEvent::StepStarted {
            run_id: self.run_id.clone(),
            step,
            total_steps,
            duration_secs,
        });
    }

    pub fn phase_changed(&self, step: usize, phase: Phase) {
        self.emit(RunEvent::PhaseChanged {
            run_id: self.run_id.clone(),
            step,
            phase,
        });
    }

    pub fn attempt_failed(&self, step: usize, command: ValveCommand, attempt: u32, max_attempts: u32, error: &str) {
        self.emit(RunEvent::AttemptFailed {
            run_id: self.run_id.clone(),
            step,
            command,
            attempt,
            max_attempts,
            error: error.to_string(),
        });
    }

    pub fn step_completed(&self, step: usize) {
        self.emit(RunEvent::StepCompleted {
            run_id: self.run_id.clone(),
            step,
        });
    }

    pub fn run_completed(&self, steps_run: usize) {
        self.emit(RunEvent::RunCompleted {
            run_id: self.run_id.clone(),
            steps_run,
        });
    }

    pub fn run_aborted(&self, step: usize, command: ValveCommand, attempts: u32, message: &str) {
        self.emit(RunEvent::RunAborted {
            run_id: self.run_id.clone(),
            step,
            command,
            attempts,
            message: message.to_string(),
        });
    }
}

/// Create an event bus wrapped in an Arc for shared ownership
pub fn create_event_bus() -> Arc<EventBus> {
    Arc::new(EventBus::with_default_capacity())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::TryRecvError;

    #[test]
    fn test_event_bus_subscribe() {
        let bus = EventBus::new(16);
        assert_eq!(bus.subscriber_count(), 0);
        let _rx1 = bus.subscribe();
        let _rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::new(16);
        bus.emitter_for("run-1").run_completed(0);
    }

    #[tokio::test]
    async fn test_emitter_tags_run_id() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let emitter = bus.emitter_for("run-42");

        emitter.run_started(1, "lawn", "127.0.0.1", 6);
        emitter.step_started(0, 6, 30);
        emitter.phase_changed(0, Phase::Opening);
        emitter.attempt_failed(0, ValveCommand::Open, 1, 12, "refused");
        emitter.step_completed(0);
        emitter.run_aborted(1, ValveCommand::Close, 12, "gave up");

        for _ in 0..6 {
            let event = rx.recv().await.unwrap();
            assert_eq!(event.run_id(), "run-42");
        }
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = create_event_bus();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.emitter_for("run-7").run_completed(2);

        assert_eq!(
            rx1.recv().await.unwrap(),
            RunEvent::RunCompleted {
                run_id: "run-7".to_string(),
                steps_run: 2
            }
        );
        assert!(rx2.recv().await.unwrap().is_terminal());
    }
}
