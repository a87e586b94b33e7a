//! Irrigation sequencer - walks a program's steps against one valve
//!
//! `Idle -> Running(step) -> {Completed, Aborted}`. For each step the valve is
//! opened (with retries), held for the step duration plus the transition
//! delay, closed (with retries), and left to settle before the next step. The
//! first empty slot ends the program.
//!
//! An exhausted retry aborts the run immediately. No compensating close is
//! attempted: if the close command is the one that failed, the valve may be
//! left open, and the abort says so.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::config::Config;
use crate::events::{EventBus, EventEmitter, Phase};
use crate::program::IrrigationProgram;
use crate::retry::{RetryExhausted, RetryPolicy, with_retry};
use crate::valve::{ProtocolError, ValveClient, ValveCommand};

/// Timing and retry settings for a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequencerConfig {
    /// Mechanical valve lag plus margin; added to every hold and settle
    pub transition_delay: Duration,

    /// Extra settle time between consecutive steps
    pub step_transition_delay: Duration,

    /// Length of one unit of step duration (one second in production)
    pub step_unit: Duration,

    /// Retry policy applied identically to open and close
    pub retry: RetryPolicy,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            transition_delay: Duration::from_secs(crate::config::DEFAULT_TRANSITION_DELAY_SECS),
            step_transition_delay: Duration::from_secs(crate::config::DEFAULT_STEP_TRANSITION_DELAY_SECS),
            step_unit: Duration::from_secs(1),
            retry: RetryPolicy::default(),
        }
    }
}

impl From<&Config> for SequencerConfig {
    fn from(config: &Config) -> Self {
        Self {
            transition_delay: config.sequencer.transition_delay(),
            step_transition_delay: config.sequencer.step_transition_delay(),
            step_unit: Duration::from_secs(1),
            retry: RetryPolicy::from(&config.retry),
        }
    }
}

impl SequencerConfig {
    /// How long the valve stays open for a step
    pub fn hold_time(&self, duration: u32) -> Duration {
        self.step_unit * duration + self.transition_delay
    }

    /// Wait after a successful close before the next step
    pub fn settle_time(&self) -> Duration {
        self.transition_delay + self.step_transition_delay
    }
}

/// Where a sequencer is in its run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerState {
    Idle,
    Running { step: usize },
    Completed,
    Aborted { step: usize },
}

/// Why a run stopped early
#[derive(Debug)]
pub struct AbortReason {
    /// Step being executed (0-based)
    pub step: usize,
    /// Command whose retries were exhausted
    pub command: ValveCommand,
    pub error: RetryExhausted<ProtocolError>,
}

impl AbortReason {
    /// True when the valve was opened but could not be closed
    pub fn valve_may_be_open(&self) -> bool {
        self.command == ValveCommand::Close
    }
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "step {}: failed to {} the valve after {} attempts ({})",
            self.step + 1,
            self.command,
            self.error.attempts,
            self.error.last_error
        )?;
        if self.valve_may_be_open() {
            write!(f, "; the valve may still be open, inspect it manually")
        } else {
            write!(f, "; inspect the valve manually")
        }
    }
}

/// Final result of [`Sequencer::run`]
#[derive(Debug)]
pub enum RunOutcome {
    Completed { steps_run: usize },
    Aborted(AbortReason),
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed { .. })
    }
}

/// Runs irrigation programs against a valve, one at a time
///
/// Callers must not run two programs against the same valve concurrently;
/// `run` takes `&mut self` so a single sequencer cannot.
pub struct Sequencer {
    client: Arc<dyn ValveClient>,
    config: SequencerConfig,
    events: Arc<EventBus>,
    state: SequencerState,
}

impl Sequencer {
    pub fn new(client: Arc<dyn ValveClient>, config: SequencerConfig, events: Arc<EventBus>) -> Self {
        debug!(?config, "Sequencer::new: called");
        Self {
            client,
            config,
            events,
            state: SequencerState::Idle,
        }
    }

    pub fn state(&self) -> SequencerState {
        self.state
    }

    /// Run a program to completion or abort
    ///
    /// Each call is an independent run starting from `Idle`. There is no
    /// cancellation once started.
    pub async fn run(&mut self, program: &IrrigationProgram, address: &str) -> RunOutcome {
        self.state = SequencerState::Idle;
        let emitter = self.events.emitter_for(generate_run_id(program));
        let total_steps = program.steps().len();

        info!(
            run_id = %emitter.run_id(),
            program_id = program.id(),
            program = %program.name(),
            %address,
            "run: starting irrigation program"
        );
        emitter.run_started(program.id(), program.name(), address, total_steps);

        let mut steps_run = 0;
        for (step, slot) in program.steps().iter().enumerate() {
            let Some(duration) = *slot else {
                debug!(step, "run: empty slot ends the program");
                break;
            };

            self.state = SequencerState::Running { step };
            info!(step = step + 1, total_steps, duration, "run: step started");
            emitter.step_started(step, total_steps, duration);

            emitter.phase_changed(step, Phase::Opening);
            if let Err(error) = self.command(ValveCommand::Open, step, address, &emitter).await {
                return self.abort(
                    AbortReason {
                        step,
                        command: ValveCommand::Open,
                        error,
                    },
                    &emitter,
                );
            }

            emitter.phase_changed(step, Phase::Holding);
            let hold = self.config.hold_time(duration);
            debug!(step, ?hold, "run: valve open, holding");
            tokio::time::sleep(hold).await;

            emitter.phase_changed(step, Phase::Closing);
            if let Err(error) = self.command(ValveCommand::Close, step, address, &emitter).await {
                return self.abort(
                    AbortReason {
                        step,
                        command: ValveCommand::Close,
                        error,
                    },
                    &emitter,
                );
            }

            emitter.phase_changed(step, Phase::Settling);
            let settle = self.config.settle_time();
            debug!(step, ?settle, "run: valve closed, settling");
            tokio::time::sleep(settle).await;

            emitter.step_completed(step);
            steps_run += 1;
        }

        self.state = SequencerState::Completed;
        info!(run_id = %emitter.run_id(), steps_run, "run: irrigation program finished");
        emitter.run_completed(steps_run);
        RunOutcome::Completed { steps_run }
    }

    /// Send one command under the retry policy
    async fn command(
        &self,
        command: ValveCommand,
        step: usize,
        address: &str,
        emitter: &EventEmitter,
    ) -> Result<(), RetryExhausted<ProtocolError>> {
        let client = self.client.as_ref();
        let max_attempts = self.config.retry.attempts();
        debug!(%command, step, max_attempts, "command: called");

        with_retry(&self.config.retry, |attempt| async move {
            let result = client.send(command, address).await;
            if let Err(e) = &result {
                emitter.attempt_failed(step, command, attempt, max_attempts, &e.to_string());
            }
            result
        })
        .await
    }

    fn abort(&mut self, reason: AbortReason, emitter: &EventEmitter) -> RunOutcome {
        self.state = SequencerState::Aborted { step: reason.step };
        if reason.valve_may_be_open() {
            error!(
                run_id = %emitter.run_id(),
                step = reason.step + 1,
                error = %reason.error,
                "run: close failed, valve may still be open; manual inspection required"
            );
        } else {
            error!(
                run_id = %emitter.run_id(),
                step = reason.step + 1,
                command = %reason.command,
                error = %reason.error,
                "run: aborted"
            );
        }
        emitter.run_aborted(reason.step, reason.command, reason.error.attempts, &reason.to_string());
        RunOutcome::Aborted(reason)
    }
}

/// Generate a run ID: `{6-char-hex}-run-{slug}`
pub fn generate_run_id(program: &IrrigationProgram) -> String {
    // The leading v7 digits are the timestamp; the tail is random
    let simple = uuid::Uuid::now_v7().simple().to_string();
    let hex_prefix = &simple[simple.len() - 6..];
    let slug = program
        .name()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    if slug.is_empty() {
        format!("{}-run-{}", hex_prefix, program.id())
    } else {
        format!("{}-run-{}", hex_prefix, slug)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RunEvent;
    use crate::valve::client::mock::{ALWAYS, MockValveClient};
    use tokio::time::Instant;

    const ADDR: &str = "192.168.1.40";

    fn lawn() -> IrrigationProgram {
        IrrigationProgram::new(1, "lawn", vec![Some(30), Some(60), None, None, None, None], 6).unwrap()
    }

    fn sequencer(client: Arc<MockValveClient>, config: SequencerConfig) -> Sequencer {
        Sequencer::new(client, config, Arc::new(EventBus::new(256)))
    }

    fn fast_config() -> SequencerConfig {
        SequencerConfig {
            transition_delay: Duration::from_millis(10),
            step_transition_delay: Duration::from_millis(10),
            step_unit: Duration::from_millis(1),
            retry: RetryPolicy::new(3, Duration::from_millis(5)),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_lawn_program_timing() {
        let client = Arc::new(MockValveClient::new());
        let mut seq = sequencer(client.clone(), SequencerConfig::default());
        let start = Instant::now();

        let outcome = seq.run(&lawn(), ADDR).await;

        assert!(matches!(outcome, RunOutcome::Completed { steps_run: 2 }));
        assert_eq!(seq.state(), SequencerState::Completed);
        assert_eq!(
            client.commands(),
            vec![
                ValveCommand::Open,
                ValveCommand::Close,
                ValveCommand::Open,
                ValveCommand::Close
            ]
        );

        let offsets: Vec<u64> = client.calls().iter().map(|c| (c.at - start).as_secs()).collect();
        // open, hold 30+30, close, settle 30+30, open, hold 60+30, close, settle 60
        assert_eq!(offsets, vec![0, 60, 120, 210]);
        assert_eq!(start.elapsed(), Duration::from_secs(270));
        assert!(client.calls().iter().all(|c| c.address == ADDR));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_empty_slot_bounds_cycles() {
        for j in 0..=6 {
            let steps: Vec<Option<u32>> = (0..6).map(|i| if i < j { Some(1) } else { None }).collect();
            let program = IrrigationProgram::new(1, "p", steps, 6).unwrap();
            let client = Arc::new(MockValveClient::new());
            let mut seq = sequencer(client.clone(), fast_config());

            let outcome = seq.run(&program, ADDR).await;

            match outcome {
                RunOutcome::Completed { steps_run } => assert_eq!(steps_run, j),
                RunOutcome::Aborted(reason) => panic!("unexpected abort: {}", reason),
            }
            assert_eq!(client.count(ValveCommand::Open), j);
            assert_eq!(client.count(ValveCommand::Close), j);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_slot_stops_even_if_later_slots_are_set() {
        let program = IrrigationProgram::new(1, "p", vec![Some(1), None, Some(1), Some(1), None, None], 6).unwrap();
        let client = Arc::new(MockValveClient::new());
        let mut seq = sequencer(client.clone(), fast_config());

        let outcome = seq.run(&program, ADDR).await;

        assert!(matches!(outcome, RunOutcome::Completed { steps_run: 1 }));
        assert_eq!(client.commands().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_exhaustion_aborts_without_close() {
        let client = Arc::new(MockValveClient::new().failing_open(ALWAYS));
        let mut seq = sequencer(client.clone(), SequencerConfig::default());
        let start = Instant::now();

        let outcome = seq.run(&lawn(), ADDR).await;

        let RunOutcome::Aborted(reason) = outcome else {
            panic!("expected abort");
        };
        assert_eq!(reason.step, 0);
        assert_eq!(reason.command, ValveCommand::Open);
        assert_eq!(reason.error.attempts, 12);
        assert!(!reason.valve_may_be_open());
        assert_eq!(client.count(ValveCommand::Open), 12);
        assert_eq!(client.count(ValveCommand::Close), 0);
        assert_eq!(seq.state(), SequencerState::Aborted { step: 0 });
        // 11 waits of 10s between 12 attempts
        assert_eq!(start.elapsed(), Duration::from_secs(110));

        let spacing: Vec<u64> = client
            .calls()
            .windows(2)
            .map(|w| (w[1].at - w[0].at).as_secs())
            .collect();
        assert!(spacing.iter().all(|s| *s == 10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_exhaustion_stops_later_steps() {
        // First close succeeds, every close after that fails
        let client = Arc::new(MockValveClient::new().failing_close_after(1));
        let mut seq = sequencer(client.clone(), fast_config());

        let outcome = seq.run(&lawn(), ADDR).await;

        let RunOutcome::Aborted(reason) = outcome else {
            panic!("expected abort");
        };
        assert_eq!(reason.step, 1);
        assert_eq!(reason.command, ValveCommand::Close);
        assert!(reason.valve_may_be_open());
        assert!(reason.to_string().contains("may still be open"));
        assert!(reason.to_string().starts_with("step 2: failed to close the valve after 3 attempts"));
        assert_eq!(seq.state(), SequencerState::Aborted { step: 1 });

        // Step 0: open, close. Step 1: open, then 3 failed closes. Nothing more.
        assert_eq!(client.count(ValveCommand::Open), 2);
        assert_eq!(client.count(ValveCommand::Close), 4);
        assert_eq!(client.commands().last(), Some(&ValveCommand::Close));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_absorbed() {
        let client = Arc::new(MockValveClient::new().failing_open(2).failing_close(2));
        let mut seq = sequencer(client.clone(), fast_config());

        let outcome = seq.run(&lawn(), ADDR).await;

        assert!(outcome.is_completed());
        // 2 failed + 1 ok for the first open/close, then 1 each for step 2
        assert_eq!(client.count(ValveCommand::Open), 4);
        assert_eq!(client.count(ValveCommand::Close), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_events() {
        let client = Arc::new(MockValveClient::new().failing_open(1));
        let bus = Arc::new(EventBus::new(256));
        let mut rx = bus.subscribe();
        let program = IrrigationProgram::new(5, "beds", vec![Some(2), None, None, None, None, None], 6).unwrap();
        let mut seq = Sequencer::new(client, fast_config(), bus);

        seq.run(&program, ADDR).await;

        let mut types = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let RunEvent::AttemptFailed { attempt, command, .. } = &event {
                assert_eq!(*attempt, 1);
                assert_eq!(*command, ValveCommand::Open);
            }
            types.push(event.event_type());
        }
        assert_eq!(
            types,
            vec![
                "RunStarted",
                "StepStarted",
                "PhaseChanged",
                "AttemptFailed",
                "PhaseChanged",
                "PhaseChanged",
                "PhaseChanged",
                "StepCompleted",
                "RunCompleted"
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_aborted_run_emits_terminal_event() {
        let client = Arc::new(MockValveClient::new().failing_open(ALWAYS));
        let bus = Arc::new(EventBus::new(256));
        let mut rx = bus.subscribe();
        let mut seq = Sequencer::new(client, fast_config(), bus);

        seq.run(&lawn(), ADDR).await;

        let mut last = None;
        while let Ok(event) = rx.try_recv() {
            last = Some(event);
        }
        match last {
            Some(RunEvent::RunAborted { step, command, attempts, .. }) => {
                assert_eq!(step, 0);
                assert_eq!(command, ValveCommand::Open);
                assert_eq!(attempts, 3);
            }
            other => panic!("expected RunAborted, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequencer_is_reusable() {
        let client = Arc::new(MockValveClient::new());
        let mut seq = sequencer(client.clone(), fast_config());
        assert_eq!(seq.state(), SequencerState::Idle);

        assert!(seq.run(&lawn(), ADDR).await.is_completed());
        assert!(seq.run(&lawn(), ADDR).await.is_completed());
        assert_eq!(client.count(ValveCommand::Open), 4);
    }

    #[test]
    fn test_config_from_settings() {
        let mut config = Config::default();
        config.sequencer.transition_delay_secs = 5;
        config.sequencer.step_transition_delay_secs = 7;
        config.retry.max_attempts = 4;

        let seq_config = SequencerConfig::from(&config);
        assert_eq!(seq_config.hold_time(10), Duration::from_secs(15));
        assert_eq!(seq_config.settle_time(), Duration::from_secs(12));
        assert_eq!(seq_config.retry.max_attempts, 4);
    }

    #[test]
    fn test_generate_run_id() {
        let id = generate_run_id(&lawn());
        assert!(id.ends_with("-run-lawn"));
        assert_eq!(id.len(), "abcdef-run-lawn".len());

        let odd = IrrigationProgram::new(9, "!!!", vec![None; 6], 6).unwrap();
        assert!(generate_run_id(&odd).ends_with("-run-9"));
    }

    #[test]
    fn test_run_ids_differ_within_a_session() {
        let ids: std::collections::HashSet<String> = (0..50).map(|_| generate_run_id(&lawn())).collect();
        // 24 random bits per prefix; a handful of collisions at most
        assert!(ids.len() > 45);
    }
}
