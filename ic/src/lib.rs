//! Irrigation - valve orchestrator for timed watering programs
//!
//! Runs an irrigation program (a fixed-length list of watering steps) against
//! a network-attached valve device, opening and closing the valve for each
//! step and retrying failed commands on a fixed interval.
//!
//! # Modules
//!
//! - [`program`] - Program model, validation and lookup
//! - [`valve`] - Valve protocol client trait and HTTP implementation
//! - [`retry`] - Fixed-interval retry of fallible async operations
//! - [`sequencer`] - Step state machine driving one valve
//! - [`events`] - Run progress events
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod events;
pub mod program;
pub mod retry;
pub mod sequencer;
pub mod valve;

// Re-export commonly used types
pub use config::Config;
pub use events::{EventBus, EventEmitter, Phase, RunEvent, create_event_bus};
pub use program::{IrrigationProgram, LoadedPrograms, ProgramError, RejectedProgram, load_programs, parse_programs};
pub use retry::{RetryExhausted, RetryPolicy, with_retry};
pub use sequencer::{AbortReason, RunOutcome, Sequencer, SequencerConfig, SequencerState};
pub use valve::{HttpValveClient, ProtocolError, ValveClient, ValveCommand, ValveState};
