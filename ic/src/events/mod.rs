//! Run progress events
//!
//! Side channel for observing a program run: the sequencer emits an event for
//! every step and phase change and for each failed valve command attempt.
//! Consumers (the CLI progress printer, tests) subscribe to the bus.
//!
//! ```rust,ignore
//! let bus = create_event_bus();
//! let mut rx = bus.subscribe();
//! let mut sequencer = Sequencer::new(client, SequencerConfig::default(), bus.clone());
//! tokio::spawn(async move {
//!     while let Ok(event) = rx.recv().await {
//!         println!("{:?}", event);
//!     }
//! });
//! ```

mod bus;
mod types;

pub use bus::{DEFAULT_CHANNEL_CAPACITY, EventBus, EventEmitter, create_event_bus};
pub use types::{Phase, RunEvent};
