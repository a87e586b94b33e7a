//! Valve protocol client
//!
//! Translates a logical command into exactly one HTTP round trip against the
//! valve device and reduces the outcome to success or [`ProtocolError`].

pub mod client;
mod error;
mod http;
mod types;

pub use client::ValveClient;
pub use error::ProtocolError;
pub use http::{HttpValveClient, device_url};
pub use types::{CLOSE_PATH, OPEN_PATH, STATUS_PATH, StatusBody, ValveCommand, ValveState};
