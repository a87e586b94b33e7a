//! Valve protocol error types

use thiserror::Error;

/// A single failed round trip to the valve device
///
/// The variants exist for logging; callers treat every one of them as
/// "the attempt failed".
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Device answered {status} for {path}")]
    Status { status: u16, path: &'static str },

    #[error("Malformed response from {path}: {message}")]
    MalformedBody { path: &'static str, message: String },
}

impl ProtocolError {
    /// HTTP status code, if the device answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            ProtocolError::Status { status, .. } => Some(*status),
            ProtocolError::Network(e) => e.status().map(|s| s.as_u16()),
            ProtocolError::MalformedBody { .. } => None,
        }
    }

    /// Whether the device could not be reached at all
    pub fn is_unreachable(&self) -> bool {
        match self {
            ProtocolError::Network(e) => e.is_connect() || e.is_timeout(),
            _ => false,
        }
    }
}
