//! ValveClient trait definition

use async_trait::async_trait;

use super::{ProtocolError, ValveCommand, ValveState};

/// One round trip per call, no retries
///
/// Retrying is the caller's job (see [`crate::retry`]), which keeps every
/// command under the same retry policy. Commands are idempotent: opening an
/// open valve succeeds.
#[async_trait]
pub trait ValveClient: Send + Sync {
    /// `POST /valve/open`
    async fn send_open(&self, address: &str) -> Result<(), ProtocolError>;

    /// `POST /valve/close`
    async fn send_close(&self, address: &str) -> Result<(), ProtocolError>;

    /// `GET /valve/status`, always a live query
    async fn get_status(&self, address: &str) -> Result<ValveState, ProtocolError>;

    /// Send either command
    async fn send(&self, command: ValveCommand, address: &str) -> Result<(), ProtocolError> {
        match command {
            ValveCommand::Open => self.send_open(address).await,
            ValveCommand::Close => self.send_close(address).await,
        }
    }
}
