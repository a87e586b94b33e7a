//! Valve protocol types shared by the client and the sequencer

use serde::{Deserialize, Serialize};

pub const STATUS_PATH: &str = "/valve/status";
pub const OPEN_PATH: &str = "/valve/open";
pub const CLOSE_PATH: &str = "/valve/close";

/// Valve position as reported by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValveState {
    Open,
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

/// A command sent to the valve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValveCommand {
    Open,
    Close,
}

impl ValveCommand {
    /// Request path that carries this command
    pub fn path(self) -> &'static str {
        match self {
            Self::Open => OPEN_PATH,
            Self::Close => CLOSE_PATH,
        }
    }
}

impl std::fmt::Display for ValveCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Close => write!(f, "close"),
        }
    }
}

/// Body of `GET /valve/status`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusBody {
    pub status: ValveState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_body_parses() {
        let body: StatusBody = serde_json::from_str(r#"{"status":"open"}"#).unwrap();
        assert_eq!(body.status, ValveState::Open);
        let body: StatusBody = serde_json::from_str(r#"{"status": "closed"}"#).unwrap();
        assert_eq!(body.status, ValveState::Closed);
    }

    #[test]
    fn test_status_body_rejects_unknown_state() {
        assert!(serde_json::from_str::<StatusBody>(r#"{"status":"ajar"}"#).is_err());
        assert!(serde_json::from_str::<StatusBody>(r#"{}"#).is_err());
    }

    #[test]
    fn test_command_paths() {
        assert_eq!(ValveCommand::Open.path(), "/valve/open");
        assert_eq!(ValveCommand::Close.path(), "/valve/close");
    }
}
