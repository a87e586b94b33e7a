//! ValveDevice - simulator for the remote irrigation valve
//!
//! Serves the valve control contract over plain HTTP from an in-memory valve,
//! so the orchestrator can be exercised without the physical controller.
//!
//! | Method | Path            | Response                          |
//! |--------|-----------------|-----------------------------------|
//! | GET    | `/valve/status` | 200 `{"status":"open"\|"closed"}` |
//! | POST   | `/valve/open`   | 200, empty body                   |
//! | POST   | `/valve/close`  | 200, empty body                   |
//! | any    | unknown path    | 404                               |
//! | other  | known path      | 405                               |
//!
//! # Example
//!
//! ```ignore
//! use valvedevice::spawn_device;
//!
//! let device = spawn_device("127.0.0.1:0").await?;
//! // ... drive http://{device.addr()}/valve/open ...
//! let valve = device.shutdown().await?;
//! assert_eq!(valve.transitions().len(), 3);
//! ```

pub mod http;
pub mod routes;
pub mod server;
pub mod valve;

pub use routes::{Dispatch, ROUTES, Route, resolve};
pub use server::{DeviceHandle, DeviceServer, spawn_device};
pub use valve::{Actuation, Valve, ValveState};

/// Address the device listens on when none is given
pub const DEFAULT_BIND: &str = "0.0.0.0:80";
