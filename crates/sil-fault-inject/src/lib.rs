//! Fault injection service for the SIL rig.
//!
//! Exposes the scripted scenario registry over HTTP, guarded by an
//! optional single-holder control lock with a TTL watchdog.

pub mod config;
pub mod error;
pub mod lock;
pub mod routes;
pub mod scenarios;
pub mod state;

pub use config::InjectConfig;
pub use error::{InjectError, InjectResult};
pub use lock::{ControlLock, LockState, spawn_watchdog};
pub use routes::build_router;
pub use scenarios::Scenario;
pub use state::{AppState, BusProvider, MockBusProvider};
