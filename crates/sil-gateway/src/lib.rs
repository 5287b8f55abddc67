//! CAN → broker gateway for the SIL rig.
//!
//! Decodes every catalogued frame on the bus, publishes each signal to its
//! own retained topic, raises DTC alerts, and validates E2E protection
//! (CRC, data ID, alive continuity) with counters on the telemetry topic.

pub mod gateway;
pub mod publisher;
pub mod validator;

pub use gateway::Gateway;
pub use publisher::SignalPublisher;
pub use validator::{E2eStats, E2eValidator, E2eViolation};
