//! Shared wire and domain types for the SIL rig.
//!
//! Everything both ends of the bus must agree on lives here: the CAN frame
//! catalogue with its E2E data IDs, vehicle operating modes, DTC codes, and
//! the broker topic hierarchy.

pub mod dtc;
pub mod frames;
pub mod state;
pub mod topics;

pub use dtc::{DTC_BATTERY_UV, DTC_BRAKE_FAULT, DTC_OVERCURRENT, DTC_STEER_FAULT, DtcAlert};
pub use frames::EcuSource;
pub use state::VehicleState;
