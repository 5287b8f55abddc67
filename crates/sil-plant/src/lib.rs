//! Plant simulator for the SIL rig.
//!
//! Consumes actuator-command frames from the virtual CAN bus, advances
//! motor/steering/brake/battery/lidar physics at 100 Hz, runs the vehicle
//! state machine with safety priorities, and emits E2E-protected sensor
//! feedback at the catalogue cadences.

pub mod config;
pub mod dtc;
pub mod models;
pub mod sim;
pub mod state;
pub mod tx;

pub use config::PlantConfig;
pub use sim::PlantSimulator;
pub use state::{StateInputs, StateMachine, next_state};
