//! Capture monitors for the two observation channels.

pub mod broker;
pub mod can;

pub use broker::{BrokerCapture, BrokerMonitor};
pub use can::{CanCapture, CanMonitor};
