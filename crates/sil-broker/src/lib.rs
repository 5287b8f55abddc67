//! MQTT channel for the SIL rig.
//!
//! A thin typed layer over `rumqttc` carrying decoded signals, statistics,
//! DTC alerts, and control events between rig components.

pub mod channel;
pub mod config;
pub mod error;
pub mod mock;

pub use channel::{BrokerClient, Channel};
pub use config::BrokerConfig;
pub use error::{BrokerError, BrokerResult};
pub use mock::{MockChannel, PublishedMessage};
