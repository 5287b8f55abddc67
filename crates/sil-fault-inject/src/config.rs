//! Injector configuration from the environment.

use std::time::Duration;

/// Runtime settings for the fault-injection binary.
#[derive(Debug, Clone)]
pub struct InjectConfig {
    /// HTTP listen port (`FAULT_PORT`, default 8091).
    pub port: u16,
    /// CAN interface name (`CAN_CHANNEL`, default `vcan0`).
    pub can_channel: String,
    /// Control-lock TTL (`LOCK_DURATION_SEC`, default 300).
    pub lock_ttl: Duration,
}

impl InjectConfig {
    pub fn from_env() -> Self {
        let port = std::env::var("FAULT_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8091);
        let can_channel = std::env::var("CAN_CHANNEL").unwrap_or_else(|_| "vcan0".to_string());
        let lock_secs = std::env::var("LOCK_DURATION_SEC")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(300);
        Self {
            port,
            can_channel,
            lock_ttl: Duration::from_secs(lock_secs),
        }
    }
}
