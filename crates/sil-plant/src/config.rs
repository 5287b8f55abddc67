//! Plant configuration from the environment.

/// Runtime settings for the plant binary.
#[derive(Debug, Clone)]
pub struct PlantConfig {
    /// CAN interface name (`CAN_CHANNEL`, default `vcan0`).
    pub can_channel: String,
}

impl PlantConfig {
    pub fn from_env() -> Self {
        Self {
            can_channel: std::env::var("CAN_CHANNEL").unwrap_or_else(|_| "vcan0".to_string()),
        }
    }
}
