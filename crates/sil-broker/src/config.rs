use serde::Deserialize;

/// Broker connection settings, loadable from TOML or the environment.
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    /// Broker hostname.
    #[serde(default = "default_host")]
    pub host: String,
    /// Broker port (default 1883, plaintext).
    #[serde(default = "default_port")]
    pub port: u16,
    /// MQTT client ID (must be unique per process).
    pub client_id: String,
    /// Keep-alive interval in seconds.
    #[serde(default = "default_keepalive")]
    pub keepalive_secs: u16,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    1883
}

fn default_keepalive() -> u16 {
    30
}

impl BrokerConfig {
    /// Read `MQTT_HOST`/`MQTT_PORT` from the environment with defaults.
    pub fn from_env(client_id: &str) -> Self {
        let host = std::env::var("MQTT_HOST").unwrap_or_else(|_| default_host());
        let port = std::env::var("MQTT_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or_else(default_port);
        Self {
            host,
            port,
            client_id: client_id.to_string(),
            keepalive_secs: default_keepalive(),
        }
    }
}
