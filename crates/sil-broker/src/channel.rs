//! Broker channel — async MQTT client for rig telemetry.
//!
//! Wraps `rumqttc::AsyncClient` with typed publish helpers for decoded CAN
//! signals, bus statistics, DTC alerts, reset events, and the injector
//! control-lock state.

use async_trait::async_trait;
use rumqttc::{AsyncClient, EventLoop, MqttOptions, QoS};
use serde::Serialize;

use sil_protocol::{DtcAlert, topics};

use crate::config::BrokerConfig;
use crate::error::{BrokerError, BrokerResult};

// ── Channel trait ─────────────────────────────────────────────

/// Abstraction for broker publishing and subscribing.
///
/// Enables mocking in tests without a live MQTT broker.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Publish a raw payload to a topic.
    async fn publish(&self, topic: &str, payload: &[u8], qos: QoS, retain: bool)
    -> BrokerResult<()>;

    /// Subscribe to a topic filter.
    async fn subscribe(&self, filter: &str, qos: QoS) -> BrokerResult<()>;
}

#[async_trait]
impl<C: Channel + ?Sized> Channel for std::sync::Arc<C> {
    async fn publish(
        &self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> BrokerResult<()> {
        (**self).publish(topic, payload, qos, retain).await
    }

    async fn subscribe(&self, filter: &str, qos: QoS) -> BrokerResult<()> {
        (**self).subscribe(filter, qos).await
    }
}

// ── BrokerClient ──────────────────────────────────────────────

/// Broker client connected to the rig's MQTT broker.
///
/// Owns the `AsyncClient`. The `EventLoop` is returned separately from
/// `connect()` — the caller must drive it in a spawned task via
/// `eventloop.poll()`.
pub struct BrokerClient {
    client: AsyncClient,
}

impl BrokerClient {
    /// Create a client from the given config. Plaintext, local broker.
    pub fn connect(config: &BrokerConfig) -> (Self, EventLoop) {
        let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
        options.set_keep_alive(std::time::Duration::from_secs(config.keepalive_secs.into()));

        let (client, eventloop) = AsyncClient::new(options, 64);
        (Self { client }, eventloop)
    }

    // ── Typed publish helpers ─────────────────────────────────

    /// Publish one decoded CAN signal value (retained, QoS 0).
    pub async fn publish_signal(
        &self,
        msg_name: &str,
        signal_name: &str,
        value: &str,
    ) -> BrokerResult<()> {
        let topic = topics::can_signal(msg_name, signal_name);
        self.publish(&topic, value.as_bytes(), QoS::AtMostOnce, true)
            .await
    }

    /// Publish the bus message rate (retained, QoS 0).
    pub async fn publish_rate(&self, msgs_per_sec: f64) -> BrokerResult<()> {
        let payload = format!("{msgs_per_sec:.0}");
        self.publish(&topics::stats_rate(), payload.as_bytes(), QoS::AtMostOnce, true)
            .await
    }

    /// Publish E2E validation counters (retained, QoS 0).
    pub async fn publish_e2e_stats<T: Serialize>(&self, stats: &T) -> BrokerResult<()> {
        self.publish_json(&topics::e2e_telemetry(), stats, QoS::AtMostOnce, true)
            .await
    }

    /// Publish a DTC alert (QoS 1).
    pub async fn publish_dtc_alert(&self, alert: &DtcAlert) -> BrokerResult<()> {
        let topic = topics::dtc_alert(&alert.dtc);
        self.publish_json(&topic, alert, QoS::AtLeastOnce, false)
            .await
    }

    /// Publish a reset event (QoS 1).
    pub async fn publish_reset<T: Serialize>(&self, event: &T) -> BrokerResult<()> {
        self.publish_json(&topics::command_reset(), event, QoS::AtLeastOnce, false)
            .await
    }

    /// Publish the injector control-lock state (retained, QoS 0).
    pub async fn publish_lock_state<T: Serialize>(&self, state: &T) -> BrokerResult<()> {
        self.publish_json(&topics::control_lock(), state, QoS::AtMostOnce, true)
            .await
    }

    /// Subscribe to the whole rig hierarchy.
    pub async fn subscribe_all(&self) -> BrokerResult<()> {
        self.subscribe(&topics::subscribe_all(), QoS::AtMostOnce)
            .await
    }

    // ── Internal helpers ──────────────────────────────────────

    async fn publish_json<T: Serialize>(
        &self,
        topic: &str,
        payload: &T,
        qos: QoS,
        retain: bool,
    ) -> BrokerResult<()> {
        let bytes =
            serde_json::to_vec(payload).map_err(|e| BrokerError::Serialization(e.to_string()))?;
        self.publish(topic, &bytes, qos, retain).await
    }
}

#[async_trait]
impl Channel for BrokerClient {
    async fn publish(
        &self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> BrokerResult<()> {
        self.client
            .publish(topic, qos, retain, payload)
            .await
            .map_err(|e| BrokerError::Publish(e.to_string()))
    }

    async fn subscribe(&self, filter: &str, qos: QoS) -> BrokerResult<()> {
        self.client
            .subscribe(filter, qos)
            .await
            .map_err(|e| BrokerError::Subscribe(e.to_string()))
    }
}
