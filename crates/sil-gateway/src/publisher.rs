//! Signal fan-out: decoded CAN frames to broker topics.

use std::time::Instant;

use sil_broker::Channel;
use sil_codec::DecodedFrame;
use sil_protocol::frames::CAN_DTC_BROADCAST;
use sil_protocol::{DtcAlert, topics};

use crate::validator::E2eStats;

/// Publishes per-signal values, DTC alerts, and periodic statistics.
pub struct SignalPublisher<C: Channel> {
    channel: C,
    msg_count: u64,
    last_stats: Instant,
    msgs_per_sec: f64,
}

impl<C: Channel> SignalPublisher<C> {
    pub fn new(channel: C) -> Self {
        Self {
            channel,
            msg_count: 0,
            last_stats: Instant::now(),
            msgs_per_sec: 0.0,
        }
    }

    pub fn msgs_per_sec(&self) -> f64 {
        self.msgs_per_sec
    }

    /// Publish each signal of a decoded frame to its own retained topic.
    pub async fn publish_frame(&mut self, frame: &DecodedFrame, raw: &[u8]) {
        for signal in &frame.signals {
            let topic = topics::can_signal(frame.msg_name, signal.name);
            let value = format_value(signal.value);
            if let Err(e) = self
                .channel
                .publish(&topic, value.as_bytes(), rumqttc::QoS::AtMostOnce, true)
                .await
            {
                tracing::debug!(topic, error = %e, "signal publish failed");
            }
        }
        self.msg_count += 1;

        if frame.arb_id == CAN_DTC_BROADCAST {
            self.publish_dtc_alert(raw).await;
        }
    }

    async fn publish_dtc_alert(&self, raw: &[u8]) {
        let ts = chrono::Utc::now().timestamp_millis() as f64 / 1000.0;
        let Some(alert) = DtcAlert::from_payload(raw, ts) else {
            return;
        };
        if alert.code() == Some(0) {
            return;
        }
        let topic = topics::dtc_alert(&alert.dtc);
        match serde_json::to_vec(&alert) {
            Ok(payload) => {
                if let Err(e) = self
                    .channel
                    .publish(&topic, &payload, rumqttc::QoS::AtLeastOnce, false)
                    .await
                {
                    tracing::warn!(topic, error = %e, "DTC alert publish failed");
                } else {
                    tracing::info!(dtc = %alert.dtc, ecu = alert.ecu_source, "DTC alert published");
                }
            }
            Err(e) => tracing::debug!(error = %e, "DTC alert serialization failed"),
        }
    }

    /// Publish rate and E2E counters once per second. Call every loop turn.
    pub async fn publish_stats(&mut self, e2e: &E2eStats) {
        let elapsed = self.last_stats.elapsed();
        if elapsed.as_secs_f64() < 1.0 {
            return;
        }
        self.msgs_per_sec = self.msg_count as f64 / elapsed.as_secs_f64();
        self.msg_count = 0;
        self.last_stats = Instant::now();

        let rate = format!("{:.0}", self.msgs_per_sec);
        if let Err(e) = self
            .channel
            .publish(
                &topics::stats_rate(),
                rate.as_bytes(),
                rumqttc::QoS::AtMostOnce,
                true,
            )
            .await
        {
            tracing::debug!(error = %e, "rate publish failed");
        }

        match serde_json::to_vec(e2e) {
            Ok(payload) => {
                if let Err(e) = self
                    .channel
                    .publish(
                        &topics::e2e_telemetry(),
                        &payload,
                        rumqttc::QoS::AtMostOnce,
                        true,
                    )
                    .await
                {
                    tracing::debug!(error = %e, "E2E stats publish failed");
                }
            }
            Err(e) => tracing::debug!(error = %e, "E2E stats serialization failed"),
        }
    }
}

/// Integers print without a fraction, scaled values with two decimals.
fn format_value(value: f64) -> String {
    if (value - value.round()).abs() < 1e-9 {
        format!("{}", value.round() as i64)
    } else {
        format!("{value:.2}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sil_broker::MockChannel;
    use sil_codec::decode_by_id;
    use sil_protocol::frames::CAN_BATTERY_STATUS;
    use std::sync::Arc;

    #[tokio::test]
    async fn publishes_each_signal_retained() {
        let channel = Arc::new(MockChannel::new());
        let mut publisher = SignalPublisher::new(channel.clone());

        let raw = vec![0x38, 0x31, 100, 2];
        let frame = decode_by_id(CAN_BATTERY_STATUS, &raw).unwrap().unwrap();
        publisher.publish_frame(&frame, &raw).await;

        let msgs = channel.published();
        assert_eq!(msgs.len(), 3);
        let voltage = channel.published_on("silrig/can/Battery_Status/BatteryVoltage_mV");
        assert_eq!(voltage.len(), 1);
        assert_eq!(voltage[0].payload, b"12600");
        assert!(voltage[0].retain);
    }

    #[tokio::test]
    async fn dtc_frame_raises_alert() {
        let channel = Arc::new(MockChannel::new());
        let mut publisher = SignalPublisher::new(channel.clone());

        let raw = vec![0x01, 0xE3, 0x01, 3, 1, 0, 0, 0];
        let frame = decode_by_id(CAN_DTC_BROADCAST, &raw).unwrap().unwrap();
        publisher.publish_frame(&frame, &raw).await;

        let alerts = channel.published_on("silrig/alerts/dtc/0xE301");
        assert_eq!(alerts.len(), 1);
        let alert: DtcAlert = serde_json::from_slice(&alerts[0].payload).unwrap();
        assert_eq!(alert.ecu_source, 3);
        assert_eq!(alert.status, 1);
    }

    #[tokio::test]
    async fn stats_throttled_to_one_second() {
        let channel = Arc::new(MockChannel::new());
        let mut publisher = SignalPublisher::new(channel.clone());

        publisher.publish_stats(&E2eStats::default()).await;
        publisher.publish_stats(&E2eStats::default()).await;
        // Inside the first second nothing is published.
        assert!(channel.published_on(&topics::stats_rate()).is_empty());
    }

    #[test]
    fn value_formatting() {
        assert_eq!(format_value(2000.0), "2000");
        assert_eq!(format_value(20.5), "20.50");
        assert_eq!(format_value(-45.0), "-45");
    }
}
