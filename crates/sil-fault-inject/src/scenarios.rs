//! Scripted fault scenarios.
//!
//! A closed enum keeps the registry exhaustive: adding a scenario means
//! adding a variant and the compiler walks every dispatch site. Each run
//! opens a short-lived bus handle (passed in by the caller), emits a
//! deterministic frame sequence through the shared codec, and returns a
//! human summary.

use std::time::Duration;

use serde_json::json;

use sil_broker::Channel;
use sil_codec::builders::{self, BrakeMode, Direction};
use sil_codec::{CanBus, CanFrame, FrameCodec};
use sil_protocol::frames::EcuSource;
use sil_protocol::{DTC_BATTERY_UV, topics};

use crate::error::InjectResult;

const BURST_GAP: Duration = Duration::from_millis(5);
const RAMP_GAP: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    NormalDrive,
    Overcurrent,
    SteerFault,
    BrakeFault,
    BatteryLow,
    Estop,
    Reset,
}

impl Scenario {
    pub const ALL: [Scenario; 7] = [
        Scenario::NormalDrive,
        Scenario::Overcurrent,
        Scenario::SteerFault,
        Scenario::BrakeFault,
        Scenario::BatteryLow,
        Scenario::Estop,
        Scenario::Reset,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "normal_drive" => Some(Self::NormalDrive),
            "overcurrent" => Some(Self::Overcurrent),
            "steer_fault" => Some(Self::SteerFault),
            "brake_fault" => Some(Self::BrakeFault),
            "battery_low" => Some(Self::BatteryLow),
            "estop" => Some(Self::Estop),
            "reset" => Some(Self::Reset),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::NormalDrive => "normal_drive",
            Self::Overcurrent => "overcurrent",
            Self::SteerFault => "steer_fault",
            Self::BrakeFault => "brake_fault",
            Self::BatteryLow => "battery_low",
            Self::Estop => "estop",
            Self::Reset => "reset",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::NormalDrive => "Normal drive: 50% torque forward, steer 0 deg, brake 0%.",
            Self::Overcurrent => {
                "Overcurrent: 95% torque + 100% emergency brake (mechanical jam) \
                 -> sustained overcurrent -> SAFE_STOP + DTC."
            }
            Self::SteerFault => {
                "Steering fault: 10 rapid +/-40 deg oscillations exceed the \
                 rate limit, latching the steering fault."
            }
            Self::BrakeFault => {
                "Brake fault: 10 rapid 0%/100% alternations trigger \
                 conflicting-command detection."
            }
            Self::BatteryLow => {
                "Battery drain: Battery_Status injections ramp 12.6 V down to \
                 8.5 V over 5 s, then fire DTC 0xE401."
            }
            Self::Estop => {
                "Emergency stop: EStop_Active=1 on 0x001. All actuators \
                 disabled, vehicle enters SAFE_STOP."
            }
            Self::Reset => "Reset: clears E-Stop, sets torque/steer/brake to zero.",
        }
    }

    /// Execute the scenario against `bus`.
    pub async fn run(
        self,
        bus: &dyn CanBus,
        codec: &FrameCodec,
        broker: Option<&dyn Channel>,
    ) -> InjectResult<String> {
        tracing::info!(scenario = self.name(), "running scenario");
        match self {
            Self::NormalDrive => self.normal_drive(bus, codec).await,
            Self::Overcurrent => self.overcurrent(bus, codec).await,
            Self::SteerFault => self.steer_fault(bus, codec).await,
            Self::BrakeFault => self.brake_fault(bus, codec).await,
            Self::BatteryLow => self.battery_low(bus).await,
            Self::Estop => self.estop(bus, codec).await,
            Self::Reset => self.reset(bus, codec, broker).await,
        }
    }

    async fn normal_drive(self, bus: &dyn CanBus, codec: &FrameCodec) -> InjectResult<String> {
        send(bus, builders::torque_request(codec, 50, Direction::Forward)).await?;
        send(bus, builders::steer_command(codec, 0.0, 10.0, 1)).await?;
        send(bus, builders::brake_command(codec, 0, BrakeMode::Normal, 1)).await?;
        Ok("Normal drive: 50% torque forward, steer 0 deg, brake 0%".to_string())
    }

    async fn overcurrent(self, bus: &dyn CanBus, codec: &FrameCodec) -> InjectResult<String> {
        // Emergency brake first so the rotor is held while torque ramps:
        // the load factor stays ~1 and current holds above the threshold.
        send(bus, builders::brake_command(codec, 100, BrakeMode::Emergency, 1)).await?;
        send(bus, builders::torque_request(codec, 95, Direction::Forward)).await?;
        Ok(
            "Overcurrent: 95% torque + 100% brake (mechanical jam); sustained \
             overcurrent expected"
                .to_string(),
        )
    }

    async fn steer_fault(self, bus: &dyn CanBus, codec: &FrameCodec) -> InjectResult<String> {
        for _ in 0..10 {
            send(bus, builders::steer_command(codec, 40.0, 50.0, 1)).await?;
            tokio::time::sleep(BURST_GAP).await;
            send(bus, builders::steer_command(codec, -40.0, 50.0, 1)).await?;
            tokio::time::sleep(BURST_GAP).await;
        }
        Ok("Steer fault: 10 rapid +/-40 deg oscillations sent".to_string())
    }

    async fn brake_fault(self, bus: &dyn CanBus, codec: &FrameCodec) -> InjectResult<String> {
        for _ in 0..10 {
            send(bus, builders::brake_command(codec, 100, BrakeMode::Emergency, 1)).await?;
            tokio::time::sleep(BURST_GAP).await;
            send(bus, builders::brake_command(codec, 0, BrakeMode::Release, 1)).await?;
            tokio::time::sleep(BURST_GAP).await;
        }
        Ok("Brake fault: 10 rapid 0%/100% alternations sent".to_string())
    }

    async fn battery_low(self, bus: &dyn CanBus) -> InjectResult<String> {
        // Phase 1: 12.6 V -> 10.2 V (UV_warn zone) over 2 s.
        for i in 0..20u32 {
            let frac = f64::from(i) / 19.0;
            let v = (12600.0 - (12600.0 - 10200.0) * frac) as u32;
            let soc = (100.0 - (100.0 - 18.0) * frac) as u8;
            let status = if v < 10500 { 1 } else { 2 };
            bus.send(&builders::battery_status(v, soc, status)).await?;
            tokio::time::sleep(RAMP_GAP).await;
        }

        // Phase 2: 10.2 V -> 8.5 V (critical_UV zone) over 3 s.
        for i in 0..30u32 {
            let frac = f64::from(i) / 29.0;
            let v = (10200.0 - (10200.0 - 8500.0) * frac) as u32;
            let soc = (18.0 - (18.0 - 3.0) * frac) as u8;
            let status = if v < 9000 { 0 } else { 1 };
            bus.send(&builders::battery_status(v, soc, status)).await?;
            tokio::time::sleep(RAMP_GAP).await;
        }

        bus.send(&builders::dtc_broadcast(DTC_BATTERY_UV, EcuSource::Rzc.as_u8(), 1))
            .await?;
        Ok("Battery drain: 12.6 V -> 8.5 V over 5 s + DTC 0xE401".to_string())
    }

    async fn estop(self, bus: &dyn CanBus, codec: &FrameCodec) -> InjectResult<String> {
        send(bus, builders::estop(codec, true, 1)).await?;
        Ok("E-Stop activated: EStop_Active=1, source=CAN_request".to_string())
    }

    async fn reset(
        self,
        bus: &dyn CanBus,
        codec: &FrameCodec,
        broker: Option<&dyn Channel>,
    ) -> InjectResult<String> {
        send(bus, builders::estop(codec, false, 1)).await?;
        tokio::time::sleep(Duration::from_millis(10)).await;
        send(bus, builders::torque_request(codec, 0, Direction::Stop)).await?;
        send(bus, builders::steer_command(codec, 0.0, 10.0, 1)).await?;
        send(bus, builders::brake_command(codec, 0, BrakeMode::Release, 1)).await?;

        // Broadcast the reset so broker consumers clear their state too.
        if let Some(broker) = broker {
            let ts = chrono::Utc::now().timestamp_millis() as f64 / 1000.0;
            let event = json!({"action": "reset", "ts": ts});
            let payload = serde_json::to_vec(&event).unwrap_or_default();
            if let Err(e) = broker
                .publish(&topics::command_reset(), &payload, rumqttc::QoS::AtLeastOnce, false)
                .await
            {
                tracing::warn!(error = %e, "reset event publish failed");
            }
        }

        Ok("Reset: E-Stop cleared, torque=0, steer=0, brake=0".to_string())
    }
}

async fn send(bus: &dyn CanBus, frame: sil_codec::CodecResult<CanFrame>) -> InjectResult<CanFrame> {
    let frame = frame.map_err(|e| {
        sil_codec::CanError::Interface(format!("frame build failed: {e}"))
    })?;
    bus.send(&frame).await?;
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sil_broker::MockChannel;
    use sil_codec::MockCanBus;
    use sil_protocol::frames::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn registry_roundtrip() {
        for scenario in Scenario::ALL {
            assert_eq!(Scenario::from_name(scenario.name()), Some(scenario));
            assert!(!scenario.description().is_empty());
        }
        assert!(Scenario::from_name("warp_drive").is_none());
    }

    #[tokio::test]
    async fn normal_drive_sends_three_commands() {
        let bus = MockCanBus::new();
        let codec = FrameCodec::new();
        Scenario::NormalDrive
            .run(&bus, &codec, None)
            .await
            .unwrap();

        let sent = bus.sent();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0].id, CAN_TORQUE_REQUEST);
        assert_eq!(sent[0].data[2], 50);
        assert_eq!(sent[1].id, CAN_STEER_COMMAND);
        assert_eq!(sent[2].id, CAN_BRAKE_COMMAND);
        assert_eq!(sent[2].data[2], 0);
    }

    #[tokio::test]
    async fn overcurrent_brakes_before_torque() {
        let bus = MockCanBus::new();
        let codec = FrameCodec::new();
        Scenario::Overcurrent.run(&bus, &codec, None).await.unwrap();

        let sent = bus.sent();
        assert_eq!(sent[0].id, CAN_BRAKE_COMMAND);
        assert_eq!(sent[0].data[2], 100);
        assert_eq!(sent[0].data[3] & 0x0F, BrakeMode::Emergency as u8);
        assert_eq!(sent[1].id, CAN_TORQUE_REQUEST);
        assert_eq!(sent[1].data[2], 95);
    }

    #[tokio::test(start_paused = true)]
    async fn steer_fault_sends_twenty_oscillations() {
        let bus = MockCanBus::new();
        let codec = FrameCodec::new();
        Scenario::SteerFault.run(&bus, &codec, None).await.unwrap();

        let sent = bus.sent_with_id(CAN_STEER_COMMAND);
        assert_eq!(sent.len(), 20);
        // Alternating +40/-40: raw 8500 / 500.
        let raw0 = u16::from(sent[0].data[2]) | (u16::from(sent[0].data[3]) << 8);
        let raw1 = u16::from(sent[1].data[2]) | (u16::from(sent[1].data[3]) << 8);
        assert_eq!(raw0, 8500);
        assert_eq!(raw1, 500);
    }

    #[tokio::test(start_paused = true)]
    async fn battery_low_ramps_and_fires_dtc() {
        let bus = MockCanBus::new();
        let codec = FrameCodec::new();
        Scenario::BatteryLow.run(&bus, &codec, None).await.unwrap();

        let batteries = bus.sent_with_id(CAN_BATTERY_STATUS);
        assert_eq!(batteries.len(), 50);

        let first = &batteries[0];
        let v_first = u16::from(first.data[0]) | (u16::from(first.data[1]) << 8);
        assert_eq!(v_first, 12600);
        assert_eq!(first.data[3], 2);

        let last = &batteries[49];
        let v_last = u16::from(last.data[0]) | (u16::from(last.data[1]) << 8);
        assert_eq!(v_last, 8500);
        assert_eq!(last.data[3], 0);

        // Voltage ramp is monotonically non-increasing.
        let mut prev = u16::MAX;
        for frame in &batteries {
            let v = u16::from(frame.data[0]) | (u16::from(frame.data[1]) << 8);
            assert!(v <= prev);
            prev = v;
        }

        let dtcs = bus.sent_with_id(CAN_DTC_BROADCAST);
        assert_eq!(dtcs.len(), 1);
        let code = u16::from(dtcs[0].data[0]) | (u16::from(dtcs[0].data[1]) << 8);
        assert_eq!(code, DTC_BATTERY_UV);
    }

    #[tokio::test]
    async fn estop_sets_active_bit() {
        let bus = MockCanBus::new();
        let codec = FrameCodec::new();
        Scenario::Estop.run(&bus, &codec, None).await.unwrap();

        let sent = bus.sent_with_id(CAN_ESTOP);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].data[2] & 0x01, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_clears_and_broadcasts() {
        let bus = MockCanBus::new();
        let codec = FrameCodec::new();
        let broker = Arc::new(MockChannel::new());
        Scenario::Reset
            .run(&bus, &codec, Some(&*broker))
            .await
            .unwrap();

        let estops = bus.sent_with_id(CAN_ESTOP);
        assert_eq!(estops[0].data[2] & 0x01, 0);
        assert_eq!(bus.sent_with_id(CAN_TORQUE_REQUEST)[0].data[2], 0);
        assert_eq!(bus.sent_with_id(CAN_BRAKE_COMMAND)[0].data[2], 0);

        let events = broker.published_on("silrig/command/reset");
        assert_eq!(events.len(), 1);
        let json: serde_json::Value = serde_json::from_slice(&events[0].payload).unwrap();
        assert_eq!(json["action"], "reset");
    }
}
