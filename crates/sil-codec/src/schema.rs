//! Static signal schema for the bus catalogue.
//!
//! Every message defines a bit-exact layout of little-endian unsigned
//! fields, optionally with a linear scale/offset. Lookup tables are built
//! once at startup; decoding is a table walk, no reflection.

use std::collections::HashMap;
use std::sync::OnceLock;

use sil_protocol::frames::*;

use crate::error::{CodecError, CodecResult};

/// One unsigned bit field within a payload.
///
/// `start_bit` counts from bit 0 of byte 0 (LSB first); multi-byte fields
/// are little-endian.
#[derive(Debug, Clone, Copy)]
pub struct SignalSpec {
    pub name: &'static str,
    pub start_bit: u16,
    pub bit_len: u16,
    pub scale: f64,
    pub offset: f64,
}

impl SignalSpec {
    const fn raw(name: &'static str, start_bit: u16, bit_len: u16) -> Self {
        Self {
            name,
            start_bit,
            bit_len,
            scale: 1.0,
            offset: 0.0,
        }
    }

    const fn scaled(
        name: &'static str,
        start_bit: u16,
        bit_len: u16,
        scale: f64,
        offset: f64,
    ) -> Self {
        Self {
            name,
            start_bit,
            bit_len,
            scale,
            offset,
        }
    }
}

/// A message layout: arbitration ID, DLC, E2E marker, and signal list.
#[derive(Debug, Clone, Copy)]
pub struct MessageSpec {
    pub name: &'static str,
    pub arb_id: u32,
    pub dlc: usize,
    pub e2e: bool,
    pub data_id: Option<u8>,
    pub signals: &'static [SignalSpec],
}

/// A decoded signal value.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedSignal {
    pub name: &'static str,
    pub value: f64,
    pub raw: u64,
}

/// A fully decoded frame.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    pub msg_name: &'static str,
    pub arb_id: u32,
    pub signals: Vec<DecodedSignal>,
}

impl DecodedFrame {
    /// Look up a decoded signal by name.
    pub fn signal(&self, name: &str) -> Option<&DecodedSignal> {
        self.signals.iter().find(|s| s.name == name)
    }
}

static CATALOG: &[MessageSpec] = &[
    MessageSpec {
        name: "EStop_Broadcast",
        arb_id: CAN_ESTOP,
        dlc: 4,
        e2e: true,
        data_id: Some(DATA_ID_ESTOP),
        signals: &[
            SignalSpec::raw("EStop_Active", 16, 1),
            SignalSpec::raw("EStop_Source", 17, 3),
        ],
    },
    MessageSpec {
        name: "Vehicle_State",
        arb_id: CAN_VEHICLE_STATE,
        dlc: 8,
        e2e: true,
        data_id: Some(DATA_ID_VEHICLE_STATE),
        signals: &[
            SignalSpec::raw("State", 16, 4),
            SignalSpec::raw("FaultMask", 24, 8),
            SignalSpec::raw("TorqueLimit", 32, 8),
            SignalSpec::raw("SpeedLimit", 40, 8),
        ],
    },
    MessageSpec {
        name: "Torque_Request",
        arb_id: CAN_TORQUE_REQUEST,
        dlc: 8,
        e2e: true,
        data_id: Some(DATA_ID_TORQUE),
        signals: &[
            SignalSpec::raw("TorqueRequest", 16, 8),
            SignalSpec::raw("Direction", 24, 2),
        ],
    },
    MessageSpec {
        name: "Steer_Command",
        arb_id: CAN_STEER_COMMAND,
        dlc: 8,
        e2e: true,
        data_id: Some(DATA_ID_STEER),
        signals: &[
            SignalSpec::scaled("SteerAngleCmd", 16, 16, 0.01, -45.0),
            SignalSpec::scaled("SteerRateLimit", 32, 8, 0.2, 0.0),
            SignalSpec::raw("VehicleState", 40, 4),
        ],
    },
    MessageSpec {
        name: "Brake_Command",
        arb_id: CAN_BRAKE_COMMAND,
        dlc: 8,
        e2e: true,
        data_id: Some(DATA_ID_BRAKE),
        signals: &[
            SignalSpec::raw("BrakeForceCmd", 16, 8),
            SignalSpec::raw("BrakeMode", 24, 4),
            SignalSpec::raw("VehicleState", 28, 4),
        ],
    },
    MessageSpec {
        name: "Steering_Status",
        arb_id: CAN_STEERING_STATUS,
        dlc: 8,
        e2e: true,
        data_id: Some(DATA_ID_STEERING_STATUS),
        signals: &[
            SignalSpec::scaled("SteerAngleActual", 16, 16, 0.01, -45.0),
            SignalSpec::scaled("SteerAngleCmd", 32, 16, 0.01, -45.0),
            SignalSpec::raw("SteerFaultStatus", 48, 4),
            SignalSpec::raw("SteerMode", 52, 4),
            SignalSpec::scaled("ServoCurrent_mA", 56, 8, 10.0, 0.0),
        ],
    },
    MessageSpec {
        name: "Brake_Status",
        arb_id: CAN_BRAKE_STATUS,
        dlc: 8,
        e2e: true,
        data_id: Some(DATA_ID_BRAKE_STATUS),
        signals: &[
            SignalSpec::raw("BrakePosition", 16, 8),
            SignalSpec::raw("BrakeForceCmd", 24, 8),
            SignalSpec::raw("ServoCurrent_mA", 32, 16),
            SignalSpec::raw("BrakeFaultStatus", 48, 4),
            SignalSpec::raw("BrakeMode", 52, 4),
        ],
    },
    MessageSpec {
        name: "Lidar_Distance",
        arb_id: CAN_LIDAR_DISTANCE,
        dlc: 8,
        e2e: true,
        data_id: Some(DATA_ID_LIDAR),
        signals: &[
            SignalSpec::raw("Distance_cm", 16, 16),
            SignalSpec::raw("SignalStrength", 32, 16),
            SignalSpec::raw("ObstacleZone", 48, 4),
            SignalSpec::raw("SensorStatus", 52, 4),
        ],
    },
    MessageSpec {
        name: "Motor_Status",
        arb_id: CAN_MOTOR_STATUS,
        dlc: 8,
        e2e: true,
        data_id: Some(DATA_ID_MOTOR_STATUS),
        signals: &[
            SignalSpec::raw("MotorSpeed_RPM", 16, 16),
            SignalSpec::raw("Direction", 32, 2),
            SignalSpec::raw("Enable", 34, 1),
            SignalSpec::raw("FaultBits", 35, 5),
            SignalSpec::raw("Duty", 40, 8),
            SignalSpec::raw("DeratingPct", 48, 8),
        ],
    },
    MessageSpec {
        name: "Motor_Current",
        arb_id: CAN_MOTOR_CURRENT,
        dlc: 8,
        e2e: true,
        data_id: Some(DATA_ID_MOTOR_CURRENT),
        signals: &[
            SignalSpec::raw("MotorCurrent_mA", 16, 16),
            SignalSpec::raw("Direction", 32, 1),
            SignalSpec::raw("Enable", 33, 1),
            SignalSpec::raw("OvercurrentFlag", 34, 1),
            SignalSpec::raw("TorqueEcho", 35, 8),
        ],
    },
    MessageSpec {
        name: "Motor_Temperature",
        arb_id: CAN_MOTOR_TEMP,
        dlc: 6,
        e2e: true,
        data_id: Some(DATA_ID_MOTOR_TEMP),
        signals: &[
            SignalSpec::scaled("WindingTemp1", 16, 8, 1.0, -40.0),
            SignalSpec::scaled("WindingTemp2", 24, 8, 1.0, -40.0),
            SignalSpec::raw("DeratingPct", 32, 8),
            SignalSpec::raw("TempFaultStatus", 40, 4),
        ],
    },
    MessageSpec {
        name: "Battery_Status",
        arb_id: CAN_BATTERY_STATUS,
        dlc: 4,
        e2e: false,
        data_id: None,
        signals: &[
            SignalSpec::raw("BatteryVoltage_mV", 0, 16),
            SignalSpec::raw("BatterySOC", 16, 8),
            SignalSpec::raw("BatteryStatus", 24, 4),
        ],
    },
    MessageSpec {
        name: "DTC_Broadcast",
        arb_id: CAN_DTC_BROADCAST,
        dlc: 8,
        e2e: false,
        data_id: None,
        signals: &[
            SignalSpec::raw("DTC_Number", 0, 16),
            SignalSpec::raw("DTC_Status", 16, 8),
            SignalSpec::raw("ECU_Source", 24, 8),
            SignalSpec::raw("OccurrenceCount", 32, 8),
            SignalSpec::raw("FreezeFrame0", 40, 8),
            SignalSpec::raw("FreezeFrame1", 48, 8),
            SignalSpec::raw("FreezeFrame2", 56, 8),
        ],
    },
];

fn by_id() -> &'static HashMap<u32, &'static MessageSpec> {
    static MAP: OnceLock<HashMap<u32, &'static MessageSpec>> = OnceLock::new();
    MAP.get_or_init(|| CATALOG.iter().map(|m| (m.arb_id, m)).collect())
}

fn by_name() -> &'static HashMap<&'static str, &'static MessageSpec> {
    static MAP: OnceLock<HashMap<&'static str, &'static MessageSpec>> = OnceLock::new();
    MAP.get_or_init(|| CATALOG.iter().map(|m| (m.name, m)).collect())
}

/// The full message catalogue.
pub fn catalog() -> &'static [MessageSpec] {
    CATALOG
}

/// Look up a message layout by arbitration ID.
pub fn spec_by_id(arb_id: u32) -> Option<&'static MessageSpec> {
    by_id().get(&arb_id).copied()
}

/// Look up a message layout by name.
pub fn spec_by_name(name: &str) -> Option<&'static MessageSpec> {
    by_name().get(name).copied()
}

/// Decode a payload against a registered message name.
pub fn decode_signal(msg_name: &str, data: &[u8]) -> CodecResult<DecodedFrame> {
    let spec =
        spec_by_name(msg_name).ok_or_else(|| CodecError::UnknownMessage(msg_name.to_string()))?;
    decode_with(spec, data)
}

/// Decode a payload against the catalogue by arbitration ID.
///
/// Returns `None` for IDs not in the catalogue (unknown traffic is skipped,
/// not an error).
pub fn decode_by_id(arb_id: u32, data: &[u8]) -> Option<CodecResult<DecodedFrame>> {
    spec_by_id(arb_id).map(|spec| decode_with(spec, data))
}

fn decode_with(spec: &'static MessageSpec, data: &[u8]) -> CodecResult<DecodedFrame> {
    if data.len() != spec.dlc {
        return Err(CodecError::Length {
            message: spec.name,
            expected: spec.dlc,
            got: data.len(),
        });
    }
    let signals = spec
        .signals
        .iter()
        .map(|sig| {
            let raw = extract_bits(data, sig.start_bit, sig.bit_len);
            DecodedSignal {
                name: sig.name,
                value: raw as f64 * sig.scale + sig.offset,
                raw,
            }
        })
        .collect();
    Ok(DecodedFrame {
        msg_name: spec.name,
        arb_id: spec.arb_id,
        signals,
    })
}

/// Extract a little-endian unsigned bit field (LSB-first numbering).
fn extract_bits(data: &[u8], start_bit: u16, bit_len: u16) -> u64 {
    let mut value = 0u64;
    for i in 0..bit_len {
        let bit_index = (start_bit + i) as usize;
        let byte = bit_index / 8;
        let bit = bit_index % 8;
        if byte >= data.len() {
            break;
        }
        if data[byte] >> bit & 1 != 0 {
            value |= 1 << i;
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalogue_dlcs_match_the_wire_format() {
        assert_eq!(spec_by_name("EStop_Broadcast").unwrap().dlc, 4);
        assert_eq!(spec_by_name("Motor_Temperature").unwrap().dlc, 6);
        assert_eq!(spec_by_name("Battery_Status").unwrap().dlc, 4);
        assert_eq!(spec_by_id(CAN_MOTOR_STATUS).unwrap().name, "Motor_Status");
    }

    #[test]
    fn unknown_message_is_an_error() {
        let err = decode_signal("Bogus_Message", &[0u8; 8]).unwrap_err();
        assert!(matches!(err, CodecError::UnknownMessage(_)));
    }

    #[test]
    fn length_mismatch_is_an_error() {
        let err = decode_signal("Motor_Status", &[0u8; 4]).unwrap_err();
        assert!(matches!(
            err,
            CodecError::Length {
                expected: 8,
                got: 4,
                ..
            }
        ));
    }

    #[test]
    fn unknown_arbitration_id_is_skipped() {
        assert!(decode_by_id(0x7FF, &[0u8; 8]).is_none());
    }

    #[test]
    fn decodes_motor_status_fields() {
        // RPM 2000 (0x07D0), direction fwd, enabled, no faults, duty 50.
        let mut data = vec![0u8; 8];
        data[2] = 0xD0;
        data[3] = 0x07;
        data[4] = 0b0000_0101; // dir=1, enable=1
        data[5] = 50;
        data[6] = 100;

        let frame = decode_signal("Motor_Status", &data).unwrap();
        assert_eq!(frame.signal("MotorSpeed_RPM").unwrap().raw, 2000);
        assert_eq!(frame.signal("Direction").unwrap().raw, 1);
        assert_eq!(frame.signal("Enable").unwrap().raw, 1);
        assert_eq!(frame.signal("FaultBits").unwrap().raw, 0);
        assert_eq!(frame.signal("Duty").unwrap().raw, 50);
        assert_eq!(frame.signal("DeratingPct").unwrap().raw, 100);
    }

    #[test]
    fn decodes_scaled_steer_angle() {
        // raw = (20.0 + 45.0) / 0.01 = 6500
        let mut data = vec![0u8; 8];
        data[2] = (6500u16 & 0xFF) as u8;
        data[3] = (6500u16 >> 8) as u8;

        let frame = decode_signal("Steer_Command", &data).unwrap();
        let angle = frame.signal("SteerAngleCmd").unwrap();
        assert_eq!(angle.raw, 6500);
        assert!((angle.value - 20.0).abs() < 1e-9);
    }

    #[test]
    fn decodes_battery_status_without_e2e() {
        let data = vec![0x34, 0x31, 60, 0x02]; // 12596 mV, 60 %, normal
        let frame = decode_signal("Battery_Status", &data).unwrap();
        assert_eq!(frame.signal("BatteryVoltage_mV").unwrap().raw, 12596);
        assert_eq!(frame.signal("BatterySOC").unwrap().raw, 60);
        assert_eq!(frame.signal("BatteryStatus").unwrap().raw, 2);
    }

    #[test]
    fn decodes_packed_nibbles() {
        // Brake_Command byte 3: mode in low nibble, vehicle state in high.
        let mut data = vec![0u8; 8];
        data[2] = 80;
        data[3] = 0x2 | (0x1 << 4); // emergency, RUN
        let frame = decode_signal("Brake_Command", &data).unwrap();
        assert_eq!(frame.signal("BrakeForceCmd").unwrap().raw, 80);
        assert_eq!(frame.signal("BrakeMode").unwrap().raw, 2);
        assert_eq!(frame.signal("VehicleState").unwrap().raw, 1);
    }
}
