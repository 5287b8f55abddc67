//! Diagnostic trouble codes raised by the plant and their broker alert shape.

use serde::{Deserialize, Serialize};

/// Motor sustained overcurrent (RZC).
pub const DTC_OVERCURRENT: u16 = 0xE301;
/// Steering oscillation fault (FZC).
pub const DTC_STEER_FAULT: u16 = 0xE201;
/// Conflicting brake commands (FZC).
pub const DTC_BRAKE_FAULT: u16 = 0xE202;
/// Battery critical undervoltage (RZC).
pub const DTC_BATTERY_UV: u16 = 0xE401;

/// DTC_Broadcast status byte: fault currently active.
pub const DTC_STATUS_ACTIVE: u8 = 0x01;

/// JSON alert published to `silrig/alerts/dtc/<code>` when a DTC_Broadcast
/// is observed on the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DtcAlert {
    /// Hex-formatted code, e.g. "0xE301".
    pub dtc: String,
    pub status: u8,
    pub ecu_source: u8,
    pub occurrence: u8,
    pub freeze_frame: [u8; 3],
    /// Wall-clock seconds since the Unix epoch.
    pub ts: f64,
}

impl DtcAlert {
    /// Build an alert from a raw DTC_Broadcast payload.
    ///
    /// Layout: bytes 0-1 code (LE), byte 2 status, byte 3 ECU source,
    /// byte 4 occurrence count, bytes 5-7 freeze frame.
    pub fn from_payload(data: &[u8], ts: f64) -> Option<Self> {
        if data.len() < 5 {
            return None;
        }
        let code = u16::from(data[0]) | (u16::from(data[1]) << 8);
        let freeze = if data.len() >= 8 {
            [data[5], data[6], data[7]]
        } else {
            [0, 0, 0]
        };
        Some(Self {
            dtc: format!("0x{code:04X}"),
            status: data[2],
            ecu_source: data[3],
            occurrence: data[4],
            freeze_frame: freeze,
            ts,
        })
    }

    /// Numeric code parsed back out of the hex string.
    pub fn code(&self) -> Option<u16> {
        u16::from_str_radix(self.dtc.trim_start_matches("0x"), 16).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alert_from_payload() {
        let data = [0x01, 0xE3, 0x01, 0x03, 0x02, 0xAA, 0xBB, 0xCC];
        let alert = DtcAlert::from_payload(&data, 1.5).unwrap();
        assert_eq!(alert.dtc, "0xE301");
        assert_eq!(alert.status, DTC_STATUS_ACTIVE);
        assert_eq!(alert.ecu_source, 3);
        assert_eq!(alert.occurrence, 2);
        assert_eq!(alert.freeze_frame, [0xAA, 0xBB, 0xCC]);
        assert_eq!(alert.code(), Some(DTC_OVERCURRENT));
    }

    #[test]
    fn alert_rejects_short_payload() {
        assert!(DtcAlert::from_payload(&[0x01, 0xE3, 0x01], 0.0).is_none());
    }

    #[test]
    fn alert_json_shape() {
        let data = [0x01, 0xE4, 0x01, 0x03, 0x01, 0, 0, 0];
        let alert = DtcAlert::from_payload(&data, 42.0).unwrap();
        let json = serde_json::to_value(&alert).unwrap();
        assert_eq!(json["dtc"], "0xE401");
        assert_eq!(json["status"], 1);
        assert_eq!(json["ecu_source"], 3);
        assert_eq!(json["freeze_frame"].as_array().unwrap().len(), 3);
    }
}
