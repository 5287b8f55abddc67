//! Canonical CAN frame catalogue for the virtual vehicle bus.
//!
//! 11-bit standard identifiers only. E2E-protected frames reserve byte 0
//! (alive counter + data ID) and byte 1 (CRC-8); the remaining bytes carry
//! signal data.

// ── Command frames (consumed by the plant) ──────────────────────

/// EStop_Broadcast — 4 bytes, E2E.
pub const CAN_ESTOP: u32 = 0x001;
/// Torque_Request — 8 bytes, E2E.
pub const CAN_TORQUE_REQUEST: u32 = 0x101;
/// Steer_Command — 8 bytes, E2E.
pub const CAN_STEER_COMMAND: u32 = 0x102;
/// Brake_Command — 8 bytes, E2E.
pub const CAN_BRAKE_COMMAND: u32 = 0x103;

// ── Heartbeats (sent by the respective ECU) ─────────────────────

pub const CAN_CVC_HEARTBEAT: u32 = 0x010;
pub const CAN_FZC_HEARTBEAT: u32 = 0x011;
pub const CAN_RZC_HEARTBEAT: u32 = 0x012;

// ── Feedback frames (emitted by the plant) ──────────────────────

/// Vehicle_State — 8 bytes, E2E, 100 ms.
pub const CAN_VEHICLE_STATE: u32 = 0x100;
/// Steering_Status — 8 bytes, E2E, 20 ms.
pub const CAN_STEERING_STATUS: u32 = 0x200;
/// Brake_Status — 8 bytes, E2E, 20 ms.
pub const CAN_BRAKE_STATUS: u32 = 0x201;
/// Lidar_Distance — 8 bytes, E2E, 10 ms.
pub const CAN_LIDAR_DISTANCE: u32 = 0x220;
/// Motor_Status — 8 bytes, E2E, 20 ms.
pub const CAN_MOTOR_STATUS: u32 = 0x300;
/// Motor_Current — 8 bytes, E2E, 10 ms.
pub const CAN_MOTOR_CURRENT: u32 = 0x301;
/// Motor_Temperature — 6 bytes, E2E, 100 ms.
pub const CAN_MOTOR_TEMP: u32 = 0x302;
/// Battery_Status — 4 bytes, **no E2E**, 1000 ms.
pub const CAN_BATTERY_STATUS: u32 = 0x303;
/// DTC_Broadcast — 8 bytes, **no E2E**, event-driven.
pub const CAN_DTC_BROADCAST: u32 = 0x500;

// ── E2E data IDs (lower nibble of payload byte 0) ───────────────

pub const DATA_ID_ESTOP: u8 = 0x01;
pub const DATA_ID_TORQUE: u8 = 0x02;
pub const DATA_ID_STEER: u8 = 0x03;
pub const DATA_ID_BRAKE: u8 = 0x04;
pub const DATA_ID_VEHICLE_STATE: u8 = 0x06;
pub const DATA_ID_STEERING_STATUS: u8 = 0x09;
pub const DATA_ID_BRAKE_STATUS: u8 = 0x0A;
pub const DATA_ID_LIDAR: u8 = 0x0D;
pub const DATA_ID_MOTOR_STATUS: u8 = 0x0E;
pub const DATA_ID_MOTOR_CURRENT: u8 = 0x0F;
pub const DATA_ID_MOTOR_TEMP: u8 = 0x00;

/// All arbitration IDs that carry an E2E header in bytes 0-1.
pub const E2E_IDS: &[u32] = &[
    CAN_ESTOP,
    CAN_CVC_HEARTBEAT,
    CAN_FZC_HEARTBEAT,
    CAN_RZC_HEARTBEAT,
    CAN_VEHICLE_STATE,
    CAN_TORQUE_REQUEST,
    CAN_STEER_COMMAND,
    CAN_BRAKE_COMMAND,
    CAN_STEERING_STATUS,
    CAN_BRAKE_STATUS,
    CAN_LIDAR_DISTANCE,
    CAN_MOTOR_STATUS,
    CAN_MOTOR_CURRENT,
    CAN_MOTOR_TEMP,
];

/// Whether frames on this arbitration ID carry E2E protection.
pub fn is_e2e_protected(arb_id: u32) -> bool {
    E2E_IDS.contains(&arb_id)
}

/// ECU source identifiers used in DTC_Broadcast byte 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EcuSource {
    /// Central Vehicle Controller.
    Cvc = 1,
    /// Front Zone Controller (steering, brake, lidar).
    Fzc = 2,
    /// Rear Zone Controller (motor, battery).
    Rzc = 3,
    /// Safety Controller.
    Sc = 4,
}

impl EcuSource {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn e2e_set_excludes_battery_and_dtc() {
        assert!(is_e2e_protected(CAN_MOTOR_STATUS));
        assert!(is_e2e_protected(CAN_ESTOP));
        assert!(!is_e2e_protected(CAN_BATTERY_STATUS));
        assert!(!is_e2e_protected(CAN_DTC_BROADCAST));
    }

    #[test]
    fn ecu_source_codes() {
        assert_eq!(EcuSource::Cvc.as_u8(), 1);
        assert_eq!(EcuSource::Fzc.as_u8(), 2);
        assert_eq!(EcuSource::Rzc.as_u8(), 3);
        assert_eq!(EcuSource::Sc.as_u8(), 4);
    }
}
