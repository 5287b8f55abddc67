//! Typed command-frame builders.
//!
//! These produce payloads bit-identical to what the plant decodes, so the
//! fault injector and the integration tests exercise the exact wire format.
//! All clamps are inclusive and silent.

use sil_protocol::frames::*;

use crate::e2e::FrameCodec;
use crate::error::CodecResult;
use crate::types::CanFrame;

/// Motor drive direction as carried in Torque_Request byte 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Direction {
    Stop = 0,
    Forward = 1,
    Reverse = 2,
}

/// Brake actuation mode as carried in Brake_Command byte 3 (low nibble).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BrakeMode {
    Release = 0,
    Normal = 1,
    Emergency = 2,
    Auto = 3,
}

/// Torque_Request (0x101, 8 bytes, E2E).
///
/// Byte 2: duty 0-100 %, byte 3: direction (2 bits).
pub fn torque_request(codec: &FrameCodec, duty_pct: u8, direction: Direction) -> CodecResult<CanFrame> {
    let mut payload = vec![0u8; 8];
    payload[2] = duty_pct.min(100);
    payload[3] = direction as u8 & 0x03;
    let data = codec.build_frame(CAN_TORQUE_REQUEST, DATA_ID_TORQUE, payload)?;
    Ok(CanFrame::new(CAN_TORQUE_REQUEST, data))
}

/// Steer_Command (0x102, 8 bytes, E2E).
///
/// Angle raw = (deg + 45.0) / 0.01, clamped to [0, 9000]; rate limit in
/// 0.2 °/s units; vehicle state echo in byte 5.
pub fn steer_command(
    codec: &FrameCodec,
    angle_deg: f64,
    rate_limit_dps: f64,
    vehicle_state: u8,
) -> CodecResult<CanFrame> {
    let mut payload = vec![0u8; 8];
    let raw = (((angle_deg + 45.0) / 0.01) as i64).clamp(0, 9000) as u16;
    payload[2] = (raw & 0xFF) as u8;
    payload[3] = (raw >> 8) as u8;
    payload[4] = ((rate_limit_dps / 0.2) as i64).clamp(0, 255) as u8;
    payload[5] = vehicle_state & 0x0F;
    let data = codec.build_frame(CAN_STEER_COMMAND, DATA_ID_STEER, payload)?;
    Ok(CanFrame::new(CAN_STEER_COMMAND, data))
}

/// Brake_Command (0x103, 8 bytes, E2E).
///
/// Byte 2: force 0-100 %, byte 3: mode (low nibble) + state (high nibble).
pub fn brake_command(
    codec: &FrameCodec,
    brake_pct: u8,
    mode: BrakeMode,
    vehicle_state: u8,
) -> CodecResult<CanFrame> {
    let mut payload = vec![0u8; 8];
    payload[2] = brake_pct.min(100);
    payload[3] = (mode as u8 & 0x0F) | ((vehicle_state & 0x0F) << 4);
    let data = codec.build_frame(CAN_BRAKE_COMMAND, DATA_ID_BRAKE, payload)?;
    Ok(CanFrame::new(CAN_BRAKE_COMMAND, data))
}

/// EStop_Broadcast (0x001, 4 bytes, E2E).
///
/// Byte 2: active flag (bit 0) + source (bits 1-3).
pub fn estop(codec: &FrameCodec, active: bool, source: u8) -> CodecResult<CanFrame> {
    let mut payload = vec![0u8; 4];
    payload[2] = u8::from(active) | ((source & 0x07) << 1);
    let data = codec.build_frame(CAN_ESTOP, DATA_ID_ESTOP, payload)?;
    Ok(CanFrame::new(CAN_ESTOP, data))
}

/// Battery_Status (0x303, 4 bytes, no E2E).
///
/// Bytes 0-1: voltage mV (LE, clamped to 20 V), byte 2: SOC %, byte 3:
/// status nibble.
pub fn battery_status(voltage_mv: u32, soc_pct: u8, status: u8) -> CanFrame {
    let v = voltage_mv.min(20000) as u16;
    let data = vec![
        (v & 0xFF) as u8,
        (v >> 8) as u8,
        soc_pct.min(100),
        status & 0x0F,
    ];
    CanFrame::new(CAN_BATTERY_STATUS, data)
}

/// DTC_Broadcast (0x500, 8 bytes, no E2E).
pub fn dtc_broadcast(dtc_code: u16, ecu_source: u8, occurrence: u8) -> CanFrame {
    dtc_broadcast_with_freeze(dtc_code, ecu_source, occurrence, [0, 0, 0])
}

/// DTC_Broadcast with explicit freeze-frame bytes.
pub fn dtc_broadcast_with_freeze(
    dtc_code: u16,
    ecu_source: u8,
    occurrence: u8,
    freeze: [u8; 3],
) -> CanFrame {
    let data = vec![
        (dtc_code & 0xFF) as u8,
        (dtc_code >> 8) as u8,
        0x01, // active
        ecu_source,
        occurrence,
        freeze[0],
        freeze[1],
        freeze[2],
    ];
    CanFrame::new(CAN_DTC_BROADCAST, data)
}
