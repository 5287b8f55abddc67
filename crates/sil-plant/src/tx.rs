//! TX payload encoders.
//!
//! Pure functions from model state to signal bytes; the simulator stamps
//! the E2E header (bytes 0-1) afterwards. Layouts follow the bus
//! catalogue bit-for-bit.

use sil_codec::Direction;
use sil_protocol::VehicleState;

use crate::models::{BatteryModel, BrakeModel, LidarModel, MotorModel, SteeringModel};

fn derating_pct(motor: &MotorModel) -> u8 {
    if motor.overtemp {
        0
    } else if motor.temp_c > 80.0 {
        50
    } else if motor.temp_c > 60.0 {
        75
    } else {
        100
    }
}

/// Motor_Status (0x300): RPM, direction/enable/fault bits, duty echo,
/// derating.
pub fn motor_status(motor: &MotorModel) -> Vec<u8> {
    let mut payload = vec![0u8; 8];
    let rpm = motor.rpm_raw();
    payload[2] = (rpm & 0xFF) as u8;
    payload[3] = (rpm >> 8) as u8;

    let direction = motor.direction as u8 & 0x03;
    let enable = u8::from(motor.enabled);
    let mut fault_bits = 0u8;
    if motor.overcurrent {
        fault_bits |= 0x01;
    }
    if motor.overtemp {
        fault_bits |= 0x02;
    }
    if motor.stall_fault {
        fault_bits |= 0x04;
    }
    if motor.hw_disabled {
        fault_bits |= 0x08;
    }
    payload[4] = direction | (enable << 2) | (fault_bits << 3);
    // Duty echo saturates at 95 on the wire.
    payload[5] = (motor.duty_pct as u8).min(95);
    payload[6] = derating_pct(motor);
    payload
}

/// Motor_Current (0x301): current, status bits, torque echo at bits 35-42.
pub fn motor_current(motor: &MotorModel) -> Vec<u8> {
    let mut payload = vec![0u8; 8];
    let current = motor.current_ma_raw();
    payload[2] = (current & 0xFF) as u8;
    payload[3] = (current >> 8) as u8;

    let direction_bit = u8::from(motor.direction == Direction::Reverse);
    let enable_bit = u8::from(motor.enabled);
    let oc_bit = u8::from(motor.overcurrent);
    payload[4] = direction_bit | (enable_bit << 1) | (oc_bit << 2);

    let torque = motor.duty_pct as u8;
    payload[4] |= (torque & 0x1F) << 3;
    payload[5] = (torque >> 5) & 0x07;
    payload
}

/// Motor_Temperature (0x302, 6 bytes): winding temps (+40 offset),
/// derating, fault nibble.
pub fn motor_temperature(motor: &MotorModel) -> Vec<u8> {
    let mut payload = vec![0u8; 6];
    payload[2] = (motor.temp_c + 40.0).clamp(0.0, 255.0) as u8;
    payload[3] = (motor.temp_c * 0.8 + 40.0).clamp(0.0, 255.0) as u8;
    payload[4] = derating_pct(motor);

    let mut fault = 0u8;
    if motor.overtemp {
        fault |= 0x04; // overtemp
        fault |= 0x08; // derating active
    } else if motor.temp_c > 60.0 {
        fault |= 0x08;
    }
    payload[5] = fault & 0x0F;
    payload
}

/// Steering_Status (0x200): actual/commanded raw angles, fault nibble,
/// servo current in 10 mA units.
pub fn steering_status(steering: &SteeringModel) -> Vec<u8> {
    let mut payload = vec![0u8; 8];
    let actual = steering.actual_raw();
    payload[2] = (actual & 0xFF) as u8;
    payload[3] = (actual >> 8) as u8;
    let cmd = steering.commanded_raw();
    payload[4] = (cmd & 0xFF) as u8;
    payload[5] = (cmd >> 8) as u8;
    payload[6] = u8::from(steering.fault);
    payload[7] = (steering.servo_current_ma / 10).min(255) as u8;
    payload
}

/// Brake_Status (0x201): position, commanded, servo current, fault nibble.
pub fn brake_status(brake: &BrakeModel) -> Vec<u8> {
    let mut payload = vec![0u8; 8];
    payload[2] = brake.position_raw();
    payload[3] = brake.commanded_pct.clamp(0.0, 100.0) as u8;
    let sc = brake.servo_current_ma.min(u32::from(u16::MAX)) as u16;
    payload[4] = (sc & 0xFF) as u8;
    payload[5] = (sc >> 8) as u8;
    payload[6] = u8::from(brake.fault);
    payload
}

/// Vehicle_State (0x100): state nibble, fault mask, torque/speed limits.
pub fn vehicle_state(state: VehicleState) -> Vec<u8> {
    let mut payload = vec![0u8; 8];
    payload[2] = state.as_u8() & 0x0F;
    payload[3] = 0;
    let limit = if state == VehicleState::Run { 100 } else { 0 };
    payload[4] = limit;
    payload[5] = limit;
    payload
}

/// Lidar_Distance (0x220): distance, signal strength, zone + sensor status.
pub fn lidar_distance(lidar: &LidarModel) -> Vec<u8> {
    let mut payload = vec![0u8; 8];
    payload[2] = (lidar.distance_cm & 0xFF) as u8;
    payload[3] = (lidar.distance_cm >> 8) as u8;
    payload[4] = (lidar.signal_strength & 0xFF) as u8;
    payload[5] = (lidar.signal_strength >> 8) as u8;
    let sensor_status = u8::from(lidar.fault);
    payload[6] = (lidar.obstacle_zone() & 0x0F) | ((sensor_status & 0x0F) << 4);
    payload
}

/// Battery_Status (0x303, 4 bytes, no E2E).
pub fn battery_status(battery: &BatteryModel) -> Vec<u8> {
    let v = battery.voltage_mv.min(20000) as u16;
    vec![
        (v & 0xFF) as u8,
        (v >> 8) as u8,
        battery.soc_raw(),
        battery.status() & 0x0F,
    ]
}

/// DTC_Broadcast (0x500, 8 bytes, no E2E).
pub fn dtc_broadcast(code: u16, ecu_source: u8, occurrence: u8) -> Vec<u8> {
    vec![
        (code & 0xFF) as u8,
        (code >> 8) as u8,
        0x01, // active
        ecu_source,
        occurrence,
        0,
        0,
        0,
    ]
}
