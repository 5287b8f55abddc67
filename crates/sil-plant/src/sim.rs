//! The plant simulator: 100 Hz tick loop over a CAN bus.
//!
//! Per tick: drain RX non-blockingly, advance physics under the
//! state-dependent actuation caps, step the vehicle state machine, emit the
//! TX schedule, sleep to the next 10 ms boundary. `tick()` is callable
//! directly so tests advance simulated time without sleeping.

use std::sync::Arc;
use std::time::Duration;

use sil_codec::{CanBus, CanFrame, Direction, FrameCodec};
use sil_protocol::VehicleState;
use sil_protocol::frames::*;

use crate::dtc::{DtcDispatcher, FaultSnapshot};
use crate::models::battery::STATUS_CRITICAL_UV;
use crate::models::{BatteryModel, BrakeModel, LidarModel, MotorModel, SteeringModel};
use crate::state::StateMachine;
use crate::tx;

/// Tick period: 10 ms (100 Hz).
pub const TICK: Duration = Duration::from_millis(10);
const DT: f64 = 0.01;

/// Duty cap while DEGRADED.
const DEGRADED_DUTY_CAP: f64 = 50.0;
/// Duty cap while LIMP.
const LIMP_DUTY_CAP: f64 = 15.0;
/// Minimum brake force while LIMP.
const LIMP_MIN_BRAKE: f64 = 30.0;

pub struct PlantSimulator {
    bus: Arc<dyn CanBus>,
    codec: FrameCodec,

    pub motor: MotorModel,
    pub steering: SteeringModel,
    pub brake: BrakeModel,
    pub battery: BatteryModel,
    pub lidar: LidarModel,

    sm: StateMachine,
    dtc: DtcDispatcher,
    estop_active: bool,

    // Last commanded values from RX (pre-cap).
    cmd_duty: f64,
    cmd_direction: Direction,

    tick_count: u64,
    rx_decode_errors: u64,
}

impl PlantSimulator {
    pub fn new(bus: Arc<dyn CanBus>) -> Self {
        Self {
            bus,
            codec: FrameCodec::new(),
            motor: MotorModel::new(),
            steering: SteeringModel::new(),
            brake: BrakeModel::new(),
            battery: BatteryModel::new(),
            lidar: LidarModel::new(),
            sm: StateMachine::new(),
            dtc: DtcDispatcher::new(),
            estop_active: false,
            cmd_duty: 0.0,
            cmd_direction: Direction::Stop,
            tick_count: 0,
            rx_decode_errors: 0,
        }
    }

    pub fn state(&self) -> VehicleState {
        self.sm.state()
    }

    pub fn estop_active(&self) -> bool {
        self.estop_active
    }

    pub fn rx_decode_errors(&self) -> u64 {
        self.rx_decode_errors
    }

    /// Advance the simulation by one 10 ms tick.
    pub async fn tick(&mut self) {
        self.drain_rx().await;
        self.run_physics();
        self.step_state_machine();
        self.run_tx_schedule().await;

        self.tick_count += 1;

        if self.tick_count % 500 == 0 {
            tracing::info!(
                rpm = self.motor.rpm_raw(),
                current_ma = self.motor.current_ma_raw(),
                temp_c = format!("{:.1}", self.motor.temp_c),
                voltage_mv = self.battery.voltage_mv,
                steer_deg = format!("{:.1}", self.steering.actual_angle),
                brake_pct = self.brake.position_raw(),
                state = %self.sm.state(),
                "plant status"
            );
        }
    }

    /// Run forever at the tick cadence. Catches up after overruns but never
    /// advances faster than wall time.
    pub async fn run(&mut self) {
        tracing::info!("plant simulator running at 100 Hz");
        let mut next = tokio::time::Instant::now() + TICK;
        loop {
            self.tick().await;

            let now = tokio::time::Instant::now();
            if next > now {
                tokio::time::sleep_until(next).await;
            } else {
                // Overrun: re-anchor to the wall clock instead of bursting.
                next = now;
            }
            next += TICK;
        }
    }

    // ── RX ────────────────────────────────────────────────────

    async fn drain_rx(&mut self) {
        loop {
            match self.bus.try_recv().await {
                Ok(Some(frame)) => self.handle_rx(&frame),
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!(error = %e, "RX error");
                    break;
                }
            }
        }
    }

    fn handle_rx(&mut self, frame: &CanFrame) {
        let data = &frame.data;
        match frame.id {
            CAN_ESTOP => {
                if data.len() < 3 {
                    self.rx_decode_errors += 1;
                    return;
                }
                let was_active = self.estop_active;
                self.estop_active = data[2] & 0x01 != 0;
                if self.estop_active && !was_active {
                    tracing::info!("E-Stop received, all outputs disabled");
                } else if !self.estop_active {
                    // Clear (or an explicit reset while already clear):
                    // drop every latch and re-arm the startup delay.
                    if was_active {
                        tracing::info!("E-Stop cleared, resetting faults, state -> INIT");
                    } else {
                        tracing::info!("reset received, clearing faults, state -> INIT");
                    }
                    self.reset_faults();
                }
            }
            CAN_TORQUE_REQUEST => {
                if data.len() < 4 {
                    self.rx_decode_errors += 1;
                    return;
                }
                if !self.estop_active {
                    self.cmd_duty = f64::from(data[2]);
                    self.cmd_direction = match data[3] & 0x03 {
                        1 => Direction::Forward,
                        2 => Direction::Reverse,
                        _ => Direction::Stop,
                    };
                }
            }
            CAN_STEER_COMMAND => {
                if data.len() < 4 {
                    self.rx_decode_errors += 1;
                    return;
                }
                if !self.estop_active {
                    let raw = u16::from(data[2]) | (u16::from(data[3]) << 8);
                    let angle = (f64::from(raw) * 0.01 - 45.0).clamp(-45.0, 45.0);
                    self.steering.record_command(angle);
                }
            }
            CAN_BRAKE_COMMAND => {
                if data.len() < 3 {
                    self.rx_decode_errors += 1;
                    return;
                }
                if !self.estop_active {
                    self.brake.record_command(f64::from(data[2]));
                }
            }
            CAN_BATTERY_STATUS => {
                // External battery injection overrides the model.
                if data.len() < 4 {
                    self.rx_decode_errors += 1;
                    return;
                }
                let voltage = u32::from(data[0]) | (u32::from(data[1]) << 8);
                self.battery.inject(voltage, data[2]);
            }
            _ => {}
        }
    }

    fn reset_faults(&mut self) {
        self.motor.reset_faults();
        self.steering.clear_fault();
        self.brake.clear_fault();
        self.dtc.clear_active();
        self.sm.reset_to_init();
        self.cmd_duty = 0.0;
        self.cmd_direction = Direction::Stop;
    }

    // ── Physics ───────────────────────────────────────────────

    fn run_physics(&mut self) {
        let state = self.sm.state();

        if self.estop_active || state == VehicleState::SafeStop {
            // Zero torque, zero steer, full brake.
            self.brake.update(100.0, DT);
            let brake_load = self.brake.actual_pct / 100.0;
            self.motor.update(0.0, Direction::Stop, DT, brake_load);
            self.steering.update(0.0, DT);
        } else {
            let duty = match state {
                VehicleState::Degraded => self.cmd_duty.min(DEGRADED_DUTY_CAP),
                VehicleState::Limp => self.cmd_duty.min(LIMP_DUTY_CAP),
                _ => self.cmd_duty,
            };
            let brake_target = if state == VehicleState::Limp {
                self.brake.commanded_pct.max(LIMP_MIN_BRAKE)
            } else {
                self.brake.commanded_pct
            };

            self.brake.update(brake_target, DT);
            let brake_load = self.brake.actual_pct / 100.0;
            self.motor.update(duty, self.cmd_direction, DT, brake_load);
            self.steering.update(self.steering.commanded_angle, DT);
        }

        self.battery.update(self.motor.current_ma, DT);
        self.lidar.update(DT);
    }

    fn step_state_machine(&mut self) {
        let safety_fault = self.motor.overcurrent
            || self.motor.hw_disabled
            || self.steering.fault
            || self.brake.fault;
        let battery_status = self.battery.status();

        if let Some((from, to)) = self.sm.step(self.estop_active, safety_fault, battery_status) {
            tracing::info!(from = %from, to = %to, "vehicle state transition");
        }
    }

    // ── TX ────────────────────────────────────────────────────

    async fn run_tx_schedule(&mut self) {
        // Every 10 ms.
        self.send_e2e(CAN_MOTOR_CURRENT, DATA_ID_MOTOR_CURRENT, tx::motor_current(&self.motor))
            .await;
        self.send_e2e(CAN_LIDAR_DISTANCE, DATA_ID_LIDAR, tx::lidar_distance(&self.lidar))
            .await;

        // Every 20 ms.
        if self.tick_count % 2 == 0 {
            self.send_e2e(CAN_MOTOR_STATUS, DATA_ID_MOTOR_STATUS, tx::motor_status(&self.motor))
                .await;
            self.send_e2e(
                CAN_STEERING_STATUS,
                DATA_ID_STEERING_STATUS,
                tx::steering_status(&self.steering),
            )
            .await;
            self.send_e2e(CAN_BRAKE_STATUS, DATA_ID_BRAKE_STATUS, tx::brake_status(&self.brake))
                .await;
        }

        // Every 100 ms.
        if self.tick_count % 10 == 0 {
            self.send_e2e(CAN_MOTOR_TEMP, DATA_ID_MOTOR_TEMP, tx::motor_temperature(&self.motor))
                .await;
            self.send_e2e(
                CAN_VEHICLE_STATE,
                DATA_ID_VEHICLE_STATE,
                tx::vehicle_state(self.sm.state()),
            )
            .await;
            self.check_and_send_dtcs().await;
        }

        // Every 1000 ms.
        if self.tick_count % 100 == 0 {
            self.send_raw(CAN_BATTERY_STATUS, tx::battery_status(&self.battery))
                .await;
        }
    }

    async fn check_and_send_dtcs(&mut self) {
        let snapshot = FaultSnapshot {
            motor_overcurrent: self.motor.overcurrent,
            steer_fault: self.steering.fault,
            brake_fault: self.brake.fault,
            battery_critical: self.battery.status() == STATUS_CRITICAL_UV,
        };
        for pending in self.dtc.check(&snapshot) {
            tracing::info!(
                code = format!("0x{:04X}", pending.code),
                ecu = pending.source.as_u8(),
                occurrence = pending.occurrence,
                "DTC broadcast"
            );
            self.send_raw(
                CAN_DTC_BROADCAST,
                tx::dtc_broadcast(pending.code, pending.source.as_u8(), pending.occurrence),
            )
            .await;
        }
    }

    async fn send_e2e(&self, arb_id: u32, data_id: u8, payload: Vec<u8>) {
        match self.codec.build_frame(arb_id, data_id, payload) {
            Ok(data) => self.send_raw(arb_id, data).await,
            Err(e) => tracing::debug!(arb_id, error = %e, "E2E encode failed"),
        }
    }

    async fn send_raw(&self, arb_id: u32, data: Vec<u8>) {
        // Send failures are logged and dropped; the next periodic slot
        // retries implicitly.
        if let Err(e) = self.bus.send(&CanFrame::new(arb_id, data)).await {
            tracing::debug!(arb_id, error = %e, "CAN send failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sil_codec::MockCanBus;
    use sil_codec::builders;
    use sil_codec::e2e::verify;

    fn sim_with_bus() -> (PlantSimulator, Arc<MockCanBus>) {
        let bus = Arc::new(MockCanBus::new());
        (PlantSimulator::new(bus.clone()), bus)
    }

    async fn boot(sim: &mut PlantSimulator) {
        for _ in 0..300 {
            sim.tick().await;
        }
        assert_eq!(sim.state(), VehicleState::Run);
    }

    #[tokio::test]
    async fn boots_to_run_after_three_seconds() {
        let (mut sim, _bus) = sim_with_bus();
        for _ in 0..299 {
            sim.tick().await;
            assert_eq!(sim.state(), VehicleState::Init);
        }
        sim.tick().await;
        assert_eq!(sim.state(), VehicleState::Run);
    }

    #[tokio::test]
    async fn tx_schedule_counts_over_one_second() {
        let (mut sim, bus) = sim_with_bus();
        for _ in 0..100 {
            sim.tick().await;
        }
        assert_eq!(bus.sent_with_id(CAN_MOTOR_CURRENT).len(), 100);
        assert_eq!(bus.sent_with_id(CAN_LIDAR_DISTANCE).len(), 100);
        assert_eq!(bus.sent_with_id(CAN_MOTOR_STATUS).len(), 50);
        assert_eq!(bus.sent_with_id(CAN_STEERING_STATUS).len(), 50);
        assert_eq!(bus.sent_with_id(CAN_BRAKE_STATUS).len(), 50);
        assert_eq!(bus.sent_with_id(CAN_MOTOR_TEMP).len(), 10);
        assert_eq!(bus.sent_with_id(CAN_VEHICLE_STATE).len(), 10);
        assert_eq!(bus.sent_with_id(CAN_BATTERY_STATUS).len(), 1);
    }

    #[tokio::test]
    async fn tx_frames_carry_valid_e2e() {
        let (mut sim, bus) = sim_with_bus();
        for _ in 0..10 {
            sim.tick().await;
        }
        for frame in bus.sent_with_id(CAN_MOTOR_CURRENT) {
            assert!(verify(DATA_ID_MOTOR_CURRENT, &frame.data));
        }
        for frame in bus.sent_with_id(CAN_MOTOR_STATUS) {
            assert!(verify(DATA_ID_MOTOR_STATUS, &frame.data));
        }
    }

    #[tokio::test]
    async fn alive_counter_increments_per_id() {
        let (mut sim, bus) = sim_with_bus();
        for _ in 0..20 {
            sim.tick().await;
        }
        let frames = bus.sent_with_id(CAN_MOTOR_CURRENT);
        for pair in frames.windows(2) {
            let a = pair[0].data[0] >> 4;
            let b = pair[1].data[0] >> 4;
            assert_eq!((a + 1) & 0x0F, b);
        }
    }

    #[tokio::test]
    async fn torque_command_spins_motor() {
        let (mut sim, bus) = sim_with_bus();
        boot(&mut sim).await;

        let codec = FrameCodec::new();
        bus.queue_rx(builders::torque_request(&codec, 50, Direction::Forward).unwrap());
        for _ in 0..300 {
            sim.tick().await;
        }
        assert!(sim.motor.rpm > 1800.0 && sim.motor.rpm < 2200.0);
        assert_eq!(sim.state(), VehicleState::Run);
    }

    #[tokio::test]
    async fn estop_forces_safe_stop_and_reset_recovers() {
        let (mut sim, bus) = sim_with_bus();
        boot(&mut sim).await;

        let codec = FrameCodec::new();
        bus.queue_rx(builders::estop(&codec, true, 1).unwrap());
        for _ in 0..100 {
            sim.tick().await;
        }
        assert!(sim.estop_active());
        assert_eq!(sim.state(), VehicleState::SafeStop);
        assert!(sim.motor.rpm < 100.0);

        bus.queue_rx(builders::estop(&codec, false, 1).unwrap());
        sim.tick().await;
        assert_eq!(sim.state(), VehicleState::Init);
        for _ in 0..300 {
            sim.tick().await;
        }
        assert_eq!(sim.state(), VehicleState::Run);
    }

    #[tokio::test]
    async fn commands_ignored_while_estopped() {
        let (mut sim, bus) = sim_with_bus();
        boot(&mut sim).await;

        let codec = FrameCodec::new();
        bus.queue_rx(builders::estop(&codec, true, 1).unwrap());
        sim.tick().await;
        bus.queue_rx(builders::torque_request(&codec, 90, Direction::Forward).unwrap());
        for _ in 0..50 {
            sim.tick().await;
        }
        assert_eq!(sim.motor.duty_pct, 0.0);
    }

    #[tokio::test]
    async fn battery_injection_degrades_then_limps() {
        let (mut sim, bus) = sim_with_bus();
        boot(&mut sim).await;

        bus.queue_rx(builders::battery_status(10200, 18, 1));
        for _ in 0..10 {
            sim.tick().await;
        }
        assert_eq!(sim.state(), VehicleState::Degraded);

        bus.queue_rx(builders::battery_status(8500, 3, 0));
        for _ in 0..10 {
            sim.tick().await;
        }
        assert_eq!(sim.state(), VehicleState::Limp);

        // LIMP forces at least 30 % brake.
        for _ in 0..60 {
            sim.tick().await;
        }
        assert!(sim.brake.actual_pct >= 25.0);
    }

    #[tokio::test]
    async fn steer_burst_latches_fault_and_safe_stops() {
        let (mut sim, bus) = sim_with_bus();
        boot(&mut sim).await;

        let codec = FrameCodec::new();
        for i in 0..20 {
            let angle = if i % 2 == 0 { 40.0 } else { -40.0 };
            bus.queue_rx(builders::steer_command(&codec, angle, 50.0, 1).unwrap());
        }
        for _ in 0..10 {
            sim.tick().await;
        }
        assert!(sim.steering.fault);
        assert_eq!(sim.state(), VehicleState::SafeStop);
    }

    #[tokio::test]
    async fn dtc_emitted_once_per_activation() {
        let (mut sim, bus) = sim_with_bus();
        boot(&mut sim).await;

        let codec = FrameCodec::new();
        for i in 0..20 {
            let angle = if i % 2 == 0 { 40.0 } else { -40.0 };
            bus.queue_rx(builders::steer_command(&codec, angle, 50.0, 1).unwrap());
        }
        for _ in 0..200 {
            sim.tick().await;
        }
        let dtcs = bus.sent_with_id(CAN_DTC_BROADCAST);
        let steer_dtcs: Vec<_> = dtcs
            .iter()
            .filter(|f| {
                u16::from(f.data[0]) | (u16::from(f.data[1]) << 8) == sil_protocol::DTC_STEER_FAULT
            })
            .collect();
        assert_eq!(steer_dtcs.len(), 1);
        assert_eq!(steer_dtcs[0].data[3], 2); // FZC
    }

    #[tokio::test]
    async fn short_frames_count_as_decode_errors() {
        let (mut sim, bus) = sim_with_bus();
        bus.queue_rx(CanFrame::new(CAN_TORQUE_REQUEST, vec![0x00, 0x00]));
        bus.queue_rx(CanFrame::new(CAN_ESTOP, vec![0x00]));
        sim.tick().await;
        assert_eq!(sim.rx_decode_errors(), 2);
        assert_eq!(sim.state(), VehicleState::Init);
    }
}
