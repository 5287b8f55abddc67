//! Shared test harness: a plant simulator on a mock bus, ticked
//! synchronously so 300 ticks equal 3 s of simulated time without
//! sleeping.

use std::sync::Arc;

use sil_codec::builders::{self, BrakeMode, Direction};
use sil_codec::{FrameCodec, MockCanBus};
use sil_plant::PlantSimulator;
use sil_protocol::VehicleState;

pub struct Rig {
    pub sim: PlantSimulator,
    pub bus: Arc<MockCanBus>,
    pub codec: FrameCodec,
}

impl Rig {
    pub fn new() -> Self {
        let bus = Arc::new(MockCanBus::new());
        Self {
            sim: PlantSimulator::new(bus.clone()),
            bus,
            codec: FrameCodec::new(),
        }
    }

    /// Advance the plant by `n` 10 ms ticks.
    pub async fn ticks(&mut self, n: u32) {
        for _ in 0..n {
            self.sim.tick().await;
        }
    }

    /// Boot to RUN: 300 ticks of uninterrupted startup.
    pub async fn boot(&mut self) {
        self.ticks(300).await;
        assert_eq!(self.sim.state(), VehicleState::Run);
    }

    pub fn send_torque(&self, duty: u8, direction: Direction) {
        self.bus
            .queue_rx(builders::torque_request(&self.codec, duty, direction).unwrap());
    }

    pub fn send_steer(&self, angle_deg: f64) {
        self.bus
            .queue_rx(builders::steer_command(&self.codec, angle_deg, 50.0, 1).unwrap());
    }

    pub fn send_brake(&self, pct: u8, mode: BrakeMode) {
        self.bus
            .queue_rx(builders::brake_command(&self.codec, pct, mode, 1).unwrap());
    }

    pub fn send_estop(&self, active: bool) {
        self.bus.queue_rx(builders::estop(&self.codec, active, 1).unwrap());
    }

    pub fn send_battery(&self, voltage_mv: u32, soc: u8, status: u8) {
        self.bus.queue_rx(builders::battery_status(voltage_mv, soc, status));
    }

    /// Start a steady normal drive and let it settle.
    pub async fn settle_normal_drive(&mut self) {
        self.send_torque(50, Direction::Forward);
        self.send_steer(0.0);
        self.send_brake(0, BrakeMode::Normal);
        self.ticks(300).await;
    }
}
