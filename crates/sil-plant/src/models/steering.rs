//! Steering servo model — rate-limited tracking plus an oscillation
//! detector on the command stream.
//!
//! `record_command` runs at sender cadence (per RX frame) and drives the
//! sliding-window fault detector; `update` runs at tick cadence and does
//! pure physics. Fast injection bursts at 5 ms must not be lost to 10 ms
//! tick aliasing, hence the split.

use std::time::{Duration, Instant};

use super::clamp_dt;
use super::window::EventWindow;

const RATE_LIMIT_DEG_S: f64 = 30.0;
const MIN_ANGLE: f64 = -45.0;
const MAX_ANGLE: f64 = 45.0;

const REVERSAL_MIN_DELTA_DEG: f64 = 1.0;
const REVERSAL_WINDOW: Duration = Duration::from_millis(500);
const REVERSAL_FAULT_COUNT: usize = 4;

#[derive(Debug)]
pub struct SteeringModel {
    pub actual_angle: f64,
    pub commanded_angle: f64,
    pub servo_current_ma: u32,
    /// Latched; cleared only by clear_fault().
    pub fault: bool,
    reversals: EventWindow,
    last_cmd: Option<f64>,
    last_dir: i8,
}

impl Default for SteeringModel {
    fn default() -> Self {
        Self::new()
    }
}

impl SteeringModel {
    pub fn new() -> Self {
        Self {
            actual_angle: 0.0,
            commanded_angle: 0.0,
            servo_current_ma: 0,
            fault: false,
            reversals: EventWindow::new(REVERSAL_WINDOW),
            last_cmd: None,
            last_dir: 0,
        }
    }

    /// Register a commanded angle from an RX frame.
    pub fn record_command(&mut self, commanded_deg: f64) {
        self.record_command_at(commanded_deg, Instant::now());
    }

    /// As `record_command`, with an explicit monotonic timestamp.
    pub fn record_command_at(&mut self, commanded_deg: f64, now: Instant) {
        let cmd = commanded_deg.clamp(MIN_ANGLE, MAX_ANGLE);

        if let Some(prev) = self.last_cmd {
            let delta = cmd - prev;
            if delta.abs() > REVERSAL_MIN_DELTA_DEG {
                let dir: i8 = if delta > 0.0 { 1 } else { -1 };
                if self.last_dir != 0 && dir != self.last_dir {
                    let count = self.reversals.record(now);
                    if count >= REVERSAL_FAULT_COUNT {
                        self.fault = true;
                    }
                }
                self.last_dir = dir;
            }
        }
        self.last_cmd = Some(cmd);
        self.commanded_angle = cmd;
    }

    /// Advance the servo toward `commanded_deg` by `dt` seconds.
    pub fn update(&mut self, commanded_deg: f64, dt: f64) {
        let dt = clamp_dt(dt);
        self.commanded_angle = commanded_deg.clamp(MIN_ANGLE, MAX_ANGLE);

        let error = self.commanded_angle - self.actual_angle;
        let max_step = RATE_LIMIT_DEG_S * dt;

        if error.abs() <= max_step {
            self.actual_angle = self.commanded_angle;
        } else if error > 0.0 {
            self.actual_angle += max_step;
        } else {
            self.actual_angle -= max_step;
        }

        // Servo current proportional to tracking effort.
        self.servo_current_ma = ((error.abs() * 20.0) as u32).min(2550);
    }

    pub fn clear_fault(&mut self) {
        self.fault = false;
        self.reversals.clear();
        self.last_dir = 0;
        self.last_cmd = None;
    }

    /// Raw 16-bit encoding: (angle + 45) / 0.01.
    pub fn actual_raw(&self) -> u16 {
        angle_raw(self.actual_angle)
    }

    pub fn commanded_raw(&self) -> u16 {
        angle_raw(self.commanded_angle)
    }
}

fn angle_raw(angle: f64) -> u16 {
    (((angle + 45.0) / 0.01) as i64).clamp(0, 9000) as u16
}
