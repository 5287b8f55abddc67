//! Brake servo model — rate-limited tracking plus a conflicting-command
//! detector on the command stream.

use std::time::{Duration, Instant};

use super::clamp_dt;
use super::window::EventWindow;

const RATE_LIMIT_PCT_S: f64 = 200.0;

const SWING_MIN_DELTA_PCT: f64 = 50.0;
const SWING_WINDOW: Duration = Duration::from_millis(500);
const SWING_FAULT_COUNT: usize = 4;

#[derive(Debug)]
pub struct BrakeModel {
    pub actual_pct: f64,
    pub commanded_pct: f64,
    pub servo_current_ma: u32,
    /// Latched; cleared only by clear_fault().
    pub fault: bool,
    swings: EventWindow,
    last_cmd: Option<f64>,
}

impl Default for BrakeModel {
    fn default() -> Self {
        Self::new()
    }
}

impl BrakeModel {
    pub fn new() -> Self {
        Self {
            actual_pct: 0.0,
            commanded_pct: 0.0,
            servo_current_ma: 0,
            fault: false,
            swings: EventWindow::new(SWING_WINDOW),
            last_cmd: None,
        }
    }

    /// Register a commanded force from an RX frame.
    pub fn record_command(&mut self, commanded_pct: f64) {
        self.record_command_at(commanded_pct, Instant::now());
    }

    /// As `record_command`, with an explicit monotonic timestamp.
    pub fn record_command_at(&mut self, commanded_pct: f64, now: Instant) {
        let cmd = commanded_pct.clamp(0.0, 100.0);

        if let Some(prev) = self.last_cmd
            && (cmd - prev).abs() >= SWING_MIN_DELTA_PCT
        {
            let count = self.swings.record(now);
            if count >= SWING_FAULT_COUNT {
                self.fault = true;
            }
        }
        self.last_cmd = Some(cmd);
        self.commanded_pct = cmd;
    }

    /// Advance the servo toward `commanded_pct` by `dt` seconds.
    pub fn update(&mut self, commanded_pct: f64, dt: f64) {
        let dt = clamp_dt(dt);
        self.commanded_pct = commanded_pct.clamp(0.0, 100.0);

        let error = self.commanded_pct - self.actual_pct;
        let max_step = RATE_LIMIT_PCT_S * dt;

        if error.abs() <= max_step {
            self.actual_pct = self.commanded_pct;
        } else if error > 0.0 {
            self.actual_pct += max_step;
        } else {
            self.actual_pct -= max_step;
        }

        self.servo_current_ma = ((error.abs() * 15.0) as u32).min(3000);
    }

    pub fn clear_fault(&mut self) {
        self.fault = false;
        self.swings.clear();
        self.last_cmd = None;
    }

    pub fn position_raw(&self) -> u8 {
        self.actual_pct.clamp(0.0, 100.0) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_commanded_pct() {
        let mut b = BrakeModel::new();
        for _ in 0..100 {
            b.update(80.0, 0.01);
        }
        assert!((b.actual_pct - 80.0).abs() < 2.0);
    }

    #[test]
    fn full_stroke_takes_half_a_second() {
        let mut b = BrakeModel::new();
        for _ in 0..50 {
            b.update(100.0, 0.01);
        }
        assert!((b.actual_pct - 100.0).abs() < 1e-9);
    }

    #[test]
    fn fault_on_rapid_alternation() {
        let mut b = BrakeModel::new();
        assert!(!b.fault);
        for _ in 0..10 {
            b.record_command(100.0);
            b.record_command(0.0);
        }
        assert!(b.fault);
    }

    #[test]
    fn small_adjustments_do_not_fault() {
        let mut b = BrakeModel::new();
        let t0 = Instant::now();
        for i in 0..20 {
            let cmd = if i % 2 == 0 { 30.0 } else { 60.0 };
            b.record_command_at(cmd, t0 + Duration::from_millis(5 * i as u64));
        }
        assert!(!b.fault);
    }

    #[test]
    fn slow_alternation_does_not_fault() {
        let mut b = BrakeModel::new();
        let t0 = Instant::now();
        for i in 0..10 {
            let cmd = if i % 2 == 0 { 100.0 } else { 0.0 };
            b.record_command_at(cmd, t0 + Duration::from_millis(400 * i as u64));
        }
        assert!(!b.fault);
    }

    #[test]
    fn clear_fault_unlatches() {
        let mut b = BrakeModel::new();
        for _ in 0..10 {
            b.record_command(100.0);
            b.record_command(0.0);
        }
        assert!(b.fault);
        b.clear_fault();
        assert!(!b.fault);
    }

    #[test]
    fn commands_clamped() {
        let mut b = BrakeModel::new();
        b.record_command(150.0);
        assert_eq!(b.commanded_pct, 100.0);
        b.update(-20.0, 0.01);
        assert_eq!(b.commanded_pct, 0.0);
    }
}
