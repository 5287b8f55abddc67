//! First-order DC motor model with thermal dynamics and latched faults.
//!
//! Physics per tick:
//!   rpm     → first-order approach to `no_load_rpm · duty/100 · (1 − brake_load)`
//!   current = stall_current · duty/100 · (1 − rpm/no_load_rpm)
//!   dT/dt   = I² · R_heat − (T − T_ambient)/R_cool   (scaled 10× for demo)
//!
//! Overcurrent is a *sustained* condition: current above 20 A while the
//! rotor is held below 500 RPM for at least 0.2 s. Spin-up transients at
//! high duty cross the current threshold for a few ticks only and must not
//! trip it. Latching overcurrent also latches `hw_disabled`, which keeps
//! the drive off until an explicit reset.

use sil_codec::Direction;

use super::clamp_dt;

const NO_LOAD_RPM: f64 = 4000.0;
const STALL_CURRENT_MA: f64 = 25000.0;
const R_THERMAL: f64 = 0.008;
const R_COOL: f64 = 200.0;
const T_AMBIENT: f64 = 25.0;

const RPM_TAU_S: f64 = 0.3;
const DECAY_TAU_S: f64 = 0.5;
const CURRENT_DECAY_TAU_S: f64 = 0.1;

const OVERCURRENT_MA: f64 = 20000.0;
const OVERCURRENT_RPM_GATE: f64 = 500.0;
const OVERCURRENT_SUSTAIN_S: f64 = 0.2;
const OVERTEMP_C: f64 = 100.0;

#[derive(Debug)]
pub struct MotorModel {
    pub rpm: f64,
    pub current_ma: f64,
    pub temp_c: f64,
    pub duty_pct: f64,
    pub direction: Direction,
    pub enabled: bool,
    // Latched faults; cleared only by reset_faults().
    pub overcurrent: bool,
    pub overtemp: bool,
    pub stall_fault: bool,
    pub hw_disabled: bool,
    oc_sustain_s: f64,
}

impl Default for MotorModel {
    fn default() -> Self {
        Self::new()
    }
}

impl MotorModel {
    pub fn new() -> Self {
        Self {
            rpm: 0.0,
            current_ma: 0.0,
            temp_c: T_AMBIENT,
            duty_pct: 0.0,
            direction: Direction::Stop,
            enabled: false,
            overcurrent: false,
            overtemp: false,
            stall_fault: false,
            hw_disabled: false,
            oc_sustain_s: 0.0,
        }
    }

    /// Advance motor physics by `dt` seconds.
    pub fn update(&mut self, duty_pct: f64, direction: Direction, dt: f64, brake_load: f64) {
        let dt = clamp_dt(dt);

        self.duty_pct = duty_pct.clamp(0.0, 100.0);
        self.direction = direction;
        let brake_load = brake_load.clamp(0.0, 1.0);

        self.enabled = !(direction == Direction::Stop
            || self.duty_pct < 1.0
            || self.stall_fault
            || self.hw_disabled);

        if self.enabled {
            let target_rpm = NO_LOAD_RPM * (self.duty_pct / 100.0) * (1.0 - brake_load);
            self.rpm += (target_rpm - self.rpm) * (dt / RPM_TAU_S);
        } else {
            self.rpm *= (1.0 - dt / DECAY_TAU_S).max(0.0);
            if self.rpm < 1.0 {
                self.rpm = 0.0;
            }
        }

        if self.enabled {
            let load_factor = (1.0 - self.rpm / NO_LOAD_RPM).clamp(0.0, 1.0);
            self.current_ma = STALL_CURRENT_MA * (self.duty_pct / 100.0) * load_factor;
        } else {
            self.current_ma *= (1.0 - dt / CURRENT_DECAY_TAU_S).max(0.0);
        }

        let heat_input = (self.current_ma / 1000.0).powi(2) * R_THERMAL;
        let heat_loss = (self.temp_c - T_AMBIENT) / R_COOL;
        self.temp_c += (heat_input - heat_loss) * dt * 10.0; // sped up for demo visibility

        // Sustained-overcurrent detector.
        if self.current_ma > OVERCURRENT_MA && self.rpm < OVERCURRENT_RPM_GATE {
            self.oc_sustain_s += dt;
            if self.oc_sustain_s >= OVERCURRENT_SUSTAIN_S && !self.overcurrent {
                self.overcurrent = true;
                self.hw_disabled = true;
            }
        } else {
            self.oc_sustain_s = 0.0;
        }

        if self.temp_c > OVERTEMP_C {
            self.overtemp = true;
        }
    }

    /// Clear all latched faults.
    pub fn reset_faults(&mut self) {
        self.overcurrent = false;
        self.overtemp = false;
        self.stall_fault = false;
        self.hw_disabled = false;
        self.oc_sustain_s = 0.0;
    }

    pub fn has_fault(&self) -> bool {
        self.overcurrent || self.overtemp || self.stall_fault || self.hw_disabled
    }

    pub fn rpm_raw(&self) -> u16 {
        self.rpm.clamp(0.0, 10000.0) as u16
    }

    pub fn current_ma_raw(&self) -> u16 {
        self.current_ma.clamp(0.0, 30000.0) as u16
    }
}
