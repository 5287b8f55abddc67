//! Vehicle state machine.
//!
//! The transition relation is a pure function of the current state and the
//! tick inputs, so the same inputs always produce the same next state.
//! When multiple conditions hold the highest-severity target wins:
//! SAFE_STOP > LIMP > DEGRADED > RUN.

use sil_protocol::VehicleState;

use crate::models::battery::{STATUS_CRITICAL_UV, STATUS_UV_WARN};

/// Ticks spent in INIT before the vehicle is allowed into RUN (3 s at 10 ms).
pub const STARTUP_TICKS: u32 = 300;

/// Inputs sampled once per tick.
#[derive(Debug, Clone, Copy)]
pub struct StateInputs {
    pub estop_active: bool,
    /// Any of: motor overcurrent, motor hw_disabled, steer fault, brake fault.
    pub safety_fault: bool,
    /// Battery status nibble (0=critical_UV .. 4=critical_OV).
    pub battery_status: u8,
    /// Startup delay elapsed (INIT → RUN gate).
    pub startup_complete: bool,
}

/// Pure transition function.
pub fn next_state(current: VehicleState, inputs: &StateInputs) -> VehicleState {
    use VehicleState::*;

    if inputs.estop_active {
        return SafeStop;
    }

    match current {
        // INIT never degrades on transient faults; it only arms RUN.
        Init => {
            if inputs.startup_complete {
                Run
            } else {
                Init
            }
        }
        SafeStop => {
            if inputs.safety_fault {
                SafeStop
            } else {
                // E-Stop already clear here; re-arm the startup delay.
                Init
            }
        }
        Run | Degraded | Limp => {
            if inputs.safety_fault {
                SafeStop
            } else if inputs.battery_status == STATUS_CRITICAL_UV {
                Limp
            } else if inputs.battery_status == STATUS_UV_WARN {
                Degraded
            } else {
                Run
            }
        }
        Shutdown => Shutdown,
    }
}

/// Stateful wrapper owning the startup-tick counter.
#[derive(Debug)]
pub struct StateMachine {
    state: VehicleState,
    startup_ticks: u32,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            state: VehicleState::Init,
            startup_ticks: 0,
        }
    }

    pub fn state(&self) -> VehicleState {
        self.state
    }

    /// Force INIT and re-arm the startup delay (reset / E-Stop clear path).
    pub fn reset_to_init(&mut self) {
        self.state = VehicleState::Init;
        self.startup_ticks = 0;
    }

    /// Advance one tick; returns `Some((from, to))` on a transition.
    pub fn step(
        &mut self,
        estop_active: bool,
        safety_fault: bool,
        battery_status: u8,
    ) -> Option<(VehicleState, VehicleState)> {
        self.startup_ticks = self.startup_ticks.saturating_add(1);

        let inputs = StateInputs {
            estop_active,
            safety_fault,
            battery_status,
            startup_complete: self.startup_ticks >= STARTUP_TICKS,
        };
        let next = next_state(self.state, &inputs);

        if next != self.state {
            let from = self.state;
            self.state = next;
            if next == VehicleState::Init {
                self.startup_ticks = 0;
            }
            Some((from, next))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::battery::{STATUS_NORMAL, STATUS_OV_WARN};
    use VehicleState::*;

    fn inputs(
        estop: bool,
        fault: bool,
        battery: u8,
        startup_complete: bool,
    ) -> StateInputs {
        StateInputs {
            estop_active: estop,
            safety_fault: fault,
            battery_status: battery,
            startup_complete,
        }
    }

    #[test]
    fn init_holds_until_startup_complete() {
        assert_eq!(next_state(Init, &inputs(false, false, STATUS_NORMAL, false)), Init);
        assert_eq!(next_state(Init, &inputs(false, false, STATUS_NORMAL, true)), Run);
    }

    #[test]
    fn init_ignores_transient_faults() {
        assert_eq!(next_state(Init, &inputs(false, true, STATUS_NORMAL, false)), Init);
        assert_eq!(
            next_state(Init, &inputs(false, false, STATUS_CRITICAL_UV, false)),
            Init
        );
    }

    #[test]
    fn estop_overrides_everything() {
        for state in [Init, Run, Degraded, Limp, SafeStop] {
            assert_eq!(
                next_state(state, &inputs(true, false, STATUS_NORMAL, true)),
                SafeStop
            );
        }
    }

    #[test]
    fn actuator_fault_forces_safe_stop() {
        assert_eq!(next_state(Run, &inputs(false, true, STATUS_NORMAL, true)), SafeStop);
        assert_eq!(
            next_state(Degraded, &inputs(false, true, STATUS_NORMAL, true)),
            SafeStop
        );
    }

    #[test]
    fn battery_levels_degrade_and_limp() {
        assert_eq!(
            next_state(Run, &inputs(false, false, STATUS_UV_WARN, true)),
            Degraded
        );
        assert_eq!(
            next_state(Run, &inputs(false, false, STATUS_CRITICAL_UV, true)),
            Limp
        );
        assert_eq!(
            next_state(Degraded, &inputs(false, false, STATUS_CRITICAL_UV, true)),
            Limp
        );
    }

    #[test]
    fn recovery_returns_to_run() {
        assert_eq!(
            next_state(Degraded, &inputs(false, false, STATUS_NORMAL, true)),
            Run
        );
        assert_eq!(next_state(Limp, &inputs(false, false, STATUS_NORMAL, true)), Run);
    }

    #[test]
    fn fault_beats_battery_degradation() {
        // SAFE_STOP has the highest priority when both hold.
        assert_eq!(
            next_state(Run, &inputs(false, true, STATUS_CRITICAL_UV, true)),
            SafeStop
        );
    }

    #[test]
    fn safe_stop_with_latched_fault_stays_put() {
        assert_eq!(
            next_state(SafeStop, &inputs(false, true, STATUS_NORMAL, true)),
            SafeStop
        );
    }

    #[test]
    fn safe_stop_releases_to_init_when_clean() {
        assert_eq!(
            next_state(SafeStop, &inputs(false, false, STATUS_NORMAL, true)),
            Init
        );
    }

    #[test]
    fn overvoltage_does_not_degrade() {
        assert_eq!(next_state(Run, &inputs(false, false, STATUS_OV_WARN, true)), Run);
    }

    #[test]
    fn transition_relation_is_deterministic() {
        for state in [Init, Run, Degraded, Limp, SafeStop, Shutdown] {
            for estop in [false, true] {
                for fault in [false, true] {
                    for battery in 0..=4u8 {
                        for startup in [false, true] {
                            let i = inputs(estop, fault, battery, startup);
                            assert_eq!(next_state(state, &i), next_state(state, &i));
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn machine_runs_after_startup_delay() {
        let mut sm = StateMachine::new();
        for _ in 0..STARTUP_TICKS - 1 {
            assert!(sm.step(false, false, STATUS_NORMAL).is_none());
        }
        assert_eq!(
            sm.step(false, false, STATUS_NORMAL),
            Some((Init, Run))
        );
        assert_eq!(sm.state(), Run);
    }

    #[test]
    fn machine_rearms_startup_after_safe_stop() {
        let mut sm = StateMachine::new();
        for _ in 0..STARTUP_TICKS {
            sm.step(false, false, STATUS_NORMAL);
        }
        assert_eq!(sm.state(), Run);

        sm.step(true, false, STATUS_NORMAL);
        assert_eq!(sm.state(), SafeStop);

        // E-Stop cleared, no faults: back through INIT with a fresh delay.
        sm.step(false, false, STATUS_NORMAL);
        assert_eq!(sm.state(), Init);
        for _ in 0..STARTUP_TICKS - 1 {
            sm.step(false, false, STATUS_NORMAL);
            assert_eq!(sm.state(), Init);
        }
        sm.step(false, false, STATUS_NORMAL);
        assert_eq!(sm.state(), Run);
    }
}
