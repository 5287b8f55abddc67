//! DTC dispatch: each code fires at most once per activation.
//!
//! A raised fault emits its DTC on the next 100 ms check; the code then
//! stays in the active set (suppressing re-emission) until every underlying
//! fault has cleared, at which point the set empties and a recurrence would
//! emit again with a bumped occurrence counter.

use std::collections::{HashMap, HashSet};

use sil_protocol::frames::EcuSource;
use sil_protocol::{DTC_BATTERY_UV, DTC_BRAKE_FAULT, DTC_OVERCURRENT, DTC_STEER_FAULT};

/// Fault conditions sampled at the 100 ms check.
#[derive(Debug, Clone, Copy, Default)]
pub struct FaultSnapshot {
    pub motor_overcurrent: bool,
    pub steer_fault: bool,
    pub brake_fault: bool,
    pub battery_critical: bool,
}

impl FaultSnapshot {
    fn any(&self) -> bool {
        self.motor_overcurrent || self.steer_fault || self.brake_fault || self.battery_critical
    }
}

/// A DTC due for broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingDtc {
    pub code: u16,
    pub source: EcuSource,
    pub occurrence: u8,
}

#[derive(Debug, Default)]
pub struct DtcDispatcher {
    active: HashSet<u16>,
    occurrence: HashMap<u16, u32>,
}

impl DtcDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate the snapshot and return any newly-fired DTCs.
    pub fn check(&mut self, faults: &FaultSnapshot) -> Vec<PendingDtc> {
        let mut fired = Vec::new();

        let conditions = [
            (faults.motor_overcurrent, DTC_OVERCURRENT, EcuSource::Rzc),
            (faults.steer_fault, DTC_STEER_FAULT, EcuSource::Fzc),
            (faults.brake_fault, DTC_BRAKE_FAULT, EcuSource::Fzc),
            (faults.battery_critical, DTC_BATTERY_UV, EcuSource::Rzc),
        ];

        for (raised, code, source) in conditions {
            if raised && !self.active.contains(&code) {
                self.active.insert(code);
                let count = self.occurrence.entry(code).or_insert(0);
                *count += 1;
                fired.push(PendingDtc {
                    code,
                    source,
                    occurrence: (*count).min(255) as u8,
                });
            }
        }

        if !faults.any() {
            self.active.clear();
        }

        fired
    }

    /// Forget all active codes (reset path).
    pub fn clear_active(&mut self) {
        self.active.clear();
    }
}
