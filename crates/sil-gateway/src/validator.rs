//! E2E validation of observed bus traffic.
//!
//! For every protected arbitration ID the validator recomputes the CRC,
//! checks the data ID against the catalogue, and tracks alive-counter
//! continuity (+1 mod 16 per ID). Violations are counted, never fatal.

use std::collections::HashMap;

use serde::Serialize;

use sil_codec::CanFrame;
use sil_codec::e2e::{alive_of, data_id_of, verify};
use sil_codec::schema::spec_by_id;
use sil_protocol::frames::is_e2e_protected;

/// Counter snapshot published to `silrig/telemetry/e2e`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct E2eStats {
    pub error_count: u64,
    pub crc_errors: u64,
    pub alive_errors: u64,
    pub data_id_errors: u64,
}

/// One detected violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum E2eViolation {
    Crc,
    DataId { expected: u8, got: u8 },
    Alive { expected: u8, got: u8 },
}

#[derive(Debug, Default)]
pub struct E2eValidator {
    last_alive: HashMap<u32, u8>,
    stats: E2eStats,
}

impl E2eValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> E2eStats {
        self.stats
    }

    /// Validate a frame; unprotected IDs pass through untouched.
    pub fn check(&mut self, frame: &CanFrame) -> Vec<E2eViolation> {
        if !is_e2e_protected(frame.id) {
            return Vec::new();
        }
        let Some(data_id) = data_id_of(&frame.data) else {
            self.stats.crc_errors += 1;
            self.stats.error_count += 1;
            return vec![E2eViolation::Crc];
        };

        let mut violations = Vec::new();

        if !verify(data_id, &frame.data) {
            self.stats.crc_errors += 1;
            violations.push(E2eViolation::Crc);
        }

        if let Some(spec) = spec_by_id(frame.id)
            && let Some(expected) = spec.data_id
            && expected != data_id
        {
            self.stats.data_id_errors += 1;
            violations.push(E2eViolation::DataId {
                expected,
                got: data_id,
            });
        }

        if let Some(alive) = alive_of(&frame.data) {
            if let Some(&last) = self.last_alive.get(&frame.id) {
                let expected = (last + 1) & 0x0F;
                if alive != expected {
                    self.stats.alive_errors += 1;
                    violations.push(E2eViolation::Alive {
                        expected,
                        got: alive,
                    });
                }
            }
            self.last_alive.insert(frame.id, alive);
        }

        self.stats.error_count += violations.len() as u64;
        violations
    }
}
