//! Vehicle operating modes and their severity ordering.

use serde::{Deserialize, Serialize};

/// Vehicle operating mode, as transmitted in Vehicle_State byte 2.
///
/// The numeric order doubles as the severity order used by fault-priority
/// checks: `Run < Degraded < Limp < SafeStop`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum VehicleState {
    Init = 0,
    Run = 1,
    Degraded = 2,
    Limp = 3,
    SafeStop = 4,
    Shutdown = 5,
}

impl VehicleState {
    /// Wire encoding (4-bit field).
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Decode from the 4-bit wire field. Unknown values map to `None`.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Init),
            1 => Some(Self::Run),
            2 => Some(Self::Degraded),
            3 => Some(Self::Limp),
            4 => Some(Self::SafeStop),
            5 => Some(Self::Shutdown),
            _ => None,
        }
    }

    /// Parse the upper-case name used in scenario definitions.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "INIT" => Some(Self::Init),
            "RUN" => Some(Self::Run),
            "DEGRADED" => Some(Self::Degraded),
            "LIMP" => Some(Self::Limp),
            "SAFE_STOP" => Some(Self::SafeStop),
            "SHUTDOWN" => Some(Self::Shutdown),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::Run => "RUN",
            Self::Degraded => "DEGRADED",
            Self::Limp => "LIMP",
            Self::SafeStop => "SAFE_STOP",
            Self::Shutdown => "SHUTDOWN",
        }
    }
}

impl std::fmt::Display for VehicleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
