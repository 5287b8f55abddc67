//! Declarative scenario definitions (YAML).
//!
//! A scenario is `{id, name, verifies[], aspice, setup[], steps[],
//! verdicts[], teardown[], timeout_sec}`. CAN IDs may be written as
//! integers or hex strings ("0x200") in the source documents.

use serde::{Deserialize, Deserializer};

use crate::error::VerdictResult;

fn default_timeout_sec() -> u64 {
    60
}

fn default_aspice() -> String {
    "SWE.5".to_string()
}

fn default_state_timeout() -> f64 {
    10.0
}

fn default_within_ms() -> u64 {
    5000
}

fn one_u32() -> u32 {
    1
}

fn default_counter_bits() -> u8 {
    4
}

fn default_tolerance() -> u16 {
    1
}

fn default_e2e_topic() -> String {
    sil_protocol::topics::e2e_telemetry()
}

fn default_error_field() -> String {
    "error_count".to_string()
}

fn default_dtc_can_id() -> u32 {
    sil_protocol::frames::CAN_DTC_BROADCAST
}

fn default_battery_can_id() -> u32 {
    sil_protocol::frames::CAN_BATTERY_STATUS
}

fn default_motor_temp_can_id() -> u32 {
    sil_protocol::frames::CAN_MOTOR_TEMP
}

fn default_direction() -> String {
    "decreasing".to_string()
}

fn default_max_temp() -> f64 {
    90.0
}

fn default_max_identical() -> usize {
    50
}

fn default_nominal_interval() -> f64 {
    50.0
}

fn default_max_jitter() -> f64 {
    10.0
}

/// Accept `0x500`, `"0x500"`, or `1280`.
fn de_can_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(u32),
        Str(String),
    }
    match Raw::deserialize(deserializer)? {
        Raw::Int(v) => Ok(v),
        Raw::Str(s) => parse_int(&s).map_err(serde::de::Error::custom),
    }
}

fn de_can_ids<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u32>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(u32),
        Str(String),
    }
    let raw = Vec::<Raw>::deserialize(deserializer)?;
    raw.into_iter()
        .map(|r| match r {
            Raw::Int(v) => Ok(v),
            Raw::Str(s) => parse_int(&s).map_err(serde::de::Error::custom),
        })
        .collect()
}

fn de_dtc_code<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u16, D::Error> {
    let wide = de_can_id(deserializer)?;
    u16::try_from(wide).map_err(|_| serde::de::Error::custom("DTC code out of u16 range"))
}

fn parse_int(s: &str) -> Result<u32, String> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("invalid hex '{s}': {e}"))
    } else {
        s.parse().map_err(|e| format!("invalid integer '{s}': {e}"))
    }
}

/// One scenario document.
#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioDef {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub verifies: Vec<String>,
    #[serde(default = "default_aspice")]
    pub aspice: String,
    #[serde(default)]
    pub setup: Vec<Step>,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default)]
    pub verdicts: Vec<VerdictDef>,
    #[serde(default)]
    pub teardown: Vec<Step>,
    #[serde(default = "default_timeout_sec")]
    pub timeout_sec: u64,
}

impl ScenarioDef {
    pub fn from_yaml(source: &str) -> VerdictResult<Self> {
        Ok(serde_yaml::from_str(source)?)
    }
}

/// One executable step.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// POST /api/fault/reset.
    Reset,
    /// POST /api/fault/scenario/{name}.
    InjectScenario { name: String },
    /// Sleep.
    Wait { seconds: f64 },
    /// Wait for a vehicle state with its own timeout.
    WaitState {
        state: String,
        #[serde(default = "default_state_timeout")]
        timeout: f64,
    },
    /// Stop a named host process (e.g. an ECU container).
    StopProcess { service: String },
    /// Start a named host process.
    StartProcess { service: String },
    /// Confirm a heartbeat ID is live on the bus.
    VerifyHeartbeat {
        #[serde(deserialize_with = "de_can_id")]
        can_id: u32,
        #[serde(default)]
        ecu: Option<String>,
    },
}

/// A byte/mask/expected check inside a `can_message` verdict.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldCheck {
    pub byte: usize,
    #[serde(default = "default_mask", deserialize_with = "de_can_id")]
    pub mask: u32,
    #[serde(deserialize_with = "de_can_id")]
    pub expected: u32,
}

fn default_mask() -> u32 {
    0xFF
}

/// One verdict definition. Every variant reduces to a pass/fail plus an
/// evidence string during evaluation.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VerdictDef {
    VehicleState {
        expected: String,
        #[serde(default)]
        description: Option<String>,
        #[serde(default = "default_within_ms")]
        within_ms: u64,
    },
    CanMessage {
        #[serde(deserialize_with = "de_can_id")]
        can_id: u32,
        #[serde(default)]
        field_checks: Vec<FieldCheck>,
        #[serde(default)]
        description: Option<String>,
        #[serde(default = "default_within_ms")]
        within_ms: u64,
    },
    CanMessageAbsent {
        #[serde(deserialize_with = "de_can_id")]
        can_id: u32,
        #[serde(default)]
        description: Option<String>,
        #[serde(default = "default_within_ms")]
        within_ms: u64,
    },
    MotorShutdown {
        #[serde(default)]
        description: Option<String>,
        #[serde(default = "default_within_ms")]
        within_ms: u64,
    },
    MqttMessage {
        topic: String,
        field: String,
        expected: serde_json::Value,
        #[serde(default)]
        description: Option<String>,
        #[serde(default = "default_within_ms")]
        within_ms: u64,
    },
    DtcBroadcast {
        #[serde(deserialize_with = "de_dtc_code")]
        dtc_code: u16,
        #[serde(default)]
        ecu_source: Option<u8>,
        #[serde(default = "default_dtc_can_id", deserialize_with = "de_can_id")]
        can_id: u32,
        #[serde(default)]
        description: Option<String>,
        #[serde(default = "default_within_ms")]
        within_ms: u64,
    },
    HeartbeatLoss {
        #[serde(deserialize_with = "de_can_id")]
        can_id: u32,
        #[serde(default)]
        description: Option<String>,
        #[serde(default = "default_within_ms")]
        within_ms: u64,
    },
    MotorRpmUnchanged {
        #[serde(default = "default_tolerance")]
        tolerance: u16,
        #[serde(default)]
        description: Option<String>,
        #[serde(default = "default_within_ms")]
        within_ms: u64,
    },
    MotorTracking {
        #[serde(default)]
        description: Option<String>,
        #[serde(default = "default_within_ms")]
        within_ms: u64,
    },
    E2eErrorCount {
        #[serde(default = "default_e2e_topic")]
        topic: String,
        #[serde(default = "default_error_field")]
        field: String,
        #[serde(default = "one_u32")]
        min_errors: u32,
        #[serde(default)]
        description: Option<String>,
        #[serde(default = "default_within_ms")]
        within_ms: u64,
    },
    SteeringRateLimit {
        #[serde(default)]
        description: Option<String>,
        #[serde(default = "default_within_ms")]
        within_ms: u64,
    },
    NoActiveFaults {
        #[serde(default)]
        description: Option<String>,
        #[serde(default = "default_within_ms")]
        within_ms: u64,
    },
    DtcPreserved {
        #[serde(deserialize_with = "de_dtc_code")]
        dtc_code: u16,
        #[serde(default)]
        description: Option<String>,
        #[serde(default = "default_within_ms")]
        within_ms: u64,
    },
    FaultPriority {
        expected_state: String,
        #[serde(default)]
        description: Option<String>,
        #[serde(default = "default_within_ms")]
        within_ms: u64,
    },
    PowerDerating {
        #[serde(default)]
        description: Option<String>,
        #[serde(default = "default_within_ms")]
        within_ms: u64,
    },
    AliveCounterWrap {
        #[serde(deserialize_with = "de_can_ids")]
        can_ids: Vec<u32>,
        #[serde(default = "default_counter_bits")]
        counter_bits: u8,
        #[serde(default = "one_u32")]
        expected_wraps_min: u32,
        #[serde(default)]
        description: Option<String>,
        #[serde(default = "default_within_ms")]
        within_ms: u64,
    },
    AllHeartbeatsActive {
        #[serde(deserialize_with = "de_can_ids")]
        can_ids: Vec<u32>,
        #[serde(default)]
        description: Option<String>,
        #[serde(default = "default_within_ms")]
        within_ms: u64,
    },
    BatterySocMonotonic {
        #[serde(default = "default_direction")]
        direction: String,
        #[serde(default = "default_battery_can_id", deserialize_with = "de_can_id")]
        can_id: u32,
        #[serde(default)]
        description: Option<String>,
        #[serde(default = "default_within_ms")]
        within_ms: u64,
    },
    CanTimingJitter {
        #[serde(deserialize_with = "de_can_ids")]
        can_ids: Vec<u32>,
        #[serde(default = "default_nominal_interval")]
        nominal_interval_ms: f64,
        #[serde(default = "default_max_jitter")]
        max_jitter_ms: f64,
        #[serde(default)]
        description: Option<String>,
        #[serde(default = "default_within_ms")]
        within_ms: u64,
    },
    MotorTempStable {
        #[serde(default = "default_max_temp")]
        max_temp_c: f64,
        #[serde(default = "default_motor_temp_can_id", deserialize_with = "de_can_id")]
        can_id: u32,
        #[serde(default)]
        description: Option<String>,
        #[serde(default = "default_within_ms")]
        within_ms: u64,
    },
    NoStuckSignals {
        #[serde(deserialize_with = "de_can_ids")]
        can_ids: Vec<u32>,
        #[serde(default = "default_max_identical")]
        max_identical_frames: usize,
        #[serde(default)]
        description: Option<String>,
        #[serde(default = "default_within_ms")]
        within_ms: u64,
    },
}
