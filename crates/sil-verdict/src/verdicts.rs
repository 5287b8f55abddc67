//! The verdict library.
//!
//! Each verdict reduces to a boolean plus evidence strings. Evaluation is
//! total: every failure mode (missing data, unknown names, short frames)
//! yields `passed=false` with an explanation, never a panic. Timing is
//! relative to the observation window that started when the monitors were
//! reset.

use std::time::{Duration, Instant};

use serde_json::Value;

use sil_codec::CanFrame;
use sil_protocol::VehicleState;
use sil_protocol::frames::{CAN_MOTOR_STATUS, CAN_STEERING_STATUS};

use crate::monitor::{BrokerCapture, CanCapture};
use crate::scenario::{FieldCheck, VerdictDef};

const POLL: Duration = Duration::from_millis(50);

/// Evidence collected while evaluating one verdict.
#[derive(Debug, Clone)]
pub struct VerdictEvidence {
    pub description: String,
    pub expected: String,
    pub observed: String,
    pub passed: bool,
    pub details: String,
}

impl VerdictEvidence {
    fn new(
        description: impl Into<String>,
        expected: impl Into<String>,
        observed: impl Into<String>,
        passed: bool,
    ) -> Self {
        Self {
            description: description.into(),
            expected: expected.into(),
            observed: observed.into(),
            passed,
            details: String::new(),
        }
    }

    fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = details.into();
        self
    }
}

/// Evaluate one verdict against the captured buffers.
pub async fn evaluate(
    def: &VerdictDef,
    can: &CanCapture,
    broker: &BrokerCapture,
    observation_start: Instant,
) -> VerdictEvidence {
    match def {
        VerdictDef::VehicleState {
            expected,
            description,
            within_ms,
        } => vehicle_state(can, expected, description.as_deref(), *within_ms, false).await,

        VerdictDef::FaultPriority {
            expected_state,
            description,
            within_ms,
        } => vehicle_state(can, expected_state, description.as_deref(), *within_ms, true).await,

        VerdictDef::CanMessage {
            can_id,
            field_checks,
            description,
            within_ms,
        } => can_message(can, *can_id, field_checks, description.as_deref(), *within_ms, observation_start).await,

        VerdictDef::CanMessageAbsent {
            can_id,
            description,
            within_ms,
        } => can_message_absent(can, *can_id, description.as_deref(), *within_ms, observation_start).await,

        VerdictDef::MotorShutdown {
            description,
            within_ms,
        } => motor_shutdown(can, description.as_deref(), *within_ms).await,

        VerdictDef::MqttMessage {
            topic,
            field,
            expected,
            description,
            within_ms,
        } => mqtt_message(broker, topic, field, expected, description.as_deref(), *within_ms).await,

        VerdictDef::DtcBroadcast {
            dtc_code,
            ecu_source,
            can_id,
            description,
            within_ms,
        } => dtc_broadcast(can, *can_id, *dtc_code, *ecu_source, description.as_deref(), *within_ms).await,

        VerdictDef::HeartbeatLoss {
            can_id,
            description,
            within_ms,
        } => heartbeat_loss(can, *can_id, description.as_deref(), *within_ms).await,

        VerdictDef::MotorRpmUnchanged {
            tolerance,
            description,
            within_ms,
        } => motor_rpm_unchanged(can, *tolerance, description.as_deref(), *within_ms).await,

        VerdictDef::MotorTracking {
            description,
            within_ms,
        } => motor_tracking(can, description.as_deref(), *within_ms).await,

        VerdictDef::E2eErrorCount {
            topic,
            field,
            min_errors,
            description,
            within_ms,
        } => e2e_error_count(broker, topic, field, *min_errors, description.as_deref(), *within_ms).await,

        VerdictDef::SteeringRateLimit {
            description,
            within_ms,
        } => steering_rate_limit(can, description.as_deref(), *within_ms).await,

        VerdictDef::NoActiveFaults {
            description,
            within_ms,
        } => no_active_faults(can, description.as_deref(), *within_ms).await,

        VerdictDef::DtcPreserved {
            dtc_code,
            description,
            within_ms,
        } => dtc_preserved(can, *dtc_code, description.as_deref(), *within_ms).await,

        VerdictDef::PowerDerating {
            description,
            within_ms,
        } => power_derating(can, description.as_deref(), *within_ms).await,

        VerdictDef::AliveCounterWrap {
            can_ids,
            counter_bits,
            expected_wraps_min,
            description,
            ..
        } => alive_counter_wrap(can, can_ids, *counter_bits, *expected_wraps_min, description.as_deref()),

        VerdictDef::AllHeartbeatsActive {
            can_ids,
            description,
            within_ms,
        } => all_heartbeats_active(can, can_ids, description.as_deref(), *within_ms).await,

        VerdictDef::BatterySocMonotonic {
            direction,
            can_id,
            description,
            ..
        } => battery_soc_monotonic(can, *can_id, direction, description.as_deref()),

        VerdictDef::CanTimingJitter {
            can_ids,
            nominal_interval_ms,
            max_jitter_ms,
            description,
            ..
        } => can_timing_jitter(can, can_ids, *nominal_interval_ms, *max_jitter_ms, description.as_deref()),

        VerdictDef::MotorTempStable {
            max_temp_c,
            can_id,
            description,
            ..
        } => motor_temp_stable(can, *can_id, *max_temp_c, description.as_deref()),

        VerdictDef::NoStuckSignals {
            can_ids,
            max_identical_frames,
            description,
            ..
        } => no_stuck_signals(can, can_ids, *max_identical_frames, description.as_deref()),
    }
}

// ── Helpers ──────────────────────────────────────────────────

fn describe(description: Option<&str>, fallback: impl Into<String>) -> String {
    description.map_or_else(|| fallback.into(), str::to_string)
}

async fn sleep_window(within_ms: u64) {
    tokio::time::sleep(Duration::from_millis(within_ms)).await;
}

fn state_names(transitions: &[(Instant, VehicleState)]) -> Vec<&'static str> {
    transitions.iter().map(|(_, s)| s.name()).collect()
}

// ── Individual verdicts ──────────────────────────────────────

async fn vehicle_state(
    can: &CanCapture,
    expected: &str,
    description: Option<&str>,
    within_ms: u64,
    at_least: bool,
) -> VerdictEvidence {
    let desc = describe(description, format!("Vehicle state = {expected}"));
    let Some(target) = VehicleState::from_name(expected) else {
        return VerdictEvidence::new(desc, expected, "N/A", false)
            .with_details(format!("unknown vehicle state '{expected}'"));
    };

    let reached = can
        .wait_for_state(target, Duration::from_millis(within_ms))
        .await
        .is_ok();
    let current = can.vehicle_state();
    let current_name = current.map_or("UNKNOWN", VehicleState::name);
    let transitions = can.transitions();
    let seen = transitions.iter().any(|(_, s)| *s == target);
    let severity_ok = at_least && current.is_some_and(|c| c >= target);

    let passed = reached || seen || current == Some(target) || severity_ok;
    let expected_str = if at_least {
        format!("state >= {}", target.name())
    } else {
        target.name().to_string()
    };

    VerdictEvidence::new(desc, expected_str, current_name, passed)
        .with_details(format!("transitions observed: {:?}", state_names(&transitions)))
}

async fn can_message(
    can: &CanCapture,
    can_id: u32,
    field_checks: &[FieldCheck],
    description: Option<&str>,
    within_ms: u64,
    observation_start: Instant,
) -> VerdictEvidence {
    let desc = describe(description, format!("CAN 0x{can_id:03X} received"));
    let deadline = observation_start + Duration::from_millis(within_ms);

    // The frame must have arrived inside the observation window.
    let frame: Option<(Instant, CanFrame)> = loop {
        let in_window: Vec<_> = can
            .history(can_id)
            .into_iter()
            .filter(|(ts, _)| *ts >= observation_start && *ts <= deadline)
            .collect();
        if let Some(entry) = in_window.into_iter().next_back() {
            break Some(entry);
        }
        if Instant::now() >= deadline {
            break None;
        }
        tokio::time::sleep(POLL).await;
    };

    let Some((_, frame)) = frame else {
        return VerdictEvidence::new(
            desc,
            format!("CAN 0x{can_id:03X} within {within_ms}ms"),
            "no message received",
            false,
        );
    };

    let mut all_pass = true;
    let mut details = Vec::new();
    for check in field_checks {
        if check.byte >= frame.data.len() {
            all_pass = false;
            details.push(format!(
                "byte[{}]: out of range (frame has {} bytes)",
                check.byte,
                frame.data.len()
            ));
            continue;
        }
        let actual = u32::from(frame.data[check.byte]) & check.mask;
        if actual == check.expected {
            details.push(format!(
                "byte[{}] & 0x{:02X}: 0x{actual:02X} OK",
                check.byte, check.mask
            ));
        } else {
            all_pass = false;
            details.push(format!(
                "byte[{}] & 0x{:02X}: expected=0x{:02X}, got=0x{actual:02X}",
                check.byte, check.mask, check.expected
            ));
        }
    }

    VerdictEvidence::new(
        desc,
        format!("CAN 0x{can_id:03X} with matching fields"),
        format!("CAN 0x{can_id:03X} data={}", hex(&frame.data)),
        all_pass,
    )
    .with_details(details.join("; "))
}

async fn can_message_absent(
    can: &CanCapture,
    can_id: u32,
    description: Option<&str>,
    within_ms: u64,
    observation_start: Instant,
) -> VerdictEvidence {
    let desc = describe(description, format!("CAN 0x{can_id:03X} absent"));
    let deadline = observation_start + Duration::from_millis(within_ms);
    let now = Instant::now();
    if deadline > now {
        tokio::time::sleep(deadline - now).await;
    }

    let seen = can
        .history(can_id)
        .iter()
        .any(|(ts, _)| *ts >= observation_start);
    VerdictEvidence::new(
        desc,
        format!("CAN 0x{can_id:03X} NOT received"),
        if seen {
            format!("CAN 0x{can_id:03X} WAS received")
        } else {
            format!("CAN 0x{can_id:03X} correctly absent")
        },
        !seen,
    )
}

async fn motor_shutdown(
    can: &CanCapture,
    description: Option<&str>,
    within_ms: u64,
) -> VerdictEvidence {
    let desc = describe(description, "Motor RPM = 0");
    let reached = can
        .wait_for_motor_rpm_zero(Duration::from_millis(within_ms))
        .await
        .is_ok();
    VerdictEvidence::new(desc, "RPM = 0", format!("RPM = {}", can.motor_rpm()), reached)
        .with_details(format!("waited up to {within_ms}ms for motor shutdown"))
}

async fn mqtt_message(
    broker: &BrokerCapture,
    topic: &str,
    field: &str,
    expected: &Value,
    description: Option<&str>,
    within_ms: u64,
) -> VerdictEvidence {
    let desc = describe(description, format!("MQTT {topic}.{field} = {expected}"));
    let Some(message) = broker
        .wait_for_message(topic, Duration::from_millis(within_ms))
        .await
    else {
        return VerdictEvidence::new(
            desc,
            format!("{field}={expected}"),
            "no MQTT message received",
            false,
        )
        .with_details(format!("topic: {topic}"));
    };

    let actual = navigate(&message, field);
    let passed = json_matches(expected, actual.as_ref());
    VerdictEvidence::new(
        desc,
        format!("{field}={expected}"),
        format!("{field}={}", actual.map_or_else(|| "null".to_string(), |v| v.to_string())),
        passed,
    )
    .with_details(format!("topic: {topic}"))
}

async fn dtc_broadcast(
    can: &CanCapture,
    can_id: u32,
    dtc_code: u16,
    ecu_source: Option<u8>,
    description: Option<&str>,
    within_ms: u64,
) -> VerdictEvidence {
    let desc = describe(description, format!("DTC 0x{dtc_code:04X} broadcast"));
    let deadline = Instant::now() + Duration::from_millis(within_ms);

    loop {
        let history = can.history(can_id);
        for (_, frame) in &history {
            if frame.data.len() < 4 {
                continue;
            }
            let code = u16::from(frame.data[0]) | (u16::from(frame.data[1]) << 8);
            let source = frame.data[3];
            if code == dtc_code && ecu_source.is_none_or(|s| s == source) {
                return VerdictEvidence::new(
                    desc,
                    format!("DTC=0x{dtc_code:04X}"),
                    format!(
                        "DTC=0x{code:04X}, status=0x{:02X}, source={source}",
                        frame.data[2]
                    ),
                    true,
                )
                .with_details(format!("found in {} DTC frames", history.len()));
            }
        }
        if Instant::now() >= deadline {
            let seen: Vec<String> = history
                .iter()
                .filter(|(_, f)| f.data.len() >= 2)
                .map(|(_, f)| {
                    format!("0x{:04X}", u16::from(f.data[0]) | (u16::from(f.data[1]) << 8))
                })
                .collect();
            return VerdictEvidence::new(
                desc,
                format!("DTC=0x{dtc_code:04X}"),
                if seen.is_empty() {
                    "no DTC messages".to_string()
                } else {
                    format!("DTCs seen: {seen:?}")
                },
                false,
            )
            .with_details(format!("searched {} DTC frames on 0x{can_id:03X}", history.len()));
        }
        tokio::time::sleep(POLL).await;
    }
}

async fn heartbeat_loss(
    can: &CanCapture,
    can_id: u32,
    description: Option<&str>,
    within_ms: u64,
) -> VerdictEvidence {
    let desc = describe(description, format!("Heartbeat loss on 0x{can_id:03X}"));
    let initial = can.history_len(can_id);
    sleep_window(within_ms).await;
    let new_frames = can.history_len(can_id).saturating_sub(initial);

    VerdictEvidence::new(
        desc,
        format!("0 new frames on 0x{can_id:03X} in {within_ms}ms"),
        format!("{new_frames} new frames on 0x{can_id:03X}"),
        new_frames == 0,
    )
    .with_details(format!("initial count={initial}"))
}

async fn motor_rpm_unchanged(
    can: &CanCapture,
    tolerance: u16,
    description: Option<&str>,
    within_ms: u64,
) -> VerdictEvidence {
    let desc = describe(description, "Motor RPM unchanged");
    let before = can.motor_rpm();
    sleep_window(within_ms).await;
    let after = can.motor_rpm();
    let delta = before.abs_diff(after);

    VerdictEvidence::new(
        desc,
        format!("RPM change <= {tolerance}"),
        format!("RPM: {before} -> {after} (delta={delta})"),
        delta <= tolerance,
    )
}

async fn motor_tracking(
    can: &CanCapture,
    description: Option<&str>,
    within_ms: u64,
) -> VerdictEvidence {
    let desc = describe(description, "Motor RPM tracking");
    let deadline = Instant::now() + Duration::from_millis(within_ms);
    loop {
        let rpm = can.motor_rpm();
        if rpm > 0 {
            return VerdictEvidence::new(desc, "RPM > 0", format!("RPM = {rpm}"), true);
        }
        if Instant::now() >= deadline {
            return VerdictEvidence::new(desc, "RPM > 0", format!("RPM = {rpm}"), false)
                .with_details(format!("no non-zero RPM within {within_ms}ms"));
        }
        tokio::time::sleep(POLL).await;
    }
}

async fn e2e_error_count(
    broker: &BrokerCapture,
    topic: &str,
    field: &str,
    min_errors: u32,
    description: Option<&str>,
    within_ms: u64,
) -> VerdictEvidence {
    let desc = describe(description, "E2E error count");
    let Some(message) = broker
        .wait_for_message(topic, Duration::from_millis(within_ms))
        .await
    else {
        return VerdictEvidence::new(
            desc,
            format!("{field} >= {min_errors}"),
            "no MQTT message received",
            false,
        )
        .with_details(format!("topic: {topic}"));
    };

    let actual = message.get(field).and_then(Value::as_u64).unwrap_or(0);
    VerdictEvidence::new(
        desc,
        format!("{field} >= {min_errors}"),
        format!("{field} = {actual}"),
        actual >= u64::from(min_errors),
    )
    .with_details(format!("topic: {topic}"))
}

async fn steering_rate_limit(
    can: &CanCapture,
    description: Option<&str>,
    within_ms: u64,
) -> VerdictEvidence {
    let desc = describe(description, "Steering rate limit active");
    let result = can
        .wait_for_frame(CAN_STEERING_STATUS, Duration::from_millis(within_ms))
        .await;

    match result {
        Ok((_, frame)) => {
            let fault_byte = frame.data.get(6).copied().unwrap_or(0);
            VerdictEvidence::new(
                desc,
                "steering fault byte != 0",
                format!("fault byte = 0x{fault_byte:02X}"),
                fault_byte != 0,
            )
            .with_details(format!("Steering_Status data: {}", hex(&frame.data)))
        }
        Err(_) => VerdictEvidence::new(
            desc,
            "steering fault byte != 0",
            "no Steering_Status message",
            false,
        ),
    }
}

async fn no_active_faults(
    can: &CanCapture,
    description: Option<&str>,
    within_ms: u64,
) -> VerdictEvidence {
    let desc = describe(description, "No active faults");
    sleep_window(within_ms.min(1000)).await;

    let history = can.history(sil_protocol::frames::CAN_DTC_BROADCAST);
    let active: Vec<String> = history
        .iter()
        .filter(|(_, f)| f.data.len() >= 3 && f.data[2] == 0x01)
        .map(|(_, f)| format!("0x{:04X}", u16::from(f.data[0]) | (u16::from(f.data[1]) << 8)))
        .collect();

    VerdictEvidence::new(
        desc,
        "0 active DTCs",
        format!("{} active DTCs: {active:?}", active.len()),
        active.is_empty(),
    )
    .with_details(format!("checked {} DTC frames", history.len()))
}

async fn dtc_preserved(
    can: &CanCapture,
    dtc_code: u16,
    description: Option<&str>,
    within_ms: u64,
) -> VerdictEvidence {
    let desc = describe(description, format!("DTC 0x{dtc_code:04X} preserved"));
    sleep_window(within_ms.min(2000)).await;

    let history = can.history(sil_protocol::frames::CAN_DTC_BROADCAST);
    let found = history.iter().any(|(_, f)| {
        f.data.len() >= 2 && u16::from(f.data[0]) | (u16::from(f.data[1]) << 8) == dtc_code
    });

    VerdictEvidence::new(
        desc,
        format!("DTC 0x{dtc_code:04X} in history"),
        if found {
            format!("found DTC 0x{dtc_code:04X}")
        } else {
            format!("not found in {} DTC messages", history.len())
        },
        found,
    )
}

async fn power_derating(
    can: &CanCapture,
    description: Option<&str>,
    within_ms: u64,
) -> VerdictEvidence {
    let desc = describe(description, "Power derating");
    sleep_window(within_ms.min(2000)).await;

    let rpms: Vec<u16> = can
        .history(CAN_MOTOR_STATUS)
        .iter()
        .filter(|(_, f)| f.data.len() >= 4)
        .map(|(_, f)| u16::from(f.data[2]) | (u16::from(f.data[3]) << 8))
        .collect();

    let Some(&max_rpm) = rpms.iter().max() else {
        return VerdictEvidence::new(desc, "RPM decreased (derating)", "no Motor_Status data", false);
    };
    let current = *rpms.last().unwrap_or(&0);
    let passed = max_rpm > 0 && current < max_rpm;

    VerdictEvidence::new(
        desc,
        "current RPM < peak RPM",
        format!("peak RPM={max_rpm}, current RPM={current}"),
        passed,
    )
    .with_details(format!("{} RPM samples", rpms.len()))
}

fn alive_counter_wrap(
    can: &CanCapture,
    can_ids: &[u32],
    counter_bits: u8,
    expected_wraps_min: u32,
    description: Option<&str>,
) -> VerdictEvidence {
    let desc = describe(description, "Alive counter wraps");
    let counter_max = (1u8 << counter_bits.min(7)) - 1;

    let mut results = Vec::new();
    let mut all_passed = !can_ids.is_empty();

    for &can_id in can_ids {
        let counters: Vec<u8> = can
            .history(can_id)
            .iter()
            .filter_map(|(_, f)| f.data.first().map(|b| (b >> 4) & counter_max))
            .collect();
        if counters.is_empty() {
            results.push(format!("0x{can_id:03X}: no messages"));
            all_passed = false;
            continue;
        }
        let wraps = counters.windows(2).filter(|w| w[1] < w[0]).count() as u32;
        let ok = wraps >= expected_wraps_min;
        if !ok {
            all_passed = false;
        }
        results.push(format!(
            "0x{can_id:03X}: {wraps} wraps ({})",
            if ok { "OK" } else { "LOW" }
        ));
    }

    VerdictEvidence::new(
        desc,
        format!(">= {expected_wraps_min} wraps per CAN ID"),
        results.join("; "),
        all_passed,
    )
}

async fn all_heartbeats_active(
    can: &CanCapture,
    can_ids: &[u32],
    description: Option<&str>,
    within_ms: u64,
) -> VerdictEvidence {
    let desc = describe(description, "All heartbeats active");
    sleep_window(within_ms.min(1000)).await;

    let mut results = Vec::new();
    let mut all_active = !can_ids.is_empty();
    for &can_id in can_ids {
        if can.latest(can_id).is_some() {
            results.push(format!("0x{can_id:03X}: active"));
        } else {
            results.push(format!("0x{can_id:03X}: NOT received"));
            all_active = false;
        }
    }

    VerdictEvidence::new(
        desc,
        format!("all {} heartbeats present", can_ids.len()),
        results.join("; "),
        all_active,
    )
}

fn battery_soc_monotonic(
    can: &CanCapture,
    can_id: u32,
    direction: &str,
    description: Option<&str>,
) -> VerdictEvidence {
    let desc = describe(description, "Battery SOC monotonic");
    let soc: Vec<u8> = can
        .history(can_id)
        .iter()
        .filter(|(_, f)| f.data.len() >= 3)
        .map(|(_, f)| f.data[2])
        .collect();

    if soc.len() < 2 {
        return VerdictEvidence::new(
            desc,
            format!("SOC monotonically {direction}"),
            format!("only {} SOC sample(s)", soc.len()),
            false,
        );
    }

    let violations = soc
        .windows(2)
        .filter(|w| {
            if direction == "increasing" {
                w[1] < w[0]
            } else {
                w[1] > w[0]
            }
        })
        .count();

    VerdictEvidence::new(
        desc,
        format!("SOC monotonically {direction} (0 violations)"),
        format!(
            "SOC range: {}% -> {}%, {violations} violations in {} samples",
            soc[0],
            soc[soc.len() - 1],
            soc.len()
        ),
        violations == 0,
    )
}

fn can_timing_jitter(
    can: &CanCapture,
    can_ids: &[u32],
    nominal_ms: f64,
    max_jitter_ms: f64,
    description: Option<&str>,
) -> VerdictEvidence {
    let desc = describe(description, "CAN timing jitter");
    let mut results = Vec::new();
    let mut all_passed = !can_ids.is_empty();

    for &can_id in can_ids {
        let history = can.history(can_id);
        if history.len() < 2 {
            results.push(format!("0x{can_id:03X}: insufficient samples"));
            all_passed = false;
            continue;
        }
        let intervals: Vec<f64> = history
            .windows(2)
            .map(|w| (w[1].0 - w[0].0).as_secs_f64() * 1000.0)
            .collect();
        let max_deviation = intervals
            .iter()
            .map(|dt| (dt - nominal_ms).abs())
            .fold(0.0f64, f64::max);
        let avg = intervals.iter().sum::<f64>() / intervals.len() as f64;
        let ok = max_deviation <= max_jitter_ms;
        if !ok {
            all_passed = false;
        }
        results.push(format!(
            "0x{can_id:03X}: avg={avg:.1}ms, max_dev={max_deviation:.1}ms ({})",
            if ok { "OK" } else { "JITTER" }
        ));
    }

    VerdictEvidence::new(
        desc,
        format!("jitter <= {max_jitter_ms}ms from {nominal_ms}ms nominal"),
        results.join("; "),
        all_passed,
    )
}

fn motor_temp_stable(
    can: &CanCapture,
    can_id: u32,
    max_temp_c: f64,
    description: Option<&str>,
) -> VerdictEvidence {
    let desc = describe(description, "Motor temp stable");
    // Winding temperature is byte 2 with a -40 °C offset.
    let temps: Vec<f64> = can
        .history(can_id)
        .iter()
        .filter(|(_, f)| f.data.len() >= 3)
        .map(|(_, f)| f64::from(f.data[2]) - 40.0)
        .collect();

    let Some(peak) = temps.iter().copied().fold(None::<f64>, |acc, t| {
        Some(acc.map_or(t, |a| a.max(t)))
    }) else {
        return VerdictEvidence::new(
            desc,
            format!("temp < {max_temp_c}C"),
            "no Motor_Temperature data",
            false,
        );
    };

    VerdictEvidence::new(
        desc,
        format!("temp < {max_temp_c}C"),
        format!("peak={peak:.1}C, latest={:.1}C", temps[temps.len() - 1]),
        peak < max_temp_c,
    )
    .with_details(format!("{} samples", temps.len()))
}

fn no_stuck_signals(
    can: &CanCapture,
    can_ids: &[u32],
    max_identical: usize,
    description: Option<&str>,
) -> VerdictEvidence {
    let desc = describe(description, "No stuck signals");
    let mut results = Vec::new();
    let mut all_passed = true;

    for &can_id in can_ids {
        let history = can.history(can_id);
        if history.len() < 2 {
            results.push(format!("0x{can_id:03X}: insufficient samples"));
            continue;
        }
        let mut max_run = 1usize;
        let mut current_run = 1usize;
        for pair in history.windows(2) {
            if pair[0].1.data == pair[1].1.data {
                current_run += 1;
                max_run = max_run.max(current_run);
            } else {
                current_run = 1;
            }
        }
        let ok = max_run <= max_identical;
        if !ok {
            all_passed = false;
        }
        results.push(format!(
            "0x{can_id:03X}: max_run={max_run} ({})",
            if ok { "OK" } else { "STUCK" }
        ));
    }

    VerdictEvidence::new(
        desc,
        format!("max consecutive identical <= {max_identical}"),
        results.join("; "),
        all_passed,
    )
}

// ── Small utilities ──────────────────────────────────────────

fn hex(data: &[u8]) -> String {
    data.iter().map(|b| format!("{b:02x}")).collect()
}

/// Navigate a dotted field path (e.g. "motor.overcurrent").
fn navigate(value: &Value, path: &str) -> Option<Value> {
    let mut current = value.clone();
    for part in path.split('.') {
        current = current.get(part)?.clone();
    }
    Some(current)
}

/// Type-aware comparison mirroring loosely-typed scenario documents.
fn json_matches(expected: &Value, actual: Option<&Value>) -> bool {
    let Some(actual) = actual else {
        return expected.is_null();
    };
    match (expected, actual) {
        (Value::Number(e), Value::Number(a)) => {
            e.as_f64().zip(a.as_f64()).is_some_and(|(e, a)| (e - a).abs() < 1e-9)
        }
        (Value::String(e), a) => a.as_str().map_or_else(|| a.to_string() == *e, |s| s == e),
        _ => expected == actual,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sil_protocol::frames::{CAN_DTC_BROADCAST, CAN_VEHICLE_STATE};

    fn state_frame(state: VehicleState) -> CanFrame {
        let mut data = vec![0u8; 8];
        data[2] = state.as_u8();
        CanFrame::new(CAN_VEHICLE_STATE, data)
    }

    fn motor_frame(rpm: u16) -> CanFrame {
        let mut data = vec![0u8; 8];
        data[2] = (rpm & 0xFF) as u8;
        data[3] = (rpm >> 8) as u8;
        CanFrame::new(CAN_MOTOR_STATUS, data)
    }

    fn dtc_frame(code: u16, source: u8, status: u8) -> CanFrame {
        CanFrame::new(
            CAN_DTC_BROADCAST,
            vec![(code & 0xFF) as u8, (code >> 8) as u8, status, source, 1, 0, 0, 0],
        )
    }

    fn ctx() -> (CanCapture, BrokerCapture, Instant) {
        (CanCapture::new(), BrokerCapture::new(), Instant::now())
    }

    #[tokio::test]
    async fn vehicle_state_passes_on_transition_history() {
        let (can, broker, start) = ctx();
        can.record(state_frame(VehicleState::Run));
        can.record(state_frame(VehicleState::SafeStop));

        let def = VerdictDef::VehicleState {
            expected: "SAFE_STOP".into(),
            description: None,
            within_ms: 100,
        };
        let evidence = evaluate(&def, &can, &broker, start).await;
        assert!(evidence.passed);
        assert_eq!(evidence.observed, "SAFE_STOP");
    }

    #[tokio::test]
    async fn vehicle_state_unknown_name_fails_without_panic() {
        let (can, broker, start) = ctx();
        let def = VerdictDef::VehicleState {
            expected: "WARP".into(),
            description: None,
            within_ms: 10,
        };
        let evidence = evaluate(&def, &can, &broker, start).await;
        assert!(!evidence.passed);
        assert!(evidence.details.contains("unknown"));
    }

    #[tokio::test]
    async fn can_message_window_semantics() {
        // A frame 50ms after observation start passes a 100ms window but
        // fails a 1ms window, deterministically.
        let (can, broker, start) = ctx();
        let mut data = vec![0u8; 8];
        data[4] = 0x01;
        can.record_at(
            CanFrame::new(CAN_STEERING_STATUS, data),
            start + Duration::from_millis(50),
        );

        let passing = VerdictDef::CanMessage {
            can_id: 0x200,
            field_checks: vec![FieldCheck {
                byte: 4,
                mask: 0xFF,
                expected: 0x01,
            }],
            description: None,
            within_ms: 100,
        };
        let evidence = evaluate(&passing, &can, &broker, start).await;
        assert!(evidence.passed, "{evidence:?}");

        let failing = VerdictDef::CanMessage {
            can_id: 0x200,
            field_checks: vec![],
            description: None,
            within_ms: 1,
        };
        let evidence = evaluate(&failing, &can, &broker, start).await;
        assert!(!evidence.passed);
        assert_eq!(evidence.observed, "no message received");
    }

    #[tokio::test]
    async fn can_message_field_check_mismatch_fails() {
        let (can, broker, start) = ctx();
        let mut data = vec![0u8; 8];
        data[4] = 0x02;
        can.record_at(CanFrame::new(0x200, data), start + Duration::from_millis(1));

        let def = VerdictDef::CanMessage {
            can_id: 0x200,
            field_checks: vec![FieldCheck {
                byte: 4,
                mask: 0xFF,
                expected: 0x01,
            }],
            description: None,
            within_ms: 50,
        };
        let evidence = evaluate(&def, &can, &broker, start).await;
        assert!(!evidence.passed);
        assert!(evidence.details.contains("expected=0x01"));
    }

    #[tokio::test]
    async fn can_message_absent_detects_presence() {
        let (can, broker, start) = ctx();
        can.record_at(motor_frame(10), start + Duration::from_millis(1));

        let def = VerdictDef::CanMessageAbsent {
            can_id: CAN_MOTOR_STATUS,
            description: None,
            within_ms: 10,
        };
        let evidence = evaluate(&def, &can, &broker, start).await;
        assert!(!evidence.passed);

        let def = VerdictDef::CanMessageAbsent {
            can_id: 0x7FF,
            description: None,
            within_ms: 10,
        };
        let evidence = evaluate(&def, &can, &broker, start).await;
        assert!(evidence.passed);
    }

    #[tokio::test]
    async fn motor_shutdown_and_tracking() {
        let (can, broker, start) = ctx();
        can.record(motor_frame(0));

        let def = VerdictDef::MotorShutdown {
            description: None,
            within_ms: 100,
        };
        assert!(evaluate(&def, &can, &broker, start).await.passed);

        let def = VerdictDef::MotorTracking {
            description: None,
            within_ms: 60,
        };
        assert!(!evaluate(&def, &can, &broker, start).await.passed);

        can.record(motor_frame(1500));
        let def = VerdictDef::MotorTracking {
            description: None,
            within_ms: 60,
        };
        assert!(evaluate(&def, &can, &broker, start).await.passed);
    }

    #[tokio::test]
    async fn mqtt_message_dotted_navigation() {
        let (can, broker, start) = ctx();
        broker.record(
            "silrig/telemetry/plant",
            br#"{"motor": {"overcurrent": true, "rpm": 0}}"#,
        );

        let def = VerdictDef::MqttMessage {
            topic: "silrig/telemetry/plant".into(),
            field: "motor.overcurrent".into(),
            expected: serde_json::json!(true),
            description: None,
            within_ms: 50,
        };
        assert!(evaluate(&def, &can, &broker, start).await.passed);

        let def = VerdictDef::MqttMessage {
            topic: "silrig/telemetry/plant".into(),
            field: "motor.rpm".into(),
            expected: serde_json::json!(100),
            description: None,
            within_ms: 50,
        };
        assert!(!evaluate(&def, &can, &broker, start).await.passed);
    }

    #[tokio::test]
    async fn dtc_broadcast_matches_code_and_source() {
        let (can, broker, start) = ctx();
        can.record(dtc_frame(0xE301, 3, 0x01));

        let def = VerdictDef::DtcBroadcast {
            dtc_code: 0xE301,
            ecu_source: Some(3),
            can_id: CAN_DTC_BROADCAST,
            description: None,
            within_ms: 50,
        };
        assert!(evaluate(&def, &can, &broker, start).await.passed);

        let def = VerdictDef::DtcBroadcast {
            dtc_code: 0xE301,
            ecu_source: Some(2),
            can_id: CAN_DTC_BROADCAST,
            description: None,
            within_ms: 50,
        };
        assert!(!evaluate(&def, &can, &broker, start).await.passed);
    }

    #[tokio::test]
    async fn no_active_faults_flags_active_dtcs() {
        let (can, broker, start) = ctx();
        let def = VerdictDef::NoActiveFaults {
            description: None,
            within_ms: 10,
        };
        assert!(evaluate(&def, &can, &broker, start).await.passed);

        can.record(dtc_frame(0xE202, 2, 0x01));
        let def = VerdictDef::NoActiveFaults {
            description: None,
            within_ms: 10,
        };
        assert!(!evaluate(&def, &can, &broker, start).await.passed);
    }

    #[tokio::test]
    async fn fault_priority_accepts_higher_severity() {
        let (can, broker, start) = ctx();
        can.record(state_frame(VehicleState::SafeStop));

        let def = VerdictDef::FaultPriority {
            expected_state: "LIMP".into(),
            description: None,
            within_ms: 50,
        };
        assert!(evaluate(&def, &can, &broker, start).await.passed);
    }

    #[tokio::test]
    async fn alive_counter_wrap_counts_wraps() {
        let (can, broker, start) = ctx();
        // Two full cycles: counters 0..15, 0..15, 0 — two wraps.
        for _ in 0..2 {
            for alive in 0..16u8 {
                let mut data = vec![0u8; 8];
                data[0] = alive << 4;
                can.record(CanFrame::new(CAN_MOTOR_STATUS, data));
            }
        }
        let mut data = vec![0u8; 8];
        data[0] = 0;
        can.record(CanFrame::new(CAN_MOTOR_STATUS, data));

        let def = VerdictDef::AliveCounterWrap {
            can_ids: vec![CAN_MOTOR_STATUS],
            counter_bits: 4,
            expected_wraps_min: 2,
            description: None,
            within_ms: 10,
        };
        let evidence = evaluate(&def, &can, &broker, start).await;
        assert!(evidence.passed, "{evidence:?}");
    }

    #[tokio::test]
    async fn battery_soc_monotonic_counts_violations() {
        let (can, broker, start) = ctx();
        for soc in [100u8, 90, 80, 85, 70] {
            can.record(CanFrame::new(0x303, vec![0x38, 0x31, soc, 1]));
        }
        let def = VerdictDef::BatterySocMonotonic {
            direction: "decreasing".into(),
            can_id: 0x303,
            description: None,
            within_ms: 10,
        };
        let evidence = evaluate(&def, &can, &broker, start).await;
        assert!(!evidence.passed);
        assert!(evidence.observed.contains("1 violations"));
    }

    #[tokio::test]
    async fn timing_jitter_within_bounds() {
        let (can, broker, start) = ctx();
        for i in 0..5u64 {
            can.record_at(motor_frame(100), start + Duration::from_millis(20 * i));
        }
        let def = VerdictDef::CanTimingJitter {
            can_ids: vec![CAN_MOTOR_STATUS],
            nominal_interval_ms: 20.0,
            max_jitter_ms: 5.0,
            description: None,
            within_ms: 10,
        };
        assert!(evaluate(&def, &can, &broker, start).await.passed);

        let def = VerdictDef::CanTimingJitter {
            can_ids: vec![CAN_MOTOR_STATUS],
            nominal_interval_ms: 50.0,
            max_jitter_ms: 5.0,
            description: None,
            within_ms: 10,
        };
        assert!(!evaluate(&def, &can, &broker, start).await.passed);
    }

    #[tokio::test]
    async fn stuck_signals_detects_frozen_payloads() {
        let (can, broker, start) = ctx();
        for _ in 0..10 {
            can.record(motor_frame(1234));
        }
        let def = VerdictDef::NoStuckSignals {
            can_ids: vec![CAN_MOTOR_STATUS],
            max_identical_frames: 5,
            description: None,
            within_ms: 10,
        };
        let evidence = evaluate(&def, &can, &broker, start).await;
        assert!(!evidence.passed);
        assert!(evidence.observed.contains("STUCK"));
    }

    #[tokio::test]
    async fn motor_temp_stable_uses_offset_encoding() {
        let (can, broker, start) = ctx();
        // 85 °C encodes as 125.
        can.record(CanFrame::new(0x302, vec![0, 0, 125, 108, 100, 0]));
        let def = VerdictDef::MotorTempStable {
            max_temp_c: 90.0,
            can_id: 0x302,
            description: None,
            within_ms: 10,
        };
        assert!(evaluate(&def, &can, &broker, start).await.passed);

        let def = VerdictDef::MotorTempStable {
            max_temp_c: 80.0,
            can_id: 0x302,
            description: None,
            within_ms: 10,
        };
        assert!(!evaluate(&def, &can, &broker, start).await.passed);
    }

    #[tokio::test]
    async fn power_derating_needs_drop_from_peak() {
        let (can, broker, start) = ctx();
        for rpm in [1000u16, 2000, 1500] {
            can.record(motor_frame(rpm));
        }
        let def = VerdictDef::PowerDerating {
            description: None,
            within_ms: 10,
        };
        assert!(evaluate(&def, &can, &broker, start).await.passed);
    }

    #[test]
    fn json_matching_rules() {
        assert!(json_matches(&serde_json::json!(1), Some(&serde_json::json!(1.0))));
        assert!(json_matches(&serde_json::json!("RUN"), Some(&serde_json::json!("RUN"))));
        assert!(json_matches(&serde_json::json!("2"), Some(&serde_json::json!(2))));
        assert!(!json_matches(&serde_json::json!(true), Some(&serde_json::json!(false))));
        assert!(!json_matches(&serde_json::json!(1), None));
    }
}
