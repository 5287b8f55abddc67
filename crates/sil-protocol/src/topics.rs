//! Broker topic builders for the rig's MQTT hierarchy.
//!
//! Topic structure:
//! ```text
//! silrig/can/{MessageName}/{SignalName}        decoded signal (retained)
//! silrig/telemetry/stats/can_msgs_per_sec      bus rate counter (retained)
//! silrig/telemetry/e2e                         E2E error counters (retained)
//! silrig/alerts/dtc/{code}                     DTC alert JSON
//! silrig/command/reset                         reset event JSON
//! silrig/control/lock                          injector lock state (retained)
//! ```

const PREFIX: &str = "silrig";

/// Decoded CAN signal value topic.
pub fn can_signal(msg_name: &str, signal_name: &str) -> String {
    format!("{PREFIX}/can/{msg_name}/{signal_name}")
}

/// Bus message rate counter.
pub fn stats_rate() -> String {
    format!("{PREFIX}/telemetry/stats/can_msgs_per_sec")
}

/// E2E validation error counters.
pub fn e2e_telemetry() -> String {
    format!("{PREFIX}/telemetry/e2e")
}

/// DTC alert topic for a hex-formatted code (e.g. "0xE301").
pub fn dtc_alert(code: &str) -> String {
    format!("{PREFIX}/alerts/dtc/{code}")
}

/// Reset command broadcast.
pub fn command_reset() -> String {
    format!("{PREFIX}/command/reset")
}

/// Fault-injector control lock state.
pub fn control_lock() -> String {
    format!("{PREFIX}/control/lock")
}

/// Wildcard subscription covering the whole hierarchy.
pub fn subscribe_all() -> String {
    format!("{PREFIX}/#")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_topic() {
        assert_eq!(
            can_signal("Motor_Status", "MotorSpeed_RPM"),
            "silrig/can/Motor_Status/MotorSpeed_RPM"
        );
    }

    #[test]
    fn telemetry_topics() {
        assert_eq!(stats_rate(), "silrig/telemetry/stats/can_msgs_per_sec");
        assert_eq!(e2e_telemetry(), "silrig/telemetry/e2e");
    }

    #[test]
    fn alert_and_control_topics() {
        assert_eq!(dtc_alert("0xE301"), "silrig/alerts/dtc/0xE301");
        assert_eq!(command_reset(), "silrig/command/reset");
        assert_eq!(control_lock(), "silrig/control/lock");
    }

    #[test]
    fn wildcard() {
        assert_eq!(subscribe_all(), "silrig/#");
    }
}
