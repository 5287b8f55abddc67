//! Scenario executor.
//!
//! Runs sequentially on the control path: setup, monitor reset
//! (observation start = now), steps, verdict evaluation, best-effort
//! teardown. Teardown failures are logged, never propagated; a timeout in
//! a step fails the scenario, not the process.

use std::sync::Arc;
use std::time::{Duration, Instant};

use sil_protocol::VehicleState;

use crate::error::{VerdictError, VerdictResult};
use crate::monitor::{BrokerCapture, CanCapture};
use crate::scenario::{ScenarioDef, Step};
use crate::verdicts::{VerdictEvidence, evaluate};

const HEARTBEAT_WAIT: Duration = Duration::from_secs(3);
const PROCESS_TIMEOUT: Duration = Duration::from_secs(30);

/// Executor settings.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Fault injection API base URL.
    pub fault_api_url: String,
    /// Command used for `stop_process`/`start_process` steps.
    pub process_runner: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            fault_api_url: "http://localhost:8091".to_string(),
            process_runner: "docker".to_string(),
        }
    }
}

/// Result of a single scenario execution.
#[derive(Debug)]
pub struct ScenarioResult {
    pub scenario_id: String,
    pub scenario_name: String,
    pub description: String,
    pub verifies: Vec<String>,
    pub aspice: String,
    pub passed: bool,
    pub duration: Duration,
    pub verdicts: Vec<VerdictEvidence>,
    pub error: Option<String>,
}

pub struct ScenarioExecutor {
    can: Arc<CanCapture>,
    broker: Arc<BrokerCapture>,
    http: reqwest::Client,
    config: ExecutorConfig,
}

impl ScenarioExecutor {
    pub fn new(can: Arc<CanCapture>, broker: Arc<BrokerCapture>, config: ExecutorConfig) -> Self {
        Self {
            can,
            broker,
            http: reqwest::Client::new(),
            config,
        }
    }

    /// Execute one scenario definition end to end.
    pub async fn execute(&self, def: &ScenarioDef) -> ScenarioResult {
        tracing::info!(id = %def.id, name = %def.name, "--- scenario start ---");
        let start = Instant::now();

        let mut result = ScenarioResult {
            scenario_id: def.id.clone(),
            scenario_name: def.name.clone(),
            description: def.description.clone(),
            verifies: def.verifies.clone(),
            aspice: def.aspice.clone(),
            passed: false,
            duration: Duration::ZERO,
            verdicts: Vec::new(),
            error: None,
        };

        // Setup.
        for step in &def.setup {
            if let Err(e) = self.run_step(step).await {
                result.error = Some(format!("setup failed: {e}"));
                result.duration = start.elapsed();
                self.teardown(def).await;
                return result;
            }
        }

        // Fresh observation window: everything captured from here counts.
        self.can.reset();
        self.broker.reset();
        let observation_start = Instant::now();

        // Steps.
        for step in &def.steps {
            if let Err(e) = self.run_step(step).await {
                result.error = Some(format!("step failed: {e}"));
                result.duration = start.elapsed();
                self.teardown(def).await;
                return result;
            }
        }

        // Verdicts.
        for vdef in &def.verdicts {
            let evidence = evaluate(vdef, &self.can, &self.broker, observation_start).await;
            let status = if evidence.passed { "PASS" } else { "FAIL" };
            tracing::info!(
                verdict = %evidence.description,
                expected = %evidence.expected,
                observed = %evidence.observed,
                status,
                "verdict evaluated"
            );
            result.verdicts.push(evidence);
        }

        self.teardown(def).await;

        result.passed = !result.verdicts.is_empty() && result.verdicts.iter().all(|v| v.passed);
        result.duration = start.elapsed();
        tracing::info!(
            id = %def.id,
            passed = result.passed,
            duration_sec = format!("{:.1}", result.duration.as_secs_f64()),
            "--- scenario done ---"
        );
        result
    }

    async fn teardown(&self, def: &ScenarioDef) {
        for step in &def.teardown {
            if let Err(e) = self.run_step(step).await {
                tracing::warn!(error = %e, "teardown step failed (non-fatal)");
            }
        }
    }

    async fn run_step(&self, step: &Step) -> VerdictResult<()> {
        match step {
            Step::Reset => {
                let url = format!("{}/api/fault/reset", self.config.fault_api_url);
                tracing::info!("[step] reset");
                let response = self
                    .http
                    .post(&url)
                    .timeout(Duration::from_secs(10))
                    .send()
                    .await
                    .map_err(|e| VerdictError::Api(e.to_string()))?;
                ensure_success(response).await
            }
            Step::InjectScenario { name } => {
                let url = format!("{}/api/fault/scenario/{name}", self.config.fault_api_url);
                tracing::info!(scenario = %name, "[step] inject");
                let response = self
                    .http
                    .post(&url)
                    .timeout(Duration::from_secs(30))
                    .send()
                    .await
                    .map_err(|e| VerdictError::Api(e.to_string()))?;
                ensure_success(response).await
            }
            Step::Wait { seconds } => {
                tracing::info!(seconds, "[step] wait");
                tokio::time::sleep(Duration::from_secs_f64(seconds.max(0.0))).await;
                Ok(())
            }
            Step::WaitState { state, timeout } => {
                let target = VehicleState::from_name(state)
                    .ok_or_else(|| VerdictError::UnknownState(state.clone()))?;
                tracing::info!(state = %state, timeout, "[step] wait_state");
                self.can
                    .wait_for_state(target, Duration::from_secs_f64(timeout.max(0.0)))
                    .await
            }
            Step::StopProcess { service } => self.process_control("stop", service).await,
            Step::StartProcess { service } => self.process_control("start", service).await,
            Step::VerifyHeartbeat { can_id, ecu } => {
                let who = ecu.as_deref().unwrap_or("unknown");
                tracing::info!(can_id = format!("0x{can_id:03X}"), ecu = who, "[step] verify_heartbeat");
                self.can.wait_for_frame(*can_id, HEARTBEAT_WAIT).await?;
                Ok(())
            }
        }
    }

    async fn process_control(&self, action: &str, service: &str) -> VerdictResult<()> {
        tracing::info!(action, service, "[step] process control");
        let output = tokio::time::timeout(
            PROCESS_TIMEOUT,
            tokio::process::Command::new(&self.config.process_runner)
                .arg(action)
                .arg(service)
                .output(),
        )
        .await
        .map_err(|_| VerdictError::Process(format!("{action} {service}: timed out")))?
        .map_err(|e| VerdictError::Process(format!("{action} {service}: {e}")))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(VerdictError::Process(format!(
                "{action} {service}: exit {:?}: {}",
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }
}

async fn ensure_success(response: reqwest::Response) -> VerdictResult<()> {
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        let body = response.text().await.unwrap_or_default();
        Err(VerdictError::Api(format!("HTTP {status}: {body}")))
    }
}
