//! Verdict checker binary.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use sil_verdict::executor::{ExecutorConfig, ScenarioExecutor};
use sil_verdict::monitor::{BrokerMonitor, CanMonitor};
use sil_verdict::report::write_reports;
use sil_verdict::scenario::ScenarioDef;

/// Executes scenario YAML files against the SIL rig and evaluates
/// pass/fail verdicts.
#[derive(Debug, Parser)]
#[command(name = "sil-verdict", version)]
struct Args {
    /// Path to a scenario YAML file (repeatable).
    #[arg(long, required = true)]
    scenario: Vec<PathBuf>,

    /// Directory for result files.
    #[arg(long, default_value = "./results")]
    results_dir: PathBuf,

    /// Fault injection API base URL.
    #[arg(long, default_value = "http://localhost:8091")]
    fault_api_url: String,

    /// MQTT broker host.
    #[arg(long, default_value = "localhost")]
    mqtt_host: String,

    /// MQTT broker port.
    #[arg(long, default_value_t = 1883)]
    mqtt_port: u16,

    /// CAN bus channel.
    #[arg(long, default_value = "vcan0")]
    can_channel: String,

    /// Command used for process-control steps.
    #[arg(long, default_value = "docker")]
    process_runner: String,

    /// Enable verbose (DEBUG) logging.
    #[arg(long, short)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive("info".parse()?)
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!("=== SIL Verdict Checker ===");
    tracing::info!(scenarios = args.scenario.len(), results_dir = %args.results_dir.display());
    tracing::info!(fault_api = %args.fault_api_url, can_channel = %args.can_channel);
    tracing::info!(mqtt = format!("{}:{}", args.mqtt_host, args.mqtt_port));

    // Load and validate every definition before touching the rig.
    let mut defs = Vec::new();
    for path in &args.scenario {
        let source = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("cannot read {}: {e}", path.display()))?;
        let def = ScenarioDef::from_yaml(&source)
            .map_err(|e| anyhow::anyhow!("cannot parse {}: {e}", path.display()))?;
        defs.push(def);
    }

    #[cfg(not(target_os = "linux"))]
    anyhow::bail!("SocketCAN channel '{}' requires Linux", args.can_channel);

    #[cfg(target_os = "linux")]
    {
        // Failing to open the CAN device is fatal at startup.
        let bus = sil_codec::SocketCanBus::open(&args.can_channel).map_err(|e| {
            tracing::error!(
                channel = %args.can_channel,
                error = %e,
                "cannot open CAN bus; is vcan0 up? (modprobe vcan; ip link add vcan0 type vcan; ip link set vcan0 up)"
            );
            anyhow::anyhow!("cannot open CAN bus '{}': {e}", args.can_channel)
        })?;

        let mut can_monitor = CanMonitor::new(Arc::new(bus));
        can_monitor.start();

        let mut broker_monitor = BrokerMonitor::new(&args.mqtt_host, args.mqtt_port);
        broker_monitor.start();

        // Brief pause for the monitors to connect.
        tokio::time::sleep(Duration::from_secs(1)).await;

        let executor = ScenarioExecutor::new(
            can_monitor.capture(),
            broker_monitor.capture(),
            ExecutorConfig {
                fault_api_url: args.fault_api_url.clone(),
                process_runner: args.process_runner.clone(),
            },
        );

        let mut results = Vec::new();
        for def in &defs {
            results.push(executor.execute(def).await);
        }

        can_monitor.stop().await;
        broker_monitor.stop().await;

        write_reports(&results, &args.results_dir)?;

        let failed = results.iter().filter(|r| !r.passed).count();
        if failed > 0 {
            anyhow::bail!("{failed} of {} scenarios failed", results.len());
        }
        Ok(())
    }
}
