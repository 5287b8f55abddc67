//! Plant simulator binary.

use tracing_subscriber::EnvFilter;

use sil_plant::PlantConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "sil-plant starting");

    let config = PlantConfig::from_env();

    #[cfg(not(target_os = "linux"))]
    anyhow::bail!("SocketCAN channel '{}' requires Linux", config.can_channel);

    #[cfg(target_os = "linux")]
    {
        use std::sync::Arc;

        use sil_plant::PlantSimulator;

        // Failing to open the CAN device is fatal at startup.
        let bus = sil_codec::SocketCanBus::open(&config.can_channel).map_err(|e| {
            tracing::error!(channel = %config.can_channel, error = %e, "cannot open CAN bus");
            anyhow::anyhow!("cannot open CAN bus '{}': {e}", config.can_channel)
        })?;

        let mut sim = PlantSimulator::new(Arc::new(bus));

        tokio::select! {
            () = sim.run() => {
                tracing::error!("simulator loop exited unexpectedly");
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown signal received");
            }
        }

        // Bus handle drops here, closing the socket.
        tracing::info!("sil-plant stopped");
        Ok(())
    }
}
