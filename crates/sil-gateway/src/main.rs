//! Gateway binary.

use tracing_subscriber::EnvFilter;

use sil_broker::{BrokerClient, BrokerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "sil-gateway starting");

    let can_channel = std::env::var("CAN_CHANNEL").unwrap_or_else(|_| "vcan0".to_string());

    #[cfg(not(target_os = "linux"))]
    anyhow::bail!("SocketCAN channel '{can_channel}' requires Linux");

    #[cfg(target_os = "linux")]
    {
        use sil_gateway::Gateway;

        let broker_config = BrokerConfig::from_env("sil-gateway");
        let (client, mut eventloop) = BrokerClient::connect(&broker_config);
        tokio::spawn(async move {
            loop {
                if let Err(e) = eventloop.poll().await {
                    tracing::warn!(error = %e, "MQTT event loop error, retrying in 5s");
                    tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                }
            }
        });

        let bus = sil_codec::SocketCanBus::open(&can_channel).map_err(|e| {
            tracing::error!(channel = %can_channel, error = %e, "cannot open CAN bus");
            anyhow::anyhow!("cannot open CAN bus '{can_channel}': {e}")
        })?;

        let mut gateway = Gateway::new(bus, client);

        tokio::select! {
            () = gateway.run() => {
                tracing::error!("gateway loop exited unexpectedly");
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown signal received");
            }
        }

        tracing::info!("sil-gateway stopped");
        Ok(())
    }
}
