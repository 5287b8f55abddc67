//! Fault injection API binary.

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use sil_broker::{BrokerClient, BrokerConfig, Channel};
use sil_fault_inject::lock::{ControlLock, spawn_watchdog};
use sil_fault_inject::state::AppState;
use sil_fault_inject::{InjectConfig, build_router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = InjectConfig::from_env();
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.port,
        can_channel = %config.can_channel,
        lock_ttl_sec = config.lock_ttl.as_secs(),
        "sil-fault-inject starting"
    );

    // Broker connection for reset events and lock state.
    let broker_config = BrokerConfig::from_env("sil-fault-inject");
    let (client, mut eventloop) = BrokerClient::connect(&broker_config);
    tokio::spawn(async move {
        loop {
            if let Err(e) = eventloop.poll().await {
                tracing::warn!(error = %e, "MQTT event loop error, retrying in 5s");
                tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            }
        }
    });
    let broker: Arc<dyn Channel> = Arc::new(client);

    let lock = Arc::new(ControlLock::new(config.lock_ttl));
    spawn_watchdog(lock.clone(), Some(broker.clone()));

    #[cfg(target_os = "linux")]
    let bus_provider: Arc<dyn sil_fault_inject::BusProvider> =
        Arc::new(sil_fault_inject::state::SocketCanProvider {
            channel: config.can_channel.clone(),
        });

    #[cfg(not(target_os = "linux"))]
    let bus_provider: Arc<dyn sil_fault_inject::BusProvider> =
        anyhow::bail!("SocketCAN channel '{}' requires Linux", config.can_channel);

    let state = AppState::new(bus_provider, lock, Some(broker));
    let app = build_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "fault injection API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await?;

    tracing::info!("sil-fault-inject stopped");
    Ok(())
}
