//! Shared application state for the Axum server.
//!
//! The bus is opened per scenario invocation through `BusProvider`, so the
//! injector never holds a long-lived CAN handle and tests swap in a mock.

use std::sync::Arc;

use async_trait::async_trait;

use sil_broker::Channel;
use sil_codec::{CanBus, CanResult, FrameCodec};

use crate::lock::ControlLock;

/// Opens short-lived bus handles for scenario runs.
#[async_trait]
pub trait BusProvider: Send + Sync {
    async fn open(&self) -> CanResult<Arc<dyn CanBus>>;
}

/// SocketCAN-backed provider for the configured channel.
#[cfg(target_os = "linux")]
pub struct SocketCanProvider {
    pub channel: String,
}

#[cfg(target_os = "linux")]
#[async_trait]
impl BusProvider for SocketCanProvider {
    async fn open(&self) -> CanResult<Arc<dyn CanBus>> {
        let bus = sil_codec::SocketCanBus::open(&self.channel)?;
        Ok(Arc::new(bus))
    }
}

/// Provider returning one shared mock bus (tests).
pub struct MockBusProvider {
    pub bus: Arc<sil_codec::MockCanBus>,
}

#[async_trait]
impl BusProvider for MockBusProvider {
    async fn open(&self) -> CanResult<Arc<dyn CanBus>> {
        Ok(self.bus.clone())
    }
}

/// Shared application state, cloned into every handler.
#[derive(Clone)]
pub struct AppState {
    pub bus_provider: Arc<dyn BusProvider>,
    pub codec: Arc<FrameCodec>,
    pub lock: Arc<ControlLock>,
    pub broker: Option<Arc<dyn Channel>>,
}

impl AppState {
    pub fn new(
        bus_provider: Arc<dyn BusProvider>,
        lock: Arc<ControlLock>,
        broker: Option<Arc<dyn Channel>>,
    ) -> Self {
        Self {
            bus_provider,
            codec: Arc::new(FrameCodec::new()),
            lock,
            broker,
        }
    }
}
