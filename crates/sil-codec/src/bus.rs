//! CAN bus abstraction.
//!
//! All rig components talk to the bus through the `CanBus` trait so tests
//! can substitute `MockCanBus` without hardware or a vcan interface.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{CanError, CanResult};
use crate::types::CanFrame;

/// Abstraction over a CAN socket.
#[async_trait]
pub trait CanBus: Send + Sync {
    /// Transmit a single frame.
    async fn send(&self, frame: &CanFrame) -> CanResult<()>;

    /// Receive the next frame, waiting up to `timeout`.
    async fn recv(&self, timeout: Duration) -> CanResult<CanFrame>;

    /// Non-blocking receive; `Ok(None)` when nothing is queued.
    async fn try_recv(&self) -> CanResult<Option<CanFrame>>;
}

#[cfg(target_os = "linux")]
pub use linux::SocketCanBus;

#[cfg(target_os = "linux")]
mod linux {
    use super::*;
    use socketcan::tokio::CanSocket;
    use socketcan::{EmbeddedFrame, Frame, StandardId};

    /// SocketCAN-backed bus (e.g. `vcan0`).
    pub struct SocketCanBus {
        socket: CanSocket,
        channel: String,
    }

    impl SocketCanBus {
        /// Open the named interface.
        pub fn open(channel: &str) -> CanResult<Self> {
            let socket = CanSocket::open(channel)
                .map_err(|e| CanError::Interface(format!("open {channel}: {e}")))?;
            tracing::info!(channel, "CAN socket opened");
            Ok(Self {
                socket,
                channel: channel.to_string(),
            })
        }

        pub fn channel(&self) -> &str {
            &self.channel
        }

        fn to_socketcan(frame: &CanFrame) -> CanResult<socketcan::CanFrame> {
            let id = StandardId::new(frame.id as u16)
                .ok_or_else(|| CanError::Interface(format!("invalid 11-bit id 0x{:X}", frame.id)))?;
            socketcan::CanFrame::new(id, &frame.data)
                .ok_or_else(|| CanError::Interface("payload exceeds 8 bytes".into()))
        }

        fn from_socketcan(frame: socketcan::CanFrame) -> CanFrame {
            CanFrame::new(frame.raw_id() & 0x7FF, frame.data().to_vec())
        }
    }

    #[async_trait]
    impl CanBus for SocketCanBus {
        async fn send(&self, frame: &CanFrame) -> CanResult<()> {
            let raw = Self::to_socketcan(frame)?;
            self.socket
                .write_frame(raw)
                .await
                .map_err(|e| CanError::Interface(e.to_string()))
        }

        async fn recv(&self, timeout: Duration) -> CanResult<CanFrame> {
            match tokio::time::timeout(timeout, self.socket.read_frame()).await {
                Ok(Ok(frame)) => Ok(Self::from_socketcan(frame)),
                Ok(Err(e)) => Err(CanError::Interface(e.to_string())),
                Err(_) => Err(CanError::Timeout {
                    timeout_ms: timeout.as_millis() as u64,
                }),
            }
        }

        async fn try_recv(&self) -> CanResult<Option<CanFrame>> {
            match tokio::time::timeout(Duration::ZERO, self.socket.read_frame()).await {
                Ok(Ok(frame)) => Ok(Some(Self::from_socketcan(frame))),
                Ok(Err(e)) => Err(CanError::Interface(e.to_string())),
                Err(_) => Ok(None),
            }
        }
    }
}
