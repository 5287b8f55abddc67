//! Mock CAN bus for testing.
//!
//! Supports a scripted RX queue and records every transmitted frame. All
//! tests use this instead of a vcan interface so the suite runs anywhere.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::bus::CanBus;
use crate::error::{CanError, CanResult};
use crate::types::CanFrame;

/// Mock bus with a scripted RX queue and recorded TX frames.
#[derive(Default)]
pub struct MockCanBus {
    rx: Mutex<VecDeque<CanFrame>>,
    tx: Mutex<Vec<CanFrame>>,
}

impl MockCanBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a frame for the next `recv`/`try_recv`.
    pub fn queue_rx(&self, frame: CanFrame) {
        self.rx.lock().unwrap().push_back(frame);
    }

    /// Copies of every frame passed to `send`, in order.
    pub fn sent(&self) -> Vec<CanFrame> {
        self.tx.lock().unwrap().clone()
    }

    /// The most recent sent frame, if any.
    pub fn last_sent(&self) -> Option<CanFrame> {
        self.tx.lock().unwrap().last().cloned()
    }

    /// Sent frames filtered by arbitration ID.
    pub fn sent_with_id(&self, arb_id: u32) -> Vec<CanFrame> {
        self.tx
            .lock()
            .unwrap()
            .iter()
            .filter(|f| f.id == arb_id)
            .cloned()
            .collect()
    }

    /// Drain and return all recorded TX frames.
    pub fn drain_sent(&self) -> Vec<CanFrame> {
        std::mem::take(&mut *self.tx.lock().unwrap())
    }
}

#[async_trait]
impl CanBus for MockCanBus {
    async fn send(&self, frame: &CanFrame) -> CanResult<()> {
        self.tx.lock().unwrap().push(frame.clone());
        Ok(())
    }

    async fn recv(&self, timeout: Duration) -> CanResult<CanFrame> {
        self.rx.lock().unwrap().pop_front().ok_or(CanError::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        })
    }

    async fn try_recv(&self) -> CanResult<Option<CanFrame>> {
        Ok(self.rx.lock().unwrap().pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_sent_frames() {
        let bus = MockCanBus::new();
        bus.send(&CanFrame::new(0x101, vec![0, 0, 50, 1, 0, 0, 0, 0]))
            .await
            .unwrap();

        let sent = bus.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].id, 0x101);
        assert_eq!(bus.last_sent().unwrap().data[2], 50);
    }

    #[tokio::test]
    async fn returns_queued_frames_in_order() {
        let bus = MockCanBus::new();
        bus.queue_rx(CanFrame::new(0x100, vec![1]));
        bus.queue_rx(CanFrame::new(0x200, vec![2]));

        let a = bus.recv(Duration::from_millis(10)).await.unwrap();
        let b = bus.try_recv().await.unwrap().unwrap();
        assert_eq!(a.id, 0x100);
        assert_eq!(b.id, 0x200);
    }

    #[tokio::test]
    async fn timeout_when_empty() {
        let bus = MockCanBus::new();
        let result = bus.recv(Duration::from_millis(10)).await;
        assert!(matches!(result, Err(CanError::Timeout { timeout_ms: 10 })));
        assert!(bus.try_recv().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn filters_by_id() {
        let bus = MockCanBus::new();
        bus.send(&CanFrame::new(0x300, vec![0; 8])).await.unwrap();
        bus.send(&CanFrame::new(0x301, vec![0; 8])).await.unwrap();
        bus.send(&CanFrame::new(0x300, vec![1; 8])).await.unwrap();

        assert_eq!(bus.sent_with_id(0x300).len(), 2);
        assert_eq!(bus.sent_with_id(0x500).len(), 0);
    }
}
