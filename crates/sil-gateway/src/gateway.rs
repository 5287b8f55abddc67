//! Gateway loop: bus in, broker out.

use std::time::Duration;

use sil_broker::Channel;
use sil_codec::{CanBus, CanError, decode_by_id};

use crate::publisher::SignalPublisher;
use crate::validator::E2eValidator;

const RECV_TIMEOUT: Duration = Duration::from_millis(100);

/// Drives frames from the bus through validation and decoding into the
/// broker. Runs until the task is cancelled.
pub struct Gateway<B: CanBus, C: Channel> {
    bus: B,
    publisher: SignalPublisher<C>,
    validator: E2eValidator,
    decode_errors: u64,
}

impl<B: CanBus, C: Channel> Gateway<B, C> {
    pub fn new(bus: B, channel: C) -> Self {
        Self {
            bus,
            publisher: SignalPublisher::new(channel),
            validator: E2eValidator::new(),
            decode_errors: 0,
        }
    }

    pub async fn run(&mut self) {
        tracing::info!("gateway running");
        loop {
            self.poll_once().await;
        }
    }

    /// One loop turn: receive with timeout, process, emit periodic stats.
    pub async fn poll_once(&mut self) {
        match self.bus.recv(RECV_TIMEOUT).await {
            Ok(frame) => {
                for violation in self.validator.check(&frame) {
                    tracing::debug!(arb_id = frame.id, ?violation, "E2E violation");
                }
                match decode_by_id(frame.id, &frame.data) {
                    Some(Ok(decoded)) => {
                        self.publisher.publish_frame(&decoded, &frame.data).await;
                    }
                    Some(Err(e)) => {
                        self.decode_errors += 1;
                        tracing::debug!(arb_id = frame.id, error = %e, "decode failed");
                    }
                    None => {} // not in the catalogue
                }
            }
            Err(CanError::Timeout { .. }) => {}
            Err(e) => {
                tracing::debug!(error = %e, "bus receive error");
            }
        }

        let stats = self.validator.stats();
        self.publisher.publish_stats(&stats).await;
    }

    pub fn decode_errors(&self) -> u64 {
        self.decode_errors
    }
}
