//! Mock broker channel for testing.

use std::sync::Mutex;

use async_trait::async_trait;
use rumqttc::QoS;

use crate::channel::Channel;
use crate::error::BrokerResult;

/// A recorded publish.
#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
}

/// Mock channel that records publishes and subscriptions.
#[derive(Default)]
pub struct MockChannel {
    published: Mutex<Vec<PublishedMessage>>,
    subscriptions: Mutex<Vec<String>>,
}

impl MockChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies of all recorded publishes, in order.
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.published.lock().unwrap().clone()
    }

    /// Publishes matching a topic, in order.
    pub fn published_on(&self, topic: &str) -> Vec<PublishedMessage> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }

    /// Recorded subscription filters.
    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().unwrap().clone()
    }
}

#[async_trait]
impl Channel for MockChannel {
    async fn publish(
        &self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> BrokerResult<()> {
        self.published.lock().unwrap().push(PublishedMessage {
            topic: topic.to_string(),
            payload: payload.to_vec(),
            qos,
            retain,
        });
        Ok(())
    }

    async fn subscribe(&self, filter: &str, _qos: QoS) -> BrokerResult<()> {
        self.subscriptions.lock().unwrap().push(filter.to_string());
        Ok(())
    }
}
