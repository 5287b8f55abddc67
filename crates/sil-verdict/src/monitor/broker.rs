//! Broker capture monitor.
//!
//! Subscribes to the rig hierarchy and keeps the latest parsed JSON per
//! topic. Payloads that are not JSON are stored as `{"raw": "<hex>"}` so
//! verdicts always have something to inspect.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use serde_json::Value;

use sil_protocol::topics;

const POLL: Duration = Duration::from_millis(100);
const STOP_DEADLINE: Duration = Duration::from_secs(3);

/// Latest message per topic, behind one mutex.
#[derive(Default)]
pub struct BrokerCapture {
    messages: Mutex<HashMap<String, (Instant, Value)>>,
}

impl BrokerCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, topic: &str, payload: &[u8]) {
        let value = serde_json::from_slice(payload).unwrap_or_else(|_| {
            let hex: String = payload.iter().map(|b| format!("{b:02x}")).collect();
            serde_json::json!({ "raw": hex })
        });
        self.messages
            .lock()
            .unwrap()
            .insert(topic.to_string(), (Instant::now(), value));
    }

    pub fn reset(&self) {
        self.messages.lock().unwrap().clear();
    }

    /// Latest parsed message for a topic, if any.
    pub fn latest(&self, topic: &str) -> Option<Value> {
        self.messages
            .lock()
            .unwrap()
            .get(topic)
            .map(|(_, v)| v.clone())
    }

    /// Wait for any message on `topic` within `timeout`.
    pub async fn wait_for_message(&self, topic: &str, timeout: Duration) -> Option<Value> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(value) = self.latest(topic) {
                return Some(value);
            }
            if Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(POLL).await;
        }
    }
}

/// Owns the MQTT client task. No work happens before `start()`.
pub struct BrokerMonitor {
    host: String,
    port: u16,
    capture: Arc<BrokerCapture>,
    running: Arc<AtomicBool>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl BrokerMonitor {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            capture: Arc::new(BrokerCapture::new()),
            running: Arc::new(AtomicBool::new(false)),
            task: None,
        }
    }

    pub fn capture(&self) -> Arc<BrokerCapture> {
        self.capture.clone()
    }

    /// Connect and start capturing. Connection failures are logged; the
    /// monitor keeps retrying in the background.
    pub fn start(&mut self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut options = MqttOptions::new("sil-verdict-checker", &self.host, self.port);
        options.set_keep_alive(Duration::from_secs(30));
        let (client, eventloop) = AsyncClient::new(options, 64);

        let capture = self.capture.clone();
        let running = self.running.clone();
        self.task = Some(tokio::spawn(run_loop(client, eventloop, capture, running)));
        tracing::info!(host = %self.host, port = self.port, "broker monitor starting");
    }

    pub async fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(task) = self.task.take()
            && tokio::time::timeout(STOP_DEADLINE, task).await.is_err()
        {
            tracing::warn!("broker monitor did not stop within deadline");
        }
    }
}

async fn run_loop(
    client: AsyncClient,
    mut eventloop: EventLoop,
    capture: Arc<BrokerCapture>,
    running: Arc<AtomicBool>,
) {
    let mut subscribed = false;
    while running.load(Ordering::SeqCst) {
        match tokio::time::timeout(POLL, eventloop.poll()).await {
            Ok(Ok(Event::Incoming(Packet::ConnAck(_)))) => {
                if let Err(e) = client.subscribe(topics::subscribe_all(), QoS::AtMostOnce).await {
                    tracing::warn!(error = %e, "broker subscribe failed");
                } else {
                    subscribed = true;
                    tracing::info!("broker monitor subscribed");
                }
            }
            Ok(Ok(Event::Incoming(Packet::Publish(publish)))) => {
                capture.record(&publish.topic, &publish.payload);
            }
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                if subscribed {
                    tracing::debug!(error = %e, "broker monitor connection error");
                }
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
            Err(_) => {} // poll timeout: loop to check the running flag
        }
    }
    tracing::info!("broker monitor stopped");
}
