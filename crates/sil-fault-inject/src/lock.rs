//! Single-holder control lock with TTL.
//!
//! A client that holds the lock has exclusive use of the scenario
//! endpoints until it releases or the TTL expires. A 1 s watchdog expires
//! stale holders and republishes the lock state to the broker.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;

use sil_broker::Channel;

use crate::error::{InjectError, InjectResult};

pub const DEFAULT_TTL: Duration = Duration::from_secs(300);
const WATCHDOG_PERIOD: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
struct Holder {
    client_id: String,
    expires_at: Instant,
}

/// Lock state JSON published to `silrig/control/lock` (retained).
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LockState {
    pub locked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    pub remaining_sec: u64,
}

#[derive(Debug)]
pub struct ControlLock {
    holder: Mutex<Option<Holder>>,
    ttl: Duration,
}

impl ControlLock {
    pub fn new(ttl: Duration) -> Self {
        Self {
            holder: Mutex::new(None),
            ttl,
        }
    }

    /// Take or refresh the lock for `client_id`.
    pub fn acquire(&self, client_id: &str) -> InjectResult<LockState> {
        let mut holder = self.holder.lock().unwrap();
        let now = Instant::now();

        if let Some(current) = holder.as_ref()
            && current.expires_at > now
            && current.client_id != client_id
        {
            return Err(InjectError::AcquireConflict {
                holder: current.client_id.clone(),
                remaining_secs: remaining(current, now),
            });
        }

        *holder = Some(Holder {
            client_id: client_id.to_string(),
            expires_at: now + self.ttl,
        });
        Ok(Self::state_of(holder.as_ref(), now))
    }

    /// Release the lock; only the holder may do so.
    pub fn release(&self, client_id: &str) -> InjectResult<LockState> {
        let mut holder = self.holder.lock().unwrap();
        let now = Instant::now();

        match holder.as_ref() {
            Some(current) if current.expires_at > now => {
                if current.client_id != client_id {
                    return Err(InjectError::NotOwner);
                }
                *holder = None;
                Ok(Self::state_of(None, now))
            }
            _ => {
                // Expired or absent: releasing is a no-op for anyone.
                *holder = None;
                Ok(Self::state_of(None, now))
            }
        }
    }

    /// Check whether `client_id` may run scenarios right now.
    pub fn permits(&self, client_id: Option<&str>) -> InjectResult<()> {
        let holder = self.holder.lock().unwrap();
        let now = Instant::now();

        if let Some(current) = holder.as_ref()
            && current.expires_at > now
            && client_id != Some(current.client_id.as_str())
        {
            return Err(InjectError::LockDenied {
                holder: current.client_id.clone(),
                remaining_secs: remaining(current, now),
            });
        }
        Ok(())
    }

    /// Drop the holder if its TTL has elapsed. Returns true on expiry.
    pub fn expire_stale(&self) -> bool {
        let mut holder = self.holder.lock().unwrap();
        if let Some(current) = holder.as_ref()
            && current.expires_at <= Instant::now()
        {
            tracing::info!(client_id = %current.client_id, "control lock expired");
            *holder = None;
            return true;
        }
        false
    }

    pub fn state(&self) -> LockState {
        let holder = self.holder.lock().unwrap();
        Self::state_of(holder.as_ref(), Instant::now())
    }

    fn state_of(holder: Option<&Holder>, now: Instant) -> LockState {
        match holder {
            Some(h) if h.expires_at > now => LockState {
                locked: true,
                client_id: Some(h.client_id.clone()),
                remaining_sec: remaining(h, now),
            },
            _ => LockState {
                locked: false,
                client_id: None,
                remaining_sec: 0,
            },
        }
    }
}

fn remaining(holder: &Holder, now: Instant) -> u64 {
    holder.expires_at.saturating_duration_since(now).as_secs()
}

/// Watchdog task: expire stale holders every second and republish state.
pub fn spawn_watchdog(
    lock: Arc<ControlLock>,
    broker: Option<Arc<dyn Channel>>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(WATCHDOG_PERIOD);
        ticker.tick().await; // immediate first tick
        loop {
            ticker.tick().await;
            let expired = lock.expire_stale();
            if let Some(broker) = &broker {
                let state = lock.state();
                let payload = match serde_json::to_vec(&state) {
                    Ok(p) => p,
                    Err(_) => continue,
                };
                if let Err(e) = broker
                    .publish(
                        &sil_protocol::topics::control_lock(),
                        &payload,
                        rumqttc::QoS::AtMostOnce,
                        true,
                    )
                    .await
                {
                    tracing::debug!(error = %e, "lock state publish failed");
                }
            }
            if expired {
                tracing::debug!("watchdog expired a stale lock holder");
            }
        }
    })
}
