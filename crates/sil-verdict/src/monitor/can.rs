//! Threaded CAN capture monitor.
//!
//! A background task receives frames with a 100 ms timeout (so shutdown is
//! responsive) and pushes them into a shared capture behind one mutex. The
//! capture offers wait primitives that poll at 50 ms against monotonic
//! deadlines; verdict evaluation reads the same buffers.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use sil_codec::{CanBus, CanFrame};
use sil_protocol::VehicleState;
use sil_protocol::frames::{CAN_MOTOR_STATUS, CAN_VEHICLE_STATE};

use crate::error::{VerdictError, VerdictResult};

const RECV_TIMEOUT: Duration = Duration::from_millis(100);
const POLL: Duration = Duration::from_millis(50);
const STOP_DEADLINE: Duration = Duration::from_secs(3);

/// Per-ID history cap; trimmed to half when exceeded.
const HISTORY_CAP: usize = 1000;
const HISTORY_TRIM: usize = 500;

#[derive(Default)]
struct CaptureInner {
    vehicle_state: Option<VehicleState>,
    transitions: Vec<(Instant, VehicleState)>,
    latest: HashMap<u32, (Instant, CanFrame)>,
    history: HashMap<u32, Vec<(Instant, CanFrame)>>,
    motor_rpm: u16,
    ids_seen: HashSet<u32>,
}

/// Shared capture buffers. All reads and the listener's appends go through
/// one mutex held for O(1) work only.
#[derive(Default)]
pub struct CanCapture {
    inner: Mutex<CaptureInner>,
}

impl CanCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a frame stamped now.
    pub fn record(&self, frame: CanFrame) {
        self.record_at(frame, Instant::now());
    }

    /// Record a frame with an explicit monotonic timestamp.
    pub fn record_at(&self, frame: CanFrame, ts: Instant) {
        let mut inner = self.inner.lock().unwrap();
        inner.ids_seen.insert(frame.id);

        if frame.id == CAN_VEHICLE_STATE
            && frame.data.len() >= 3
            && let Some(state) = VehicleState::from_u8(frame.data[2] & 0x0F)
            && inner.vehicle_state != Some(state)
        {
            tracing::debug!(state = %state, "vehicle state observed");
            inner.transitions.push((ts, state));
            inner.vehicle_state = Some(state);
        }

        if frame.id == CAN_MOTOR_STATUS && frame.data.len() >= 4 {
            inner.motor_rpm = u16::from(frame.data[2]) | (u16::from(frame.data[3]) << 8);
        }

        inner.latest.insert(frame.id, (ts, frame.clone()));
        let hist = inner.history.entry(frame.id).or_default();
        hist.push((ts, frame));
        if hist.len() > HISTORY_CAP {
            hist.drain(..hist.len() - HISTORY_TRIM);
        }
    }

    /// Clear all captured state for a new scenario.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        *inner = CaptureInner::default();
    }

    pub fn vehicle_state(&self) -> Option<VehicleState> {
        self.inner.lock().unwrap().vehicle_state
    }

    pub fn motor_rpm(&self) -> u16 {
        self.inner.lock().unwrap().motor_rpm
    }

    pub fn transitions(&self) -> Vec<(Instant, VehicleState)> {
        self.inner.lock().unwrap().transitions.clone()
    }

    pub fn latest(&self, can_id: u32) -> Option<(Instant, CanFrame)> {
        self.inner.lock().unwrap().latest.get(&can_id).cloned()
    }

    pub fn history(&self, can_id: u32) -> Vec<(Instant, CanFrame)> {
        self.inner
            .lock()
            .unwrap()
            .history
            .get(&can_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn history_len(&self, can_id: u32) -> usize {
        self.inner
            .lock()
            .unwrap()
            .history
            .get(&can_id)
            .map_or(0, Vec::len)
    }

    pub fn has_seen(&self, can_id: u32) -> bool {
        self.inner.lock().unwrap().ids_seen.contains(&can_id)
    }

    /// Block until the vehicle reaches `target` or the deadline passes.
    pub async fn wait_for_state(
        &self,
        target: VehicleState,
        timeout: Duration,
    ) -> VerdictResult<()> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.vehicle_state() == Some(target) {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(VerdictError::Timeout {
                    what: format!("vehicle state {target}"),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            tokio::time::sleep(POLL).await;
        }
    }

    /// Block until a *new* frame arrives on `can_id` or the deadline passes.
    pub async fn wait_for_frame(
        &self,
        can_id: u32,
        timeout: Duration,
    ) -> VerdictResult<(Instant, CanFrame)> {
        let initial = self.history_len(can_id);
        let deadline = Instant::now() + timeout;
        loop {
            {
                let inner = self.inner.lock().unwrap();
                if let Some(hist) = inner.history.get(&can_id)
                    && hist.len() > initial
                    && let Some(entry) = hist.last()
                {
                    return Ok(entry.clone());
                }
            }
            if Instant::now() >= deadline {
                return Err(VerdictError::Timeout {
                    what: format!("CAN frame 0x{can_id:03X}"),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            tokio::time::sleep(POLL).await;
        }
    }

    /// Block until motor RPM reads 0 or the deadline passes.
    pub async fn wait_for_motor_rpm_zero(&self, timeout: Duration) -> VerdictResult<()> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.motor_rpm() == 0 {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(VerdictError::Timeout {
                    what: "motor RPM 0".to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            tokio::time::sleep(POLL).await;
        }
    }
}

/// Owns the listener task. No work happens before `start()`.
pub struct CanMonitor {
    bus: Arc<dyn CanBus>,
    capture: Arc<CanCapture>,
    running: Arc<AtomicBool>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl CanMonitor {
    pub fn new(bus: Arc<dyn CanBus>) -> Self {
        Self {
            bus,
            capture: Arc::new(CanCapture::new()),
            running: Arc::new(AtomicBool::new(false)),
            task: None,
        }
    }

    pub fn capture(&self) -> Arc<CanCapture> {
        self.capture.clone()
    }

    /// Spawn the listener task.
    pub fn start(&mut self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let bus = self.bus.clone();
        let capture = self.capture.clone();
        let running = self.running.clone();

        self.task = Some(tokio::spawn(async move {
            tracing::info!("CAN monitor started");
            while running.load(Ordering::SeqCst) {
                match bus.recv(RECV_TIMEOUT).await {
                    Ok(frame) => capture.record(frame),
                    Err(sil_codec::CanError::Timeout { .. }) => {}
                    Err(e) => {
                        tracing::debug!(error = %e, "CAN monitor receive error");
                        tokio::time::sleep(POLL).await;
                    }
                }
            }
            tracing::info!("CAN monitor stopped");
        }));
    }

    /// Signal shutdown and join the listener within 3 s.
    pub async fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(task) = self.task.take()
            && tokio::time::timeout(STOP_DEADLINE, task).await.is_err()
        {
            tracing::warn!("CAN monitor did not stop within deadline");
        }
    }
}
