//! Sliding-window event counter for command-pattern fault detectors.
//!
//! Counts events whose timestamps fall within `[now - window, now]` on a
//! monotonic clock. The timestamp deque is pruned on every record, so the
//! memory bound is the event rate times the window length.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct EventWindow {
    window: Duration,
    events: VecDeque<Instant>,
}

impl EventWindow {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            events: VecDeque::new(),
        }
    }

    /// Record an event at `now` and return the in-window count.
    pub fn record(&mut self, now: Instant) -> usize {
        self.prune(now);
        self.events.push_back(now);
        self.events.len()
    }

    /// Number of events within the window ending at `now`.
    pub fn count(&mut self, now: Instant) -> usize {
        self.prune(now);
        self.events.len()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    fn prune(&mut self, now: Instant) {
        while let Some(&front) = self.events.front() {
            if now.duration_since(front) > self.window {
                self.events.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_events_inside_window() {
        let mut w = EventWindow::new(Duration::from_millis(500));
        let t0 = Instant::now();
        assert_eq!(w.record(t0), 1);
        assert_eq!(w.record(t0 + Duration::from_millis(100)), 2);
        assert_eq!(w.record(t0 + Duration::from_millis(200)), 3);
    }

    #[test]
    fn prunes_expired_events() {
        let mut w = EventWindow::new(Duration::from_millis(500));
        let t0 = Instant::now();
        w.record(t0);
        w.record(t0 + Duration::from_millis(100));
        // 700ms later, both initial events are out of the window.
        assert_eq!(w.count(t0 + Duration::from_millis(700)), 0);
    }

    #[test]
    fn boundary_is_inclusive() {
        let mut w = EventWindow::new(Duration::from_millis(500));
        let t0 = Instant::now();
        w.record(t0);
        assert_eq!(w.count(t0 + Duration::from_millis(500)), 1);
        assert_eq!(w.count(t0 + Duration::from_millis(501)), 0);
    }

    #[test]
    fn clear_resets() {
        let mut w = EventWindow::new(Duration::from_millis(500));
        let t0 = Instant::now();
        w.record(t0);
        w.clear();
        assert_eq!(w.count(t0), 0);
    }
}
