//! Debounced "latest reading" observation
//!
//! Consumers that only display the newest value do not need every reading.
//! [`Debouncer`] holds the newest reading and releases it once no other
//! reading has arrived for a full window; each arrival restarts the window.
//! The session drives it with `tokio::time::sleep_until(deadline)`.

use std::time::Duration;

use tokio::time::Instant;

use crate::reading::Reading;

/// Debounce state for one stream
#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    deadline: Option<Instant>,
    pending: Option<Reading>,
}

impl Debouncer {
    /// Create an idle debouncer
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            deadline: None,
            pending: None,
        }
    }

    /// Record an arrival, replacing any unreleased reading and restarting the
    /// window.
    pub fn observe(&mut self, reading: Reading, now: Instant) {
        self.pending = Some(reading);
        self.deadline = Some(now + self.window);
    }

    /// When the pending reading becomes due, if any
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Release the pending reading if its window has elapsed.
    pub fn poll(&mut self, now: Instant) -> Option<Reading> {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                self.pending.take()
            }
            _ => None,
        }
    }

    /// Forget the pending reading
    pub fn cancel(&mut self) {
        self.deadline = None;
        self.pending = None;
    }

    /// Whether a reading is waiting for its window to elapse
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(n: usize) -> Reading {
        Reading::new("s1", n as f64, format!("2024-05-01T12:00:00.{:03}Z", n))
    }

    #[test]
    fn test_idle() {
        let mut debouncer = Debouncer::new(Duration::from_millis(300));
        assert!(debouncer.deadline().is_none());
        assert!(debouncer.poll(Instant::now()).is_none());
    }

    #[test]
    fn test_release_after_window() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(Duration::from_millis(300));
        debouncer.observe(reading(1), start);

        assert!(debouncer.poll(start + Duration::from_millis(299)).is_none());
        let released = debouncer.poll(start + Duration::from_millis(300)).unwrap();
        assert_eq!(released.numeric(), Some(1.0));
        assert!(!debouncer.is_pending());
        assert!(debouncer.poll(start + Duration::from_millis(900)).is_none());
    }

    #[test]
    fn test_arrival_restarts_window() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(Duration::from_millis(300));
        debouncer.observe(reading(1), start);
        debouncer.observe(reading(2), start + Duration::from_millis(200));

        // the first window would have closed here
        assert!(debouncer.poll(start + Duration::from_millis(350)).is_none());
        let released = debouncer.poll(start + Duration::from_millis(500)).unwrap();
        assert_eq!(released.numeric(), Some(2.0));
    }

    #[test]
    fn test_cancel() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(Duration::from_millis(300));
        debouncer.observe(reading(1), start);
        debouncer.cancel();
        assert!(debouncer.poll(start + Duration::from_secs(1)).is_none());
    }
}
