//! Pause/resume gate
//!
//! A shared flag that stops readings from reaching the buffers without
//! tearing down the transport. Nothing seen while paused is replayed on
//! resume.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cloneable handle to one stream's pause flag
#[derive(Debug, Clone, Default)]
pub struct PauseGate {
    paused: Arc<AtomicBool>,
}

impl PauseGate {
    /// Create an open (not paused) gate
    pub fn new() -> Self {
        Self::default()
    }

    /// Engage the gate. Idempotent; returns whether the state changed.
    pub fn pause(&self) -> bool {
        !self.paused.swap(true, Ordering::SeqCst)
    }

    /// Release the gate. Idempotent; returns whether the state changed.
    pub fn resume(&self) -> bool {
        self.paused.swap(false, Ordering::SeqCst)
    }

    /// Whether the gate is engaged
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Whether readings may pass
    pub fn is_open(&self) -> bool {
        !self.is_paused()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_open() {
        let gate = PauseGate::new();
        assert!(gate.is_open());
        assert!(!gate.is_paused());
    }

    #[test]
    fn test_pause_resume_idempotent() {
        let gate = PauseGate::new();
        assert!(gate.pause());
        assert!(!gate.pause());
        assert!(gate.is_paused());
        assert!(gate.resume());
        assert!(!gate.resume());
        assert!(gate.is_open());
    }

    #[test]
    fn test_clones_share_state() {
        let gate = PauseGate::new();
        let handle = gate.clone();
        handle.pause();
        assert!(gate.is_paused());
    }
}
