// Sensorstream - Realtime sensor ingestion and decimation
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Pending batch and the flush step
//!
//! Normalized readings are queued in a [`PendingBatch`] as they arrive and
//! applied to the [`StreamBuffer`] all at once by [`flush`], so consumers see
//! one change per flush period however fast readings arrive.

use crate::buffer::StreamBuffer;
use crate::gate::PauseGate;
use crate::reading::Reading;

/// Readings waiting for the next flush, in arrival order
#[derive(Debug, Clone, Default)]
pub struct PendingBatch {
    readings: Vec<Reading>,
}

impl PendingBatch {
    /// Create an empty batch
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reading
    pub fn push(&mut self, reading: Reading) {
        self.readings.push(reading);
    }

    /// Take every queued reading, leaving the batch empty
    pub fn take(&mut self) -> Vec<Reading> {
        std::mem::take(&mut self.readings)
    }

    /// Drop every queued reading, returning how many were dropped
    pub fn discard(&mut self) -> usize {
        let count = self.readings.len();
        self.readings.clear();
        count
    }

    /// Number of queued readings
    pub fn len(&self) -> usize {
        self.readings.len()
    }

    /// Check if nothing is queued
    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}

/// What a flush did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was queued; no notification is due
    Empty,
    /// The gate was engaged; the queued readings were dropped
    Dropped { count: usize },
    /// The queued readings were applied; exactly one notification is due
    Applied(FlushReport),
}

impl FlushOutcome {
    /// Whether consumers must be notified
    pub fn should_notify(&self) -> bool {
        matches!(self, FlushOutcome::Applied(_))
    }
}

/// Counts from an applied flush
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlushReport {
    /// Readings taken from the batch
    pub flushed: usize,
    /// Readings stored in a buffer
    pub appended: usize,
    /// Readings skipped as tail duplicates
    pub duplicates: usize,
    /// Readings evicted by capacity trims
    pub evicted: usize,
}

/// Apply the pending batch to the buffers in FIFO order and clear it.
///
/// Callers must hold both `pending` and `buffer` for the whole call so the
/// batch becomes visible all together.
pub fn flush(pending: &mut PendingBatch, buffer: &mut StreamBuffer, gate: &PauseGate) -> FlushOutcome {
    if pending.is_empty() {
        return FlushOutcome::Empty;
    }

    if gate.is_paused() {
        let count = pending.discard();
        log::debug!("Stream paused, dropped {} pending readings", count);
        return FlushOutcome::Dropped { count };
    }

    let mut report = FlushReport::default();
    for reading in pending.take() {
        report.flushed += 1;
        let outcome = buffer.push(reading);
        if outcome.is_appended() {
            report.appended += 1;
        } else {
            report.duplicates += 1;
        }
        report.evicted += outcome.evicted();
    }

    log::trace!(
        "Flushed {} readings ({} appended, {} duplicates, {} evicted)",
        report.flushed,
        report.appended,
        report.duplicates,
        report.evicted
    );
    FlushOutcome::Applied(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(sensor: &str, n: usize) -> Reading {
        Reading::new(sensor, n as f64, format!("2024-05-01T12:00:00.{:03}Z", n))
    }

    #[test]
    fn test_empty_flush() {
        let mut pending = PendingBatch::new();
        let mut buffer = StreamBuffer::new(10);
        let outcome = flush(&mut pending, &mut buffer, &PauseGate::new());
        assert_eq!(outcome, FlushOutcome::Empty);
        assert!(!outcome.should_notify());
    }

    #[test]
    fn test_flush_applies_in_order_and_clears() {
        let mut pending = PendingBatch::new();
        let mut buffer = StreamBuffer::new(10);
        for i in 0..4 {
            pending.push(reading("s1", i));
        }

        let outcome = flush(&mut pending, &mut buffer, &PauseGate::new());
        assert!(outcome.should_notify());
        assert!(pending.is_empty());

        let values: Vec<f64> = buffer
            .snapshot("s1")
            .iter()
            .filter_map(Reading::numeric)
            .collect();
        assert_eq!(values, vec![0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_flush_report_counts() {
        let mut pending = PendingBatch::new();
        let mut buffer = StreamBuffer::new(2);
        pending.push(reading("s1", 1));
        pending.push(reading("s1", 1));
        pending.push(reading("s1", 2));
        pending.push(reading("s1", 3));

        match flush(&mut pending, &mut buffer, &PauseGate::new()) {
            FlushOutcome::Applied(report) => {
                assert_eq!(report.flushed, 4);
                assert_eq!(report.appended, 3);
                assert_eq!(report.duplicates, 1);
                assert_eq!(report.evicted, 1);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_paused_flush_drops() {
        let mut pending = PendingBatch::new();
        let mut buffer = StreamBuffer::new(10);
        let gate = PauseGate::new();
        pending.push(reading("s1", 1));
        pending.push(reading("s1", 2));
        gate.pause();

        let outcome = flush(&mut pending, &mut buffer, &gate);
        assert_eq!(outcome, FlushOutcome::Dropped { count: 2 });
        assert!(pending.is_empty());
        assert!(buffer.get("s1").is_none());

        // nothing comes back on resume
        gate.resume();
        assert_eq!(flush(&mut pending, &mut buffer, &gate), FlushOutcome::Empty);
    }
}
