//! Pipeline metrics
//!
//! Counters for what happened to readings between the transport and the
//! buffers. The session keeps one [`StreamMetrics`] and hands out copies.

use serde::Serialize;

use crate::batch::{FlushOutcome, FlushReport};
use crate::reading::ReadingQuality;

/// Pipeline statistics collector
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StreamMetrics {
    /// Readings delivered by the transport or `on_reading`
    pub received: u64,
    /// Normalizations that had to guess the sensor id or value
    pub best_effort: u64,
    /// Payloads that were not objects
    pub sentinel: u64,
    /// Readings refused because the gate was engaged
    pub rejected_paused: u64,
    /// Readings skipped as tail duplicates at flush
    pub duplicates: u64,
    /// Readings evicted by capacity trims
    pub evicted: u64,
    /// Flushes that applied at least one reading
    pub flushes: u64,
    /// Readings appended to a buffer
    pub applied: u64,
    /// Pending readings dropped at flush because the gate was engaged
    pub dropped_at_flush: u64,
}

impl StreamMetrics {
    /// Create an empty collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a reading arriving, with its normalization quality
    pub fn record_received(&mut self, quality: ReadingQuality) {
        self.received += 1;
        match quality {
            ReadingQuality::Exact => {}
            ReadingQuality::BestEffort => self.best_effort += 1,
            ReadingQuality::Sentinel => self.sentinel += 1,
        }
    }

    /// Record a reading refused at the gate
    pub fn record_rejected(&mut self) {
        self.rejected_paused += 1;
    }

    /// Record the outcome of a flush
    pub fn record_flush(&mut self, outcome: &FlushOutcome) {
        match outcome {
            FlushOutcome::Empty => {}
            FlushOutcome::Dropped { count } => self.dropped_at_flush += *count as u64,
            FlushOutcome::Applied(report) => self.record_report(report),
        }
    }

    fn record_report(&mut self, report: &FlushReport) {
        self.flushes += 1;
        self.applied += report.appended as u64;
        self.duplicates += report.duplicates as u64;
        self.evicted += report.evicted as u64;
    }

    /// Share of received readings that needed a fallback (0.0 - 1.0)
    pub fn degraded_ratio(&self) -> f64 {
        if self.received == 0 {
            return 0.0;
        }
        (self.best_effort + self.sentinel) as f64 / self.received as f64
    }

    /// Average readings applied per flush
    pub fn average_batch_size(&self) -> f64 {
        if self.flushes == 0 {
            return 0.0;
        }
        self.applied as f64 / self.flushes as f64
    }

    /// Reset all counters
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Generate a human-readable report
    pub fn report(&self) -> String {
        let mut report = String::new();

        report.push_str("=== Sensorstream Pipeline Metrics ===\n\n");

        report.push_str(&format!("Readings received: {}\n", self.received));
        report.push_str(&format!(
            "  best-effort: {}, sentinel: {} ({:.1}% degraded)\n",
            self.best_effort,
            self.sentinel,
            self.degraded_ratio() * 100.0
        ));
        report.push_str(&format!("Rejected while paused: {}\n", self.rejected_paused));
        report.push_str(&format!("Dropped at flush: {}\n\n", self.dropped_at_flush));

        report.push_str(&format!("Flushes: {}\n", self.flushes));
        report.push_str(&format!("Readings applied: {}\n", self.applied));
        report.push_str(&format!(
            "Average batch: {:.1} readings\n",
            self.average_batch_size()
        ));
        report.push_str(&format!("Duplicates skipped: {}\n", self.duplicates));
        report.push_str(&format!("Evicted by capacity: {}\n", self.evicted));

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_received_by_quality() {
        let mut metrics = StreamMetrics::new();
        metrics.record_received(ReadingQuality::Exact);
        metrics.record_received(ReadingQuality::BestEffort);
        metrics.record_received(ReadingQuality::Sentinel);
        metrics.record_received(ReadingQuality::Exact);

        assert_eq!(metrics.received, 4);
        assert_eq!(metrics.best_effort, 1);
        assert_eq!(metrics.sentinel, 1);
        assert!((metrics.degraded_ratio() - 0.5).abs() < 0.001);
    }

    #[test]
    fn test_flush_outcomes() {
        let mut metrics = StreamMetrics::new();
        metrics.record_flush(&FlushOutcome::Empty);
        metrics.record_flush(&FlushOutcome::Dropped { count: 3 });
        metrics.record_flush(&FlushOutcome::Applied(FlushReport {
            flushed: 5,
            appended: 4,
            duplicates: 1,
            evicted: 2,
        }));

        assert_eq!(metrics.flushes, 1);
        assert_eq!(metrics.applied, 4);
        assert_eq!(metrics.duplicates, 1);
        assert_eq!(metrics.evicted, 2);
        assert_eq!(metrics.dropped_at_flush, 3);
        assert!((metrics.average_batch_size() - 4.0).abs() < 0.001);
    }

    #[test]
    fn test_empty_ratios() {
        let metrics = StreamMetrics::new();
        assert_eq!(metrics.degraded_ratio(), 0.0);
        assert_eq!(metrics.average_batch_size(), 0.0);
    }

    #[test]
    fn test_report_and_reset() {
        let mut metrics = StreamMetrics::new();
        metrics.record_received(ReadingQuality::Exact);
        metrics.record_rejected();

        let report = metrics.report();
        assert!(report.contains("Readings received: 1"));
        assert!(report.contains("Rejected while paused: 1"));

        metrics.reset();
        assert_eq!(metrics, StreamMetrics::default());
    }
}
