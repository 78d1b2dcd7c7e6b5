// Sensorstream Exporter - Prometheus metrics definitions
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Prometheus metrics for sensorstream monitoring.
//!
//! Gauges mirror a [`StreamSession`]'s counters and per-sensor state; they are
//! refreshed on every scrape.

use lazy_static::lazy_static;
use prometheus::{register_gauge, register_gauge_vec, Encoder, Gauge, GaugeVec, TextEncoder};
use sensorstream::{AlertLevel, StreamMetrics, StreamSession};

lazy_static! {
    // ============================================================
    // Pipeline Metrics (from StreamMetrics)
    // ============================================================

    /// Readings by pipeline outcome.
    pub static ref PIPELINE_READINGS: GaugeVec = register_gauge_vec!(
        "sensorstream_pipeline_readings",
        "Readings per pipeline outcome since start",
        &["outcome"]
    ).unwrap();

    /// Flushes that applied at least one reading.
    pub static ref FLUSHES_TOTAL: Gauge = register_gauge!(
        "sensorstream_flushes_total",
        "Batch flushes that applied readings"
    ).unwrap();

    /// Flush generation seen by subscribers.
    pub static ref GENERATION: Gauge = register_gauge!(
        "sensorstream_generation",
        "Change generation (one increment per applied flush)"
    ).unwrap();

    // ============================================================
    // Session State
    // ============================================================

    /// Pause gate state.
    pub static ref PAUSED: Gauge = register_gauge!(
        "sensorstream_paused",
        "Whether the pause gate is engaged (0/1)"
    ).unwrap();

    /// Transport connection status.
    pub static ref CONNECTION_STATUS: Gauge = register_gauge!(
        "sensorstream_connection_status",
        "Connection status (0=disconnected, 1=connecting, 2=connected, 3=reconnecting, 4=error)"
    ).unwrap();

    // ============================================================
    // Per-sensor Metrics
    // ============================================================

    /// Readings currently buffered per sensor.
    pub static ref SENSOR_BUFFERED: GaugeVec = register_gauge_vec!(
        "sensorstream_sensor_buffered_readings",
        "Readings currently buffered per sensor",
        &["sensor"]
    ).unwrap();

    /// Newest buffered value per sensor.
    pub static ref SENSOR_LAST_VALUE: GaugeVec = register_gauge_vec!(
        "sensorstream_sensor_last_value",
        "Newest buffered value per sensor",
        &["sensor"]
    ).unwrap();

    /// Alert level of the newest value per sensor.
    pub static ref SENSOR_ALERT_LEVEL: GaugeVec = register_gauge_vec!(
        "sensorstream_sensor_alert_level",
        "Alert level of the newest value (0=normal, 1=alert, 2=failure)",
        &["sensor"]
    ).unwrap();

    // ============================================================
    // Exporter Metrics
    // ============================================================

    /// Current replay position (row index).
    pub static ref REPLAY_POSITION: Gauge = register_gauge!(
        "sensorstream_exporter_replay_position",
        "Current replay position (row index)"
    ).unwrap();

    /// Total rows in the replay dataset.
    pub static ref REPLAY_TOTAL_ROWS: Gauge = register_gauge!(
        "sensorstream_exporter_replay_total_rows",
        "Total rows in the replay dataset"
    ).unwrap();

    /// Replay speed multiplier.
    pub static ref REPLAY_SPEED: Gauge = register_gauge!(
        "sensorstream_exporter_replay_speed",
        "Replay speed multiplier"
    ).unwrap();
}

/// Numeric code of an alert level.
pub fn alert_code(level: AlertLevel) -> f64 {
    match level {
        AlertLevel::Normal => 0.0,
        AlertLevel::Alert => 1.0,
        AlertLevel::Failure => 2.0,
    }
}

/// Update pipeline gauges from a metrics snapshot.
pub fn update_pipeline_metrics(metrics: &StreamMetrics) {
    let outcomes = [
        ("received", metrics.received),
        ("best_effort", metrics.best_effort),
        ("sentinel", metrics.sentinel),
        ("rejected_paused", metrics.rejected_paused),
        ("duplicates", metrics.duplicates),
        ("evicted", metrics.evicted),
        ("applied", metrics.applied),
        ("dropped_at_flush", metrics.dropped_at_flush),
    ];
    for (outcome, count) in outcomes {
        PIPELINE_READINGS
            .with_label_values(&[outcome])
            .set(count as f64);
    }
    FLUSHES_TOTAL.set(metrics.flushes as f64);
}

/// Update every gauge from a session.
pub fn update_session_metrics(session: &StreamSession) {
    update_pipeline_metrics(&session.metrics());
    GENERATION.set(session.generation() as f64);
    PAUSED.set(if session.is_paused() { 1.0 } else { 0.0 });
    CONNECTION_STATUS.set(f64::from(session.status().code()));

    for sensor in session.sensor_ids() {
        let buffered = session.get_buffer(&sensor);
        SENSOR_BUFFERED
            .with_label_values(&[sensor.as_str()])
            .set(buffered.len() as f64);
        if let Some(value) = buffered.last().and_then(|r| r.numeric()) {
            SENSOR_LAST_VALUE.with_label_values(&[sensor.as_str()]).set(value);
        }
        if let Some(level) = session.alert(&sensor) {
            SENSOR_ALERT_LEVEL
                .with_label_values(&[sensor.as_str()])
                .set(alert_code(level));
        }
    }
}

/// Update replay position metrics.
pub fn update_replay_metrics(position: usize, total: usize, speed: f64) {
    REPLAY_POSITION.set(position as f64);
    REPLAY_TOTAL_ROWS.set(total as f64);
    REPLAY_SPEED.set(speed);
}

/// Encode all metrics to Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_alert_code() {
        assert_eq!(alert_code(AlertLevel::Normal), 0.0);
        assert_eq!(alert_code(AlertLevel::Alert), 1.0);
        assert_eq!(alert_code(AlertLevel::Failure), 2.0);
    }

    #[test]
    fn test_encode_metrics() {
        let session = StreamSession::default();
        session.on_reading(json!({"sensorId": "p1", "value": 0.5, "timestamp": 1000}));
        session.flush_now();
        update_session_metrics(&session);
        update_replay_metrics(3, 10, 2.0);

        let output = encode_metrics();
        assert!(output.contains("sensorstream_pipeline_readings"));
        assert!(output.contains("sensorstream_sensor_alert_level{sensor=\"p1\"} 2"));
        assert!(output.contains("sensorstream_exporter_replay_total_rows"));
    }
}
