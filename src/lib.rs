//! # Sensorstream - Realtime sensor ingestion and decimation
//!
//! Turns a noisy, bursty feed of sensor payloads into bounded per-sensor
//! histories that a UI can render without choking.
//!
//! ## Key Features
//!
//! - **Tolerant normalization**: payloads with any of the known field aliases
//!   become typed [`Reading`]s; malformed payloads degrade, never fail
//! - **Bounded buffers**: per-sensor, oldest-first, capacity 200 by default
//! - **Batched updates**: readings are applied every 500 ms with a single
//!   change notification per flush
//! - **Debounced latest value** for single-value displays
//! - **Chart decimation**: average-binning or LTTB, picked by the series'
//!   coefficient of variation
//! - **Pause/resume** without dropping the connection
//!
//! ## Quick Start
//!
//! ```rust
//! use sensorstream::{StreamConfig, StreamSession};
//! use serde_json::json;
//!
//! let session = StreamSession::new(StreamConfig::default()).unwrap();
//!
//! session.on_reading(json!({"sensorId": "p1", "valor": "3.8", "timestamp": "2024-05-01T12:00:00Z"}));
//! session.on_reading(json!({"idSensor": "p1", "medida": 3.9, "dataHora": "2024-05-01T12:00:01Z"}));
//! session.flush_now();
//!
//! let history = session.get_buffer("p1");
//! assert_eq!(history.len(), 2);
//! assert_eq!(history[1].numeric(), Some(3.9));
//! ```
//!
//! ## Modules
//!
//! - [`normalizer`]: Raw payload to [`Reading`]
//! - [`buffer`]: Bounded per-sensor buffers
//! - [`batch`]: Pending batch and flush
//! - [`throttle`]: Debounced latest reading
//! - [`gate`]: Pause/resume gate
//! - [`decimation`]: Average-binning and LTTB
//! - [`chart`]: Buffer to chart series
//! - [`alerts`]: Sensor catalog and alert levels
//! - [`session`]: The running pipeline

// Modules
pub mod alerts;
pub mod batch;
pub mod buffer;
pub mod chart;
pub mod config;
pub mod decimation;
pub mod error;
pub mod gate;
pub mod metrics;
pub mod normalizer;
pub mod reading;
pub mod session;
pub mod status;
pub mod throttle;
pub mod transport;

// Re-exports for convenient access
pub use alerts::{classify, classify_reading, AlertLevel, SensorCatalog, SensorInfo, SensorKind};
pub use batch::{FlushOutcome, FlushReport, PendingBatch};
pub use buffer::{PushOutcome, SensorBuffer, StreamBuffer};
pub use chart::ChartSeries;
pub use config::{DecimationConfig, StreamConfig};
pub use decimation::{decimate, Algorithm, DecimatedSeries, Decimator};
pub use error::{
    ConfigError, DecimationError, Result, SessionError, StreamError, TransportError,
};
pub use gate::PauseGate;
pub use metrics::StreamMetrics;
pub use normalizer::Normalizer;
pub use reading::{RawReading, Reading, ReadingQuality, ReadingValue};
pub use session::StreamSession;
pub use status::ConnectionStatus;
pub use throttle::Debouncer;
pub use transport::{ManualHandle, ManualTransport, Transport, TransportSink};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Sensor id given to readings whose source could not be identified
pub const UNKNOWN_SENSOR: &str = "unknown";

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_basic_pipeline() {
        let session = StreamSession::default();
        session.on_reading(json!({"sensorId": "t1", "value": 22.5}));
        session.on_reading("garbage");
        session.flush_now();

        assert_eq!(session.get_last("t1").unwrap().numeric(), Some(22.5));
        assert_eq!(session.get_buffer(UNKNOWN_SENSOR).len(), 1);
        assert_eq!(session.metrics().sentinel, 1);
    }
}
