// Sensorstream Exporter - Dataset replay transport
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! CSV dataset replay as a [`Transport`].
//!
//! The dataset has a `timestamp_ms` first column and one column per sensor id.
//! Every non-empty cell becomes one raw JSON payload, delivered at the
//! recorded cadence divided by the speed multiplier.

use crate::metrics::update_replay_metrics;
use sensorstream::{ConnectionStatus, Transport, TransportError, TransportSink};
use serde_json::json;
use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{yield_now, JoinHandle};
use tokio::time::sleep;
use tracing::{debug, info};

/// Configuration for dataset replay.
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    /// Path to CSV dataset file.
    pub csv_path: String,
    /// Replay speed multiplier (1.0 = real-time, 10.0 = 10x faster).
    pub speed: f64,
    /// Whether to loop the dataset.
    pub loop_replay: bool,
    /// Interval after the last row, in milliseconds.
    pub default_sample_interval_ms: u64,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            csv_path: String::new(),
            speed: 1.0,
            loop_replay: true,
            default_sample_interval_ms: 1_000,
        }
    }
}

/// Shared progress of a replay.
#[derive(Debug, Default)]
pub struct ReplayState {
    /// Next row to deliver.
    pub position: AtomicUsize,
    /// Rows in the dataset.
    pub total_samples: AtomicUsize,
    /// Completed passes over the dataset.
    pub loops: AtomicUsize,
    /// Whether the replay task is delivering.
    pub running: AtomicBool,
}

/// Dataset row for replay.
#[derive(Debug, Clone, PartialEq)]
struct DataRow {
    timestamp_ms: u64,
    values: Vec<Option<f64>>,
}

/// Parsed replay dataset.
#[derive(Debug, Clone)]
pub struct Dataset {
    sensor_ids: Vec<String>,
    rows: Vec<DataRow>,
}

impl Dataset {
    /// Load a dataset from a CSV file.
    pub fn from_csv(path: &Path) -> Result<Self, ReplayError> {
        if !path.exists() {
            return Err(ReplayError::FileNotFound(path.display().to_string()));
        }
        Self::from_reader(std::fs::File::open(path)?)
    }

    /// Load a dataset from any CSV source.
    pub fn from_reader<R: Read>(source: R) -> Result<Self, ReplayError> {
        let mut reader = csv::Reader::from_reader(source);

        let headers = reader.headers()?.clone();
        let header_strs: Vec<&str> = headers.iter().collect();
        if header_strs.is_empty() || header_strs[0].trim() != "timestamp_ms" {
            return Err(ReplayError::InvalidFormat(
                "First column must be 'timestamp_ms'".to_string(),
            ));
        }
        let sensor_ids: Vec<String> = header_strs[1..].iter().map(|s| s.trim().to_string()).collect();

        let mut rows = Vec::new();
        for (line, result) in reader.records().enumerate() {
            let record = result?;
            let mut fields = record.iter();
            let timestamp_ms: u64 = match fields.next() {
                Some(field) => field.trim().parse().map_err(|_| {
                    ReplayError::InvalidFormat(format!("Invalid timestamp on row {}", line + 1))
                })?,
                None => continue,
            };

            let values = (0..sensor_ids.len())
                .map(|_| {
                    fields
                        .next()
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .and_then(|s| s.parse().ok())
                })
                .collect();

            rows.push(DataRow {
                timestamp_ms,
                values,
            });
        }

        if rows.is_empty() {
            return Err(ReplayError::EmptyDataset);
        }
        Ok(Self { sensor_ids, rows })
    }

    /// Dataset summary.
    pub fn info(&self) -> DatasetInfo {
        let duration_ms = match (self.rows.first(), self.rows.last()) {
            (Some(first), Some(last)) => last.timestamp_ms.saturating_sub(first.timestamp_ms),
            _ => 0,
        };

        DatasetInfo {
            sensor_count: self.sensor_ids.len(),
            sample_count: self.rows.len(),
            duration_ms,
            sensor_ids: self.sensor_ids.clone(),
        }
    }

    /// Raw payloads of one row, shifted by `offset_ms`.
    fn payloads(&self, row: &DataRow, offset_ms: u64) -> Vec<serde_json::Value> {
        self.sensor_ids
            .iter()
            .zip(&row.values)
            .filter_map(|(sensor_id, value)| {
                value.map(|v| {
                    json!({
                        "sensorId": sensor_id,
                        "value": v,
                        "timestamp": row.timestamp_ms + offset_ms,
                    })
                })
            })
            .collect()
    }
}

/// Dataset information.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DatasetInfo {
    pub sensor_count: usize,
    pub sample_count: usize,
    pub duration_ms: u64,
    pub sensor_ids: Vec<String>,
}

/// Transport that replays a dataset into a session.
pub struct ReplayTransport {
    config: ReplayConfig,
    dataset: Arc<Dataset>,
    state: Arc<ReplayState>,
    task: Option<JoinHandle<()>>,
}

impl ReplayTransport {
    /// Load the dataset named by `config`.
    pub fn from_csv(config: ReplayConfig) -> Result<Self, ReplayError> {
        let dataset = Dataset::from_csv(Path::new(&config.csv_path))?;
        Ok(Self::new(config, dataset))
    }

    /// Replay an already loaded dataset.
    pub fn new(config: ReplayConfig, dataset: Dataset) -> Self {
        let state = Arc::new(ReplayState::default());
        state.total_samples.store(dataset.rows.len(), Ordering::SeqCst);

        let info = dataset.info();
        info!(
            "Loaded dataset: {} sensors, {} samples, {}ms span",
            info.sensor_count, info.sample_count, info.duration_ms
        );

        Self {
            config,
            dataset: Arc::new(dataset),
            state,
            task: None,
        }
    }

    /// Get the replay state.
    pub fn state(&self) -> Arc<ReplayState> {
        Arc::clone(&self.state)
    }

    /// Get dataset info.
    pub fn dataset_info(&self) -> DatasetInfo {
        self.dataset.info()
    }
}

impl Transport for ReplayTransport {
    fn connect(&mut self, sink: TransportSink) -> sensorstream::Result<()> {
        if self.task.is_some() {
            return Err(TransportError::AlreadyConnected.into());
        }
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|e| TransportError::ConnectFailed {
                reason: e.to_string(),
            })?;

        sink.on_status(ConnectionStatus::Connected);
        self.state.running.store(true, Ordering::SeqCst);
        self.task = Some(runtime.spawn(run_replay(
            self.config.clone(),
            Arc::clone(&self.dataset),
            Arc::clone(&self.state),
            sink,
        )));
        Ok(())
    }

    fn disconnect(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.state.running.store(false, Ordering::SeqCst);
    }
}

/// Deliver rows until the dataset ends (without looping) or the session stops.
async fn run_replay(
    config: ReplayConfig,
    dataset: Arc<Dataset>,
    state: Arc<ReplayState>,
    sink: TransportSink,
) {
    let rows = &dataset.rows;
    let pass_span_ms = dataset.info().duration_ms + config.default_sample_interval_ms;
    info!(
        "Starting replay: speed={}, loop={}",
        config.speed, config.loop_replay
    );

    loop {
        if !sink.is_open() {
            break;
        }

        let position = state.position.load(Ordering::SeqCst);
        if position >= rows.len() {
            if config.loop_replay {
                info!("Dataset complete, looping...");
                state.position.store(0, Ordering::SeqCst);
                state.loops.fetch_add(1, Ordering::SeqCst);
                continue;
            }
            info!("Dataset complete, stopping");
            sink.on_status(ConnectionStatus::Disconnected);
            break;
        }

        // later passes are shifted forward so timestamps keep increasing
        let offset_ms = state.loops.load(Ordering::SeqCst) as u64 * pass_span_ms;
        let row = &rows[position];
        debug!("Replaying row {} at timestamp {}", position, row.timestamp_ms);
        for payload in dataset.payloads(row, offset_ms) {
            sink.on_reading(payload);
        }

        state.position.fetch_add(1, Ordering::SeqCst);
        update_replay_metrics(position + 1, rows.len(), config.speed);

        let base_interval_ms = match rows.get(position + 1) {
            Some(next) => next.timestamp_ms.saturating_sub(row.timestamp_ms),
            None => config.default_sample_interval_ms,
        };
        let sleep_ms = (base_interval_ms as f64 / config.speed.max(f64::MIN_POSITIVE)) as u64;
        if sleep_ms > 0 {
            sleep(Duration::from_millis(sleep_ms)).await;
        } else {
            yield_now().await;
        }
    }

    state.running.store(false, Ordering::SeqCst);
}

/// Replay errors.
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Empty dataset")]
    EmptyDataset,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
