//! Buffer snapshot to chart series
//!
//! Charts want plain `f64` points with short time labels. Long series are
//! decimated once they exceed the configured threshold.

use serde::Serialize;

use crate::alerts::{classify_reading, AlertLevel, SensorCatalog};
use crate::config::DecimationConfig;
use crate::decimation::{select_algorithm, Algorithm, Decimator};
use crate::reading::Reading;

/// Points ready for drawing
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ChartSeries {
    /// `HH:MM:SS` UTC labels, one per value
    pub labels: Vec<String>,
    pub values: Vec<f64>,
    /// Points before decimation
    pub source_len: usize,
    /// Algorithm applied, `None` when the series was short enough
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decimated_with: Option<Algorithm>,
}

impl ChartSeries {
    /// Build a series from readings in any order.
    ///
    /// Readings are sorted oldest first; readings without a value are
    /// skipped. The series is decimated only when more than
    /// `config.threshold` points remain.
    pub fn from_readings(readings: &[Reading], config: &DecimationConfig) -> Self {
        let mut sorted: Vec<&Reading> = readings.iter().filter(|r| r.value.is_some()).collect();
        // unparseable timestamps go last, in string order
        sorted.sort_by_cached_key(|r| {
            let parsed = r.parsed_timestamp();
            (parsed.is_none(), parsed, r.timestamp.clone())
        });

        let mut labels = Vec::with_capacity(sorted.len());
        let mut values = Vec::with_capacity(sorted.len());
        for reading in sorted {
            if let Some(value) = reading.numeric() {
                labels.push(time_label(reading));
                values.push(value);
            }
        }

        let source_len = values.len();
        let decimator = Decimator::new(config.clone());
        if !decimator.should_decimate(source_len) {
            return Self {
                labels,
                values,
                source_len,
                decimated_with: None,
            };
        }

        let algorithm = select_algorithm(&values, config.algorithm, config.variance_threshold);
        let series = decimator.decimate(&values, &labels);
        log::trace!(
            "Decimated {} points to {} with {}",
            source_len,
            series.values.len(),
            algorithm
        );
        Self {
            labels: series.labels,
            values: series.values,
            source_len,
            decimated_with: Some(algorithm),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Whether decimation was applied
    pub fn is_decimated(&self) -> bool {
        self.decimated_with.is_some()
    }
}

/// `HH:MM:SS` in UTC, or the raw timestamp when it does not parse
fn time_label(reading: &Reading) -> String {
    reading
        .parsed_timestamp()
        .map(|ts| ts.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| reading.timestamp.clone())
}

/// Alert level of the newest reading that carries a value
pub fn last_alert(readings: &[Reading], catalog: &SensorCatalog) -> Option<AlertLevel> {
    readings
        .iter()
        .rev()
        .find(|r| r.value.is_some())
        .and_then(|r| classify_reading(catalog, r))
}
