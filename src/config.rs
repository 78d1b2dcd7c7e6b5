// Sensorstream - Realtime sensor ingestion and decimation
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Configuration types for the stream pipeline.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::decimation::Algorithm;
use crate::error::{ConfigError, Result};

/// Stream-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Maximum readings kept per sensor (default: 200).
    pub buffer_capacity: usize,

    /// Period of the batch flush timer in milliseconds (default: 500).
    pub flush_interval_ms: u64,

    /// Quiet period before the latest reading is published (default: 300).
    pub throttle_interval_ms: u64,

    /// Chart decimation settings.
    pub decimation: DecimationConfig,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 200,
            flush_interval_ms: 500,
            throttle_interval_ms: 300,
            decimation: DecimationConfig::default(),
        }
    }
}

impl StreamConfig {
    /// Create a configuration with a custom buffer capacity
    pub fn with_buffer_capacity(buffer_capacity: usize) -> Self {
        Self {
            buffer_capacity,
            ..Default::default()
        }
    }

    /// Create a configuration with custom timer periods
    pub fn with_intervals(flush_interval_ms: u64, throttle_interval_ms: u64) -> Self {
        Self {
            flush_interval_ms,
            throttle_interval_ms,
            ..Default::default()
        }
    }

    /// Flush period as a [`Duration`].
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    /// Debounce window as a [`Duration`].
    pub fn throttle_interval(&self) -> Duration {
        Duration::from_millis(self.throttle_interval_ms)
    }

    /// Check every option is usable.
    pub fn validate(&self) -> Result<()> {
        if self.buffer_capacity == 0 {
            return Err(invalid("buffer_capacity", "must be greater than zero"));
        }
        if self.flush_interval_ms == 0 {
            return Err(invalid("flush_interval_ms", "must be greater than zero"));
        }
        if self.throttle_interval_ms == 0 {
            return Err(invalid("throttle_interval_ms", "must be greater than zero"));
        }
        self.decimation.validate()
    }

    /// Parse and validate a JSON configuration. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_json(&text)
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Chart decimation configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecimationConfig {
    /// Series longer than this are decimated before charting (default: 150).
    pub threshold: usize,

    /// Number of points kept after decimation (default: 100).
    pub target_size: usize,

    /// Algorithm selection (default: auto).
    pub algorithm: Algorithm,

    /// Coefficient of variation above which auto mode picks LTTB (default: 0.3).
    pub variance_threshold: f64,
}

impl Default for DecimationConfig {
    fn default() -> Self {
        Self {
            threshold: 150,
            target_size: 100,
            algorithm: Algorithm::Auto,
            variance_threshold: 0.3,
        }
    }
}

impl DecimationConfig {
    /// Create a configuration forcing one algorithm
    pub fn with_algorithm(algorithm: Algorithm) -> Self {
        Self {
            algorithm,
            ..Default::default()
        }
    }

    /// Create a configuration with a custom target size
    pub fn with_target_size(target_size: usize) -> Self {
        Self {
            target_size,
            ..Default::default()
        }
    }

    /// Check every option is usable.
    pub fn validate(&self) -> Result<()> {
        if self.target_size == 0 {
            return Err(invalid("decimation.target_size", "must be greater than zero"));
        }
        if self.threshold < self.target_size {
            return Err(invalid(
                "decimation.threshold",
                format!("{} is below target_size {}", self.threshold, self.target_size),
            ));
        }
        if !self.variance_threshold.is_finite() || self.variance_threshold < 0.0 {
            return Err(invalid(
                "decimation.variance_threshold",
                format!("{} is not a finite non-negative number", self.variance_threshold),
            ));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> crate::error::StreamError {
    ConfigError::InvalidValue {
        field,
        reason: reason.into(),
    }
    .into()
}
