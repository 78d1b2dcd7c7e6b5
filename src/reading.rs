//! Reading types
//!
//! [`RawReading`] is the only untyped value in the crate: whatever a transport
//! delivers. [`Reading`] is the validated record everything downstream of the
//! [`Normalizer`](crate::normalizer::Normalizer) works with.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Payload as delivered by a transport, before normalization
#[derive(Debug, Clone, PartialEq)]
pub enum RawReading {
    /// Already decoded payload
    Json(Value),
    /// Undecoded text frame
    Text(String),
}

impl RawReading {
    /// Decode into a JSON value. Text that is not valid JSON is kept as a
    /// JSON string so the normalizer can still report it.
    pub fn into_value(self) -> Value {
        match self {
            RawReading::Json(value) => value,
            RawReading::Text(text) => {
                serde_json::from_str(&text).unwrap_or(Value::String(text))
            }
        }
    }
}

impl From<Value> for RawReading {
    fn from(value: Value) -> Self {
        RawReading::Json(value)
    }
}

impl From<String> for RawReading {
    fn from(text: String) -> Self {
        RawReading::Text(text)
    }
}

impl From<&str> for RawReading {
    fn from(text: &str) -> Self {
        RawReading::Text(text.to_string())
    }
}

/// Measured quantity
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReadingValue {
    /// Binary sensor state (limit switches)
    Bool(bool),
    /// Analog measurement
    Number(f64),
}

impl ReadingValue {
    /// Numeric view; booleans map to 0.0 / 1.0
    pub fn as_f64(&self) -> f64 {
        match *self {
            ReadingValue::Bool(true) => 1.0,
            ReadingValue::Bool(false) => 0.0,
            ReadingValue::Number(n) => n,
        }
    }

    /// Whether this comes from a binary sensor
    pub fn is_binary(&self) -> bool {
        matches!(self, ReadingValue::Bool(_))
    }
}

impl From<f64> for ReadingValue {
    fn from(value: f64) -> Self {
        ReadingValue::Number(value)
    }
}

impl From<bool> for ReadingValue {
    fn from(value: bool) -> Self {
        ReadingValue::Bool(value)
    }
}

/// How much of a reading came from the payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingQuality {
    /// Sensor id and value were found in the payload
    #[default]
    Exact,
    /// Payload was an object but the sensor id or value had to be guessed
    BestEffort,
    /// Payload was not an object at all
    Sentinel,
}

/// A normalized, timestamped sensor measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    /// Dedup key supplied by the source, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Originating sensor, never empty
    pub sensor_id: String,
    /// Measured value; `None` when the payload carried nothing usable
    pub value: Option<ReadingValue>,
    /// Capture time, RFC 3339 UTC
    pub timestamp: String,
    /// Confidence of the normalization
    #[serde(default)]
    pub quality: ReadingQuality,
    /// Original payload, kept for best-effort and sentinel readings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<Value>,
}

impl Reading {
    /// Create an exact reading
    pub fn new(
        sensor_id: impl Into<String>,
        value: impl Into<ReadingValue>,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            sensor_id: sensor_id.into(),
            value: Some(value.into()),
            timestamp: timestamp.into(),
            quality: ReadingQuality::Exact,
            raw: None,
        }
    }

    /// Builder: attach a dedup id
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Record returned for payloads that are not objects
    pub fn sentinel(now: DateTime<Utc>, raw: Value) -> Self {
        Self {
            id: None,
            sensor_id: crate::UNKNOWN_SENSOR.to_string(),
            value: Some(ReadingValue::Number(0.0)),
            timestamp: format_timestamp(now),
            quality: ReadingQuality::Sentinel,
            raw: Some(raw),
        }
    }

    /// Numeric value, if any
    pub fn numeric(&self) -> Option<f64> {
        self.value.map(|v| v.as_f64())
    }

    /// Parsed capture time
    pub fn parsed_timestamp(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.timestamp)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Buffer dedup rule: same id when both carry one, otherwise same sensor
    /// and same timestamp.
    pub fn is_duplicate_of(&self, other: &Reading) -> bool {
        match (&self.id, &other.id) {
            (Some(a), Some(b)) => a == b,
            _ => self.sensor_id == other.sensor_id && self.timestamp == other.timestamp,
        }
    }
}

/// Canonical timestamp text: RFC 3339, UTC, millisecond precision
pub fn format_timestamp(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
