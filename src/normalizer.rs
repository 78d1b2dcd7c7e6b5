//! Reading normalization
//!
//! Backend payloads name the same field in several ways (`sensorId`,
//! `idSensor`, `sensor_id`, ...). Each canonical field is resolved by an
//! ordered list of [`FieldRule`]s, evaluated first-match-wins: a rule matches
//! when its field is present and its coercion accepts the value.
//!
//! Normalization never fails. Objects missing a usable sensor id or value
//! become [`ReadingQuality::BestEffort`] readings carrying the raw payload;
//! anything that is not an object becomes the
//! [`ReadingQuality::Sentinel`] reading.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde_json::{Map, Value};

use crate::alerts::SensorCatalog;
use crate::reading::{format_timestamp, RawReading, Reading, ReadingQuality, ReadingValue};

/// Converts a payload field into a typed value, `None` when unusable
pub type Coercion<T> = fn(&Value) -> Option<T>;

/// One extraction rule: a payload field and how to read it
#[derive(Debug, Clone)]
pub struct FieldRule<T> {
    /// Payload field name
    pub field: String,
    /// Coercion applied to the field
    pub coerce: Coercion<T>,
}

impl<T> FieldRule<T> {
    /// Create a rule
    pub fn new(field: impl Into<String>, coerce: Coercion<T>) -> Self {
        Self {
            field: field.into(),
            coerce,
        }
    }

    /// Apply the rule to a payload
    pub fn apply(&self, payload: &Map<String, Value>) -> Option<T> {
        payload.get(&self.field).and_then(self.coerce)
    }
}

/// Evaluate rules in order and return the first match.
pub fn resolve<T>(rules: &[FieldRule<T>], payload: &Map<String, Value>) -> Option<T> {
    rules.iter().find_map(|rule| rule.apply(payload))
}

/// Non-empty text; numbers are stringified.
pub fn coerce_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Booleans stay binary; numbers and numeric strings must be finite.
pub fn coerce_value(value: &Value) -> Option<ReadingValue> {
    match value {
        Value::Bool(b) => Some(ReadingValue::Bool(*b)),
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()).map(ReadingValue::Number),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(ReadingValue::Number),
        _ => None,
    }
}

/// RFC 3339, naive `YYYY-MM-DD[T ]HH:MM:SS[.fff]` (taken as UTC), or epoch
/// milliseconds.
pub fn coerce_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_timestamp_text(s.trim()),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    }
}

fn parse_timestamp_text(text: &str) -> Option<DateTime<Utc>> {
    if text.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    text.parse::<i64>()
        .ok()
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
}

fn rules<T>(fields: &[&str], coerce: Coercion<T>) -> Vec<FieldRule<T>> {
    fields.iter().map(|f| FieldRule::new(*f, coerce)).collect()
}

/// Turns raw payloads into [`Reading`]s
#[derive(Debug, Clone)]
pub struct Normalizer {
    id_rules: Vec<FieldRule<String>>,
    sensor_rules: Vec<FieldRule<String>>,
    value_rules: Vec<FieldRule<ReadingValue>>,
    timestamp_rules: Vec<FieldRule<DateTime<Utc>>>,
    catalog: SensorCatalog,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::with_catalog(SensorCatalog::default())
    }
}

impl Normalizer {
    /// Create a normalizer with the default field aliases and sensor catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a normalizer with the default field aliases and a custom catalog
    pub fn with_catalog(catalog: SensorCatalog) -> Self {
        Self {
            id_rules: rules(&["id", "codigo", "uuid"], coerce_text),
            sensor_rules: rules(
                &["sensorId", "idSensor", "sensor_id", "codigoSensor", "sensor"],
                coerce_text,
            ),
            value_rules: rules(
                &["value", "valor", "medida", "leitura", "measurement"],
                coerce_value,
            ),
            timestamp_rules: rules(
                &[
                    "timestamp",
                    "dataHora",
                    "data_hora",
                    "createdAt",
                    "time",
                    "ultimoHorario",
                    "ultimo_horario",
                    "criadoEm",
                ],
                coerce_timestamp,
            ),
            catalog,
        }
    }

    /// Builder: append a sensor id alias (lowest priority)
    pub fn with_sensor_field(mut self, field: &str) -> Self {
        self.sensor_rules.push(FieldRule::new(field, coerce_text));
        self
    }

    /// Builder: append a value alias (lowest priority)
    pub fn with_value_field(mut self, field: &str) -> Self {
        self.value_rules.push(FieldRule::new(field, coerce_value));
        self
    }

    /// Builder: append a timestamp alias (lowest priority)
    pub fn with_timestamp_field(mut self, field: &str) -> Self {
        self.timestamp_rules
            .push(FieldRule::new(field, coerce_timestamp));
        self
    }

    /// Sensor catalog used for sensor-specific value keys
    pub fn catalog(&self) -> &SensorCatalog {
        &self.catalog
    }

    /// Normalize against the current wall clock.
    pub fn normalize(&self, raw: impl Into<RawReading>) -> Reading {
        self.normalize_at(raw, Utc::now())
    }

    /// Normalize with an explicit "now", used for missing timestamps.
    pub fn normalize_at(&self, raw: impl Into<RawReading>, now: DateTime<Utc>) -> Reading {
        let object = match raw.into().into_value() {
            Value::Object(object) => object,
            other => {
                log::warn!("Non-object sensor payload, using sentinel reading: {}", other);
                return Reading::sentinel(now, other);
            }
        };

        let sensor_id = resolve(&self.sensor_rules, &object);
        let value = resolve(&self.value_rules, &object).or_else(|| {
            sensor_id
                .as_deref()
                .and_then(|id| self.sensor_specific_value(id, &object))
        });
        let timestamp = resolve(&self.timestamp_rules, &object).unwrap_or(now);
        let id = resolve(&self.id_rules, &object);

        let exact = sensor_id.is_some() && value.is_some();
        if !exact {
            log::debug!(
                "Incomplete sensor payload (sensor id: {:?}, value found: {}), keeping best-effort reading",
                sensor_id,
                value.is_some()
            );
        }

        // without a sensor id, readings are grouped by their source id
        let sensor_id = sensor_id
            .or_else(|| id.clone())
            .unwrap_or_else(|| crate::UNKNOWN_SENSOR.to_string());

        Reading {
            id,
            sensor_id,
            value,
            timestamp: format_timestamp(timestamp),
            quality: if exact {
                ReadingQuality::Exact
            } else {
                ReadingQuality::BestEffort
            },
            raw: if exact { None } else { Some(Value::Object(object)) },
        }
    }

    fn sensor_specific_value(
        &self,
        sensor_id: &str,
        object: &Map<String, Value>,
    ) -> Option<ReadingValue> {
        self.catalog.value_keys(sensor_id).iter().find_map(|key| {
            object
                .get(key)
                .and_then(coerce_value)
                .or_else(|| object.get(&key.to_lowercase()).and_then(coerce_value))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_canonical_payload() {
        let normalizer = Normalizer::new();
        let reading = normalizer.normalize_at(
            json!({"id": "r1", "sensorId": "t1", "value": 21.5, "timestamp": "2024-05-01T10:00:00Z"}),
            now(),
        );
        assert_eq!(reading.id.as_deref(), Some("r1"));
        assert_eq!(reading.sensor_id, "t1");
        assert_eq!(reading.value, Some(ReadingValue::Number(21.5)));
        assert_eq!(reading.timestamp, "2024-05-01T10:00:00.000Z");
        assert_eq!(reading.quality, ReadingQuality::Exact);
        assert!(reading.raw.is_none());
    }

    #[test]
    fn test_alias_priority() {
        let normalizer = Normalizer::new();
        let reading = normalizer.normalize_at(
            json!({"sensor_id": "low", "idSensor": "high", "medida": 1.0, "valor": 2.0}),
            now(),
        );
        assert_eq!(reading.sensor_id, "high");
        assert_eq!(reading.numeric(), Some(2.0));
    }

    #[test]
    fn test_invalid_value_falls_through_to_next_alias() {
        let normalizer = Normalizer::new();
        let reading = normalizer.normalize_at(
            json!({"sensorId": "p2", "value": "n/a", "valor": "3.2"}),
            now(),
        );
        assert_eq!(reading.numeric(), Some(3.2));
        assert_eq!(reading.quality, ReadingQuality::Exact);
    }

    #[test]
    fn test_portuguese_timestamp_fields() {
        let normalizer = Normalizer::new();
        let reading = normalizer.normalize_at(
            json!({"sensorId": "t1", "valor": 20, "data_hora": "2024-04-30 08:15:00"}),
            now(),
        );
        assert_eq!(reading.timestamp, "2024-04-30T08:15:00.000Z");

        let reading = normalizer.normalize_at(
            json!({"sensorId": "t1", "valor": 20, "createdAt": 1714557600000i64}),
            now(),
        );
        assert_eq!(reading.timestamp, "2024-05-01T10:00:00.000Z");
    }

    #[test]
    fn test_unparseable_timestamp_skipped() {
        let normalizer = Normalizer::new();
        let reading = normalizer.normalize_at(
            json!({"sensorId": "t1", "value": 1, "timestamp": "yesterday", "dataHora": "2024-04-30T08:00:00Z"}),
            now(),
        );
        assert_eq!(reading.timestamp, "2024-04-30T08:00:00.000Z");
    }

    #[test]
    fn test_missing_timestamp_defaults_to_now() {
        let normalizer = Normalizer::new();
        let reading = normalizer.normalize_at(json!({"sensorId": "t1", "value": 1}), now());
        assert_eq!(reading.timestamp, "2024-05-01T12:00:00.000Z");
    }

    #[test]
    fn test_boolean_value() {
        let normalizer = Normalizer::new();
        let reading = normalizer.normalize_at(json!({"sensorId": "l1", "value": true}), now());
        assert_eq!(reading.value, Some(ReadingValue::Bool(true)));
    }

    #[test]
    fn test_sensor_specific_key() {
        let normalizer = Normalizer::new();
        let reading = normalizer.normalize_at(
            json!({"sensorId": "p2", "pressao02_hx710b": 3.7}),
            now(),
        );
        assert_eq!(reading.numeric(), Some(3.7));

        // lower-case form of a camel-case key
        let reading = normalizer.normalize_at(json!({"sensorId": "vx", "vibracaox": 0.4}), now());
        assert_eq!(reading.numeric(), Some(0.4));
    }

    #[test]
    fn test_numeric_sensor_id_stringified() {
        let normalizer = Normalizer::new();
        let reading = normalizer.normalize_at(json!({"sensor_id": 7, "value": 1}), now());
        assert_eq!(reading.sensor_id, "7");
    }

    #[test]
    fn test_invalid_value_best_effort() {
        let normalizer = Normalizer::new();
        let payload = json!({"sensorId": "t1", "value": "broken"});
        let reading = normalizer.normalize_at(payload.clone(), now());
        assert_eq!(reading.sensor_id, "t1");
        assert_eq!(reading.value, None);
        assert_eq!(reading.quality, ReadingQuality::BestEffort);
        assert_eq!(reading.raw, Some(payload));
    }

    #[test]
    fn test_missing_sensor_id_best_effort() {
        let normalizer = Normalizer::new();
        let reading = normalizer.normalize_at(json!({"value": 4.2, "sensorId": ""}), now());
        assert_eq!(reading.sensor_id, "unknown");
        assert_eq!(reading.numeric(), Some(4.2));
        assert_eq!(reading.quality, ReadingQuality::BestEffort);
    }

    #[test]
    fn test_missing_sensor_id_uses_payload_id() {
        let normalizer = Normalizer::new();
        let reading = normalizer.normalize_at(json!({"id": 42, "valor": 1.5}), now());
        assert_eq!(reading.sensor_id, "42");
        assert_eq!(reading.id.as_deref(), Some("42"));
        assert_eq!(reading.numeric(), Some(1.5));
        assert_eq!(reading.quality, ReadingQuality::BestEffort);
    }

    #[test]
    fn test_non_object_sentinel() {
        let normalizer = Normalizer::new();
        for payload in [json!(null), json!(12), json!([1, 2]), json!("text")] {
            let reading = normalizer.normalize_at(payload, now());
            assert_eq!(reading.sensor_id, "unknown");
            assert_eq!(reading.numeric(), Some(0.0));
            assert_eq!(reading.timestamp, "2024-05-01T12:00:00.000Z");
            assert_eq!(reading.quality, ReadingQuality::Sentinel);
        }
    }

    #[test]
    fn test_text_frame() {
        let normalizer = Normalizer::new();
        let reading = normalizer.normalize_at(r#"{"sensorId": "vel", "value": "1.25"}"#, now());
        assert_eq!(reading.sensor_id, "vel");
        assert_eq!(reading.numeric(), Some(1.25));

        let reading = normalizer.normalize_at("garbage", now());
        assert_eq!(reading.quality, ReadingQuality::Sentinel);
    }

    #[test]
    fn test_custom_alias() {
        let normalizer = Normalizer::new().with_value_field("reading");
        let reading = normalizer.normalize_at(json!({"sensorId": "x", "reading": 9}), now());
        assert_eq!(reading.numeric(), Some(9.0));
    }

    #[test]
    fn test_non_finite_string_rejected() {
        assert_eq!(coerce_value(&json!("NaN")), None);
        assert_eq!(coerce_value(&json!("inf")), None);
        assert_eq!(coerce_value(&json!(" 12 ")), Some(ReadingValue::Number(12.0)));
    }
}
