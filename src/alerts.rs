// Sensorstream - Realtime sensor ingestion and decimation
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Sensor catalog and alert classification
//!
//! The catalog maps frontend sensor ids to the backend keys their values may
//! arrive under, and tells the classifier which reference ranges apply.

use serde::{Deserialize, Serialize};

use crate::reading::{Reading, ReadingValue};

/// Physical quantity measured by a sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    /// Pneumatic pressure (Pa)
    Pressure,
    /// Temperature (°C)
    Temperature,
    /// Vibration per axis
    Vibration,
    /// Actuator speed (m/s)
    Velocity,
    /// End-of-travel switch
    LimitSwitch,
    /// Unknown quantity
    Other,
}

impl SensorKind {
    /// Guess the kind of an uncatalogued sensor from its unit.
    pub fn from_unit(unit: &str) -> Self {
        let unit = unit.trim().to_lowercase();
        if unit.contains("bar") || unit.contains("pa") {
            SensorKind::Pressure
        } else if unit.contains("°c") || unit == "c" {
            SensorKind::Temperature
        } else if unit.contains("mm/s") {
            SensorKind::Vibration
        } else if unit == "m/s" {
            SensorKind::Velocity
        } else {
            SensorKind::Other
        }
    }
}

/// Catalog entry for one sensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorInfo {
    /// Frontend sensor id (`p2`, `t1`, ...)
    pub sensor_id: String,
    /// Canonical backend key
    pub key: String,
    /// Human readable title
    pub title: String,
    /// Unit of measure
    pub unit: Option<String>,
    /// Physical quantity
    pub kind: SensorKind,
    /// Payload keys the value may arrive under, in priority order
    pub value_keys: Vec<String>,
}

impl SensorInfo {
    /// Create a catalog entry
    pub fn new(
        sensor_id: &str,
        key: &str,
        title: &str,
        unit: Option<&str>,
        kind: SensorKind,
        value_keys: &[&str],
    ) -> Self {
        Self {
            sensor_id: sensor_id.to_string(),
            key: key.to_string(),
            title: title.to_string(),
            unit: unit.map(str::to_string),
            kind,
            value_keys: value_keys.iter().map(|k| k.to_string()).collect(),
        }
    }
}

/// Known sensors, keyed by frontend id
#[derive(Debug, Clone, PartialEq)]
pub struct SensorCatalog {
    sensors: Vec<SensorInfo>,
}

impl Default for SensorCatalog {
    /// The test bench's actuator instrumentation.
    fn default() -> Self {
        use SensorKind::*;
        Self {
            sensors: vec![
                SensorInfo::new(
                    "p1",
                    "pressao01_xgzp701db1r",
                    "Pressure XGZP701DB1R",
                    Some("Pa"),
                    Pressure,
                    &["pressao01_xgzp701db1r", "pressao"],
                ),
                SensorInfo::new(
                    "p2",
                    "pressao02_hx710b",
                    "Pressure HX710B",
                    Some("Pa"),
                    Pressure,
                    &["pressao02_hx710b", "pressao"],
                ),
                SensorInfo::new(
                    "t1",
                    "temperatura_ds18b20",
                    "Temperature DS18B20",
                    Some("°C"),
                    Temperature,
                    &["temperatura_ds18b20", "temperatura", "temp"],
                ),
                SensorInfo::new(
                    "vx",
                    "vibracao_vib_x",
                    "Vibration X",
                    Some("g"),
                    Vibration,
                    &["vibracao_vib_x", "vibracaoX", "vibracao_x", "vib_x"],
                ),
                SensorInfo::new(
                    "vy",
                    "vibracao_vib_y",
                    "Vibration Y",
                    Some("g"),
                    Vibration,
                    &["vibracao_vib_y", "vibracaoY", "vibracao_y", "vib_y"],
                ),
                SensorInfo::new(
                    "vz",
                    "vibracao_vib_z",
                    "Vibration Z",
                    Some("g"),
                    Vibration,
                    &["vibracao_vib_z", "vibracaoZ", "vibracao_z", "vib_z"],
                ),
                SensorInfo::new(
                    "vel",
                    "velocidade_m_s",
                    "Velocity",
                    Some("m/s"),
                    Velocity,
                    &["velocidade_m_s", "velocidade"],
                ),
                SensorInfo::new(
                    "l1",
                    "chave_fim_de_curso",
                    "Limit switch",
                    None,
                    LimitSwitch,
                    &["chave_fim_de_curso", "ativo", "limit_switch"],
                ),
            ],
        }
    }
}

impl SensorCatalog {
    /// Empty catalog
    pub fn empty() -> Self {
        Self {
            sensors: Vec::new(),
        }
    }

    /// Add or replace an entry
    pub fn register(&mut self, info: SensorInfo) {
        match self
            .sensors
            .iter_mut()
            .find(|s| s.sensor_id == info.sensor_id)
        {
            Some(existing) => *existing = info,
            None => self.sensors.push(info),
        }
    }

    /// Look up by frontend sensor id
    pub fn get(&self, sensor_id: &str) -> Option<&SensorInfo> {
        self.sensors.iter().find(|s| s.sensor_id == sensor_id)
    }

    /// Look up by backend key
    pub fn by_key(&self, key: &str) -> Option<&SensorInfo> {
        self.sensors.iter().find(|s| s.key == key)
    }

    /// Payload keys registered for a sensor
    pub fn value_keys(&self, sensor_id: &str) -> &[String] {
        self.get(sensor_id)
            .map(|s| s.value_keys.as_slice())
            .unwrap_or(&[])
    }

    /// Kind of a sensor, [`SensorKind::Other`] when unknown
    pub fn kind_of(&self, sensor_id: &str) -> SensorKind {
        self.get(sensor_id)
            .map(|s| s.kind)
            .unwrap_or(SensorKind::Other)
    }

    /// Iterate over entries
    pub fn iter(&self) -> impl Iterator<Item = &SensorInfo> {
        self.sensors.iter()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    /// Whether the catalog has no entries
    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }
}

/// Operating condition derived from a value
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    /// Within the reference range
    Normal,
    /// Degraded operation
    Alert,
    /// Failure condition
    Failure,
}

impl AlertLevel {
    /// Short status text for dashboards
    pub fn status_text(&self) -> &'static str {
        match self {
            AlertLevel::Normal => "Normal operation",
            AlertLevel::Alert => "Operating at limit",
            AlertLevel::Failure => "Operating with failure",
        }
    }
}

/// Classification of a pressure value (Pa)
pub fn classify_pressure(value: f64) -> AlertLevel {
    if (3.0..=4.5).contains(&value) {
        AlertLevel::Normal
    } else if (1.0..=2.9).contains(&value) {
        AlertLevel::Alert
    } else if (0.0..=0.99).contains(&value) {
        AlertLevel::Failure
    } else {
        // outside the reference bands, including above 4.5
        AlertLevel::Normal
    }
}

/// Classification of a temperature value (°C)
pub fn classify_temperature(value: f64) -> AlertLevel {
    if (-20.0..=80.0).contains(&value) {
        AlertLevel::Normal
    } else if (-39.0..-20.0).contains(&value) || (value > 80.0 && value <= 99.0) {
        AlertLevel::Alert
    } else if value < -40.0 || (100.0..=150.0).contains(&value) {
        AlertLevel::Failure
    } else {
        AlertLevel::Alert
    }
}

/// Classification of a vibration value, ISO 10816 zones
pub fn classify_vibration(value: f64) -> AlertLevel {
    if (0.0..=2.7).contains(&value) {
        AlertLevel::Normal
    } else if (2.8..=7.1).contains(&value) {
        AlertLevel::Alert
    } else if value > 7.1 {
        AlertLevel::Failure
    } else {
        AlertLevel::Alert
    }
}

/// Classify a value for a given sensor kind.
pub fn classify(kind: SensorKind, value: ReadingValue) -> AlertLevel {
    match kind {
        SensorKind::Pressure => classify_pressure(value.as_f64()),
        SensorKind::Temperature => classify_temperature(value.as_f64()),
        SensorKind::Vibration => classify_vibration(value.as_f64()),
        SensorKind::LimitSwitch => {
            if value.as_f64() == 1.0 {
                AlertLevel::Normal
            } else {
                AlertLevel::Alert
            }
        }
        SensorKind::Velocity | SensorKind::Other => {
            let v = value.as_f64();
            if v >= 80.0 {
                AlertLevel::Failure
            } else if v >= 60.0 {
                AlertLevel::Alert
            } else {
                AlertLevel::Normal
            }
        }
    }
}

/// Classify a reading using the catalog; `None` when the reading has no value.
pub fn classify_reading(catalog: &SensorCatalog, reading: &Reading) -> Option<AlertLevel> {
    let value = reading.value?;
    if let ReadingValue::Number(n) = value {
        if !n.is_finite() {
            return Some(AlertLevel::Alert);
        }
    }
    Some(classify(catalog.kind_of(&reading.sensor_id), value))
}
