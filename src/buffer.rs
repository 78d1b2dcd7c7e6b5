// Sensorstream - Realtime sensor ingestion and decimation
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Bounded per-sensor reading buffers.
//!
//! Each sensor gets its own oldest-first [`SensorBuffer`], created on the
//! first reading for that id. Duplicate detection only looks at the tail
//! reading, so a push is O(1) apart from the trim.

use std::collections::{HashMap, VecDeque};

use crate::reading::Reading;

/// Result of a single push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Reading appended, nothing evicted.
    Appended,
    /// Reading appended and this many of the oldest readings dropped.
    AppendedWithEviction(usize),
    /// Reading matched the tail reading and was ignored.
    Duplicate,
}

impl PushOutcome {
    /// Whether the reading was stored.
    pub fn is_appended(&self) -> bool {
        !matches!(self, PushOutcome::Duplicate)
    }

    /// Readings evicted by this push.
    pub fn evicted(&self) -> usize {
        match self {
            PushOutcome::AppendedWithEviction(n) => *n,
            _ => 0,
        }
    }
}

/// Capacity-limited, oldest-first history of one sensor.
#[derive(Debug, Clone)]
pub struct SensorBuffer {
    readings: VecDeque<Reading>,
    capacity: usize,
}

impl SensorBuffer {
    /// Create an empty buffer. A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            readings: VecDeque::with_capacity(capacity.min(1024) + 1),
            capacity,
        }
    }

    /// Append unless the reading duplicates the tail, then trim the front
    /// back down to capacity in one step.
    pub fn push(&mut self, reading: Reading) -> PushOutcome {
        if let Some(last) = self.readings.back() {
            if reading.is_duplicate_of(last) {
                return PushOutcome::Duplicate;
            }
        }

        self.readings.push_back(reading);

        let excess = self.readings.len().saturating_sub(self.capacity);
        if excess > 0 {
            self.readings.drain(..excess);
            PushOutcome::AppendedWithEviction(excess)
        } else {
            PushOutcome::Appended
        }
    }

    /// Most recent reading.
    pub fn last(&self) -> Option<&Reading> {
        self.readings.back()
    }

    /// Oldest reading.
    pub fn first(&self) -> Option<&Reading> {
        self.readings.front()
    }

    /// Iterate oldest-first.
    pub fn iter(&self) -> impl Iterator<Item = &Reading> {
        self.readings.iter()
    }

    /// Owned oldest-first copy.
    pub fn to_vec(&self) -> Vec<Reading> {
        self.readings.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// All sensor buffers of one stream.
#[derive(Debug, Clone)]
pub struct StreamBuffer {
    sensors: HashMap<String, SensorBuffer>,
    capacity: usize,
}

impl StreamBuffer {
    /// Create a stream buffer whose sensors each keep `capacity` readings.
    pub fn new(capacity: usize) -> Self {
        Self {
            sensors: HashMap::new(),
            capacity,
        }
    }

    /// Push a reading into its sensor's buffer.
    pub fn push(&mut self, reading: Reading) -> PushOutcome {
        let capacity = self.capacity;
        self.sensors
            .entry(reading.sensor_id.clone())
            .or_insert_with(|| SensorBuffer::new(capacity))
            .push(reading)
    }

    /// Buffer of one sensor, if it has received anything.
    pub fn get(&self, sensor_id: &str) -> Option<&SensorBuffer> {
        self.sensors.get(sensor_id)
    }

    /// Most recent reading of one sensor.
    pub fn last(&self, sensor_id: &str) -> Option<&Reading> {
        self.sensors.get(sensor_id).and_then(SensorBuffer::last)
    }

    /// Owned oldest-first copy of one sensor's buffer; empty when unknown.
    pub fn snapshot(&self, sensor_id: &str) -> Vec<Reading> {
        self.sensors
            .get(sensor_id)
            .map(SensorBuffer::to_vec)
            .unwrap_or_default()
    }

    /// Ids of all sensors seen so far, sorted.
    pub fn sensor_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sensors.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of sensors with a buffer.
    pub fn sensor_count(&self) -> usize {
        self.sensors.len()
    }

    /// Readings held across all sensors.
    pub fn total_readings(&self) -> usize {
        self.sensors.values().map(SensorBuffer::len).sum()
    }

    /// Per-sensor capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(sensor: &str, n: usize) -> Reading {
        Reading::new(sensor, n as f64, format!("2024-05-01T12:00:{:02}.000Z", n % 60))
            .with_id(format!("{}-{}", sensor, n))
    }

    #[test]
    fn test_push_and_last() {
        let mut buffer = SensorBuffer::new(10);
        assert!(buffer.last().is_none());
        assert_eq!(buffer.push(reading("s1", 1)), PushOutcome::Appended);
        assert_eq!(buffer.push(reading("s1", 2)), PushOutcome::Appended);
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.last().unwrap().numeric(), Some(2.0));
        assert_eq!(buffer.first().unwrap().numeric(), Some(1.0));
    }

    #[test]
    fn test_tail_duplicate_ignored() {
        let mut buffer = SensorBuffer::new(10);
        let a = Reading::new("s1", 1.0, "T1").with_id("a");
        buffer.push(a.clone());
        assert_eq!(buffer.push(a), PushOutcome::Duplicate);
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_only_tail_is_checked() {
        let mut buffer = SensorBuffer::new(10);
        let a = Reading::new("s1", 1.0, "T1").with_id("a");
        let b = Reading::new("s1", 2.0, "T2").with_id("b");
        buffer.push(a.clone());
        buffer.push(b);
        // "a" is no longer the tail
        assert_eq!(buffer.push(a), PushOutcome::Appended);
        assert_eq!(buffer.len(), 3);
    }

    #[test]
    fn test_capacity_trim() {
        let mut buffer = SensorBuffer::new(3);
        for i in 0..3 {
            buffer.push(reading("s1", i));
        }
        assert_eq!(
            buffer.push(reading("s1", 3)),
            PushOutcome::AppendedWithEviction(1)
        );
        assert_eq!(buffer.len(), 3);
        let values: Vec<f64> = buffer.iter().filter_map(Reading::numeric).collect();
        assert_eq!(values, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_zero_capacity_raised() {
        let mut buffer = SensorBuffer::new(0);
        buffer.push(reading("s1", 1));
        buffer.push(reading("s1", 2));
        assert_eq!(buffer.capacity(), 1);
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_stream_buffer_lazy_creation() {
        let mut stream = StreamBuffer::new(5);
        assert!(stream.get("s1").is_none());
        assert!(stream.snapshot("s1").is_empty());

        stream.push(reading("s1", 1));
        stream.push(reading("s2", 1));
        stream.push(reading("s1", 2));

        assert_eq!(stream.sensor_count(), 2);
        assert_eq!(stream.total_readings(), 3);
        assert_eq!(stream.get("s1").unwrap().len(), 2);
        assert_eq!(stream.last("s2").unwrap().sensor_id, "s2");
        assert_eq!(stream.sensor_ids(), vec!["s1".to_string(), "s2".to_string()]);
    }

    #[test]
    fn test_sensors_are_independent() {
        let mut stream = StreamBuffer::new(2);
        for i in 0..5 {
            stream.push(reading("busy", i));
        }
        stream.push(reading("quiet", 0));
        assert_eq!(stream.get("busy").unwrap().len(), 2);
        assert_eq!(stream.get("quiet").unwrap().len(), 1);
    }
}
