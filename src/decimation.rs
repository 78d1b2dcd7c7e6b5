// Sensorstream - Realtime sensor ingestion and decimation
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Chart decimation
//!
//! Reduces a series to a bounded number of points before it is drawn.
//!
//! - **Average-binning** splits the series into `target` contiguous bins and
//!   keeps each bin's mean. Cheap, and fine for smooth signals.
//! - **LTTB** (Largest-Triangle-Three-Buckets) keeps the first and last points
//!   and, per bucket, the point forming the largest triangle with the previous
//!   pick and the next bucket's average. Peaks and troughs survive.
//!
//! In [`Algorithm::Auto`] mode the coefficient of variation of the series
//! picks between them: spiky series (cv above the threshold, 0.3 by default)
//! get LTTB.
//!
//! ```rust
//! use sensorstream::decimation::{decimate, Algorithm};
//!
//! let values = [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 10.0];
//! let series = decimate(&values, &[], 4, Algorithm::Auto);
//! assert_eq!(series.values.len(), 4);
//! assert_eq!(series.values[0], 0.0);
//! assert_eq!(series.values[3], 10.0);
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::DecimationConfig;
use crate::error::{DecimationError, Result};

/// Default coefficient-of-variation threshold for [`Algorithm::Auto`]
pub const DEFAULT_VARIANCE_THRESHOLD: f64 = 0.3;

/// Decimation algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    /// Choose by coefficient of variation
    #[default]
    Auto,
    /// Average-binning
    Average,
    /// Largest-Triangle-Three-Buckets
    Lttb,
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Algorithm::Auto => "auto",
            Algorithm::Average => "average",
            Algorithm::Lttb => "lttb",
        };
        f.write_str(name)
    }
}

impl FromStr for Algorithm {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(Algorithm::Auto),
            "average" | "avg" => Ok(Algorithm::Average),
            "lttb" => Ok(Algorithm::Lttb),
            other => Err(format!("unknown decimation algorithm: {}", other)),
        }
    }
}

/// Decimated values with their labels. `labels` is empty when the source had
/// no labels.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DecimatedSeries {
    pub values: Vec<f64>,
    pub labels: Vec<String>,
}

impl DecimatedSeries {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Arithmetic mean; 0.0 for an empty series
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation divided by the absolute mean.
///
/// A constant zero series yields NaN and a zero-mean series with spread
/// yields infinity; both compare as expected against a threshold.
pub fn coefficient_of_variation(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt() / m.abs()
}

/// Resolve [`Algorithm::Auto`] for a series. Explicit choices pass through.
pub fn select_algorithm(values: &[f64], requested: Algorithm, variance_threshold: f64) -> Algorithm {
    match requested {
        Algorithm::Auto => {
            if coefficient_of_variation(values) > variance_threshold {
                Algorithm::Lttb
            } else {
                Algorithm::Average
            }
        }
        explicit => explicit,
    }
}

/// Start index of bin `i` when `len` points are split into `bins` bins.
fn bin_start(i: usize, len: usize, bins: usize) -> usize {
    i * len / bins
}

/// Average-binning of values only. Identity when `values.len() <= target`.
pub fn decimate_average(values: &[f64], target: usize) -> Vec<f64> {
    if target == 0 {
        return Vec::new();
    }
    if values.len() <= target {
        return values.to_vec();
    }

    let len = values.len();
    (0..target)
        .map(|i| {
            let bin = &values[bin_start(i, len, target)..bin_start(i + 1, len, target)];
            bin.iter().sum::<f64>() / bin.len() as f64
        })
        .collect()
}

/// Average-binning with labels: each output label is the source label at the
/// bin midpoint (or the bin's first label when that one is blank).
pub fn decimate_average_with_labels(values: &[f64], labels: &[String], target: usize) -> DecimatedSeries {
    if target == 0 {
        return DecimatedSeries::default();
    }
    if values.len() <= target {
        return DecimatedSeries {
            values: values.to_vec(),
            labels: labels.to_vec(),
        };
    }

    let len = values.len();
    let mut out = DecimatedSeries {
        values: Vec::with_capacity(target),
        labels: Vec::with_capacity(if labels.is_empty() { 0 } else { target }),
    };

    for i in 0..target {
        let start = bin_start(i, len, target);
        let end = bin_start(i + 1, len, target);
        let bin = &values[start..end];
        out.values.push(bin.iter().sum::<f64>() / bin.len() as f64);

        if !labels.is_empty() {
            let middle = (start + end) / 2;
            let label = labels
                .get(middle)
                .filter(|l| !l.is_empty())
                .or_else(|| labels.get(start))
                .cloned()
                .unwrap_or_default();
            out.labels.push(label);
        }
    }
    out
}

/// Source indices picked by LTTB, first and last included.
///
/// Identity when `values.len() <= target`; `target < 3` leaves no room for a
/// middle bucket and returns the endpoints only (or fewer).
pub fn lttb_indices(values: &[f64], target: usize) -> Vec<usize> {
    let len = values.len();
    if len <= target {
        return (0..len).collect();
    }
    match target {
        0 => return Vec::new(),
        1 => return vec![0],
        2 => return vec![0, len - 1],
        _ => {}
    }

    let buckets = target - 2;
    let span = len - 2;
    // bucket i covers [start(i), start(i + 1))
    let start = |i: usize| i * span / buckets + 1;

    let mut picked = Vec::with_capacity(target);
    picked.push(0);
    let mut a = 0usize;

    for i in 0..buckets {
        let avg_start = start(i + 1);
        let avg_end = start(i + 2).min(len);
        let avg_len = (avg_end - avg_start) as f64;
        let avg_x = (avg_start..avg_end).map(|j| j as f64).sum::<f64>() / avg_len;
        let avg_y = values[avg_start..avg_end].iter().sum::<f64>() / avg_len;

        let ax = a as f64;
        let ay = values[a];
        let mut max_area = -1.0;
        let mut max_point = start(i);

        for (j, &y) in values.iter().enumerate().take(start(i + 1)).skip(start(i)) {
            let area = ((ax - avg_x) * (y - ay) - (ax - j as f64) * (avg_y - ay)).abs() * 0.5;
            if area > max_area {
                max_area = area;
                max_point = j;
            }
        }

        picked.push(max_point);
        a = max_point;
    }

    picked.push(len - 1);
    picked
}

/// LTTB on values only. Identity when `values.len() <= target`.
pub fn decimate_lttb(values: &[f64], target: usize) -> Vec<f64> {
    lttb_indices(values, target)
        .into_iter()
        .map(|i| values[i])
        .collect()
}

/// Labels for an LTTB output of `out_len` points, resampled by index ratio.
fn resample_labels(labels: &[String], source_len: usize, out_len: usize) -> Vec<String> {
    if labels.is_empty() || out_len == 0 {
        return Vec::new();
    }
    let ratio = source_len as f64 / out_len as f64;
    (0..out_len)
        .map(|i| {
            let index = (i as f64 * ratio).round() as usize;
            labels.get(index).cloned().unwrap_or_default()
        })
        .collect()
}

/// Decimate with the default variance threshold.
///
/// Never fails: empty input or a zero target gives an empty series, short
/// input is returned unchanged, and LTTB with a target below 3 falls back to
/// average-binning.
pub fn decimate(values: &[f64], labels: &[String], target: usize, algorithm: Algorithm) -> DecimatedSeries {
    decimate_with_threshold(values, labels, target, algorithm, DEFAULT_VARIANCE_THRESHOLD)
}

/// [`decimate`] with an explicit auto-selection threshold.
pub fn decimate_with_threshold(
    values: &[f64],
    labels: &[String],
    target: usize,
    algorithm: Algorithm,
    variance_threshold: f64,
) -> DecimatedSeries {
    if values.is_empty() || target == 0 {
        return DecimatedSeries::default();
    }
    if values.len() <= target {
        return DecimatedSeries {
            values: values.to_vec(),
            labels: labels.to_vec(),
        };
    }

    match select_algorithm(values, algorithm, variance_threshold) {
        Algorithm::Lttb if target >= 3 => {
            let decimated = decimate_lttb(values, target);
            let labels = resample_labels(labels, values.len(), decimated.len());
            DecimatedSeries {
                values: decimated,
                labels,
            }
        }
        Algorithm::Lttb => {
            log::debug!(
                "LTTB needs a target of at least 3 (got {}), using average-binning",
                target
            );
            decimate_average_with_labels(values, labels, target)
        }
        _ => decimate_average_with_labels(values, labels, target),
    }
}

/// Decimation driven by a [`DecimationConfig`]
#[derive(Debug, Clone, Default)]
pub struct Decimator {
    config: DecimationConfig,
}

impl Decimator {
    /// Create a decimator with the given configuration
    pub fn new(config: DecimationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DecimationConfig {
        &self.config
    }

    /// Whether a series of `len` points exceeds the decimation threshold
    pub fn should_decimate(&self, len: usize) -> bool {
        len > self.config.threshold
    }

    /// Algorithm that would be applied to this series
    pub fn algorithm_for(&self, values: &[f64]) -> Algorithm {
        select_algorithm(values, self.config.algorithm, self.config.variance_threshold)
    }

    /// Decimate to the configured target size, with the lenient guards of
    /// [`decimate`].
    pub fn decimate(&self, values: &[f64], labels: &[String]) -> DecimatedSeries {
        decimate_with_threshold(
            values,
            labels,
            self.config.target_size,
            self.config.algorithm,
            self.config.variance_threshold,
        )
    }

    /// Decimate only when the series exceeds the threshold.
    pub fn decimate_if_needed(&self, values: &[f64], labels: &[String]) -> DecimatedSeries {
        if self.should_decimate(values.len()) {
            self.decimate(values, labels)
        } else {
            DecimatedSeries {
                values: values.to_vec(),
                labels: labels.to_vec(),
            }
        }
    }

    /// Strict variant: rejects a zero target, LTTB with a target below 3, and
    /// labels that do not line up with the values.
    pub fn try_decimate(
        &self,
        values: &[f64],
        labels: &[String],
        target: usize,
    ) -> Result<DecimatedSeries> {
        if target == 0 {
            return Err(DecimationError::ZeroTarget.into());
        }
        if !labels.is_empty() && labels.len() != values.len() {
            return Err(DecimationError::LabelMismatch {
                values: values.len(),
                labels: labels.len(),
            }
            .into());
        }
        if values.len() > target && target < 3 && self.algorithm_for(values) == Algorithm::Lttb {
            return Err(DecimationError::TargetTooSmallForLttb { target_size: target }.into());
        }
        Ok(decimate_with_threshold(
            values,
            labels,
            target,
            self.config.algorithm,
            self.config.variance_threshold,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StreamError;
    use approx::assert_relative_eq;

    fn labels(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("L{}", i)).collect()
    }

    #[test]
    fn test_identity_when_short() {
        let values = vec![1.0, 5.0, 2.0];
        let series = decimate(&values, &labels(3), 3, Algorithm::Auto);
        assert_eq!(series.values, values);
        assert_eq!(series.labels, labels(3));
    }

    #[test]
    fn test_empty_input() {
        let series = decimate(&[], &labels(4), 10, Algorithm::Lttb);
        assert!(series.is_empty());
        assert!(series.labels.is_empty());
    }

    #[test]
    fn test_zero_target() {
        assert!(decimate(&[1.0, 2.0], &[], 0, Algorithm::Average).is_empty());
        assert!(decimate_average(&[1.0, 2.0], 0).is_empty());
    }

    #[test]
    fn test_cv() {
        assert_relative_eq!(coefficient_of_variation(&[1.0; 10]), 0.0);
        let spiky = [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 10.0];
        assert_relative_eq!(coefficient_of_variation(&spiky), 3.0, epsilon = 1e-12);
        assert!(coefficient_of_variation(&[0.0; 5]).is_nan());
        assert!(coefficient_of_variation(&[-1.0, 1.0]).is_infinite());
    }

    #[test]
    fn test_auto_selection() {
        let spiky = [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 10.0];
        assert_eq!(select_algorithm(&spiky, Algorithm::Auto, 0.3), Algorithm::Lttb);
        assert_eq!(select_algorithm(&[1.0; 10], Algorithm::Auto, 0.3), Algorithm::Average);
        // all zeros: NaN never exceeds the threshold
        assert_eq!(select_algorithm(&[0.0; 10], Algorithm::Auto, 0.3), Algorithm::Average);
        assert_eq!(select_algorithm(&spiky, Algorithm::Average, 0.3), Algorithm::Average);
    }

    #[test]
    fn test_spiky_example_uses_lttb() {
        let values = [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 10.0];
        let series = decimate(&values, &[], 4, Algorithm::Auto);
        assert_eq!(series.values.len(), 4);
        assert_eq!(series.values[0], 0.0);
        assert_eq!(series.values[3], 10.0);
    }

    #[test]
    fn test_flat_example_uses_average() {
        let series = decimate(&[1.0; 10], &[], 5, Algorithm::Auto);
        assert_eq!(series.values, vec![1.0; 5]);
    }

    #[test]
    fn test_average_bins() {
        let values: Vec<f64> = (0..10).map(f64::from).collect();
        assert_eq!(decimate_average(&values, 5), vec![0.5, 2.5, 4.5, 6.5, 8.5]);

        // uneven bins: 10 / 3 gives [0..3), [3..6), [6..10)
        assert_eq!(decimate_average(&values, 3), vec![1.0, 4.0, 7.5]);
    }

    #[test]
    fn test_average_labels_from_midpoint() {
        let values: Vec<f64> = (0..10).map(f64::from).collect();
        let series = decimate_average_with_labels(&values, &labels(10), 5);
        assert_eq!(series.labels, vec!["L1", "L3", "L5", "L7", "L9"]);
    }

    #[test]
    fn test_average_blank_label_falls_back_to_bin_start() {
        let values = vec![1.0; 4];
        let labels = vec!["a".to_string(), String::new(), "c".to_string(), String::new()];
        let series = decimate_average_with_labels(&values, &labels, 2);
        assert_eq!(series.labels, vec!["a", "c"]);
    }

    #[test]
    fn test_lttb_keeps_endpoints_and_peak() {
        let mut values = vec![1.0; 100];
        values[0] = 3.0;
        values[42] = 50.0;
        values[99] = -2.0;
        let out = decimate_lttb(&values, 10);
        assert_eq!(out.len(), 10);
        assert_eq!(out[0], 3.0);
        assert_eq!(out[9], -2.0);
        assert!(out.contains(&50.0));
    }

    #[test]
    fn test_lttb_indices_strictly_increasing() {
        let values: Vec<f64> = (0..500).map(|i| ((i as f64) * 0.37).sin() * 10.0).collect();
        let indices = lttb_indices(&values, 37);
        assert_eq!(indices.len(), 37);
        assert!(indices.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(indices[0], 0);
        assert_eq!(*indices.last().unwrap(), 499);
    }

    #[test]
    fn test_lttb_labels_resampled() {
        let values: Vec<f64> = (0..20).map(|i| if i % 5 == 0 { 10.0 } else { 0.0 }).collect();
        let series = decimate(&values, &labels(20), 5, Algorithm::Lttb);
        // ratio 20 / 5 = 4
        assert_eq!(series.labels, vec!["L0", "L4", "L8", "L12", "L16"]);
    }

    #[test]
    fn test_lttb_small_target_falls_back() {
        let values = [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 10.0];
        let series = decimate(&values, &[], 2, Algorithm::Lttb);
        assert_eq!(series.values, vec![0.0, 2.0]);
    }

    #[test]
    fn test_lttb_indices_degenerate_targets() {
        let values = [1.0, 2.0, 3.0, 4.0];
        assert!(lttb_indices(&values, 0).is_empty());
        assert_eq!(lttb_indices(&values, 1), vec![0]);
        assert_eq!(lttb_indices(&values, 2), vec![0, 3]);
    }

    #[test]
    fn test_decimator_threshold() {
        let decimator = Decimator::new(DecimationConfig::default());
        let values: Vec<f64> = (0..150).map(|i| 20.0 + (i % 3) as f64 * 0.1).collect();
        assert!(!decimator.should_decimate(values.len()));
        assert_eq!(decimator.decimate_if_needed(&values, &[]).len(), 150);

        let values: Vec<f64> = (0..151).map(|i| 20.0 + (i % 3) as f64 * 0.1).collect();
        assert_eq!(decimator.decimate_if_needed(&values, &[]).len(), 100);
    }

    #[test]
    fn test_try_decimate_errors() {
        let decimator = Decimator::new(DecimationConfig::with_algorithm(Algorithm::Lttb));
        let values = vec![1.0, 9.0, 1.0, 9.0, 1.0];

        assert!(matches!(
            decimator.try_decimate(&values, &[], 0),
            Err(StreamError::Decimation(DecimationError::ZeroTarget))
        ));
        assert!(matches!(
            decimator.try_decimate(&values, &[], 2),
            Err(StreamError::Decimation(DecimationError::TargetTooSmallForLttb { target_size: 2 }))
        ));
        assert!(matches!(
            decimator.try_decimate(&values, &labels(3), 4),
            Err(StreamError::Decimation(DecimationError::LabelMismatch { .. }))
        ));
        assert_eq!(decimator.try_decimate(&values, &labels(5), 3).unwrap().len(), 3);
    }

    #[test]
    fn test_algorithm_parse() {
        assert_eq!("LTTB".parse::<Algorithm>().unwrap(), Algorithm::Lttb);
        assert_eq!("average".parse::<Algorithm>().unwrap(), Algorithm::Average);
        assert!("median".parse::<Algorithm>().is_err());
        assert_eq!(Algorithm::Auto.to_string(), "auto");
    }
}
