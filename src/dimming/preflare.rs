//! Pre-flare irradiance level.
//!
//! The samples before the onset are split into three contiguous sub-windows of
//! equal duration. Each must be quiet (small relative scatter) and the three
//! medians must agree; the level is then the mean of the medians. Anything
//! else leaves the level undetermined and records why.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::LightCurve;
use crate::math::{mean, median, sample_std};

/// Number of pre-flare sub-windows.
pub const SUB_WINDOWS: usize = 3;

/// Quietness thresholds, both in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreflareThresholds {
    /// Maximum `std / median × 100` inside any sub-window.
    pub max_relative_std: f64,
    /// Maximum `(max_median − min_median) / mean_median × 100`.
    pub max_median_spread: f64,
}

impl Default for PreflareThresholds {
    fn default() -> Self {
        Self {
            max_relative_std: 0.5,
            max_median_spread: 1.5,
        }
    }
}

/// Statistics of one sub-window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SubWindowStats {
    pub start: f64,
    pub end: f64,
    pub count: usize,
    pub median: Option<f64>,
    pub std: Option<f64>,
}

/// Why no pre-flare level could be determined.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum PreflareRejection {
    /// No finite sample at or before the onset.
    NoSamples,
    /// A sub-window holds fewer than two samples.
    TooFewSamples { window: usize, found: usize },
    /// A sub-window median is zero, negative or not finite.
    NonPositiveMedian { window: usize },
    RelativeStdTooHigh { window: usize, percent: f64 },
    MedianSpreadTooHigh { percent: f64 },
}

impl fmt::Display for PreflareRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreflareRejection::NoSamples => write!(f, "no finite samples before onset"),
            PreflareRejection::TooFewSamples { window, found } => {
                write!(f, "sub-window {window} has {found} sample(s), need 2")
            }
            PreflareRejection::NonPositiveMedian { window } => {
                write!(f, "sub-window {window} median is not positive")
            }
            PreflareRejection::RelativeStdTooHigh { window, percent } => {
                write!(f, "sub-window {window} relative std {percent:.3}% too high")
            }
            PreflareRejection::MedianSpreadTooHigh { percent } => {
                write!(f, "median spread {percent:.3}% too high")
            }
        }
    }
}

/// Result of [`estimate_preflare`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreflareEstimate {
    pub level: Option<f64>,
    pub sub_windows: Vec<SubWindowStats>,
    pub rejection: Option<PreflareRejection>,
}

impl PreflareEstimate {
    fn rejected(sub_windows: Vec<SubWindowStats>, rejection: PreflareRejection) -> Self {
        Self {
            level: None,
            sub_windows,
            rejection: Some(rejection),
        }
    }
}

/// Estimate the pre-flare level of `curve` from samples at or before `onset`.
///
/// `onset` is in the curve's own time coordinate; samples after it are ignored.
pub fn estimate_preflare(
    curve: &LightCurve,
    onset: f64,
    thresholds: &PreflareThresholds,
) -> PreflareEstimate {
    let (t, y): (Vec<f64>, Vec<f64>) = curve
        .iter()
        .filter(|(t, y)| *t <= onset && y.is_finite())
        .unzip();
    let Some(&first) = t.first() else {
        return PreflareEstimate::rejected(Vec::new(), PreflareRejection::NoSamples);
    };

    let span = onset - first;
    let mut buckets: Vec<Vec<f64>> = vec![Vec::new(); SUB_WINDOWS];
    if span > 0.0 {
        for (&ti, &yi) in t.iter().zip(y.iter()) {
            let idx = (((ti - first) * SUB_WINDOWS as f64 / span) as usize).min(SUB_WINDOWS - 1);
            buckets[idx].push(yi);
        }
    }

    let step = span / SUB_WINDOWS as f64;
    let sub_windows: Vec<SubWindowStats> = buckets
        .iter()
        .enumerate()
        .map(|(i, values)| SubWindowStats {
            start: first + step * i as f64,
            end: if i + 1 == SUB_WINDOWS { onset } else { first + step * (i + 1) as f64 },
            count: values.len(),
            median: median(values),
            std: sample_std(values),
        })
        .collect();

    let mut medians = Vec::with_capacity(SUB_WINDOWS);
    for (i, w) in sub_windows.iter().enumerate() {
        let (Some(med), Some(std)) = (w.median, w.std) else {
            return PreflareEstimate::rejected(
                sub_windows.clone(),
                PreflareRejection::TooFewSamples { window: i, found: w.count },
            );
        };
        if !med.is_finite() || med <= 0.0 {
            return PreflareEstimate::rejected(sub_windows.clone(), PreflareRejection::NonPositiveMedian { window: i });
        }
        let percent = 100.0 * std / med;
        if percent > thresholds.max_relative_std {
            return PreflareEstimate::rejected(
                sub_windows.clone(),
                PreflareRejection::RelativeStdTooHigh { window: i, percent },
            );
        }
        medians.push(med);
    }

    let Some(level) = mean(&medians) else {
        return PreflareEstimate::rejected(sub_windows, PreflareRejection::NoSamples);
    };
    let lo = medians.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = medians.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let spread = 100.0 * (hi - lo) / level;
    if spread > thresholds.max_median_spread {
        return PreflareEstimate::rejected(sub_windows, PreflareRejection::MedianSpreadTooHigh { percent: spread });
    }

    PreflareEstimate {
        level: Some(level),
        sub_windows,
        rejection: None,
    }
}
