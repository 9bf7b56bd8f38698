//! Dimming slope: how fast the fitted curve falls into the dip.
//!
//! The derivative is taken pointwise on the whole curve. Inside
//! `[start, end]` the contiguous run of negative derivative that contains the
//! steepest descent is the dimming onset; its minimum, maximum and mean
//! derivative are reported together with the run's first and last timestamps.

use serde::Serialize;

use crate::domain::LightCurve;
use crate::math::{argmin, gradient, mean};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SlopeResult {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub start: Option<f64>,
    pub end: Option<f64>,
}

/// Slope statistics of `curve` between `start` and `end`.
///
/// Without an `end` the search runs up to the curve's own minimum after `start`.
pub fn detect_slope(curve: &LightCurve, start: f64, end: Option<f64>) -> SlopeResult {
    let (t, y) = curve.finite_samples();
    if t.len() < 2 || !start.is_finite() {
        return SlopeResult::default();
    }

    let end = match end {
        Some(e) => e,
        None => {
            let first = t.partition_point(|&ti| ti < start);
            match argmin(&y[first..]) {
                Some((i, _)) => t[first + i],
                None => return SlopeResult::default(),
            }
        }
    };
    if !end.is_finite() || end < start {
        return SlopeResult::default();
    }

    let dydt = gradient(&t, &y);
    let lo = t.partition_point(|&ti| ti < start);
    let hi = t.partition_point(|&ti| ti <= end);
    if lo >= hi {
        return SlopeResult::default();
    }

    let Some((steepest, s)) = argmin(&dydt[lo..hi]) else {
        return SlopeResult::default();
    };
    if s >= 0.0 {
        return SlopeResult::default();
    }

    let steepest = lo + steepest;
    let is_falling = |i: usize| dydt[i] < 0.0;
    let mut first = steepest;
    while first > lo && is_falling(first - 1) {
        first -= 1;
    }
    let mut last = steepest;
    while last + 1 < hi && is_falling(last + 1) {
        last += 1;
    }

    let run = &dydt[first..=last];
    SlopeResult {
        min: run.iter().copied().reduce(f64::min),
        max: run.iter().copied().reduce(f64::max),
        mean: mean(run),
        start: Some(t[first]),
        end: Some(t[last]),
    }
}
