//! Dimming duration: time the fitted curve spends below zero.
//!
//! The dimming is the below-zero excursion that holds the curve minimum
//! (after the scan start). It opens at the last downward zero crossing before
//! that minimum and closes at the first upward crossing after it, so the
//! interval never spans time above zero. Both crossing times are linearly
//! interpolated between samples.

use serde::Serialize;

use crate::domain::LightCurve;
use crate::math::{argmin, zero_crossing};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DurationResult {
    pub start: Option<f64>,
    pub end: Option<f64>,
    pub duration: Option<f64>,
}

pub fn detect_duration(curve: &LightCurve, scan_start: f64) -> DurationResult {
    let (t, y): (Vec<f64>, Vec<f64>) = curve
        .iter()
        .filter(|(t, y)| *t >= scan_start && y.is_finite())
        .unzip();
    if t.len() < 2 {
        return DurationResult::default();
    }

    let falls = |i: usize| y[i - 1] >= 0.0 && y[i] < 0.0;
    let Some(first_down) = (1..t.len()).find(|&i| falls(i)) else {
        return DurationResult::default();
    };

    let Some((offset, _)) = argmin(&y[first_down..]) else {
        return DurationResult::default();
    };
    let min_idx = first_down + offset;

    // Always found: `first_down` itself qualifies.
    let down = (first_down..=min_idx).rev().find(|&i| falls(i)).unwrap_or(first_down);
    let start = zero_crossing(t[down - 1], y[down - 1], t[down], y[down]);

    let Some(up) = (min_idx + 1..t.len()).find(|&i| y[i - 1] < 0.0 && y[i] >= 0.0) else {
        return DurationResult::default();
    };
    let end = zero_crossing(t[up - 1], y[up - 1], t[up], y[up]);

    DurationResult {
        start: Some(start),
        end: Some(end),
        duration: Some(end - start),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn curve(y: Vec<f64>) -> LightCurve {
        let t = (0..y.len()).map(|i| i as f64 * 10.0).collect();
        LightCurve::new(t, y).unwrap()
    }

    #[test]
    fn crossings_are_interpolated() {
        let c = curve(vec![2.0, 1.0, -1.0, -3.0, -1.0, 1.0, 2.0]);
        let d = detect_duration(&c, 0.0);
        assert!((d.start.unwrap() - 15.0).abs() < 1e-12);
        assert!((d.end.unwrap() - 45.0).abs() < 1e-12);
        assert!((d.duration.unwrap() - 30.0).abs() < 1e-12);
    }

    #[test]
    fn monotone_decrease_is_undetermined() {
        let c = curve((0..20).map(|i| 5.0 - i as f64).collect());
        assert_eq!(detect_duration(&c, 0.0), DurationResult::default());
    }

    #[test]
    fn interval_covers_only_the_deepest_excursion() {
        // A shallow dip at 5..15 s, back above zero until 35 s, then the
        // deep one closing at 55 s.
        let c = curve(vec![1.0, -1.0, 1.0, 1.0, -1.0, -2.0, 2.0]);
        let d = detect_duration(&c, 0.0);
        assert!((d.start.unwrap() - 35.0).abs() < 1e-12);
        assert!((d.end.unwrap() - 55.0).abs() < 1e-12);
        assert!((d.duration.unwrap() - 20.0).abs() < 1e-12);

        let inside: Vec<f64> = c
            .iter()
            .filter(|(t, _)| *t > d.start.unwrap() && *t < d.end.unwrap())
            .map(|(_, y)| y)
            .collect();
        assert!(!inside.is_empty() && inside.iter().all(|&y| y < 0.0));
    }

    #[test]
    fn deeper_first_dip_wins_over_later_shallow_one() {
        let c = curve(vec![1.0, -3.0, 1.0, 1.0, -1.0, 1.0]);
        let d = detect_duration(&c, 0.0);
        assert!((d.start.unwrap() - 2.5).abs() < 1e-12);
        assert!((d.end.unwrap() - 17.5).abs() < 1e-12);
    }

    #[test]
    fn scan_start_skips_earlier_dips() {
        let c = curve(vec![1.0, -5.0, 1.0, 1.0, -1.0, -2.0, 2.0]);
        let all = detect_duration(&c, 0.0);
        assert!((all.start.unwrap() - 10.0 / 6.0).abs() < 1e-12);

        let later = detect_duration(&c, 20.0);
        assert!((later.start.unwrap() - 35.0).abs() < 1e-12);
        assert!((later.end.unwrap() - 55.0).abs() < 1e-12);
    }

    #[test]
    fn curve_starting_below_zero_needs_a_downward_crossing() {
        let c = curve(vec![-1.0, -2.0, -1.0, 1.0]);
        assert_eq!(detect_duration(&c, 0.0), DurationResult::default());
    }
}
