//! Small descriptive statistics used by the stages.
//!
//! Callers pass finite values only (light curves expose `finite_samples()`
//! for that); `argmin`/`argmax` are the exception and skip `NaN`s.

use std::cmp::Ordering;

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Median of `values` (sorts in place).
pub fn median_mut(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        Some(values[mid])
    } else {
        Some((values[mid - 1] + values[mid]) / 2.0)
    }
}

pub fn median(values: &[f64]) -> Option<f64> {
    let mut sorted = values.to_vec();
    median_mut(&mut sorted)
}

/// Sample standard deviation (n - 1 denominator). Needs at least 2 values.
pub fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let ss: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
    Some((ss / (values.len() as f64 - 1.0)).sqrt())
}

/// Coefficient of determination `1 - SS_res / SS_tot`.
///
/// A constant `observed` vector gives 1.0 for a perfect prediction and 0.0
/// otherwise, so a flat curve never looks like a failure.
pub fn r2_score(observed: &[f64], predicted: &[f64]) -> Option<f64> {
    if observed.is_empty() || observed.len() != predicted.len() {
        return None;
    }
    let m = mean(observed)?;
    let ss_tot: f64 = observed.iter().map(|y| (y - m) * (y - m)).sum();
    let ss_res: f64 = observed
        .iter()
        .zip(predicted.iter())
        .map(|(y, p)| (y - p) * (y - p))
        .sum();
    if !ss_res.is_finite() {
        return None;
    }
    if ss_tot <= f64::EPSILON {
        return Some(if ss_res <= f64::EPSILON { 1.0 } else { 0.0 });
    }
    Some(1.0 - ss_res / ss_tot)
}

/// Index and value of the minimum finite entry.
pub fn argmin(values: &[f64]) -> Option<(usize, f64)> {
    values
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal))
}

/// Index and value of the maximum finite entry.
pub fn argmax(values: &[f64]) -> Option<(usize, f64)> {
    values
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_handles_even_and_odd() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), Some(2.5));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn sample_std_uses_bessel_correction() {
        let s = sample_std(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert!((s - (5.0f64 / 3.0).sqrt()).abs() < 1e-12);
        assert!(sample_std(&[1.0]).is_none());
    }

    #[test]
    fn r2_perfect_and_mean_predictions() {
        let y = [1.0, 2.0, 3.0];
        assert!((r2_score(&y, &y).unwrap() - 1.0).abs() < 1e-12);
        assert!(r2_score(&y, &[2.0, 2.0, 2.0]).unwrap().abs() < 1e-12);
        assert_eq!(r2_score(&[5.0, 5.0], &[5.0, 5.0]), Some(1.0));
    }

    #[test]
    fn argmin_skips_missing() {
        assert_eq!(argmin(&[f64::NAN, 2.0, -1.0, 0.0]), Some((2, -1.0)));
        assert_eq!(argmax(&[f64::NAN, 2.0, -1.0]), Some((1, 2.0)));
        assert_eq!(argmin(&[f64::NAN]), None);
    }
}
