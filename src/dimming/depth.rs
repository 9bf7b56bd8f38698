//! Dimming depth: how far the fitted curve drops below its baseline.

use serde::Serialize;

use crate::domain::{LightCurve, Window};
use crate::math::argmin;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DepthResult {
    /// Signed minimum relative to the baseline (negative for a dip).
    pub depth: Option<f64>,
    pub time: Option<f64>,
}

/// Deepest point of `curve` inside `window`, accepted only strictly below `baseline`.
pub fn detect_depth(curve: &LightCurve, window: Window, baseline: f64) -> DepthResult {
    if !window.is_valid() || !baseline.is_finite() {
        return DepthResult::default();
    }
    let Some(inside) = curve.window(window) else {
        return DepthResult::default();
    };
    match argmin(inside.irradiance()) {
        Some((i, min)) if min < baseline => DepthResult {
            depth: Some(min - baseline),
            time: Some(inside.time()[i]),
        },
        _ => DepthResult::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> LightCurve {
        // 0 at t=0, down to -30 at t=5, back to 0 at t=10.
        let t: Vec<f64> = (0..=10).map(|i| i as f64).collect();
        let y = t.iter().map(|&ti| -30.0 * (1.0 - (ti - 5.0).abs() / 5.0)).collect();
        LightCurve::new(t, y).unwrap()
    }

    #[test]
    fn triangular_dip_is_recovered() {
        let d = detect_depth(&triangle(), Window::ALL, 0.0);
        assert!((d.depth.unwrap() + 30.0).abs() < 1e-12);
        assert_eq!(d.time, Some(5.0));
    }

    #[test]
    fn window_restricts_the_search() {
        let d = detect_depth(&triangle(), Window::new(7.0, 10.0), 0.0);
        assert!((d.depth.unwrap() + 18.0).abs() < 1e-12);
        assert_eq!(d.time, Some(7.0));
        assert_eq!(detect_depth(&triangle(), Window::new(20.0, 30.0), 0.0), DepthResult::default());
        assert_eq!(detect_depth(&triangle(), Window::new(3.0, 1.0), 0.0), DepthResult::default());
    }

    #[test]
    fn no_dip_below_baseline_is_undetermined() {
        let flat = LightCurve::new(vec![0.0, 1.0, 2.0], vec![0.0, 0.0, 0.0]).unwrap();
        assert_eq!(detect_depth(&flat, Window::ALL, 0.0), DepthResult::default());
        let d = detect_depth(&flat, Window::ALL, 1.0);
        assert_eq!(d.depth, Some(-1.0));
    }
}
