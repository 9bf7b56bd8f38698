//! RBF kernel ridge regression.
//!
//! `y(x) = ȳ + Σ_i w_i · exp(-γ (x - x_i)²)` with weights from
//!
//! ```text
//! (K + α I) w = y - ȳ,   K_ij = exp(-γ (x_i - x_j)²)
//! ```
//!
//! γ controls the width of the kernel and is the hyperparameter selected by
//! the validation curve; α is a fixed ridge term. `K + α I` is symmetric
//! positive definite for α > 0, so a Cholesky solve suffices.

use nalgebra::{DMatrix, DVector};

use super::{Predictor, Regressor};
use crate::math::mean;

#[derive(Debug, Clone, Copy)]
pub struct RbfKernelRidge {
    pub alpha: f64,
}

impl Default for RbfKernelRidge {
    fn default() -> Self {
        Self { alpha: 0.1 }
    }
}

#[derive(Debug, Clone)]
pub struct RbfModel {
    gamma: f64,
    offset: f64,
    centers: Vec<f64>,
    weights: Vec<f64>,
}

impl Predictor for RbfModel {
    fn predict(&self, x: f64) -> f64 {
        let mut acc = self.offset;
        for (&c, &w) in self.centers.iter().zip(self.weights.iter()) {
            let d = x - c;
            acc += w * (-self.gamma * d * d).exp();
        }
        acc
    }
}

impl Regressor for RbfKernelRidge {
    type Model = RbfModel;

    fn name(&self) -> &'static str {
        "rbf"
    }

    fn fit(&self, x: &[f64], y: &[f64], gamma: f64) -> Option<RbfModel> {
        let n = x.len();
        if n == 0 || n != y.len() {
            return None;
        }
        if !(gamma.is_finite() && gamma > 0.0 && self.alpha.is_finite() && self.alpha > 0.0) {
            return None;
        }

        let offset = mean(y)?;
        let k = DMatrix::<f64>::from_fn(n, n, |i, j| {
            let d = x[i] - x[j];
            let v = (-gamma * d * d).exp();
            if i == j { v + self.alpha } else { v }
        });
        let rhs = DVector::<f64>::from_iterator(n, y.iter().map(|v| v - offset));

        let weights = k.cholesky()?.solve(&rhs);
        if !weights.iter().all(|w| w.is_finite()) {
            return None;
        }

        Some(RbfModel {
            gamma,
            offset,
            centers: x.to_vec(),
            weights: weights.iter().copied().collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rbf_reproduces_smooth_bump() {
        let x: Vec<f64> = (0..60).map(|i| i as f64 / 59.0).collect();
        let y: Vec<f64> = x.iter().map(|v| -(-(v - 0.5) * (v - 0.5) / 0.02).exp()).collect();

        let model = RbfKernelRidge { alpha: 1e-4 }.fit(&x, &y, 50.0).unwrap();
        for (&xi, &yi) in x.iter().zip(y.iter()) {
            assert!((model.predict(xi) - yi).abs() < 0.05, "x={xi}");
        }
    }

    #[test]
    fn rbf_rejects_invalid_gamma() {
        let x = [0.0, 0.5, 1.0];
        let y = [1.0, 2.0, 3.0];
        assert!(RbfKernelRidge::default().fit(&x, &y, 0.0).is_none());
        assert!(RbfKernelRidge::default().fit(&x, &y, f64::NAN).is_none());
    }

    #[test]
    fn rbf_predicts_mean_far_from_data() {
        let x = [0.0, 0.1, 0.2];
        let y = [1.0, 2.0, 3.0];
        let model = RbfKernelRidge::default().fit(&x, &y, 1000.0).unwrap();
        assert!((model.predict(50.0) - 2.0).abs() < 1e-9);
    }
}
