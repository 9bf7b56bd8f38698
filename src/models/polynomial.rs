//! Least-squares polynomial regression.
//!
//! The hyperparameter is the degree (rounded to the nearest integer). The
//! normalized time axis `[0, 1]` is mapped to `[-1, 1]` before building the
//! Vandermonde design to keep its conditioning reasonable up to degree ~10.

use nalgebra::{DMatrix, DVector};

use super::{Predictor, Regressor};
use crate::math::solve_least_squares;

/// Highest degree accepted; higher grid values are rejected as degenerate.
pub const MAX_DEGREE: usize = 15;

#[derive(Debug, Clone, Copy, Default)]
pub struct PolynomialRegressor;

#[derive(Debug, Clone)]
pub struct PolynomialModel {
    /// Coefficients in increasing power order on the `[-1, 1]` axis.
    coeffs: Vec<f64>,
}

impl PolynomialModel {
    pub fn degree(&self) -> usize {
        self.coeffs.len().saturating_sub(1)
    }
}

impl Predictor for PolynomialModel {
    fn predict(&self, x: f64) -> f64 {
        let u = to_unit(x);
        self.coeffs.iter().rev().fold(0.0, |acc, &c| acc * u + c)
    }
}

impl Regressor for PolynomialRegressor {
    type Model = PolynomialModel;

    fn name(&self) -> &'static str {
        "polynomial"
    }

    fn fit(&self, x: &[f64], y: &[f64], degree: f64) -> Option<PolynomialModel> {
        if !(degree.is_finite() && degree >= 0.0) {
            return None;
        }
        let degree = degree.round() as usize;
        let n = x.len();
        if degree > MAX_DEGREE || n != y.len() || n <= degree {
            return None;
        }

        let p = degree + 1;
        let mut design = DMatrix::<f64>::zeros(n, p);
        for (i, &xi) in x.iter().enumerate() {
            let u = to_unit(xi);
            let mut power = 1.0;
            for j in 0..p {
                design[(i, j)] = power;
                power *= u;
            }
        }
        let rhs = DVector::<f64>::from_row_slice(y);
        let beta = solve_least_squares(&design, &rhs)?;

        Some(PolynomialModel {
            coeffs: beta.iter().copied().collect(),
        })
    }
}

fn to_unit(x: f64) -> f64 {
    2.0 * x - 1.0
}
