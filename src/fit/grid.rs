//! Hyperparameter grid generation.
//!
//! The fitter selects model complexity by a deterministic grid search over one
//! hyperparameter (γ for the RBF backend, degree for polynomials). Grids are
//! described in configuration and expanded here.

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// A hyperparameter grid as written in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "scale", rename_all = "lowercase")]
pub enum GridSpec {
    /// `steps` log-spaced values in `[min, max]`.
    Log { min: f64, max: f64, steps: usize },
    /// `steps` evenly spaced values in `[min, max]`.
    Linear { min: f64, max: f64, steps: usize },
    /// An explicit list.
    Values { values: Vec<f64> },
}

impl GridSpec {
    pub fn expand(&self) -> Result<Vec<f64>, AppError> {
        match self {
            GridSpec::Log { min, max, steps } => log_space(*min, *max, *steps),
            GridSpec::Linear { min, max, steps } => linear_space(*min, *max, *steps),
            GridSpec::Values { values } => {
                if values.is_empty() {
                    return Err(AppError::config("Hyperparameter grid is empty."));
                }
                if values.iter().any(|v| !v.is_finite()) {
                    return Err(AppError::config("Hyperparameter grid contains a non-finite value."));
                }
                Ok(values.clone())
            }
        }
    }
}

/// Generate `steps` log-spaced points between `min` and `max` (inclusive).
pub fn log_space(min: f64, max: f64, steps: usize) -> Result<Vec<f64>, AppError> {
    if !(min.is_finite() && max.is_finite() && min > 0.0 && max > 0.0 && max > min) {
        return Err(AppError::config(format!(
            "Invalid log grid range: min={min}, max={max} (must be finite, >0, and max>min)."
        )));
    }
    if steps < 2 {
        return Err(AppError::config("Grid steps must be >= 2."));
    }

    let ln_min = min.ln();
    let ln_max = max.ln();
    let step = (ln_max - ln_min) / (steps as f64 - 1.0);

    let mut out = Vec::with_capacity(steps);
    for i in 0..steps {
        out.push((ln_min + step * i as f64).exp());
    }
    Ok(out)
}

/// Generate `steps` evenly spaced points between `min` and `max` (inclusive).
pub fn linear_space(min: f64, max: f64, steps: usize) -> Result<Vec<f64>, AppError> {
    if !(min.is_finite() && max.is_finite() && max > min) {
        return Err(AppError::config(format!(
            "Invalid linear grid range: min={min}, max={max} (must be finite and max>min)."
        )));
    }
    if steps < 2 {
        return Err(AppError::config("Grid steps must be >= 2."));
    }
    let step = (max - min) / (steps as f64 - 1.0);
    Ok((0..steps).map(|i| min + step * i as f64).collect())
}
