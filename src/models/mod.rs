//! Regression backends for the automatic curve fitter.
//!
//! The fitter only needs two primitive operations:
//! - fit a model to `(x, y)` samples for one hyperparameter value
//! - predict `y(x)` from the fitted model
//!
//! Backends implement [`Regressor`] and are selected statically, so swapping
//! the smoothing technique never touches the depth/slope/duration detectors.
//! `x` is always time normalized to `[0, 1]` over the curve being fitted.

pub mod kernel;
pub mod polynomial;

pub use kernel::*;
pub use polynomial::*;

/// A fitted model that can be evaluated anywhere on the normalized axis.
pub trait Predictor: Send {
    fn predict(&self, x: f64) -> f64;

    fn predict_many(&self, xs: &[f64]) -> Vec<f64> {
        xs.iter().map(|&x| self.predict(x)).collect()
    }
}

/// A regression technique parameterized by one complexity hyperparameter.
pub trait Regressor: Sync {
    type Model: Predictor;

    /// Short name used in logs and diagnostics.
    fn name(&self) -> &'static str;

    /// Fit to samples. Returns `None` if the problem is degenerate for this
    /// hyperparameter (too few samples, singular system, invalid value).
    fn fit(&self, x: &[f64], y: &[f64], hyperparameter: f64) -> Option<Self::Model>;
}
