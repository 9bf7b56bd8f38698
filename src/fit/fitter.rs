//! Automatic light curve fitting with validation-driven complexity selection.
//!
//! Given a (peak-corrected) light curve we:
//! 1. drop missing samples and normalize time to `[0, 1]`
//! 2. build the validation curve over the hyperparameter grid
//! 3. pick the best grid value and refit on every sample
//! 4. accept the fit only if both the best validation score and the final
//!    score reach the configured minimum
//!
//! The result is never an error: every way this can go wrong is reported as
//! a [`FitStatus`] with no fitted curve.

use tracing::debug;

use crate::domain::{FitStatus, FitSummary, LightCurve};
use crate::fit::validation::{BudgetTracker, FitBudget, ValidationPoint, select_best, validation_curve};
use crate::math::r2_score;
use crate::models::{Predictor, Regressor};

/// Options for one automatic fit.
#[derive(Debug, Clone)]
pub struct FitOptions {
    /// Expanded hyperparameter grid.
    pub grid: Vec<f64>,
    /// Number of validation folds (at least 2).
    pub folds: usize,
    /// Fits scoring below this (R²) are discarded.
    pub minimum_score: f64,
    pub budget: FitBudget,
}

/// Result of [`automatic_fit`].
#[derive(Debug, Clone)]
pub struct CurveFit {
    /// The fitted curve on the input time grid, present only when accepted.
    pub curve: Option<LightCurve>,
    pub summary: FitSummary,
    pub validation: Vec<ValidationPoint>,
}

impl CurveFit {
    fn rejected(status: FitStatus, validation: Vec<ValidationPoint>) -> Self {
        Self {
            curve: None,
            summary: FitSummary {
                status,
                accepted: false,
                hyperparameter: None,
                validation_score: None,
                score: None,
            },
            validation,
        }
    }
}

/// Minimum number of finite samples needed for `folds`-fold validation.
pub fn minimum_samples(folds: usize) -> usize {
    (2 * folds.max(2)).max(6)
}

/// Fit `curve` with `regressor`, selecting the hyperparameter by validation.
pub fn automatic_fit<R: Regressor>(curve: &LightCurve, regressor: &R, opts: &FitOptions) -> CurveFit {
    let (t, y) = curve.finite_samples();
    if t.len() < minimum_samples(opts.folds) || opts.grid.is_empty() {
        return CurveFit::rejected(FitStatus::InsufficientSamples, Vec::new());
    }

    let t0 = t[0];
    let span = t[t.len() - 1] - t0;
    if !span.is_finite() || span <= 0.0 {
        return CurveFit::rejected(FitStatus::InsufficientSamples, Vec::new());
    }
    let x: Vec<f64> = t.iter().map(|&ti| (ti - t0) / span).collect();

    let budget = BudgetTracker::new(opts.budget);
    let validation = match validation_curve(regressor, &x, &y, &opts.grid, opts.folds, &budget) {
        Ok(v) => v,
        Err(_) => {
            debug!(backend = regressor.name(), used = budget.used(), "fit budget exceeded during validation");
            return CurveFit::rejected(FitStatus::BudgetExceeded, Vec::new());
        }
    };

    let Some((best_idx, best_score)) = select_best(&validation) else {
        return CurveFit::rejected(FitStatus::NoCandidates, validation);
    };
    let hyperparameter = validation[best_idx].hyperparameter;

    if !budget.try_consume() {
        debug!(backend = regressor.name(), "fit budget exceeded before final refit");
        return CurveFit::rejected(FitStatus::BudgetExceeded, validation);
    }
    let Some(model) = regressor.fit(&x, &y, hyperparameter) else {
        return CurveFit::rejected(FitStatus::NoCandidates, validation);
    };

    let in_sample = model.predict_many(&x);
    let score = r2_score(&y, &in_sample);

    let accepted = best_score >= opts.minimum_score
        && score.is_some_and(|s| s.is_finite() && s >= opts.minimum_score);

    let summary = FitSummary {
        status: if accepted {
            FitStatus::Accepted
        } else {
            FitStatus::BelowMinimumScore
        },
        accepted,
        hyperparameter: Some(hyperparameter),
        validation_score: Some(best_score),
        score,
    };

    if !accepted {
        return CurveFit {
            curve: None,
            summary,
            validation,
        };
    }

    // Resample on the full input grid, including samples that were missing.
    let resampled: Vec<f64> = curve
        .time()
        .iter()
        .map(|&ti| model.predict((ti - t0) / span))
        .collect();
    let fitted = curve.with_irradiance(resampled).ok();

    CurveFit {
        curve: fitted,
        summary,
        validation,
    }
}
