//! Validation curve: held-out score as a function of the hyperparameter.
//!
//! Splits are interleaved k-fold (sample `i` is held out in fold `i mod k`).
//! For a light curve this keeps every fold spread over the whole time span, so
//! the score measures how well the model interpolates between neighbours
//! rather than how it extrapolates past an edge.
//!
//! Every individual model fit draws from a shared [`BudgetTracker`]; once the
//! budget is gone the search stops and reports [`BudgetExceeded`].

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::Serialize;

use crate::math::r2_score;
use crate::models::{Predictor, Regressor};

/// External compute budget for one automatic fit.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FitBudget {
    /// Maximum number of model fits (validation folds plus the final refit).
    pub max_fits: Option<usize>,
    /// Wall-clock limit for the whole search.
    pub timeout: Option<Duration>,
}

/// The search ran out of budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetExceeded;

/// Shared, thread-safe budget counter for one search.
#[derive(Debug)]
pub struct BudgetTracker {
    used: AtomicUsize,
    exhausted: AtomicBool,
    max_fits: Option<usize>,
    deadline: Option<Instant>,
}

impl BudgetTracker {
    pub fn new(budget: FitBudget) -> Self {
        Self {
            used: AtomicUsize::new(0),
            exhausted: AtomicBool::new(false),
            max_fits: budget.max_fits,
            deadline: budget.timeout.map(|t| Instant::now() + t),
        }
    }

    /// Reserve one model fit. Returns `false` once the budget is exhausted.
    pub fn try_consume(&self) -> bool {
        if self.exhausted.load(Ordering::Relaxed) {
            return false;
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                self.exhausted.store(true, Ordering::Relaxed);
                return false;
            }
        }
        let used = self.used.fetch_add(1, Ordering::Relaxed) + 1;
        if let Some(max) = self.max_fits {
            if used > max {
                self.exhausted.store(true, Ordering::Relaxed);
                return false;
            }
        }
        true
    }

    pub fn used(&self) -> usize {
        self.used.load(Ordering::Relaxed)
    }
}

/// One point of the validation curve.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationPoint {
    pub hyperparameter: f64,
    /// Mean held-out R² over folds; `None` if any fold could not be fitted.
    pub mean_score: Option<f64>,
    pub fold_scores: Vec<f64>,
}

/// Evaluate every grid value with k-fold validation (grid values in parallel).
pub fn validation_curve<R: Regressor>(
    regressor: &R,
    x: &[f64],
    y: &[f64],
    grid: &[f64],
    folds: usize,
    budget: &BudgetTracker,
) -> Result<Vec<ValidationPoint>, BudgetExceeded> {
    let folds = folds.max(2);
    grid.par_iter()
        .map(|&h| evaluate_hyperparameter(regressor, x, y, h, folds, budget))
        .collect()
}

fn evaluate_hyperparameter<R: Regressor>(
    regressor: &R,
    x: &[f64],
    y: &[f64],
    hyperparameter: f64,
    folds: usize,
    budget: &BudgetTracker,
) -> Result<ValidationPoint, BudgetExceeded> {
    let mut fold_scores = Vec::with_capacity(folds);
    let mut complete = true;

    for fold in 0..folds {
        let (train_x, train_y, test_x, test_y) = split_fold(x, y, fold, folds);
        if test_x.is_empty() || train_x.is_empty() {
            complete = false;
            continue;
        }
        if !budget.try_consume() {
            return Err(BudgetExceeded);
        }
        let Some(model) = regressor.fit(&train_x, &train_y, hyperparameter) else {
            complete = false;
            continue;
        };
        let predicted = model.predict_many(&test_x);
        match r2_score(&test_y, &predicted) {
            Some(score) => fold_scores.push(score),
            None => complete = false,
        }
    }

    let mean_score = if complete && !fold_scores.is_empty() {
        Some(fold_scores.iter().sum::<f64>() / fold_scores.len() as f64)
    } else {
        None
    };

    Ok(ValidationPoint {
        hyperparameter,
        mean_score,
        fold_scores,
    })
}

fn split_fold(
    x: &[f64],
    y: &[f64],
    fold: usize,
    folds: usize,
) -> (Vec<f64>, Vec<f64>, Vec<f64>, Vec<f64>) {
    let mut train_x = Vec::with_capacity(x.len());
    let mut train_y = Vec::with_capacity(x.len());
    let mut test_x = Vec::with_capacity(x.len() / folds + 1);
    let mut test_y = Vec::with_capacity(x.len() / folds + 1);
    for (i, (&xi, &yi)) in x.iter().zip(y.iter()).enumerate() {
        if i % folds == fold {
            test_x.push(xi);
            test_y.push(yi);
        } else {
            train_x.push(xi);
            train_y.push(yi);
        }
    }
    (train_x, train_y, test_x, test_y)
}

/// Pick the grid point with the highest mean score (ties: lowest grid index).
pub fn select_best(points: &[ValidationPoint]) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for (idx, p) in points.iter().enumerate() {
        let Some(score) = p.mean_score else { continue };
        if !score.is_finite() {
            continue;
        }
        match best {
            Some((_, s)) if score <= s => {}
            _ => best = Some((idx, score)),
        }
    }
    best
}
