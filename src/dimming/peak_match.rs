//! Peak-match subtraction.
//!
//! A flare brightens every line; a dimming is a deficit *after* that. To see
//! the deficit in a target line we scale a reference line (mostly flare
//! emission) onto the target inside a fitting window around the peak and
//! subtract it:
//!
//! ```text
//! corrected(t) = target(t) − s · reference(t − shift)
//! ```
//!
//! `s` is the least-squares scale over the fitting window. `shift` is zero
//! unless peak alignment is enabled.

use clap::ValueEnum;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::domain::{LightCurve, MatchFailure, MatchStatus, PeakMatchSummary, Window};
use crate::error::AppError;
use crate::math::{argmax, interp, solve_least_squares};

/// Grids whose timestamps differ by more than this are rejected.
pub const GRID_TOLERANCE: f64 = 1e-6;

/// How the reference is aligned in time before scaling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AlignMode {
    /// Use the reference as-is.
    #[default]
    Off,
    /// Shift the reference so its maximum coincides with the target maximum.
    Peak,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PeakMatchConfig {
    pub align: AlignMode,
    /// Largest accepted alignment shift in seconds.
    pub max_shift: f64,
    pub min_samples: usize,
    /// Window (seconds from the flare peak) used to solve for the scale.
    pub fit_window: Window,
}

impl Default for PeakMatchConfig {
    fn default() -> Self {
        Self {
            align: AlignMode::Off,
            max_shift: 600.0,
            min_samples: 3,
            fit_window: Window::new(-300.0, 1800.0),
        }
    }
}

/// Corrected target curve and the catalog summary.
#[derive(Debug, Clone, PartialEq)]
pub struct PeakMatch {
    pub corrected: LightCurve,
    pub summary: PeakMatchSummary,
}

impl PeakMatch {
    /// The target unchanged, with `status`.
    pub fn passthrough(target: &LightCurve, status: MatchStatus) -> Self {
        Self {
            corrected: target.clone(),
            summary: PeakMatchSummary {
                status,
                scale_factor: None,
                time_shift: None,
            },
        }
    }

    fn failed(target: &LightCurve, failure: MatchFailure) -> Self {
        Self::passthrough(target, MatchStatus::Failed(failure))
    }
}

/// The target paired with itself: nothing to subtract.
pub fn self_pair(target: &LightCurve) -> PeakMatch {
    PeakMatch::passthrough(target, MatchStatus::SelfPair)
}

/// Subtract the scaled `reference` from `target`.
///
/// Both curves must share a time grid; that is the only hard error. Every
/// other problem returns the target unchanged with a `Failed` status.
pub fn peak_match_subtract(
    target: &LightCurve,
    reference: &LightCurve,
    config: &PeakMatchConfig,
) -> Result<PeakMatch, AppError> {
    if !target.same_grid(reference, GRID_TOLERANCE) {
        return Err(AppError::malformed(format!(
            "Peak match needs a shared time grid: target has {} samples, reference {}.",
            target.len(),
            reference.len()
        )));
    }

    let time = target.time();
    let window = config.fit_window;

    let shift = match config.align {
        AlignMode::Off => 0.0,
        AlignMode::Peak => {
            let (Some(tp), Some(rp)) = (peak_time(target, window), peak_time(reference, window)) else {
                return Ok(PeakMatch::failed(
                    target,
                    MatchFailure::InsufficientSamples {
                        found: 0,
                        required: config.min_samples,
                    },
                ));
            };
            let shift = tp - rp;
            if shift.abs() > config.max_shift {
                return Ok(PeakMatch::failed(target, MatchFailure::ShiftTooLarge { shift }));
            }
            shift
        }
    };

    let shifted: Vec<f64> = if shift == 0.0 {
        reference.irradiance().to_vec()
    } else {
        time.iter()
            .map(|&t| interp(reference.time(), reference.irradiance(), t - shift))
            .collect()
    };

    let (ref_fit, target_fit): (Vec<f64>, Vec<f64>) = time
        .iter()
        .zip(target.irradiance().iter().zip(shifted.iter()))
        .filter(|(t, (y, r))| window.contains(**t) && y.is_finite() && r.is_finite())
        .map(|(_, (&y, &r))| (r, y))
        .unzip();

    let required = config.min_samples.max(1);
    if ref_fit.len() < required {
        return Ok(PeakMatch::failed(
            target,
            MatchFailure::InsufficientSamples {
                found: ref_fit.len(),
                required,
            },
        ));
    }

    let design = DMatrix::<f64>::from_column_slice(ref_fit.len(), 1, &ref_fit);
    let rhs = DVector::<f64>::from_row_slice(&target_fit);
    let Some(beta) = solve_least_squares(&design, &rhs) else {
        return Ok(PeakMatch::failed(target, MatchFailure::SolverFailed));
    };
    let scale = beta[0];
    if !scale.is_finite() || scale <= 0.0 {
        return Ok(PeakMatch::failed(target, MatchFailure::InvalidScale));
    }

    let corrected: Vec<f64> = target
        .irradiance()
        .iter()
        .zip(shifted.iter())
        .map(|(&y, &r)| if r.is_finite() { y - scale * r } else { y })
        .collect();

    Ok(PeakMatch {
        corrected: target.with_irradiance(corrected)?,
        summary: PeakMatchSummary {
            status: MatchStatus::Matched,
            scale_factor: Some(scale),
            time_shift: Some(shift),
        },
    })
}

fn peak_time(curve: &LightCurve, window: Window) -> Option<f64> {
    let inside = curve.window(window)?;
    argmax(inside.irradiance()).map(|(i, _)| inside.time()[i])
}
