//! One event record: a flare and an ordered (target, reference) line pair.
//!
//! Stages run in order, each one feeding the next:
//!
//! 1. peak-match subtraction of the reference from the target
//! 2. automatic curve fit of the corrected target
//! 3. depth, slope and duration of the fitted curve
//!
//! The optional inputs of the detectors live in a [`StagePlan`]. It starts
//! from configuration and is overridden by upstream results (the slope search
//! ends at the depth time when a depth was found).

use tracing::warn;

use crate::config::PipelineConfig;
use crate::diagnostics::{Diagnostics, StageEvent, StageKey};
use crate::dimming::{
    PeakMatch, PeakMatchConfig, detect_depth, detect_duration, detect_slope, peak_match_subtract, self_pair,
};
use crate::domain::{
    DimmingParameters, EventRecord, FlareContext, LightCurve, LineIndex, MatchFailure, MatchStatus,
    RecordStatus, Window,
};
use crate::error::AppError;
use crate::fit::{FitOptions, automatic_fit};
use crate::models::Regressor;

/// Optional detector inputs for one record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StagePlan {
    /// Level the depth is measured from (percent of pre-flare).
    pub baseline: f64,
    pub depth_window: Window,
    pub slope_start: f64,
    /// `None` lets the slope detector fall back to the curve's own minimum.
    pub slope_end: Option<f64>,
    pub duration_start: f64,
}

impl StagePlan {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            baseline: config.depth_baseline,
            depth_window: config.depth_search_window.unwrap_or(Window::ALL),
            slope_start: config.slope_search_start,
            slope_end: config.slope_search_end,
            duration_start: config.duration_scan_start.unwrap_or(config.slope_search_start),
        }
    }

    /// End the slope search at the depth time, when there is one.
    pub fn with_depth_time(self, depth_time: Option<f64>) -> Self {
        Self {
            slope_end: depth_time.or(self.slope_end),
            ..self
        }
    }
}

impl Default for StagePlan {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

/// A line's dimming-window curve, ready for pairing.
#[derive(Debug, Clone, PartialEq)]
pub enum LineCurve {
    /// Percent of the pre-flare level.
    Normalized(LightCurve),
    /// The pre-flare level is undetermined.
    NoBaseline,
    /// The archive has no samples in the dimming window.
    NoData,
}

impl LineCurve {
    pub fn curve(&self) -> Option<&LightCurve> {
        match self {
            LineCurve::Normalized(c) => Some(c),
            _ => None,
        }
    }
}

/// Shared, read-only inputs for every record of a run.
pub struct RecordStages<'a, R, D> {
    pub peak_match: &'a PeakMatchConfig,
    pub fit: &'a FitOptions,
    pub plan: StagePlan,
    pub regressor: &'a R,
    pub diagnostics: &'a D,
}

/// Run every stage for one ordered pair. Never fails: malformed input turns
/// into a `Failed` record.
pub fn process_record<R: Regressor, D: Diagnostics>(
    flare: FlareContext,
    target: LineIndex,
    reference: LineIndex,
    curves: &[LineCurve],
    levels: &[Option<f64>],
    stages: &RecordStages<'_, R, D>,
) -> EventRecord {
    let preflare = levels.get(target).copied().flatten();
    match try_record(flare, target, reference, curves, preflare, stages) {
        Ok(record) => record,
        Err(e) => {
            warn!(
                flare = flare.flare_index,
                target,
                reference,
                error = %e,
                "record failed"
            );
            let mut record = EventRecord::undetermined(flare, target, reference, RecordStatus::Failed, preflare);
            record.error = Some(e.message().to_string());
            record
        }
    }
}

fn try_record<R: Regressor, D: Diagnostics>(
    flare: FlareContext,
    target: LineIndex,
    reference: LineIndex,
    curves: &[LineCurve],
    preflare: Option<f64>,
    stages: &RecordStages<'_, R, D>,
) -> Result<EventRecord, AppError> {
    let target_curve = match curves.get(target) {
        Some(LineCurve::Normalized(c)) => c,
        Some(LineCurve::NoBaseline) => {
            return Ok(EventRecord::undetermined(flare, target, reference, RecordStatus::NoBaseline, preflare));
        }
        Some(LineCurve::NoData) => {
            return Err(AppError::malformed("Target line has no samples in the dimming window."));
        }
        None => return Err(AppError::malformed(format!("Target line {target} does not exist."))),
    };
    let reference_curve = curves
        .get(reference)
        .ok_or_else(|| AppError::malformed(format!("Reference line {reference} does not exist.")))?;

    let key = StageKey {
        flare_index: flare.flare_index,
        target,
        reference,
    };
    let report = stages.diagnostics.enabled();

    // 1) Peak match.
    let matched = if target == reference {
        self_pair(target_curve)
    } else {
        match reference_curve.curve() {
            Some(r) => peak_match_subtract(target_curve, r, stages.peak_match)?,
            None => PeakMatch::passthrough(target_curve, MatchStatus::Failed(MatchFailure::NoReferenceBaseline)),
        }
    };
    if report {
        stages.diagnostics.on_stage(key, StageEvent::PeakMatch {
            target: target_curve,
            corrected: &matched.corrected,
            summary: &matched.summary,
        });
    }

    // 2) Fit.
    let fit = automatic_fit(&matched.corrected, stages.regressor, stages.fit);
    if report {
        stages.diagnostics.on_stage(key, StageEvent::Fit {
            input: &matched.corrected,
            fit: &fit,
        });
    }

    // 3) Dimming parameters.
    let dimming = match &fit.curve {
        Some(fitted) => {
            let dimming = extract_dimming(fitted, stages.plan);
            if report {
                stages.diagnostics.on_stage(key, StageEvent::Dimming {
                    fitted,
                    params: &dimming,
                });
            }
            dimming
        }
        None => DimmingParameters::default(),
    };

    Ok(EventRecord {
        flare,
        target,
        reference,
        status: RecordStatus::Complete,
        preflare,
        peak_match: matched.summary,
        fit: fit.summary,
        dimming,
        error: None,
    })
}

/// Depth, then slope (ending at the depth time), then duration.
pub fn extract_dimming(fitted: &LightCurve, plan: StagePlan) -> DimmingParameters {
    let depth = detect_depth(fitted, plan.depth_window, plan.baseline);
    let plan = plan.with_depth_time(depth.time);
    let slope = detect_slope(fitted, plan.slope_start, plan.slope_end);
    let duration = detect_duration(fitted, plan.duration_start);

    DimmingParameters {
        depth: depth.depth,
        depth_time: depth.time,
        slope_min: slope.min,
        slope_max: slope.max,
        slope_mean: slope.mean,
        slope_start: slope.start,
        slope_end: slope.end,
        duration_start: duration.start,
        duration_end: duration.end,
        duration: duration.duration,
    }
}
