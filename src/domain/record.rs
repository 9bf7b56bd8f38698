//! Per-event outputs: dimming parameters, stage summaries and the event record.
//!
//! Every numeric field is an `Option<f64>`; `None` is the "undetermined"
//! sentinel and ends up as an empty cell in the exported catalog.

use serde::Serialize;

use super::LineIndex;

/// The three dimming parameters (plus their supporting times).
///
/// Depth is the signed minimum of the fitted curve relative to the pre-flare
/// zero level (percent, negative for a dip). Slopes are in percent per
/// second; all times are seconds relative to the flare peak.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DimmingParameters {
    pub depth: Option<f64>,
    pub depth_time: Option<f64>,
    pub slope_min: Option<f64>,
    pub slope_max: Option<f64>,
    pub slope_mean: Option<f64>,
    pub slope_start: Option<f64>,
    pub slope_end: Option<f64>,
    pub duration_start: Option<f64>,
    pub duration_end: Option<f64>,
    pub duration: Option<f64>,
}

impl DimmingParameters {
    /// Number of determined fields (used in run summaries).
    pub fn determined_count(&self) -> usize {
        [
            self.depth,
            self.depth_time,
            self.slope_min,
            self.slope_max,
            self.slope_mean,
            self.slope_start,
            self.slope_end,
            self.duration_start,
            self.duration_end,
            self.duration,
        ]
        .iter()
        .filter(|v| v.is_some())
        .count()
    }
}

/// Why a peak match could not be computed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum MatchFailure {
    /// Too few samples where both curves are finite inside the fitting window.
    InsufficientSamples { found: usize, required: usize },
    /// Peak alignment wanted a shift larger than allowed.
    ShiftTooLarge { shift: f64 },
    /// The least-squares scale was non-finite or non-positive.
    InvalidScale,
    /// The least-squares solver could not produce a solution.
    SolverFailed,
    /// The reference line has no pre-flare level, so it cannot be normalized.
    NoReferenceBaseline,
}

/// Outcome of the peak-match-subtract stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MatchStatus {
    Matched,
    /// Target and reference are the same line; the correction is a no-op.
    SelfPair,
    Failed(MatchFailure),
    /// The stage did not run (event skipped or target without baseline).
    NotAttempted,
}

impl MatchStatus {
    pub fn label(&self) -> &'static str {
        match self {
            MatchStatus::Matched => "matched",
            MatchStatus::SelfPair => "self_pair",
            MatchStatus::Failed(MatchFailure::InsufficientSamples { .. }) => "insufficient_samples",
            MatchStatus::Failed(MatchFailure::ShiftTooLarge { .. }) => "shift_too_large",
            MatchStatus::Failed(MatchFailure::InvalidScale) => "invalid_scale",
            MatchStatus::Failed(MatchFailure::SolverFailed) => "solver_failed",
            MatchStatus::Failed(MatchFailure::NoReferenceBaseline) => "no_reference_baseline",
            MatchStatus::NotAttempted => "not_attempted",
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, MatchStatus::Failed(_))
    }
}

/// Catalog-facing summary of the peak match.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PeakMatchSummary {
    pub status: MatchStatus,
    pub scale_factor: Option<f64>,
    pub time_shift: Option<f64>,
}

impl PeakMatchSummary {
    pub fn failed(failure: MatchFailure) -> Self {
        Self {
            status: MatchStatus::Failed(failure),
            scale_factor: None,
            time_shift: None,
        }
    }
}

/// Outcome of the automatic curve fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FitStatus {
    Accepted,
    /// Best validation score or final score below the configured minimum.
    BelowMinimumScore,
    InsufficientSamples,
    /// The search exceeded its fit-count or wall-clock budget.
    BudgetExceeded,
    /// No grid value produced a usable model.
    NoCandidates,
    /// The fit was not attempted (event skipped or no baseline).
    NotAttempted,
}

impl FitStatus {
    pub fn label(&self) -> &'static str {
        match self {
            FitStatus::Accepted => "accepted",
            FitStatus::BelowMinimumScore => "below_minimum_score",
            FitStatus::InsufficientSamples => "insufficient_samples",
            FitStatus::BudgetExceeded => "budget_exceeded",
            FitStatus::NoCandidates => "no_candidates",
            FitStatus::NotAttempted => "not_attempted",
        }
    }
}

/// Catalog-facing summary of the curve fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FitSummary {
    pub status: FitStatus,
    pub accepted: bool,
    /// Selected hyperparameter (γ for the RBF backend, degree for polynomials).
    pub hyperparameter: Option<f64>,
    /// Best mean validation score.
    pub validation_score: Option<f64>,
    /// Score of the final model refit on all samples.
    pub score: Option<f64>,
}

impl FitSummary {
    pub fn not_attempted() -> Self {
        Self {
            status: FitStatus::NotAttempted,
            accepted: false,
            hyperparameter: None,
            validation_score: None,
            score: None,
        }
    }
}

/// Overall state of one event record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    /// All stages ran (individual fields may still be undetermined).
    Complete,
    /// The flare was skipped (dimming window too short).
    Skipped,
    /// The target line had no pre-flare level.
    NoBaseline,
    /// Malformed input; this record alone failed.
    Failed,
}

impl RecordStatus {
    pub fn label(&self) -> &'static str {
        match self {
            RecordStatus::Complete => "complete",
            RecordStatus::Skipped => "skipped",
            RecordStatus::NoBaseline => "no_baseline",
            RecordStatus::Failed => "failed",
        }
    }
}

/// Per-flare facts shared by every record of that flare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FlareContext {
    /// Position of the flare in the catalog.
    pub flare_index: usize,
    /// Pre-flare levels were carried over from the previous flare.
    pub preflare_held_over: bool,
    /// The next flare cut the dimming window short.
    pub flare_interrupt: bool,
}

impl FlareContext {
    pub fn new(flare_index: usize) -> Self {
        Self {
            flare_index,
            preflare_held_over: false,
            flare_interrupt: false,
        }
    }
}

/// One flare × one ordered line pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventRecord {
    #[serde(flatten)]
    pub flare: FlareContext,
    pub target: LineIndex,
    pub reference: LineIndex,
    pub status: RecordStatus,
    /// Pre-flare level of the target line in input irradiance units.
    pub preflare: Option<f64>,
    pub peak_match: PeakMatchSummary,
    pub fit: FitSummary,
    pub dimming: DimmingParameters,
    /// Error message when `status == Failed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EventRecord {
    /// A record whose every field is undetermined.
    pub fn undetermined(
        flare: FlareContext,
        target: LineIndex,
        reference: LineIndex,
        status: RecordStatus,
        preflare: Option<f64>,
    ) -> Self {
        Self {
            flare,
            target,
            reference,
            status,
            preflare,
            peak_match: PeakMatchSummary {
                status: MatchStatus::NotAttempted,
                scale_factor: None,
                time_shift: None,
            },
            fit: FitSummary::not_attempted(),
            dimming: DimmingParameters::default(),
            error: None,
        }
    }

    pub fn is_self_pair(&self) -> bool {
        self.target == self.reference
    }

    /// Catalog ordering: flare, then target, then reference.
    pub fn sort_key(&self) -> (usize, LineIndex, LineIndex) {
        (self.flare.flare_index, self.target, self.reference)
    }
}
