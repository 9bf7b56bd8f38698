//! Shared domain types: light curves, time windows and flare events.
//!
//! Inside the analytical core time is plain `f64` seconds relative to the
//! flare peak (t = 0). Absolute timestamps only exist at the I/O boundary
//! (`FlareEvent`, `io::ingest`).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Index of an emission line inside the per-flare arena of light curves.
pub type LineIndex = usize;

/// Closed time interval `[start, end]` in seconds relative to the flare peak.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Window {
    pub start: f64,
    pub end: f64,
}

impl Window {
    /// The unbounded window; used when a stage should look at the whole curve.
    pub const ALL: Window = Window {
        start: f64::NEG_INFINITY,
        end: f64::INFINITY,
    };

    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, t: f64) -> bool {
        t >= self.start && t <= self.end
    }

    pub fn len(&self) -> f64 {
        self.end - self.start
    }

    /// A window is valid when neither bound is NaN and `start <= end`.
    pub fn is_valid(&self) -> bool {
        !self.start.is_nan() && !self.end.is_nan() && self.start <= self.end
    }
}

/// An irradiance light curve for one emission line.
///
/// Invariants (checked by [`LightCurve::new`]):
/// - at least one sample
/// - `time` and `irradiance` have the same length
/// - timestamps are finite and non-decreasing
///
/// Irradiance values may be `NaN`, which marks a missing sample. Gaps in the
/// cadence are kept as-is and never interpolated implicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LightCurve {
    time: Vec<f64>,
    irradiance: Vec<f64>,
}

impl LightCurve {
    pub fn new(time: Vec<f64>, irradiance: Vec<f64>) -> Result<Self, AppError> {
        if time.is_empty() {
            return Err(AppError::malformed("Light curve has no samples."));
        }
        if time.len() != irradiance.len() {
            return Err(AppError::malformed(format!(
                "Light curve length mismatch: {} timestamps vs {} irradiance values.",
                time.len(),
                irradiance.len()
            )));
        }
        if let Some(i) = time.iter().position(|t| !t.is_finite()) {
            return Err(AppError::malformed(format!(
                "Light curve timestamp {i} is not finite."
            )));
        }
        if let Some(i) = time.windows(2).position(|w| w[1] < w[0]) {
            return Err(AppError::malformed(format!(
                "Light curve timestamps decrease at sample {}: {} -> {}.",
                i + 1,
                time[i],
                time[i + 1]
            )));
        }
        Ok(Self { time, irradiance })
    }

    pub fn time(&self) -> &[f64] {
        &self.time
    }

    pub fn irradiance(&self) -> &[f64] {
        &self.irradiance
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.time.iter().copied().zip(self.irradiance.iter().copied())
    }

    /// Samples with a finite irradiance, split into `(time, irradiance)`.
    pub fn finite_samples(&self) -> (Vec<f64>, Vec<f64>) {
        self.iter().filter(|(_, y)| y.is_finite()).unzip()
    }

    /// First and last timestamp.
    pub fn span(&self) -> (f64, f64) {
        (self.time[0], self.time[self.time.len() - 1])
    }

    /// Samples inside `window`, or `None` if the window selects nothing.
    pub fn window(&self, window: Window) -> Option<LightCurve> {
        let (time, irradiance): (Vec<f64>, Vec<f64>) =
            self.iter().filter(|(t, _)| window.contains(*t)).unzip();
        if time.is_empty() {
            None
        } else {
            Some(LightCurve { time, irradiance })
        }
    }

    /// A new curve on the same time grid with replaced irradiance values.
    pub fn with_irradiance(&self, irradiance: Vec<f64>) -> Result<LightCurve, AppError> {
        if irradiance.len() != self.time.len() {
            return Err(AppError::malformed(format!(
                "Replacement irradiance has {} values for a grid of {}.",
                irradiance.len(),
                self.time.len()
            )));
        }
        Ok(LightCurve {
            time: self.time.clone(),
            irradiance,
        })
    }

    /// Apply `f` to every irradiance value, keeping the time grid.
    pub fn map_irradiance(&self, f: impl Fn(f64) -> f64) -> LightCurve {
        LightCurve {
            time: self.time.clone(),
            irradiance: self.irradiance.iter().map(|&y| f(y)).collect(),
        }
    }

    /// Whether `other` shares this curve's time grid within `tolerance` seconds.
    pub fn same_grid(&self, other: &LightCurve, tolerance: f64) -> bool {
        self.time.len() == other.time.len()
            && self
                .time
                .iter()
                .zip(other.time.iter())
                .all(|(a, b)| (a - b).abs() <= tolerance)
    }
}

/// GOES X-ray class letter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FlareLetter {
    A,
    B,
    C,
    M,
    X,
}

impl FlareLetter {
    /// Peak flux in W/m² for magnitude 1.0 of this letter.
    pub fn base_flux(self) -> f64 {
        match self {
            FlareLetter::A => 1e-8,
            FlareLetter::B => 1e-7,
            FlareLetter::C => 1e-6,
            FlareLetter::M => 1e-5,
            FlareLetter::X => 1e-4,
        }
    }
}

/// Flare strength class such as `C1.0` or `X2.2`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlareClass {
    pub letter: FlareLetter,
    pub magnitude: f64,
}

impl FlareClass {
    /// Peak 1-8 Å flux implied by the class.
    pub fn peak_flux(&self) -> f64 {
        self.letter.base_flux() * self.magnitude
    }
}

impl FromStr for FlareClass {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let mut chars = s.chars();
        let letter = match chars.next().map(|c| c.to_ascii_uppercase()) {
            Some('A') => FlareLetter::A,
            Some('B') => FlareLetter::B,
            Some('C') => FlareLetter::C,
            Some('M') => FlareLetter::M,
            Some('X') => FlareLetter::X,
            _ => return Err(AppError::malformed(format!("Invalid flare class '{s}'."))),
        };
        let rest = chars.as_str();
        let magnitude = if rest.is_empty() {
            1.0
        } else {
            rest.parse::<f64>()
                .ok()
                .filter(|m| m.is_finite() && *m > 0.0)
                .ok_or_else(|| AppError::malformed(format!("Invalid flare class magnitude in '{s}'.")))?
        };
        Ok(FlareClass { letter, magnitude })
    }
}

impl fmt::Display for FlareClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}{:.1}", self.letter, self.magnitude)
    }
}

/// A flare from the event catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlareEvent {
    pub start: DateTime<Utc>,
    pub peak: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    pub class: FlareClass,
}

impl FlareEvent {
    /// Seconds from the flare peak to `at` (negative before the peak).
    pub fn seconds_from_peak(&self, at: DateTime<Utc>) -> f64 {
        seconds_between(self.peak, at)
    }

    /// Onset time relative to the peak (usually negative).
    pub fn onset_offset(&self) -> f64 {
        self.seconds_from_peak(self.start)
    }
}

/// Signed seconds from `from` to `to`, with sub-second precision.
pub fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    let delta = to - from;
    delta.num_milliseconds() as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn light_curve_rejects_decreasing_time() {
        let err = LightCurve::new(vec![0.0, 2.0, 1.0], vec![1.0; 3]).unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_MALFORMED);
    }

    #[test]
    fn light_curve_rejects_empty_and_mismatched() {
        assert!(LightCurve::new(vec![], vec![]).is_err());
        assert!(LightCurve::new(vec![0.0, 1.0], vec![1.0]).is_err());
    }

    #[test]
    fn light_curve_accepts_repeated_timestamps_and_missing_values() {
        let curve = LightCurve::new(vec![0.0, 1.0, 1.0, 5.0], vec![1.0, f64::NAN, 2.0, 3.0]).unwrap();
        let (t, y) = curve.finite_samples();
        assert_eq!(t, vec![0.0, 1.0, 5.0]);
        assert_eq!(y, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn window_selects_inclusive_bounds() {
        let curve = LightCurve::new(vec![0.0, 1.0, 2.0, 3.0], vec![0.0, 1.0, 2.0, 3.0]).unwrap();
        let w = curve.window(Window::new(1.0, 2.0)).unwrap();
        assert_eq!(w.time(), &[1.0, 2.0]);
        assert!(curve.window(Window::new(10.0, 20.0)).is_none());
    }

    #[test]
    fn flare_class_parses_common_forms() {
        let c: FlareClass = "M1.5".parse().unwrap();
        assert_eq!(c.letter, FlareLetter::M);
        assert!((c.magnitude - 1.5).abs() < 1e-12);
        assert!((c.peak_flux() - 1.5e-5).abs() < 1e-18);

        let x: FlareClass = "x".parse().unwrap();
        assert_eq!(x.letter, FlareLetter::X);
        assert_eq!(x.to_string(), "X1.0");

        assert!("Q2.0".parse::<FlareClass>().is_err());
        assert!("C-1".parse::<FlareClass>().is_err());
    }
}
