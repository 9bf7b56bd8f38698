//! Pipeline configuration.
//!
//! Sources, lowest priority first:
//!
//! - built-in defaults (`PipelineConfig::default()`)
//! - an optional TOML file (`--config` or `JEDI_CONFIG`, `.env` is honoured)
//! - CLI flags for the few knobs worth overriding per run
//!
//! Every duration is in seconds. Missing keys take their default; unknown
//! keys are rejected so a typo never silently falls back to a default.

use std::path::Path;
use std::time::Duration;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::dimming::{PeakMatchConfig, PreflareThresholds};
use crate::domain::Window;
use crate::error::AppError;
use crate::fit::{FitBudget, FitOptions, GridSpec};

/// Regression backend used by the curve fitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// RBF kernel ridge regression; hyperparameter γ.
    #[default]
    Rbf,
    /// Least-squares polynomial; hyperparameter degree.
    Polynomial,
}

impl Backend {
    /// Grid used when the configuration does not name one.
    pub fn default_grid(self) -> GridSpec {
        match self {
            Backend::Rbf => GridSpec::Log {
                min: 1.0,
                max: 1e5,
                steps: 24,
            },
            Backend::Polynomial => GridSpec::Linear {
                min: 1.0,
                max: 10.0,
                steps: 10,
            },
        }
    }
}

/// `[fit]` section: backend and compute budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FitSection {
    pub backend: Backend,
    pub folds: usize,
    /// Ridge term of the RBF backend.
    pub rbf_alpha: f64,
    pub max_fits: Option<usize>,
    pub timeout_secs: Option<f64>,
}

impl Default for FitSection {
    fn default() -> Self {
        Self {
            backend: Backend::Rbf,
            folds: 5,
            rbf_alpha: 0.1,
            max_fits: None,
            timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Length of the pre-flare window ending at the flare peak.
    pub preflare_window_len: f64,
    /// Pre-flare levels are held over from the previous flare when its peak
    /// is closer than this.
    pub threshold_time_prior_flare: f64,
    pub max_relative_std: f64,
    pub max_median_spread: f64,

    /// Dimming window is `[peak + left, peak + right]`, cut at the next flare.
    pub dimming_window_left: f64,
    pub dimming_window_right: f64,
    /// Events whose dimming window is shorter than this are skipped.
    pub min_dimming_window: f64,

    pub minimum_fit_score: f64,

    /// Level the depth is measured from, in percent of pre-flare.
    pub depth_baseline: f64,
    pub slope_search_start: f64,
    /// Upper bound for the slope search when no depth time is available.
    pub slope_search_end: Option<f64>,
    /// Defaults to the slope search start.
    pub duration_scan_start: Option<f64>,

    /// Rayon worker count; all logical CPUs when unset.
    pub threads: Option<usize>,

    /// Whole curve when unset.
    pub depth_search_window: Option<Window>,
    /// Backend default when unset.
    pub hyperparameter_grid: Option<GridSpec>,
    pub fit: FitSection,
    pub peak_match: PeakMatchConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            preflare_window_len: 240.0 * 60.0,
            threshold_time_prior_flare: 240.0 * 60.0,
            max_relative_std: 0.5,
            max_median_spread: 1.5,
            dimming_window_left: 0.0,
            dimming_window_right: 240.0 * 60.0,
            min_dimming_window: 120.0 * 60.0,
            minimum_fit_score: 0.5,
            depth_baseline: 0.0,
            slope_search_start: 0.0,
            slope_search_end: None,
            duration_scan_start: None,
            threads: None,
            depth_search_window: None,
            hyperparameter_grid: None,
            fit: FitSection::default(),
            peak_match: PeakMatchConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load and validate a configuration; defaults only when `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        let config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|e| {
                    AppError::config(format!("Failed to read config {}: {e}", path.display()))
                })?;
                Self::from_toml(&text)
                    .map_err(|e| AppError::config(format!("{}: {}", path.display(), e.message())))?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, AppError> {
        toml::from_str(text).map_err(|e| AppError::config(format!("Invalid config: {e}")))
    }

    pub fn to_toml(&self) -> Result<String, AppError> {
        toml::to_string_pretty(self).map_err(|e| AppError::config(format!("Failed to serialize config: {e}")))
    }

    pub fn validate(&self) -> Result<(), AppError> {
        positive("preflare_window_len", self.preflare_window_len)?;
        non_negative("threshold_time_prior_flare", self.threshold_time_prior_flare)?;
        non_negative("max_relative_std", self.max_relative_std)?;
        non_negative("max_median_spread", self.max_median_spread)?;
        finite("dimming_window_left", self.dimming_window_left)?;
        finite("dimming_window_right", self.dimming_window_right)?;
        if self.dimming_window_right <= self.dimming_window_left {
            return Err(AppError::config(format!(
                "dimming_window_right ({}) must be greater than dimming_window_left ({}).",
                self.dimming_window_right, self.dimming_window_left
            )));
        }
        non_negative("min_dimming_window", self.min_dimming_window)?;
        finite("minimum_fit_score", self.minimum_fit_score)?;
        finite("depth_baseline", self.depth_baseline)?;
        finite("slope_search_start", self.slope_search_start)?;
        if let Some(end) = self.slope_search_end {
            finite("slope_search_end", end)?;
            if end < self.slope_search_start {
                return Err(AppError::config("slope_search_end is before slope_search_start."));
            }
        }
        if let Some(start) = self.duration_scan_start {
            finite("duration_scan_start", start)?;
        }
        if let Some(w) = self.depth_search_window {
            valid_window("depth_search_window", w)?;
        }
        if self.threads == Some(0) {
            return Err(AppError::config("threads must be at least 1."));
        }

        if self.fit.folds < 2 {
            return Err(AppError::config("fit.folds must be at least 2."));
        }
        positive("fit.rbf_alpha", self.fit.rbf_alpha)?;
        if self.fit.max_fits == Some(0) {
            return Err(AppError::config("fit.max_fits must be at least 1."));
        }
        if let Some(t) = self.fit.timeout_secs {
            non_negative("fit.timeout_secs", t)?;
        }
        self.grid().expand()?;

        let pm = &self.peak_match;
        valid_window("peak_match.fit_window", pm.fit_window)?;
        non_negative("peak_match.max_shift", pm.max_shift)?;
        if pm.min_samples == 0 {
            return Err(AppError::config("peak_match.min_samples must be at least 1."));
        }
        Ok(())
    }

    pub fn preflare_thresholds(&self) -> PreflareThresholds {
        PreflareThresholds {
            max_relative_std: self.max_relative_std,
            max_median_spread: self.max_median_spread,
        }
    }

    /// Configured hyperparameter grid, or the backend's default.
    pub fn grid(&self) -> GridSpec {
        self.hyperparameter_grid
            .clone()
            .unwrap_or_else(|| self.fit.backend.default_grid())
    }

    pub fn fit_options(&self) -> Result<FitOptions, AppError> {
        Ok(FitOptions {
            grid: self.grid().expand()?,
            folds: self.fit.folds,
            minimum_score: self.minimum_fit_score,
            budget: FitBudget {
                max_fits: self.fit.max_fits,
                timeout: self.fit.timeout_secs.and_then(|s| Duration::try_from_secs_f64(s).ok()),
            },
        })
    }
}

fn finite(name: &str, v: f64) -> Result<(), AppError> {
    if v.is_finite() {
        Ok(())
    } else {
        Err(AppError::config(format!("{name} must be finite (got {v}).")))
    }
}

fn non_negative(name: &str, v: f64) -> Result<(), AppError> {
    finite(name, v)?;
    if v < 0.0 {
        return Err(AppError::config(format!("{name} must be >= 0 (got {v}).")));
    }
    Ok(())
}

fn positive(name: &str, v: f64) -> Result<(), AppError> {
    finite(name, v)?;
    if v <= 0.0 {
        return Err(AppError::config(format!("{name} must be > 0 (got {v}).")));
    }
    Ok(())
}

fn valid_window(name: &str, w: Window) -> Result<(), AppError> {
    if !w.is_valid() {
        return Err(AppError::config(format!(
            "{name} is inverted or NaN: [{}, {}].",
            w.start, w.end
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimming::AlignMode;
    use crate::error::EXIT_CONFIG;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = PipelineConfig::default();
        config.validate().unwrap();
        let opts = config.fit_options().unwrap();
        assert_eq!(opts.grid.len(), 24);
        assert_eq!(opts.folds, 5);
        assert_eq!(opts.budget, FitBudget::default());
    }

    #[test]
    fn partial_file_overrides_defaults() {
        let config = PipelineConfig::from_toml(
            r#"
            minimum_fit_score = 0.8
            threads = 2

            [fit]
            backend = "polynomial"
            max_fits = 500

            [peak_match]
            align = "peak"

            [peak_match.fit_window]
            start = -600.0
            end = 900.0
            "#,
        )
        .unwrap();
        config.validate().unwrap();

        assert_eq!(config.minimum_fit_score, 0.8);
        assert_eq!(config.threads, Some(2));
        assert_eq!(config.fit.backend, Backend::Polynomial);
        assert_eq!(config.fit.folds, 5);
        assert_eq!(config.peak_match.align, AlignMode::Peak);
        assert_eq!(config.peak_match.fit_window, Window::new(-600.0, 900.0));
        assert_eq!(config.peak_match.min_samples, 3);
        assert_eq!(config.preflare_window_len, 14400.0);

        let grid = config.fit_options().unwrap().grid;
        assert_eq!(grid.first(), Some(&1.0));
        assert_eq!(grid.len(), 10);
    }

    #[test]
    fn explicit_grid_wins_over_backend_default() {
        let config = PipelineConfig::from_toml(
            r#"
            [hyperparameter_grid]
            scale = "values"
            values = [2.0, 3.0]
            "#,
        )
        .unwrap();
        assert_eq!(config.fit_options().unwrap().grid, vec![2.0, 3.0]);
    }

    #[test]
    fn unknown_keys_and_bad_values_are_config_errors() {
        let err = PipelineConfig::from_toml("minimum_fit_scor = 0.8").unwrap_err();
        assert_eq!(err.exit_code(), EXIT_CONFIG);

        let inverted = PipelineConfig {
            dimming_window_left: 100.0,
            dimming_window_right: 50.0,
            ..PipelineConfig::default()
        };
        assert_eq!(inverted.validate().unwrap_err().exit_code(), EXIT_CONFIG);

        let nan = PipelineConfig {
            max_relative_std: f64::NAN,
            ..PipelineConfig::default()
        };
        assert!(nan.validate().is_err());

        let mut bad_window = PipelineConfig::default();
        bad_window.peak_match.fit_window = Window::new(10.0, -10.0);
        assert!(bad_window.validate().is_err());
    }

    #[test]
    fn printed_config_loads_back() {
        let config = PipelineConfig {
            slope_search_end: Some(3600.0),
            depth_search_window: Some(Window::new(0.0, 7200.0)),
            ..PipelineConfig::default()
        };
        let text = config.to_toml().unwrap();

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        let loaded = PipelineConfig::load(Some(file.path())).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = PipelineConfig::load(Some(Path::new("/nonexistent/jedi.toml"))).unwrap_err();
        assert_eq!(err.exit_code(), EXIT_CONFIG);
    }
}
