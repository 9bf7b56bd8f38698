//! Per-stage diagnostics.
//!
//! The orchestrator reports every stage of every record to a [`Diagnostics`]
//! implementation. [`NoDiagnostics`] ignores everything and lets callers skip
//! building the report at all (`enabled() == false`).
//!
//! [`PlotWriter`] renders an ASCII plot per stage on the calling worker and
//! hands the text to a dedicated writer thread over a channel, so rayon
//! workers never wait on the filesystem. Files land in
//! `<dir>/flare_<k>/<target>_by_<reference>_<stage>.txt`.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use crate::domain::{DimmingParameters, LightCurve, LineIndex, PeakMatchSummary};
use crate::error::AppError;
use crate::fit::CurveFit;
use crate::plot::{Marker, render_curve_plot};

/// Which record a stage report belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageKey {
    pub flare_index: usize,
    pub target: LineIndex,
    pub reference: LineIndex,
}

/// A stage outcome, borrowed from the record being processed.
#[derive(Debug, Clone, Copy)]
pub enum StageEvent<'a> {
    PeakMatch {
        target: &'a LightCurve,
        corrected: &'a LightCurve,
        summary: &'a PeakMatchSummary,
    },
    Fit {
        input: &'a LightCurve,
        fit: &'a CurveFit,
    },
    Dimming {
        fitted: &'a LightCurve,
        params: &'a DimmingParameters,
    },
}

impl StageEvent<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            StageEvent::PeakMatch { .. } => "peak_match",
            StageEvent::Fit { .. } => "fit",
            StageEvent::Dimming { .. } => "dimming",
        }
    }
}

pub trait Diagnostics: Sync {
    /// `false` lets callers skip preparing stage reports.
    fn enabled(&self) -> bool;

    fn on_stage(&self, key: StageKey, event: StageEvent<'_>);
}

/// Discards every report.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDiagnostics;

impl Diagnostics for NoDiagnostics {
    fn enabled(&self) -> bool {
        false
    }

    fn on_stage(&self, _key: StageKey, _event: StageEvent<'_>) {}
}

struct PlotJob {
    path: PathBuf,
    text: String,
}

/// Writes one ASCII plot per stage on a background thread.
pub struct PlotWriter {
    dir: PathBuf,
    lines: Vec<String>,
    width: usize,
    height: usize,
    sender: Sender<PlotJob>,
    handle: JoinHandle<usize>,
}

impl PlotWriter {
    pub fn spawn(dir: &Path, lines: Vec<String>, width: usize, height: usize) -> Result<Self, AppError> {
        std::fs::create_dir_all(dir)
            .map_err(|e| AppError::config(format!("Failed to create plot directory '{}': {e}", dir.display())))?;

        let (sender, receiver) = mpsc::channel::<PlotJob>();
        let handle = thread::Builder::new()
            .name("jedi-plots".to_string())
            .spawn(move || {
                let mut written = 0usize;
                for job in receiver {
                    match write_job(&job) {
                        Ok(()) => written += 1,
                        Err(e) => warn!(path = %job.path.display(), error = %e, "failed to write diagnostic plot"),
                    }
                }
                written
            })
            .map_err(|e| AppError::config(format!("Failed to start plot writer: {e}")))?;

        Ok(Self {
            dir: dir.to_path_buf(),
            lines,
            width,
            height,
            sender,
            handle,
        })
    }

    /// Close the channel, wait for pending writes and return how many files were written.
    pub fn finish(self) -> Result<usize, AppError> {
        drop(self.sender);
        let written = self
            .handle
            .join()
            .map_err(|_| AppError::config("Plot writer thread panicked."))?;
        debug!(written, "diagnostic plots written");
        Ok(written)
    }

    /// `<dir>/flare_<k>/<target>_by_<reference>_<stage>.txt`
    pub fn path_for(&self, key: StageKey, stage: &str) -> PathBuf {
        self.dir.join(format!("flare_{}", key.flare_index)).join(format!(
            "{}_by_{}_{stage}.txt",
            file_stem(&self.line_name(key.target)),
            file_stem(&self.line_name(key.reference)),
        ))
    }

    fn line_name(&self, line: LineIndex) -> String {
        self.lines.get(line).cloned().unwrap_or_else(|| format!("line_{line}"))
    }

    fn render(&self, key: StageKey, event: &StageEvent<'_>) -> String {
        let mut text = format!(
            "flare {} | {} by {} | {}\n",
            key.flare_index,
            self.line_name(key.target),
            self.line_name(key.reference),
            event.name()
        );
        let plot = match *event {
            StageEvent::PeakMatch { target, corrected, summary } => {
                let _ = writeln!(
                    text,
                    "status={} scale={} shift={}",
                    summary.status.label(),
                    fmt_opt(summary.scale_factor),
                    fmt_opt(summary.time_shift)
                );
                render_curve_plot(target, Some(corrected), &[], self.width, self.height)
            }
            StageEvent::Fit { input, fit } => {
                let s = &fit.summary;
                let _ = writeln!(
                    text,
                    "status={} hyperparameter={} validation={} score={}",
                    s.status.label(),
                    fmt_opt(s.hyperparameter),
                    fmt_opt(s.validation_score),
                    fmt_opt(s.score)
                );
                for p in &fit.validation {
                    let _ = writeln!(text, "  {:>12.4e}  {}", p.hyperparameter, fmt_opt(p.mean_score));
                }
                render_curve_plot(input, fit.curve.as_ref(), &[], self.width, self.height)
            }
            StageEvent::Dimming { fitted, params } => {
                let _ = writeln!(
                    text,
                    "depth={} at {} | slope mean={} | duration={}",
                    fmt_opt(params.depth),
                    fmt_opt(params.depth_time),
                    fmt_opt(params.slope_mean),
                    fmt_opt(params.duration)
                );
                let mut markers = Vec::new();
                if let (Some(t), Some(d)) = (params.depth_time, params.depth) {
                    markers.push(Marker::new(t, d, 'D'));
                }
                if let Some(t) = params.duration_start {
                    markers.push(Marker::new(t, 0.0, '['));
                }
                if let Some(t) = params.duration_end {
                    markers.push(Marker::new(t, 0.0, ']'));
                }
                render_curve_plot(fitted, None, &markers, self.width, self.height)
            }
        };
        text.push_str(&plot);
        text
    }
}

impl Diagnostics for PlotWriter {
    fn enabled(&self) -> bool {
        true
    }

    fn on_stage(&self, key: StageKey, event: StageEvent<'_>) {
        let job = PlotJob {
            path: self.path_for(key, event.name()),
            text: self.render(key, &event),
        };
        if self.sender.send(job).is_err() {
            warn!("plot writer stopped; dropping diagnostic plot");
        }
    }
}

fn write_job(job: &PlotJob) -> std::io::Result<()> {
    if let Some(parent) = job.path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&job.path, &job.text)
}

fn file_stem(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
        .collect()
}

fn fmt_opt(v: Option<f64>) -> String {
    v.map(|v| format!("{v:.4}")).unwrap_or_else(|| "-".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MatchStatus, PeakMatchSummary};

    #[test]
    fn no_diagnostics_is_disabled() {
        assert!(!NoDiagnostics.enabled());
    }

    #[test]
    fn plot_writer_writes_partitioned_files() {
        let dir = tempfile::tempdir().unwrap();
        let writer = PlotWriter::spawn(dir.path(), vec!["Fe IX 171".to_string(), "He II 304".to_string()], 20, 6).unwrap();
        assert!(writer.enabled());

        let curve = LightCurve::new(vec![0.0, 60.0, 120.0], vec![0.0, -2.0, 1.0]).unwrap();
        let summary = PeakMatchSummary {
            status: MatchStatus::Matched,
            scale_factor: Some(0.5),
            time_shift: Some(0.0),
        };
        let key = StageKey {
            flare_index: 3,
            target: 0,
            reference: 1,
        };
        writer.on_stage(key, StageEvent::PeakMatch {
            target: &curve,
            corrected: &curve,
            summary: &summary,
        });
        let params = DimmingParameters {
            depth: Some(-2.0),
            depth_time: Some(60.0),
            ..DimmingParameters::default()
        };
        writer.on_stage(key, StageEvent::Dimming {
            fitted: &curve,
            params: &params,
        });

        let expected = dir.path().join("flare_3").join("Fe_IX_171_by_He_II_304_peak_match.txt");
        assert_eq!(writer.path_for(key, "peak_match"), expected);
        assert_eq!(writer.finish().unwrap(), 2);

        let text = std::fs::read_to_string(&expected).unwrap();
        assert!(text.starts_with("flare 3 | Fe IX 171 by He II 304 | peak_match\n"));
        assert!(text.contains("status=matched scale=0.5000"));
        let dimming = std::fs::read_to_string(dir.path().join("flare_3").join("Fe_IX_171_by_He_II_304_dimming.txt")).unwrap();
        assert!(dimming.contains('D'));
    }
}
