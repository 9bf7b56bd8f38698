//! Catalog pipeline shared by the `run` command and the tests.
//!
//! Per flare, in catalog order:
//! pre-flare levels (estimated or held over) -> dimming window -> percent
//! normalization -> every ordered line pair in parallel.
//!
//! Flares are processed one after another because hold-over carries the
//! previous flare's levels forward; the records of one flare are independent.

use chrono::{DateTime, Duration, Utc};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::app::record::{LineCurve, RecordStages, StagePlan, process_record};
use crate::config::PipelineConfig;
use crate::diagnostics::Diagnostics;
use crate::dimming::{PreflareThresholds, estimate_preflare};
use crate::domain::{EventRecord, FlareContext, FlareEvent, RecordStatus, seconds_between};
use crate::error::AppError;
use crate::io::ingest::{FlareCatalog, LightCurveSource};
use crate::models::Regressor;

/// What happened to one flare.
#[derive(Debug, Clone, PartialEq)]
pub struct FlareOutcome {
    pub context: FlareContext,
    /// Pre-flare level per line, in input units.
    pub levels: Vec<Option<f64>>,
    /// Window the levels were estimated over; an earlier flare's when held over.
    pub preflare_start: DateTime<Utc>,
    pub preflare_end: DateTime<Utc>,
    /// Length of the dimming window in seconds.
    pub window: f64,
    pub skipped: bool,
}

/// Receives each flare's records, sorted, as soon as the flare is done.
///
/// Flares arrive in catalog order, so a sink that appends sees the whole run
/// in [`EventRecord::sort_key`] order without holding it in memory.
pub trait RecordSink {
    fn write_flare(
        &mut self,
        flare: &FlareEvent,
        outcome: &FlareOutcome,
        records: &[EventRecord],
    ) -> Result<(), AppError>;
}

/// All computed outputs of one catalog run, kept in memory.
#[derive(Debug, Clone, Default)]
pub struct RunOutput {
    /// Sorted by flare, target, reference.
    pub records: Vec<EventRecord>,
    pub flares: Vec<FlareOutcome>,
}

impl RecordSink for RunOutput {
    fn write_flare(
        &mut self,
        _flare: &FlareEvent,
        outcome: &FlareOutcome,
        records: &[EventRecord],
    ) -> Result<(), AppError> {
        self.records.extend_from_slice(records);
        self.flares.push(outcome.clone());
        Ok(())
    }
}

/// Rayon pool with `threads` workers (all logical CPUs when `None`).
pub fn build_pool(threads: Option<usize>) -> Result<rayon::ThreadPool, AppError> {
    let mut builder = rayon::ThreadPoolBuilder::new().thread_name(|i| format!("jedi-worker-{i}"));
    if let Some(n) = threads {
        builder = builder.num_threads(n);
    }
    builder
        .build()
        .map_err(|e| AppError::config(format!("Failed to build thread pool: {e}")))
}

/// Run the full catalog and collect every record.
pub fn run_catalog<S, R, D>(
    source: &S,
    flares: &FlareCatalog,
    config: &PipelineConfig,
    regressor: &R,
    diagnostics: &D,
) -> Result<RunOutput, AppError>
where
    S: LightCurveSource,
    R: Regressor,
    D: Diagnostics,
{
    let mut out = RunOutput::default();
    stream_catalog(source, flares, config, regressor, diagnostics, &mut out)?;
    Ok(out)
}

/// Run the full catalog on a dedicated pool sized by `config.threads`,
/// handing each flare's records to `sink`.
pub fn stream_catalog<S, R, D, K>(
    source: &S,
    flares: &FlareCatalog,
    config: &PipelineConfig,
    regressor: &R,
    diagnostics: &D,
    sink: &mut K,
) -> Result<(), AppError>
where
    S: LightCurveSource,
    R: Regressor,
    D: Diagnostics,
    K: RecordSink + Send + ?Sized,
{
    config.validate()?;
    let pool = build_pool(config.threads)?;
    pool.install(|| run_flares(source, flares, config, regressor, diagnostics, sink))
}

fn run_flares<S, R, D, K>(
    source: &S,
    flares: &FlareCatalog,
    config: &PipelineConfig,
    regressor: &R,
    diagnostics: &D,
    sink: &mut K,
) -> Result<(), AppError>
where
    S: LightCurveSource,
    R: Regressor,
    D: Diagnostics,
    K: RecordSink + ?Sized,
{
    let lines = source.line_names().len();
    if lines == 0 {
        return Err(AppError::malformed("The irradiance source has no emission lines."));
    }
    let fit = config.fit_options()?;
    let stages = RecordStages {
        peak_match: &config.peak_match,
        fit: &fit,
        plan: StagePlan::from_config(config),
        regressor,
        diagnostics,
    };
    let thresholds = config.preflare_thresholds();

    info!(flares = flares.len(), lines, backend = regressor.name(), "catalog run started");

    let mut written = 0usize;
    let mut held: Option<HeldLevels> = None;

    for (k, flare) in flares.iter().enumerate() {
        let mut context = FlareContext::new(k);

        // 1) Pre-flare levels.
        let levels = match held.take() {
            Some(previous) if seconds_between(previous.peak, flare.peak) <= config.threshold_time_prior_flare => {
                context.preflare_held_over = true;
                previous
            }
            _ => {
                let start = offset(flare.peak, -config.preflare_window_len);
                HeldLevels {
                    peak: flare.peak,
                    start,
                    end: flare.peak,
                    levels: estimate_levels(source, flare, k, start, &thresholds),
                }
            }
        };
        let levels = held.insert(HeldLevels {
            peak: flare.peak,
            ..levels
        });
        let mut outcome = FlareOutcome {
            context,
            levels: levels.levels.clone(),
            preflare_start: levels.start,
            preflare_end: levels.end,
            window: 0.0,
            skipped: false,
        };

        // 2) Dimming window, cut at the next flare.
        let start = offset(flare.peak, config.dimming_window_left);
        let mut end = offset(flare.peak, config.dimming_window_right);
        if let Some(next) = flares.get(k + 1) {
            if next.peak < end {
                end = next.peak;
                outcome.context.flare_interrupt = true;
            }
        }
        outcome.window = seconds_between(start, end);
        let context = outcome.context;

        let mut flare_records: Vec<EventRecord> = if outcome.window < config.min_dimming_window {
            info!(
                flare = k,
                window_min = outcome.window / 60.0,
                minimum_min = config.min_dimming_window / 60.0,
                "dimming window too short; skipping flare"
            );
            outcome.skipped = true;
            all_pairs(lines)
                .map(|(t, r)| EventRecord::undetermined(context, t, r, RecordStatus::Skipped, outcome.levels[t]))
                .collect()
        } else {
            // 3) Percent of pre-flare.
            let curves: Vec<LineCurve> = (0..lines)
                .into_par_iter()
                .map(|j| normalized_curve(source, j, outcome.levels[j], start, end, flare.peak))
                .collect();

            // 4) Every ordered pair.
            let pairs: Vec<(usize, usize)> = all_pairs(lines).collect();
            let records: Vec<EventRecord> = pairs
                .par_iter()
                .map(|&(t, r)| process_record(context, t, r, &curves, &outcome.levels, &stages))
                .collect();

            let failed = records.iter().filter(|r| r.status == RecordStatus::Failed).count();
            info!(
                flare = k,
                held_over = context.preflare_held_over,
                interrupted = context.flare_interrupt,
                records = records.len(),
                failed,
                "flare processed"
            );
            records
        };

        flare_records.sort_by_key(EventRecord::sort_key);
        sink.write_flare(flare, &outcome, &flare_records)?;
        written += flare_records.len();
    }

    info!(records = written, "catalog run finished");
    Ok(())
}

/// Pre-flare levels carried to the next flare.
struct HeldLevels {
    /// Peak of the flare that last used these levels.
    peak: DateTime<Utc>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    levels: Vec<Option<f64>>,
}

fn all_pairs(lines: usize) -> impl Iterator<Item = (usize, usize)> {
    (0..lines).flat_map(move |t| (0..lines).map(move |r| (t, r)))
}

fn offset(at: DateTime<Utc>, seconds: f64) -> DateTime<Utc> {
    at + Duration::milliseconds((seconds * 1000.0).round() as i64)
}

fn estimate_levels<S: LightCurveSource>(
    source: &S,
    flare: &FlareEvent,
    flare_index: usize,
    start: DateTime<Utc>,
    thresholds: &PreflareThresholds,
) -> Vec<Option<f64>> {
    let onset = flare.onset_offset();
    (0..source.line_names().len())
        .into_par_iter()
        .map(|j| match source.light_curve(j, start, flare.peak, flare.peak) {
            Ok(Some(curve)) => {
                let estimate = estimate_preflare(&curve, onset, thresholds);
                if let Some(reason) = &estimate.rejection {
                    debug!(flare = flare_index, line = j, %reason, "pre-flare level undetermined");
                }
                estimate.level
            }
            Ok(None) => {
                debug!(flare = flare_index, line = j, "no pre-flare samples");
                None
            }
            Err(e) => {
                warn!(flare = flare_index, line = j, error = %e, "pre-flare curve unreadable");
                None
            }
        })
        .collect()
}

fn normalized_curve<S: LightCurveSource>(
    source: &S,
    line: usize,
    level: Option<f64>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    origin: DateTime<Utc>,
) -> LineCurve {
    let Some(level) = level else {
        return LineCurve::NoBaseline;
    };
    match source.light_curve(line, start, end, origin) {
        Ok(Some(curve)) => LineCurve::Normalized(curve.map_irradiance(|v| (v - level) / level * 100.0)),
        Ok(None) => LineCurve::NoData,
        Err(e) => {
            warn!(line, error = %e, "dimming window curve unreadable");
            LineCurve::NoData
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Backend;
    use crate::data::{SynthConfig, generate};
    use crate::diagnostics::NoDiagnostics;
    use crate::domain::{FlareClass, FlareLetter, MatchFailure, MatchStatus};
    use crate::io::ingest::IrradianceArchive;
    use crate::models::PolynomialRegressor;
    use chrono::TimeZone;

    fn polynomial_config() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.fit.backend = Backend::Polynomial;
        config.threads = Some(2);
        config
    }

    fn flare_at(peak: DateTime<Utc>) -> FlareEvent {
        FlareEvent {
            start: peak - Duration::minutes(12),
            peak,
            end: Some(peak + Duration::minutes(30)),
            class: FlareClass {
                letter: FlareLetter::M,
                magnitude: 1.0,
            },
        }
    }

    #[test]
    fn synthetic_run_recovers_the_dimming_line() {
        let synth = SynthConfig {
            lines: 2,
            flares: 2,
            missing_probability: 0.0,
            ..SynthConfig::default()
        };
        let data = generate(&synth).unwrap();
        let out = run_catalog(
            &data.archive,
            &data.flares,
            &polynomial_config(),
            &PolynomialRegressor,
            &NoDiagnostics,
        )
        .unwrap();

        assert_eq!(out.records.len(), 2 * 2 * 2);
        let keys: Vec<_> = out.records.iter().map(EventRecord::sort_key).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);

        for outcome in &out.flares {
            assert!(!outcome.skipped);
            assert!(!outcome.context.preflare_held_over);
            assert!(!outcome.context.flare_interrupt);
            assert!(outcome.levels.iter().all(Option::is_some));
        }
        assert!(out.records.iter().all(|r| r.status == RecordStatus::Complete));

        let dimming = out
            .records
            .iter()
            .find(|r| r.flare.flare_index == 0 && r.target == 0 && r.reference == 1)
            .unwrap();
        assert_eq!(dimming.peak_match.status, MatchStatus::Matched);
        assert!(dimming.fit.accepted, "{:?}", dimming.fit);
        let depth = dimming.dimming.depth.unwrap();
        assert!((-4.5..-2.0).contains(&depth), "depth {depth}");
        let at = dimming.dimming.depth_time.unwrap();
        assert!((1500.0..5000.0).contains(&at), "depth time {at}");
    }

    #[test]
    fn close_flares_hold_over_interrupt_and_skip() {
        let synth = SynthConfig {
            lines: 2,
            flares: 1,
            missing_probability: 0.0,
            ..SynthConfig::default()
        };
        let data = generate(&synth).unwrap();
        let peak = data.flares.get(0).unwrap().peak;
        let flares = FlareCatalog::new(vec![
            flare_at(peak),
            flare_at(peak + Duration::hours(3)),
            flare_at(peak + Duration::hours(4)),
        ]);

        let out = run_catalog(&data.archive, &flares, &polynomial_config(), &PolynomialRegressor, &NoDiagnostics).unwrap();
        assert_eq!(out.records.len(), 3 * 4);

        let first = &out.flares[0];
        assert!(first.context.flare_interrupt && !first.context.preflare_held_over && !first.skipped);
        assert!((first.window - 3.0 * 3600.0).abs() < 1e-9);

        assert_eq!(first.preflare_end, peak);
        assert_eq!(
            seconds_between(first.preflare_start, first.preflare_end),
            polynomial_config().preflare_window_len
        );

        let second = &out.flares[1];
        assert!(second.context.preflare_held_over && second.skipped);
        assert_eq!(second.levels, first.levels);
        assert_eq!((second.preflare_start, second.preflare_end), (first.preflare_start, first.preflare_end));

        let third = &out.flares[2];
        assert!(third.context.preflare_held_over && !third.context.flare_interrupt && !third.skipped);

        for record in &out.records {
            let skipped = record.status == RecordStatus::Skipped;
            assert_eq!(skipped, record.flare.flare_index == 1);
            if skipped {
                assert_eq!(record.dimming.determined_count(), 0);
                assert!(record.preflare.is_some());
            }
        }
    }

    #[test]
    fn line_without_baseline_degrades_its_pairs() {
        let epoch = Utc.with_ymd_and_hms(2012, 3, 7, 0, 0, 0).unwrap();
        let peak = epoch + Duration::hours(5);
        let times: Vec<DateTime<Utc>> = (0..=300).map(|i| epoch + Duration::minutes(2 * i)).collect();
        let quiet: Vec<f64> = times
            .iter()
            .map(|&at| {
                let t = seconds_between(peak, at);
                // Smooth 5 % dip bottoming out at t = 4000 s.
                let u = (t / 4000.0).max(0.0);
                2.0 * (1.0 - 0.05 * u * (1.0 - u).exp())
            })
            .collect();
        let gappy: Vec<f64> = times
            .iter()
            .map(|&at| if at < peak { f64::NAN } else { 1.0 })
            .collect();
        let archive = IrradianceArchive::new(times, vec!["a".to_string(), "b".to_string()], vec![quiet, gappy]).unwrap();
        let flares = FlareCatalog::new(vec![flare_at(peak)]);

        let out = run_catalog(&archive, &flares, &polynomial_config(), &PolynomialRegressor, &NoDiagnostics).unwrap();
        assert_eq!(out.flares[0].levels, vec![Some(2.0), None]);

        let by = |t: usize, r: usize| out.records.iter().find(|x| x.target == t && x.reference == r).unwrap();
        assert_eq!(by(1, 0).status, RecordStatus::NoBaseline);
        assert_eq!(by(1, 1).status, RecordStatus::NoBaseline);
        assert_eq!(
            by(0, 1).peak_match.status,
            MatchStatus::Failed(MatchFailure::NoReferenceBaseline)
        );
        assert_eq!(by(0, 0).peak_match.status, MatchStatus::SelfPair);

        let depth = by(0, 1).dimming.depth.unwrap();
        assert!((depth + 5.0).abs() < 0.5, "depth {depth}");
    }

    /// Remembers the shape of every flare handed over.
    #[derive(Default)]
    struct Batches {
        flares: Vec<(usize, usize)>,
        sorted: bool,
        fail_after: Option<usize>,
    }

    impl RecordSink for Batches {
        fn write_flare(
            &mut self,
            _flare: &FlareEvent,
            outcome: &FlareOutcome,
            records: &[EventRecord],
        ) -> Result<(), AppError> {
            if self.fail_after == Some(self.flares.len()) {
                return Err(AppError::config("disk full"));
            }
            self.sorted &= records.windows(2).all(|w| w[0].sort_key() < w[1].sort_key());
            self.sorted &= records.iter().all(|r| r.flare.flare_index == outcome.context.flare_index);
            self.flares.push((outcome.context.flare_index, records.len()));
            Ok(())
        }
    }

    #[test]
    fn records_are_streamed_one_flare_at_a_time() {
        let data = generate(&SynthConfig {
            lines: 2,
            flares: 3,
            missing_probability: 0.0,
            ..SynthConfig::default()
        })
        .unwrap();
        let config = polynomial_config();

        let mut sink = Batches {
            sorted: true,
            ..Batches::default()
        };
        stream_catalog(&data.archive, &data.flares, &config, &PolynomialRegressor, &NoDiagnostics, &mut sink).unwrap();
        assert_eq!(sink.flares, vec![(0, 4), (1, 4), (2, 4)]);
        assert!(sink.sorted);

        let mut failing = Batches {
            sorted: true,
            fail_after: Some(1),
            ..Batches::default()
        };
        let err = stream_catalog(&data.archive, &data.flares, &config, &PolynomialRegressor, &NoDiagnostics, &mut failing)
            .unwrap_err();
        assert_eq!(err.message(), "disk full");
        assert_eq!(failing.flares, vec![(0, 4)]);
    }

    #[test]
    fn invalid_config_is_rejected_before_running() {
        assert!(build_pool(Some(1)).is_ok());
        let mut config = polynomial_config();
        config.min_dimming_window = f64::NAN;
        let data = generate(&SynthConfig {
            lines: 1,
            flares: 1,
            ..SynthConfig::default()
        })
        .unwrap();
        let err = run_catalog(&data.archive, &data.flares, &config, &PolynomialRegressor, &NoDiagnostics).unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_CONFIG);
    }
}
