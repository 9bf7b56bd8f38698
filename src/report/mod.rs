//! Run summaries: what the catalog run determined and what it could not.

use std::collections::BTreeMap;

use crate::app::pipeline::{FlareOutcome, RecordSink, RunOutput};
use crate::domain::{EventRecord, FlareEvent, LineIndex, RecordStatus};
use crate::error::AppError;
use crate::math::median;

pub mod format;

pub use format::*;

/// Counts over every record of a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub flares: usize,
    pub flares_skipped: usize,
    pub flares_held_over: usize,
    pub flares_interrupted: usize,
    pub records: usize,
    /// Record count per [`RecordStatus`] label.
    pub by_status: BTreeMap<&'static str, usize>,
    /// Record count per peak-match status label.
    pub by_peak_match: BTreeMap<&'static str, usize>,
    pub fits_accepted: usize,
    pub depths: usize,
    pub slopes: usize,
    pub durations: usize,
    pub lines: Vec<LineSummary>,
}

/// Per target line, over all references and flares.
#[derive(Debug, Clone, PartialEq)]
pub struct LineSummary {
    pub line: LineIndex,
    pub records: usize,
    pub depths: usize,
    pub median_depth: Option<f64>,
    pub median_duration: Option<f64>,
}

/// Accumulates a [`RunSummary`] while records stream past.
///
/// Only the determined depths and durations are kept (for the medians), never
/// the records themselves.
#[derive(Debug, Clone, Default)]
pub struct SummaryBuilder {
    summary: RunSummary,
    line_records: Vec<usize>,
    depths: Vec<Vec<f64>>,
    durations: Vec<Vec<f64>>,
}

impl SummaryBuilder {
    pub fn new(lines: usize) -> Self {
        Self {
            summary: RunSummary::default(),
            line_records: vec![0; lines],
            depths: vec![Vec::new(); lines],
            durations: vec![Vec::new(); lines],
        }
    }

    pub fn add_flare(&mut self, outcome: &FlareOutcome) {
        let s = &mut self.summary;
        s.flares += 1;
        s.flares_skipped += usize::from(outcome.skipped);
        s.flares_held_over += usize::from(outcome.context.preflare_held_over);
        s.flares_interrupted += usize::from(outcome.context.flare_interrupt);
    }

    pub fn add_record(&mut self, record: &EventRecord) {
        let s = &mut self.summary;
        s.records += 1;
        *s.by_status.entry(record.status.label()).or_default() += 1;
        if record.status != RecordStatus::Skipped {
            *s.by_peak_match.entry(record.peak_match.status.label()).or_default() += 1;
        }
        s.fits_accepted += usize::from(record.fit.accepted);
        s.depths += usize::from(record.dimming.depth.is_some());
        s.slopes += usize::from(record.dimming.slope_min.is_some());
        s.durations += usize::from(record.dimming.duration.is_some());

        let line = record.target;
        if let Some(count) = self.line_records.get_mut(line) {
            *count += 1;
            self.depths[line].extend(record.dimming.depth);
            self.durations[line].extend(record.dimming.duration);
        }
    }

    pub fn finish(self) -> RunSummary {
        let lines = self
            .line_records
            .iter()
            .zip(self.depths.iter().zip(&self.durations))
            .enumerate()
            .map(|(line, (&records, (depths, durations)))| LineSummary {
                line,
                records,
                depths: depths.len(),
                median_depth: median(depths),
                median_duration: median(durations),
            })
            .collect();
        RunSummary { lines, ..self.summary }
    }
}

impl RecordSink for SummaryBuilder {
    fn write_flare(
        &mut self,
        _flare: &FlareEvent,
        outcome: &FlareOutcome,
        records: &[EventRecord],
    ) -> Result<(), AppError> {
        self.add_flare(outcome);
        records.iter().for_each(|r| self.add_record(r));
        Ok(())
    }
}

/// Summary of a run collected in memory.
pub fn summarize(run: &RunOutput, lines: usize) -> RunSummary {
    let mut builder = SummaryBuilder::new(lines);
    run.flares.iter().for_each(|f| builder.add_flare(f));
    run.records.iter().for_each(|r| builder.add_record(r));
    builder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FlareContext, MatchStatus};
    use chrono::{TimeZone, Utc};

    fn record(target: usize, reference: usize, depth: Option<f64>) -> EventRecord {
        let mut r = EventRecord::undetermined(FlareContext::new(0), target, reference, RecordStatus::Complete, Some(1.0));
        r.peak_match.status = if target == reference { MatchStatus::SelfPair } else { MatchStatus::Matched };
        r.fit.accepted = depth.is_some();
        r.dimming.depth = depth;
        r
    }

    fn sample_run() -> RunOutput {
        let mut skipped = EventRecord::undetermined(FlareContext::new(1), 0, 0, RecordStatus::Skipped, None);
        skipped.flare.preflare_held_over = true;
        let at = Utc.with_ymd_and_hms(2014, 1, 1, 0, 0, 0).unwrap();
        RunOutput {
            records: vec![
                record(0, 0, Some(-2.0)),
                record(0, 1, Some(-4.0)),
                record(1, 0, None),
                record(1, 1, Some(-1.0)),
                skipped,
            ],
            flares: vec![
                FlareOutcome {
                    context: FlareContext::new(0),
                    levels: vec![Some(1.0), Some(1.0)],
                    preflare_start: at,
                    preflare_end: at,
                    window: 14400.0,
                    skipped: false,
                },
                FlareOutcome {
                    context: FlareContext {
                        flare_index: 1,
                        preflare_held_over: true,
                        flare_interrupt: false,
                    },
                    levels: vec![Some(1.0), Some(1.0)],
                    preflare_start: at,
                    preflare_end: at,
                    window: 600.0,
                    skipped: true,
                },
            ],
        }
    }

    #[test]
    fn summary_counts_statuses_and_medians() {
        let s = summarize(&sample_run(), 2);
        assert_eq!((s.flares, s.flares_skipped, s.flares_held_over), (2, 1, 1));
        assert_eq!(s.records, 5);
        assert_eq!(s.by_status["complete"], 4);
        assert_eq!(s.by_status["skipped"], 1);
        assert_eq!(s.by_peak_match["self_pair"], 2);
        assert_eq!(s.by_peak_match["matched"], 2);
        assert!(!s.by_peak_match.contains_key("not_attempted"));
        assert_eq!(s.fits_accepted, 3);
        assert_eq!(s.depths, 3);

        assert_eq!(s.lines[0].records, 3);
        assert_eq!(s.lines[0].median_depth, Some(-3.0));
        assert_eq!(s.lines[1].depths, 1);
        assert_eq!(s.lines[1].median_duration, None);
    }

    #[test]
    fn streamed_summary_matches_collected_one() {
        let run = sample_run();
        let at = run.flares[0].preflare_end;
        let flare = FlareEvent {
            start: at,
            peak: at,
            end: None,
            class: "C1.0".parse().unwrap(),
        };

        let mut builder = SummaryBuilder::new(2);
        builder.write_flare(&flare, &run.flares[0], &run.records[..4]).unwrap();
        builder.write_flare(&flare, &run.flares[1], &run.records[4..]).unwrap();
        assert_eq!(builder.finish(), summarize(&run, 2));
    }
}
