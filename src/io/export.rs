//! Catalog exports.
//!
//! - long-format CSV: one row per (flare, target, reference), undetermined
//!   values are empty cells
//! - JSON lines: the full `EventRecord`, one object per line
//!
//! Both are meant to be pivoted into a wide table by downstream scripts.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::app::pipeline::{FlareOutcome, RecordSink};
use crate::domain::{EventRecord, FlareEvent};
use crate::error::AppError;

/// Flat, CSV-friendly view of an [`EventRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogRow {
    pub flare_index: usize,
    pub flare_start: String,
    pub flare_peak: String,
    pub flare_class: String,
    /// Peak 1-8 Å flux implied by the class, W/m².
    pub flare_peak_flux: f64,
    pub preflare_start: String,
    pub preflare_end: String,
    pub target: String,
    pub reference: String,
    pub status: String,
    pub preflare_irradiance: Option<f64>,
    pub preflare_held_over: bool,
    pub flare_interrupt: bool,
    pub peak_match_status: String,
    pub scale_factor: Option<f64>,
    pub time_shift: Option<f64>,
    pub fit_status: String,
    pub fit_accepted: bool,
    pub fit_hyperparameter: Option<f64>,
    pub fit_validation_score: Option<f64>,
    pub fit_score: Option<f64>,
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
    pub error: Option<String>,
}

impl CatalogRow {
    pub fn from_record(record: &EventRecord, flare: &FlareEvent, outcome: &FlareOutcome, lines: &[String]) -> Self {
        let name = |i: usize| lines.get(i).cloned().unwrap_or_else(|| format!("line_{i}"));
        let d = &record.dimming;
        Self {
            flare_index: record.flare.flare_index,
            flare_start: flare.start.to_rfc3339(),
            flare_peak: flare.peak.to_rfc3339(),
            flare_class: flare.class.to_string(),
            flare_peak_flux: flare.class.peak_flux(),
            preflare_start: outcome.preflare_start.to_rfc3339(),
            preflare_end: outcome.preflare_end.to_rfc3339(),
            target: name(record.target),
            reference: name(record.reference),
            status: record.status.label().to_string(),
            preflare_irradiance: record.preflare,
            preflare_held_over: record.flare.preflare_held_over,
            flare_interrupt: record.flare.flare_interrupt,
            peak_match_status: record.peak_match.status.label().to_string(),
            scale_factor: record.peak_match.scale_factor,
            time_shift: record.peak_match.time_shift,
            fit_status: record.fit.status.label().to_string(),
            fit_accepted: record.fit.accepted,
            fit_hyperparameter: record.fit.hyperparameter,
            fit_validation_score: record.fit.validation_score,
            fit_score: record.fit.score,
            depth: d.depth,
            depth_time: d.depth_time,
            slope_min: d.slope_min,
            slope_max: d.slope_max,
            slope_mean: d.slope_mean,
            slope_start: d.slope_start,
            slope_end: d.slope_end,
            duration_start: d.duration_start,
            duration_end: d.duration_end,
            duration: d.duration,
            error: record.error.clone(),
        }
    }
}

/// Appends catalog rows flare by flare, flushing after each one.
pub struct CatalogWriter<W: Write> {
    writer: csv::Writer<W>,
    lines: Vec<String>,
    rows: usize,
}

impl CatalogWriter<BufWriter<File>> {
    pub fn create(path: &Path, lines: Vec<String>) -> Result<Self, AppError> {
        let file = File::create(path)
            .map_err(|e| AppError::config(format!("Failed to create catalog CSV '{}': {e}", path.display())))?;
        Ok(Self::from_writer(BufWriter::new(file), lines))
    }
}

impl<W: Write> CatalogWriter<W> {
    pub fn from_writer(out: W, lines: Vec<String>) -> Self {
        Self {
            writer: csv::Writer::from_writer(out),
            lines,
            rows: 0,
        }
    }

    /// Flush and return the number of rows written.
    pub fn finish(mut self) -> Result<usize, AppError> {
        self.writer
            .flush()
            .map_err(|e| AppError::config(format!("Failed to flush catalog CSV: {e}")))?;
        Ok(self.rows)
    }
}

impl<W: Write> RecordSink for CatalogWriter<W> {
    fn write_flare(
        &mut self,
        flare: &FlareEvent,
        outcome: &FlareOutcome,
        records: &[EventRecord],
    ) -> Result<(), AppError> {
        for record in records {
            let row = CatalogRow::from_record(record, flare, outcome, &self.lines);
            self.writer
                .serialize(&row)
                .map_err(|e| AppError::config(format!("Failed to write catalog row: {e}")))?;
        }
        self.rows += records.len();
        self.writer
            .flush()
            .map_err(|e| AppError::config(format!("Failed to flush catalog CSV: {e}")))
    }
}

/// One JSON object per record.
pub struct JsonLinesWriter<W: Write> {
    out: W,
}

impl JsonLinesWriter<BufWriter<File>> {
    pub fn create(path: &Path) -> Result<Self, AppError> {
        let file = File::create(path)
            .map_err(|e| AppError::config(format!("Failed to create JSON lines '{}': {e}", path.display())))?;
        Ok(Self::from_writer(BufWriter::new(file)))
    }
}

impl<W: Write> JsonLinesWriter<W> {
    pub fn from_writer(out: W) -> Self {
        Self { out }
    }

    pub fn write_records(&mut self, records: &[EventRecord]) -> Result<(), AppError> {
        for record in records {
            serde_json::to_writer(&mut self.out, record)
                .map_err(|e| AppError::config(format!("Failed to write JSON record: {e}")))?;
            self.out
                .write_all(b"\n")
                .map_err(|e| AppError::config(format!("Failed to write JSON lines: {e}")))?;
        }
        Ok(())
    }

    pub fn finish(mut self) -> Result<(), AppError> {
        self.out
            .flush()
            .map_err(|e| AppError::config(format!("Failed to flush JSON lines: {e}")))
    }
}

impl<W: Write> RecordSink for JsonLinesWriter<W> {
    fn write_flare(
        &mut self,
        _flare: &FlareEvent,
        _outcome: &FlareOutcome,
        records: &[EventRecord],
    ) -> Result<(), AppError> {
        self.write_records(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FlareClass, FlareContext, FlareLetter, MatchStatus, RecordStatus};
    use chrono::{Duration, TimeZone, Utc};

    fn lines() -> Vec<String> {
        vec!["171".to_string(), "195".to_string()]
    }

    fn flare() -> FlareEvent {
        let peak = Utc.with_ymd_and_hms(2011, 2, 15, 1, 56, 0).unwrap();
        FlareEvent {
            start: peak - Duration::minutes(12),
            peak,
            end: None,
            class: FlareClass {
                letter: FlareLetter::X,
                magnitude: 2.2,
            },
        }
    }

    fn outcome(flare: &FlareEvent, index: usize) -> FlareOutcome {
        FlareOutcome {
            context: FlareContext::new(index),
            levels: vec![Some(2.0), None],
            preflare_start: flare.peak - Duration::hours(3),
            preflare_end: flare.peak,
            window: 14400.0,
            skipped: false,
        }
    }

    fn complete_record() -> EventRecord {
        let mut record = EventRecord::undetermined(FlareContext::new(0), 0, 1, RecordStatus::Complete, Some(2.0));
        record.peak_match.status = MatchStatus::Matched;
        record.peak_match.scale_factor = Some(0.8);
        record.dimming.depth = Some(-30.0);
        record.dimming.depth_time = Some(300.0);
        record
    }

    #[test]
    fn csv_appends_flares_with_their_times() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.csv");
        let flare = flare();
        let skipped = EventRecord::undetermined(FlareContext::new(1), 1, 1, RecordStatus::Skipped, None);

        let mut writer = CatalogWriter::create(&path, lines()).unwrap();
        writer.write_flare(&flare, &outcome(&flare, 0), &[complete_record()]).unwrap();
        // Rows of finished flares are on disk before the run ends.
        let partial = std::fs::read_to_string(&path).unwrap();
        assert_eq!(partial.lines().count(), 2);

        writer.write_flare(&flare, &outcome(&flare, 1), &[skipped]).unwrap();
        assert_eq!(writer.finish().unwrap(), 2);

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with(
            "flare_index,flare_start,flare_peak,flare_class,flare_peak_flux,preflare_start,preflare_end,target,"
        ));

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let back: Vec<CatalogRow> = reader.deserialize().map(Result::unwrap).collect();
        assert_eq!(back.len(), 2);
        assert_eq!(back[0].flare_start, "2011-02-15T01:44:00+00:00");
        assert_eq!(back[0].flare_peak, "2011-02-15T01:56:00+00:00");
        assert_eq!(back[0].preflare_start, "2011-02-14T22:56:00+00:00");
        assert_eq!(back[0].preflare_end, back[0].flare_peak);
        assert_eq!(back[0].flare_class, "X2.2");
        assert!((back[0].flare_peak_flux - 2.2e-4).abs() < 1e-15);
        assert_eq!((back[0].target.as_str(), back[0].reference.as_str()), ("171", "195"));
        assert_eq!(back[0].depth, Some(-30.0));
        assert_eq!(back[0].slope_min, None);
        assert_eq!(back[1].flare_index, 1);
        assert_eq!(back[1].status, "skipped");
        assert_eq!(back[1].peak_match_status, "not_attempted");
        assert_eq!(back[1].preflare_irradiance, None);
    }

    #[test]
    fn jsonl_writes_one_object_per_record() {
        let flare = flare();
        let mut writer = JsonLinesWriter::from_writer(Vec::new());
        writer
            .write_flare(&flare, &outcome(&flare, 0), &[complete_record(), complete_record()])
            .unwrap();

        let text = String::from_utf8(writer.out.clone()).unwrap();
        let objects: Vec<serde_json::Value> = text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0]["flare_index"], 0);
        assert_eq!(objects[0]["peak_match"]["status"]["status"], "matched");
        assert_eq!(objects[0]["dimming"]["depth"], -30.0);
        assert!(objects[0]["dimming"]["slope_min"].is_null());
        assert!(objects[0].get("error").is_none());
        writer.finish().unwrap();
    }
}
