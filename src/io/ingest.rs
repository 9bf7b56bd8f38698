//! CSV ingest for the irradiance archive and the flare list.
//!
//! Archive layout: a `time` column followed by one column per emission line.
//!
//! ```text
//! time,Fe IX 171,Fe XII 195,...
//! 2011-02-15 00:00:00,1.02e-4,,...
//! ```
//!
//! Flare list layout: `start_time`, `peak_time`, optional `end_time`, `class`.
//!
//! Design goals:
//! - **Strict schema** for required columns (exit code 2)
//! - **Row-level validation** (skip bad rows, but report what happened)
//! - **Missing samples stay missing**: empty, `nan` and `-1` cells become `NaN`

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};
use csv::StringRecord;
use tracing::warn;

use crate::domain::{FlareClass, FlareEvent, LightCurve, LineIndex, seconds_between};
use crate::error::AppError;

/// Anything that can cut a light curve for one line out of a time range.
pub trait LightCurveSource: Sync {
    fn line_names(&self) -> &[String];

    /// Samples of `line` in `[start, end]`, timed in seconds from `origin`.
    ///
    /// `Ok(None)` when the range holds no samples at all.
    fn light_curve(
        &self,
        line: LineIndex,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        origin: DateTime<Utc>,
    ) -> Result<Option<LightCurve>, AppError>;
}

/// A row-level error encountered during ingest.
#[derive(Debug, Clone)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

/// Timestamps plus one irradiance column per emission line.
#[derive(Debug, Clone)]
pub struct IrradianceArchive {
    times: Vec<DateTime<Utc>>,
    lines: Vec<String>,
    columns: Vec<Vec<f64>>,
    pub row_errors: Vec<RowError>,
}

impl IrradianceArchive {
    /// Build an archive from already-parsed columns (`columns[line][sample]`).
    pub fn new(times: Vec<DateTime<Utc>>, lines: Vec<String>, columns: Vec<Vec<f64>>) -> Result<Self, AppError> {
        if lines.is_empty() {
            return Err(AppError::malformed("Irradiance archive has no emission lines."));
        }
        if lines.len() != columns.len() {
            return Err(AppError::malformed(format!(
                "Irradiance archive names {} lines but holds {} columns.",
                lines.len(),
                columns.len()
            )));
        }
        if let Some((name, _)) = lines.iter().zip(columns.iter()).find(|(_, c)| c.len() != times.len()) {
            return Err(AppError::malformed(format!(
                "Irradiance column '{name}' length differs from the {} timestamps.",
                times.len()
            )));
        }
        if let Some(i) = times.windows(2).position(|w| w[1] < w[0]) {
            return Err(AppError::malformed(format!(
                "Archive timestamps decrease at sample {}: {} -> {}.",
                i + 1,
                times[i],
                times[i + 1]
            )));
        }
        Ok(Self {
            times,
            lines,
            columns,
            row_errors: Vec::new(),
        })
    }

    pub fn from_path(path: &Path) -> Result<Self, AppError> {
        let file = File::open(path).map_err(|e| {
            AppError::config(format!("Failed to open archive '{}': {e}", path.display()))
        })?;
        Self::from_reader(file)
    }

    pub fn from_reader(reader: impl Read) -> Result<Self, AppError> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = reader
            .headers()
            .map_err(|e| AppError::config(format!("Failed to read archive headers: {e}")))?
            .clone();
        let header_map = build_header_map(&headers);
        let Some(&time_col) = header_map.get("time") else {
            return Err(AppError::config("Missing required archive column: `time`"));
        };

        let line_cols: Vec<usize> = (0..headers.len()).filter(|&i| i != time_col).collect();
        let lines: Vec<String> = line_cols
            .iter()
            .map(|&i| normalize_header_name(&headers[i]).1)
            .collect();
        if lines.is_empty() {
            return Err(AppError::config("Archive has no emission line columns."));
        }

        let mut times = Vec::new();
        let mut columns: Vec<Vec<f64>> = vec![Vec::new(); lines.len()];
        let mut row_errors = Vec::new();

        for (idx, result) in reader.records().enumerate() {
            let line = idx + 2;
            let record = match result {
                Ok(r) => r,
                Err(e) => {
                    row_errors.push(RowError {
                        line,
                        message: format!("CSV parse error: {e}"),
                    });
                    continue;
                }
            };
            let time = match record.get(time_col).map(parse_timestamp) {
                Some(Ok(t)) => t,
                Some(Err(e)) => {
                    row_errors.push(RowError { line, message: e });
                    continue;
                }
                None => {
                    row_errors.push(RowError {
                        line,
                        message: "Missing `time` value.".to_string(),
                    });
                    continue;
                }
            };
            times.push(time);
            for (column, &col) in columns.iter_mut().zip(line_cols.iter()) {
                column.push(parse_irradiance(record.get(col)));
            }
        }

        if times.is_empty() {
            return Err(AppError::malformed("Archive has no valid rows."));
        }
        if !row_errors.is_empty() {
            warn!(skipped = row_errors.len(), "archive rows skipped");
        }

        let mut archive = Self::new(times, lines, columns)?;
        archive.row_errors = row_errors;
        Ok(archive)
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn times(&self) -> &[DateTime<Utc>] {
        &self.times
    }

    pub fn line_index(&self, name: &str) -> Option<LineIndex> {
        self.lines.iter().position(|l| l == name)
    }
}

impl LightCurveSource for IrradianceArchive {
    fn line_names(&self) -> &[String] {
        &self.lines
    }

    fn light_curve(
        &self,
        line: LineIndex,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        origin: DateTime<Utc>,
    ) -> Result<Option<LightCurve>, AppError> {
        let Some(column) = self.columns.get(line) else {
            return Err(AppError::malformed(format!(
                "Line index {line} out of range ({} lines).",
                self.lines.len()
            )));
        };
        let lo = self.times.partition_point(|t| *t < start);
        let hi = self.times.partition_point(|t| *t <= end);
        if lo >= hi {
            return Ok(None);
        }
        let time = self.times[lo..hi].iter().map(|t| seconds_between(origin, *t)).collect();
        let irradiance = column[lo..hi].to_vec();
        LightCurve::new(time, irradiance).map(Some)
    }
}

/// Flares ordered by peak time; the position is the catalog index.
#[derive(Debug, Clone, Default)]
pub struct FlareCatalog {
    events: Vec<FlareEvent>,
    pub row_errors: Vec<RowError>,
}

impl FlareCatalog {
    pub fn new(mut events: Vec<FlareEvent>) -> Self {
        if events.windows(2).any(|w| w[1].peak < w[0].peak) {
            warn!("flare list is not ordered by peak time; sorting");
            events.sort_by_key(|e| e.peak);
        }
        Self {
            events,
            row_errors: Vec::new(),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, AppError> {
        let file = File::open(path).map_err(|e| {
            AppError::config(format!("Failed to open flare list '{}': {e}", path.display()))
        })?;
        Self::from_reader(file)
    }

    pub fn from_reader(reader: impl Read) -> Result<Self, AppError> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);
        let headers = reader
            .headers()
            .map_err(|e| AppError::config(format!("Failed to read flare list headers: {e}")))?
            .clone();
        let header_map = build_header_map(&headers);
        for required in ["start_time", "peak_time", "class"] {
            if !header_map.contains_key(required) {
                return Err(AppError::config(format!("Missing required flare list column: `{required}`")));
            }
        }

        let mut events = Vec::new();
        let mut row_errors = Vec::new();
        for (idx, result) in reader.records().enumerate() {
            let line = idx + 2;
            let parsed = result
                .map_err(|e| format!("CSV parse error: {e}"))
                .and_then(|record| parse_flare(&record, &header_map));
            match parsed {
                Ok(event) => events.push(event),
                Err(message) => row_errors.push(RowError { line, message }),
            }
        }

        if events.is_empty() {
            return Err(AppError::malformed("Flare list has no valid rows."));
        }
        if !row_errors.is_empty() {
            warn!(skipped = row_errors.len(), "flare rows skipped");
        }
        let mut catalog = Self::new(events);
        catalog.row_errors = row_errors;
        Ok(catalog)
    }

    pub fn get(&self, index: usize) -> Option<&FlareEvent> {
        self.events.get(index)
    }

    /// Flares whose peak lies in `[start, end]`, with their catalog index.
    pub fn in_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> impl Iterator<Item = (usize, &FlareEvent)> + '_ {
        self.events
            .iter()
            .enumerate()
            .filter(move |(_, e)| e.peak >= start && e.peak <= end)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FlareEvent> + '_ {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

fn parse_flare(record: &StringRecord, header_map: &HashMap<String, usize>) -> Result<FlareEvent, String> {
    let start = parse_timestamp(get_required(record, header_map, "start_time")?)?;
    let peak = parse_timestamp(get_required(record, header_map, "peak_time")?)?;
    let end = match get_optional(record, header_map, "end_time") {
        Some(s) => Some(parse_timestamp(s)?),
        None => None,
    };
    let class: FlareClass = get_required(record, header_map, "class")?
        .parse()
        .map_err(|e: AppError| e.message().to_string())?;

    if peak < start {
        return Err(format!("Peak {peak} precedes start {start}."));
    }
    if let Some(end) = end {
        if end < peak {
            return Err(format!("End {end} precedes peak {peak}."));
        }
    }
    Ok(FlareEvent { start, peak, end, class })
}

/// Parse an RFC 3339 timestamp or a naive `YYYY-MM-DD HH:MM:SS` taken as UTC.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, String> {
    let s = s.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Ok(t.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(t) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(t.and_utc());
        }
    }
    Err(format!("Invalid timestamp '{s}'."))
}

fn parse_irradiance(cell: Option<&str>) -> f64 {
    let Some(s) = cell.map(str::trim).filter(|s| !s.is_empty()) else {
        return f64::NAN;
    };
    match s.parse::<f64>() {
        Ok(v) if v.is_finite() && v != -1.0 => v,
        _ => f64::NAN,
    }
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name).0, idx))
        .collect()
}

/// `(lookup key, display name)`; the BOM some tools prepend is stripped.
fn normalize_header_name(name: &str) -> (String, String) {
    let name = name.trim().trim_start_matches('\u{feff}');
    (name.to_ascii_lowercase(), name.to_string())
}

fn get_required<'a>(
    record: &'a StringRecord,
    header_map: &HashMap<String, usize>,
    key: &str,
) -> Result<&'a str, String> {
    get_optional(record, header_map, key).ok_or_else(|| format!("Missing `{key}` value."))
}

fn get_optional<'a>(record: &'a StringRecord, header_map: &HashMap<String, usize>, key: &str) -> Option<&'a str> {
    header_map
        .get(key)
        .and_then(|&i| record.get(i))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FlareLetter;
    use chrono::TimeZone;

    const ARCHIVE: &str = "\
time,Fe IX 171,Fe XII 195
2011-02-15 01:00:00,1.0,2.0
2011-02-15 01:01:00,,-1
2011-02-15T01:02:00Z,nan,2.5
not a time,9.0,9.0
2011-02-15 01:03:00,1.5,3.0
";

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2011, 2, 15, h, m, 0).unwrap()
    }

    #[test]
    fn archive_reads_lines_and_missing_markers() {
        let archive = IrradianceArchive::from_reader(ARCHIVE.as_bytes()).unwrap();
        assert_eq!(archive.line_names(), &["Fe IX 171".to_string(), "Fe XII 195".to_string()]);
        assert_eq!(archive.len(), 4);
        assert_eq!(archive.row_errors.len(), 1);
        assert_eq!(archive.row_errors[0].line, 5);

        let curve = archive.light_curve(1, at(1, 0), at(1, 3), at(1, 2)).unwrap().unwrap();
        assert_eq!(curve.time(), &[-120.0, -60.0, 0.0, 60.0]);
        assert_eq!(curve.irradiance()[0], 2.0);
        assert!(curve.irradiance()[1].is_nan());
        assert_eq!(curve.irradiance()[2], 2.5);

        let first = archive.light_curve(0, at(1, 0), at(1, 3), at(1, 0)).unwrap().unwrap();
        assert!(first.irradiance()[1].is_nan());
        assert!(first.irradiance()[2].is_nan());
        assert_eq!(archive.line_index("Fe XII 195"), Some(1));
    }

    #[test]
    fn archive_range_outside_data_is_none() {
        let archive = IrradianceArchive::from_reader(ARCHIVE.as_bytes()).unwrap();
        assert!(archive.light_curve(0, at(5, 0), at(6, 0), at(5, 0)).unwrap().is_none());
        assert!(archive.light_curve(7, at(1, 0), at(2, 0), at(1, 0)).is_err());
    }

    #[test]
    fn archive_requires_time_column_and_order() {
        let err = IrradianceArchive::from_reader("t,a\n2011-01-01 00:00:00,1\n".as_bytes()).unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_CONFIG);

        let unordered = "time,a\n2011-01-01 00:01:00,1\n2011-01-01 00:00:00,1\n";
        let err = IrradianceArchive::from_reader(unordered.as_bytes()).unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_MALFORMED);
    }

    #[test]
    fn flare_list_parses_and_sorts_by_peak() {
        let csv = "\
start_time,peak_time,end_time,class
2011-02-15 03:00:00,2011-02-15 03:10:00,,M1.0
2011-02-15 01:44:00,2011-02-15 01:56:00,2011-02-15 02:06:00,X2.2
2011-02-15 05:00:00,2011-02-15 04:00:00,,C1.0
2011-02-15 06:00:00,2011-02-15 06:05:00,,Z9
";
        let catalog = FlareCatalog::from_reader(csv.as_bytes()).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.row_errors.len(), 2);

        let first = catalog.get(0).unwrap();
        assert_eq!(first.class.letter, FlareLetter::X);
        assert_eq!(first.peak, at(1, 56));
        assert_eq!(first.end, Some(at(2, 6)));
        assert_eq!(catalog.get(1).unwrap().end, None);

        let hits: Vec<usize> = catalog.in_range(at(3, 0), at(4, 0)).map(|(i, _)| i).collect();
        assert_eq!(hits, vec![1]);
    }

    #[test]
    fn timestamps_accept_rfc3339_and_naive() {
        assert_eq!(parse_timestamp("2011-02-15T01:56:00+00:00").unwrap(), at(1, 56));
        assert_eq!(parse_timestamp("2011-02-15 01:56:00").unwrap(), at(1, 56));
        assert!(parse_timestamp("15/02/2011").is_err());
    }
}
