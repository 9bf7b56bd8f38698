//! Synthetic irradiance archive and flare list.
//!
//! Lines alternate between two kinds:
//! - *dimming* lines: a weak flare brightening followed by a slow deficit
//! - *hot* lines: a strong flare brightening and no deficit (good references)
//!
//! Every line sits on its own quiet pre-flare level with small Gaussian noise,
//! so the pre-flare thresholds pass and peak matching has something to do.

use std::fs::File;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

use crate::domain::{FlareClass, FlareEvent, FlareLetter};
use crate::error::{AppError, EXIT_NUMERICAL};
use crate::io::ingest::{FlareCatalog, IrradianceArchive, LightCurveSource};

/// Emission line names used for the first synthetic lines.
const LINE_NAMES: [&str; 8] = [
    "Fe IX 171",
    "Fe XVIII 94",
    "Fe XII 195",
    "Fe XX 133",
    "Fe XIV 211",
    "Fe XXI 129",
    "He II 304",
    "Fe XXIII 263",
];

/// Knobs of the generator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SynthConfig {
    pub lines: usize,
    pub flares: usize,
    pub seed: u64,
    /// Sample spacing in seconds.
    pub cadence: i64,
    /// Peak-to-peak spacing of consecutive flares in seconds.
    pub flare_spacing: i64,
    /// Relative Gaussian noise on every sample.
    pub noise: f64,
    /// Probability that a sample is missing.
    pub missing_probability: f64,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            lines: 4,
            flares: 3,
            seed: 42,
            cadence: 60,
            flare_spacing: 8 * 3600,
            noise: 5e-4,
            missing_probability: 0.002,
        }
    }
}

/// Shape of one line's response to a flare, relative to its quiet level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineResponse {
    /// Peak brightening (fraction of the quiet level).
    pub flare_amplitude: f64,
    /// Depth of the dimming deficit (fraction of the quiet level).
    pub dimming_depth: f64,
}

impl LineResponse {
    /// Relative excursion at `t` seconds from the flare peak.
    pub fn excursion(&self, t: f64) -> f64 {
        self.flare_amplitude * flare_profile(t) - self.dimming_depth * dimming_profile(t)
    }
}

/// Impulsive rise (σ = 120 s) and exponential decay (τ = 600 s), 1 at the peak.
pub fn flare_profile(t: f64) -> f64 {
    if t < 0.0 {
        (-(t * t) / (2.0 * 120.0 * 120.0)).exp()
    } else {
        (-t / 600.0).exp()
    }
}

/// Slow deficit after the peak, scaled to a maximum of 1 at
/// t = 1800·ln(5) ≈ 2897 s.
pub fn dimming_profile(t: f64) -> f64 {
    if t <= 0.0 {
        return 0.0;
    }
    let raw = (1.0 - (-t / 1800.0).exp()) * (-t / 7200.0).exp();
    raw / DIMMING_PROFILE_MAX
}

// max of (1 - e^{-t/1800}) e^{-t/7200}, attained at t = 1800 ln 5.
const DIMMING_PROFILE_MAX: f64 = 0.534_992_244_8;

/// Response of line `j`: even lines dim, odd lines are hot.
pub fn line_response(j: usize) -> LineResponse {
    if j % 2 == 0 {
        LineResponse {
            flare_amplitude: 0.02,
            dimming_depth: 0.03 + 0.005 * (j / 2) as f64,
        }
    } else {
        LineResponse {
            flare_amplitude: 0.5 + 0.1 * (j / 2) as f64,
            dimming_depth: 0.0,
        }
    }
}

pub fn line_name(j: usize) -> String {
    match LINE_NAMES.get(j) {
        Some(name) => (*name).to_string(),
        None => format!("line_{j:02}"),
    }
}

/// Generated archive plus its flare list.
#[derive(Debug, Clone)]
pub struct SyntheticData {
    pub archive: IrradianceArchive,
    pub flares: FlareCatalog,
}

pub fn generate(config: &SynthConfig) -> Result<SyntheticData, AppError> {
    if config.lines == 0 || config.flares == 0 {
        return Err(AppError::config("Synthetic data needs at least one line and one flare."));
    }
    if config.cadence <= 0 || config.flare_spacing <= 0 {
        return Err(AppError::config("Cadence and flare spacing must be > 0."));
    }
    if !(0.0..1.0).contains(&config.missing_probability) || !config.noise.is_finite() || config.noise < 0.0 {
        return Err(AppError::config("Invalid noise or missing-sample settings."));
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let normal = Normal::new(0.0, 1.0)
        .map_err(|e| AppError::new(EXIT_NUMERICAL, format!("Noise distribution error: {e}")))?;

    let epoch = Utc
        .with_ymd_and_hms(2011, 2, 15, 0, 0, 0)
        .single()
        .ok_or_else(|| AppError::config("Invalid synthetic epoch."))?;
    let lead = 5 * 3600;
    let peaks: Vec<DateTime<Utc>> = (0..config.flares)
        .map(|k| epoch + Duration::seconds(lead + k as i64 * config.flare_spacing))
        .collect();

    let flares: Vec<FlareEvent> = peaks
        .iter()
        .map(|&peak| {
            let letter = match rng.gen_range(0..3) {
                0 => FlareLetter::C,
                1 => FlareLetter::M,
                _ => FlareLetter::X,
            };
            let magnitude = (rng.gen_range(1.0..9.9_f64) * 10.0).round() / 10.0;
            FlareEvent {
                start: peak - Duration::seconds(12 * 60),
                peak,
                end: Some(peak + Duration::seconds(30 * 60)),
                class: FlareClass { letter, magnitude },
            }
        })
        .collect();

    let total = lead + (config.flares as i64 - 1) * config.flare_spacing + 6 * 3600;
    let samples = (total / config.cadence + 1) as usize;
    let times: Vec<DateTime<Utc>> = (0..samples)
        .map(|i| epoch + Duration::seconds(i as i64 * config.cadence))
        .collect();

    let mut columns = Vec::with_capacity(config.lines);
    for j in 0..config.lines {
        let quiet = 1e-4 * (1.0 + 0.25 * j as f64);
        let response = line_response(j);
        let column: Vec<f64> = times
            .iter()
            .map(|&at| {
                if rng.r#gen::<f64>() < config.missing_probability {
                    return f64::NAN;
                }
                let excursion: f64 = peaks
                    .iter()
                    .map(|&peak| response.excursion((at - peak).num_seconds() as f64))
                    .sum();
                let noise = config.noise * normal.sample(&mut rng);
                quiet * (1.0 + excursion + noise)
            })
            .collect();
        columns.push(column);
    }

    let lines = (0..config.lines).map(line_name).collect();
    Ok(SyntheticData {
        archive: IrradianceArchive::new(times, lines, columns)?,
        flares: FlareCatalog::new(flares),
    })
}

/// Write `archive.csv` and `flares.csv` into `dir`, returning both paths.
pub fn write_csv(data: &SyntheticData, dir: &Path) -> Result<(PathBuf, PathBuf), AppError> {
    std::fs::create_dir_all(dir)
        .map_err(|e| AppError::config(format!("Failed to create '{}': {e}", dir.display())))?;
    let archive_path = dir.join("archive.csv");
    let flares_path = dir.join("flares.csv");
    let write_err = |e: csv::Error| AppError::config(format!("Failed to write synthetic CSV: {e}"));

    let file = File::create(&archive_path)
        .map_err(|e| AppError::config(format!("Failed to create '{}': {e}", archive_path.display())))?;
    let mut writer = csv::Writer::from_writer(file);
    let mut header = vec!["time".to_string()];
    header.extend(data.archive.line_names().iter().cloned());
    writer.write_record(&header).map_err(write_err)?;

    let names = data.archive.line_names();
    let first = data.archive.times()[0];
    let last = data.archive.times()[data.archive.len() - 1];
    let mut curves = Vec::with_capacity(names.len());
    for j in 0..names.len() {
        let curve = data
            .archive
            .light_curve(j, first, last, first)?
            .ok_or_else(|| AppError::malformed(format!("Synthetic line '{}' has no samples.", names[j])))?;
        curves.push(curve);
    }
    for (i, at) in data.archive.times().iter().enumerate() {
        let mut row = vec![format_timestamp(*at)];
        for curve in &curves {
            let v = curve.irradiance()[i];
            row.push(if v.is_finite() { format!("{v:e}") } else { String::new() });
        }
        writer.write_record(&row).map_err(write_err)?;
    }
    writer
        .flush()
        .map_err(|e| AppError::config(format!("Failed to flush archive CSV: {e}")))?;

    let file = File::create(&flares_path)
        .map_err(|e| AppError::config(format!("Failed to create '{}': {e}", flares_path.display())))?;
    let mut writer = csv::Writer::from_writer(file);
    writer
        .write_record(["start_time", "peak_time", "end_time", "class"])
        .map_err(write_err)?;
    for flare in data.flares.iter() {
        writer
            .write_record([
                format_timestamp(flare.start),
                format_timestamp(flare.peak),
                flare.end.map(format_timestamp).unwrap_or_default(),
                flare.class.to_string(),
            ])
            .map_err(write_err)?;
    }
    writer
        .flush()
        .map_err(|e| AppError::config(format!("Failed to flush flare CSV: {e}")))?;

    Ok((archive_path, flares_path))
}

fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profiles_are_normalized() {
        assert!((flare_profile(0.0) - 1.0).abs() < 1e-12);
        assert!((dimming_profile(1800.0 * 5f64.ln()) - 1.0).abs() < 1e-6);
        assert_eq!(dimming_profile(-10.0), 0.0);
    }

    #[test]
    fn generation_is_deterministic_for_a_seed() {
        let config = SynthConfig {
            lines: 2,
            flares: 2,
            ..SynthConfig::default()
        };
        let a = generate(&config).unwrap();
        let b = generate(&config).unwrap();
        assert_eq!(a.archive.len(), b.archive.len());
        assert_eq!(a.flares.get(1), b.flares.get(1));

        let peak = a.flares.get(0).unwrap().peak;
        let start = peak - Duration::hours(1);
        let end = peak + Duration::hours(1);
        let ca = a.archive.light_curve(1, start, end, peak).unwrap().unwrap();
        let cb = b.archive.light_curve(1, start, end, peak).unwrap().unwrap();
        assert_eq!(ca.time(), cb.time());
        let same = ca
            .irradiance()
            .iter()
            .zip(cb.irradiance())
            .all(|(x, y)| x == y || (x.is_nan() && y.is_nan()));
        assert!(same);
    }

    #[test]
    fn csv_round_trip_through_ingest() {
        let config = SynthConfig {
            lines: 3,
            flares: 2,
            ..SynthConfig::default()
        };
        let data = generate(&config).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let (archive_path, flares_path) = write_csv(&data, dir.path()).unwrap();

        let archive = IrradianceArchive::from_path(&archive_path).unwrap();
        let flares = FlareCatalog::from_path(&flares_path).unwrap();
        assert_eq!(archive.line_names(), data.archive.line_names());
        assert_eq!(archive.len(), data.archive.len());
        assert!(archive.row_errors.is_empty());
        assert_eq!(flares.len(), 2);
        assert_eq!(flares.get(0).unwrap().peak, data.flares.get(0).unwrap().peak);
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let config = SynthConfig {
            lines: 0,
            ..SynthConfig::default()
        };
        assert!(generate(&config).is_err());
    }
}
