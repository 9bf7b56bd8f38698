//! Command-line parsing for the dimming catalog generator.
//!
//! The goal of this module is to keep **argument parsing** separate from the
//! pipeline. Flags given here override the TOML configuration.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{Backend, PipelineConfig};
use crate::dimming::AlignMode;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "jedi", version, about = "Coronal dimming catalog from EUV irradiance light curves")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Build the dimming catalog for every flare and ordered line pair.
    Run(RunArgs),
    /// Write a synthetic archive and flare list (for trying the pipeline).
    Synth(SynthArgs),
    /// Print the effective configuration as TOML.
    Config(ConfigArgs),
}

/// Options for `jedi run`.
#[derive(Debug, Parser, Clone)]
pub struct RunArgs {
    /// Irradiance archive CSV (`time` column plus one column per line).
    #[arg(long)]
    pub archive: PathBuf,

    /// Flare list CSV (`start_time`, `peak_time`, `end_time`, `class`).
    #[arg(long)]
    pub flares: PathBuf,

    /// Pipeline configuration (TOML).
    #[arg(long, env = "JEDI_CONFIG")]
    pub config: Option<PathBuf>,

    /// Catalog CSV, one row per flare and ordered line pair.
    #[arg(long, default_value = "jedi_catalog.csv")]
    pub output: PathBuf,

    /// Also write the full records as JSON lines.
    #[arg(long)]
    pub json: Option<PathBuf>,

    /// Write per-stage ASCII diagnostic plots under this directory.
    #[arg(long)]
    pub plots: Option<PathBuf>,

    /// Diagnostic plot width (columns).
    #[arg(long, default_value_t = 100)]
    pub plot_width: usize,

    /// Diagnostic plot height (rows).
    #[arg(long, default_value_t = 25)]
    pub plot_height: usize,

    /// Worker threads (defaults to all logical CPUs).
    #[arg(long)]
    pub threads: Option<usize>,

    /// Minimum R² for a fit to be accepted.
    #[arg(long)]
    pub min_fit_score: Option<f64>,

    /// Regression backend for the curve fit.
    #[arg(long, value_enum)]
    pub backend: Option<Backend>,

    /// Peak alignment before the reference is scaled and subtracted.
    #[arg(long, value_enum)]
    pub align: Option<AlignMode>,
}

impl RunArgs {
    /// Apply flag overrides on top of a loaded configuration.
    pub fn apply(&self, config: &mut PipelineConfig) {
        if let Some(n) = self.threads {
            config.threads = Some(n);
        }
        if let Some(score) = self.min_fit_score {
            config.minimum_fit_score = score;
        }
        if let Some(backend) = self.backend {
            config.fit.backend = backend;
        }
        if let Some(align) = self.align {
            config.peak_match.align = align;
        }
    }
}

/// Options for `jedi synth`.
#[derive(Debug, Parser, Clone)]
pub struct SynthArgs {
    /// Output directory for `archive.csv` and `flares.csv`.
    #[arg(long)]
    pub out_dir: PathBuf,

    /// Number of emission lines.
    #[arg(long, default_value_t = 4)]
    pub lines: usize,

    /// Number of flares.
    #[arg(long, default_value_t = 3)]
    pub flares: usize,

    /// Random seed.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

/// Options for `jedi config`.
#[derive(Debug, Parser, Clone)]
pub struct ConfigArgs {
    #[arg(long, env = "JEDI_CONFIG")]
    pub config: Option<PathBuf>,
}
