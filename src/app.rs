//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - initializes logging and reads `.env`
//! - parses CLI arguments and loads the configuration
//! - runs the catalog pipeline
//! - streams each flare's records to the exports and prints the run summary

use std::fs::File;
use std::io::BufWriter;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::cli::{Command, ConfigArgs, RunArgs, SynthArgs};
use crate::config::{Backend, PipelineConfig};
use crate::diagnostics::{NoDiagnostics, PlotWriter};
use crate::domain::{EventRecord, FlareEvent};
use crate::error::AppError;
use crate::io::export::{CatalogWriter, JsonLinesWriter};
use crate::io::ingest::{FlareCatalog, IrradianceArchive, LightCurveSource};
use crate::models::{PolynomialRegressor, RbfKernelRidge};
use crate::report::SummaryBuilder;
use self::pipeline::{FlareOutcome, RecordSink};

pub mod pipeline;
pub mod record;

/// Entry point for the `jedi` binary.
pub fn run() -> Result<(), AppError> {
    // `.env` is optional.
    let _ = dotenvy::dotenv();
    init_logging();

    let cli = crate::cli::Cli::parse();
    match cli.command {
        Command::Run(args) => handle_run(args),
        Command::Synth(args) => handle_synth(args),
        Command::Config(args) => handle_config(args),
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("jedi_catalog=info"));
    // A subscriber may already be installed.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn handle_run(args: RunArgs) -> Result<(), AppError> {
    let mut config = PipelineConfig::load(args.config.as_deref())?;
    args.apply(&mut config);
    config.validate()?;

    let archive = IrradianceArchive::from_path(&args.archive)?;
    let flares = FlareCatalog::from_path(&args.flares)?;
    info!(
        samples = archive.len(),
        lines = archive.line_names().len(),
        flares = flares.len(),
        skipped_rows = archive.row_errors.len() + flares.row_errors.len(),
        "inputs loaded"
    );

    let lines = archive.line_names();
    let mut sink = RunSink {
        catalog: CatalogWriter::create(&args.output, lines.to_vec())?,
        json: args.json.as_deref().map(JsonLinesWriter::create).transpose()?,
        summary: SummaryBuilder::new(lines.len()),
    };

    match &args.plots {
        Some(dir) => {
            let writer = PlotWriter::spawn(dir, lines.to_vec(), args.plot_width, args.plot_height)?;
            run_with_backend(&archive, &flares, &config, &writer, &mut sink)?;
            let written = writer.finish()?;
            info!(written, dir = %dir.display(), "diagnostic plots written");
        }
        None => run_with_backend(&archive, &flares, &config, &NoDiagnostics, &mut sink)?,
    }

    let rows = sink.catalog.finish()?;
    info!(path = %args.output.display(), records = rows, "catalog written");
    if let (Some(json), Some(path)) = (sink.json, &args.json) {
        json.finish()?;
        info!(path = %path.display(), "JSON lines written");
    }

    let summary = sink.summary.finish();
    println!("{}", crate::report::format_run_summary(&summary, lines, &config));
    Ok(())
}

/// Everything a `run` writes, fed one flare at a time.
struct RunSink {
    catalog: CatalogWriter<BufWriter<File>>,
    json: Option<JsonLinesWriter<BufWriter<File>>>,
    summary: SummaryBuilder,
}

impl RecordSink for RunSink {
    fn write_flare(
        &mut self,
        flare: &FlareEvent,
        outcome: &FlareOutcome,
        records: &[EventRecord],
    ) -> Result<(), AppError> {
        self.catalog.write_flare(flare, outcome, records)?;
        if let Some(json) = &mut self.json {
            json.write_flare(flare, outcome, records)?;
        }
        self.summary.write_flare(flare, outcome, records)
    }
}

fn run_with_backend<D: crate::diagnostics::Diagnostics>(
    archive: &IrradianceArchive,
    flares: &FlareCatalog,
    config: &PipelineConfig,
    diagnostics: &D,
    sink: &mut RunSink,
) -> Result<(), AppError> {
    match config.fit.backend {
        Backend::Rbf => {
            let regressor = RbfKernelRidge {
                alpha: config.fit.rbf_alpha,
            };
            pipeline::stream_catalog(archive, flares, config, &regressor, diagnostics, sink)
        }
        Backend::Polynomial => {
            pipeline::stream_catalog(archive, flares, config, &PolynomialRegressor, diagnostics, sink)
        }
    }
}

fn handle_synth(args: SynthArgs) -> Result<(), AppError> {
    let config = crate::data::SynthConfig {
        lines: args.lines,
        flares: args.flares,
        seed: args.seed,
        ..crate::data::SynthConfig::default()
    };
    let data = crate::data::generate(&config)?;
    let (archive, flares) = crate::data::write_csv(&data, &args.out_dir)?;
    println!("{}", archive.display());
    println!("{}", flares.display());
    Ok(())
}

fn handle_config(args: ConfigArgs) -> Result<(), AppError> {
    let config = PipelineConfig::load(args.config.as_deref())?;
    print!("{}", config.to_toml()?);
    Ok(())
}
