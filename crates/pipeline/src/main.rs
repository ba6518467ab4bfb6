//! synth-pipeline: synthetic patient generator binary entrypoint.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use synth_core::{EntityKind, PatientRecord, TransformOptions, TransformReport, Transformer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use synth_pipeline::config::{Config, parse_delimiter};
use synth_pipeline::{
    HttpRemoteStore, ImportReport, MemoryStore, Pipeline, PipelineError, PipelineReport,
    RemoteStore,
};

#[derive(Parser)]
#[command(name = "synth-pipeline")]
#[command(about = "Generate synthetic patients from a template and import them")]
struct Cli {
    /// Directory holding the template patient files
    #[arg(long, global = true)]
    source_dir: Option<PathBuf>,
    /// Root directory for generated patients
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,
    /// Remote API base URL
    #[arg(long, global = true)]
    remote_url: Option<String>,
    /// Field delimiter of the delimited files (`tab` for tab)
    #[arg(long, global = true)]
    delimiter: Option<String>,
    /// Print the report as JSON
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Transform the template patient and write the result, without importing
    Generate {
        /// Display name of the synthetic patient (prompted when omitted)
        name: Option<String>,
        /// Seed for a reproducible run
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Import a previously generated patient directory
    Import {
        dir: PathBuf,
        /// Import into an in-process store instead of the remote API
        #[arg(long)]
        dry_run: bool,
    },
    /// Generate a synthetic patient and import it
    Run {
        /// Display name of the synthetic patient (prompted when omitted)
        name: Option<String>,
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr so stdout carries only the report
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "Pipeline run failed");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::from_env();
    if let Some(dir) = cli.source_dir {
        config.source_dir = dir;
    }
    if let Some(dir) = cli.output_dir {
        config.output_dir = dir;
    }
    if let Some(url) = cli.remote_url {
        config.remote_base_url = url;
    }
    if let Some(delimiter) = cli.delimiter {
        config.csv_delimiter = parse_delimiter(&delimiter)
            .with_context(|| format!("invalid delimiter {delimiter:?}"))?;
    }

    let dry_run = match cli.command {
        Commands::Import { dry_run, .. } | Commands::Run { dry_run, .. } => dry_run,
        Commands::Generate { .. } => true,
    };

    if dry_run {
        tracing::info!("Using in-process store, nothing will be sent to the remote API");
        let pipeline = Pipeline::new(&config, transformer(), MemoryStore::new());
        execute(pipeline, cli.command, &config, cli.json).await
    } else {
        tracing::info!(remote = %config.remote_base_url, "Using remote store");
        let pipeline = Pipeline::new(&config, transformer(), HttpRemoteStore::new(&config)?);
        execute(pipeline, cli.command, &config, cli.json).await
    }
}

fn transformer() -> Transformer {
    Transformer::new(TransformOptions::default())
}

async fn execute<S: RemoteStore>(
    pipeline: Pipeline<S>,
    command: Commands,
    config: &Config,
    json: bool,
) -> anyhow::Result<()> {
    match command {
        Commands::Generate { name, seed } => {
            let name = display_name(name)?;
            let generated = pipeline.generate(&name, rng(seed.or(config.rng_seed)))?;
            let patient = generated.transformed.patient();

            if json {
                print_json(&generated.transformed.report)?;
            } else {
                print_header(patient, &generated.output_dir);
                print_transform(&generated.transformed.report);
            }
        }
        Commands::Import { dir, .. } => match pipeline.import_dir(&dir).await {
            Ok(report) => emit_import(&report, json)?,
            Err(e) => return Err(report_failure(e, json)),
        },
        Commands::Run { name, seed, .. } => {
            let name = display_name(name)?;
            match pipeline.run(&name, rng(seed.or(config.rng_seed))).await {
                Ok(report) if json => print_json(&report)?,
                Ok(report) => {
                    print_header(&report.patient, &report.output_dir);
                    print_transform(&report.transform);
                    println!();
                    print_import(&report.import);
                }
                Err(e) => return Err(report_failure(e, json)),
            }
        }
    }
    Ok(())
}

/// Show what was written and imported before a fatal stage, then hand the error back
fn report_failure(err: PipelineError, json: bool) -> anyhow::Error {
    let printed = match &err {
        PipelineError::StageFailed(failed) => emit_import(&failed.report, json),
        PipelineError::RunAborted {
            patient,
            output_dir,
            transform,
            failed,
        } if json => print_json(&PipelineReport {
            patient: patient.clone(),
            output_dir: output_dir.clone(),
            transform: (**transform).clone(),
            import: (*failed.report).clone(),
        }),
        PipelineError::RunAborted {
            patient,
            output_dir,
            transform,
            failed,
        } => {
            print_header(patient, output_dir);
            print_transform(transform);
            println!();
            print_import(&failed.report);
            Ok(())
        }
        _ => Ok(()),
    };
    if let Err(e) = printed {
        tracing::warn!(error = %e, "Failed to print partial report");
    }
    err.into()
}

fn print_header(patient: &PatientRecord, output_dir: &Path) {
    println!("Patient: {} ({})", patient.display_name, patient.id);
    println!("Output:  {}", output_dir.display());
    println!();
}

fn rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

fn display_name(name: Option<String>) -> anyhow::Result<String> {
    if let Some(name) = name.filter(|n| !n.trim().is_empty()) {
        return Ok(name);
    }

    eprint!("Display name for the synthetic patient: ");
    std::io::stderr().flush()?;
    let mut line = String::new();
    std::io::stdin()
        .read_line(&mut line)
        .context("failed to read display name")?;

    let name = line.trim();
    if name.is_empty() {
        bail!("a display name is required");
    }
    Ok(name.to_string())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn emit_import(report: &ImportReport, json: bool) -> anyhow::Result<()> {
    if json {
        print_json(report)
    } else {
        print_import(report);
        Ok(())
    }
}

fn print_transform(report: &TransformReport) {
    println!("{:<16} {:>8} {:>8} {:>8}", "Transform", "source", "emitted", "dropped");
    for kind in EntityKind::ALL {
        let counts = report.counts(kind);
        println!(
            "{:<16} {:>8} {:>8} {:>8}",
            kind.to_string(),
            counts.source,
            counts.emitted,
            counts.dropped
        );
    }
    println!("Warnings: {}", report.warnings.len());
}

fn print_import(report: &ImportReport) {
    println!(
        "{:<16} {:>8} {:>8} {:>8} {:>8}",
        "Import", "created", "reused", "failed", "dropped"
    );
    for stage in &report.stages {
        println!(
            "{:<16} {:>8} {:>8} {:>8} {:>8}",
            stage.entity.to_string(),
            stage.created,
            stage.reused,
            stage.failed,
            stage.dropped
        );
    }
    for stage in &report.stages {
        for failure in &stage.errors {
            println!("  {} {}: {}", stage.entity, failure.record, failure.message);
        }
    }
}
