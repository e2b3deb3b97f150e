use neb_index::config::RunConfig;
use neb_index::export::NebExporter;
use neb_index::model::Granularity;
use neb_index::source::CsvDirectorySource;
use neb_index::{NebRun, SourceTables};

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "neb")]
#[command(about = "New Economy Business index builder")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the index for state and us and write the output files
    Run {
        /// Directory with cached raw tables (or set NEB_RAW_DATA_DIR)
        #[arg(long)]
        raw_data_dir: Option<PathBuf>,

        /// Output directory (or set NEB_OUTPUT_DIR)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Also write every output file here (or set NEB_MIRROR_DIR)
        #[arg(long)]
        mirror_dir: Option<PathBuf>,
    },
    /// Print the calibrated goalposts of the state-level reference window
    Calibrate {
        /// Directory with cached raw tables (or set NEB_RAW_DATA_DIR)
        #[arg(long)]
        raw_data_dir: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    match args.command {
        Commands::Run {
            raw_data_dir,
            output_dir,
            mirror_dir,
        } => {
            let config = RunConfig::from_env().with_overrides(raw_data_dir, output_dir, mirror_dir);
            run(&config)
        }
        Commands::Calibrate { raw_data_dir } => {
            let config = RunConfig::from_env().with_overrides(raw_data_dir, None, None);
            calibrate(&config)
        }
    }
}

fn run(config: &RunConfig) -> Result<()> {
    let started_at = Utc::now();
    info!("NEB index run starting...");
    info!("Raw data: {}", config.raw_data_dir.display());

    let source = CsvDirectorySource::new(&config.raw_data_dir);
    let state = SourceTables::load(&source, Granularity::State)
        .context("Failed to load state raw tables")?;
    let us = SourceTables::load(&source, Granularity::Us)
        .context("Failed to load us raw tables")?;

    let output = NebRun::execute(&state, &us)?;

    let exporter = NebExporter::new(config.output_dir.clone(), config.mirror_dir.clone());
    let manifest = exporter
        .write_all(&output, started_at)
        .context("Failed to write output files")?;

    println!(
        "run {}: {} state rows, {} us rows, {} files in {}",
        manifest.run_id,
        output.state.len(),
        output.us.len(),
        manifest.files.len(),
        config.output_dir.display()
    );

    Ok(())
}

fn calibrate(config: &RunConfig) -> Result<()> {
    let source = CsvDirectorySource::new(&config.raw_data_dir);
    let state = SourceTables::load(&source, Granularity::State)
        .context("Failed to load state raw tables")?;

    let reference = NebRun::reference_window(&state)?;
    let variables = reference.index_variables()?;

    println!("{}", serde_json::to_string_pretty(&variables)?);
    Ok(())
}
