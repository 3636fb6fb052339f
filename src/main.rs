use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use basic_cleaning::artifact::ArtifactRef;
use basic_cleaning::cleaning::{CleaningParams, CleaningStep};
use basic_cleaning::config::CleaningConfig;
use basic_cleaning::filter::PriceRange;
use basic_cleaning::logging;

#[derive(Parser, Debug)]
#[command(name = "basic_cleaning")]
#[command(about = "Clean Airbnb data: filter by price and NYC bounds, then publish a new artifact")]
#[command(version)]
struct Cli {
    /// Artifact name:version (e.g. sample.csv:latest)
    #[arg(long = "input_artifact")]
    input_artifact: String,

    /// Name for the output artifact (e.g. clean_sample.csv)
    #[arg(long = "output_artifact")]
    output_artifact: String,

    /// Type of the output artifact (e.g. clean_sample)
    #[arg(long = "output_type")]
    output_type: String,

    /// Description of the output artifact
    #[arg(long = "output_description")]
    output_description: String,

    /// Minimum price for filtering
    #[arg(long = "min_price", allow_negative_numbers = true)]
    min_price: f64,

    /// Maximum price for filtering
    #[arg(long = "max_price", allow_negative_numbers = true)]
    max_price: f64,

    /// Optional specific sample filename inside the artifact
    #[arg(long, default_value = "")]
    sample: String,

    /// Configuration file (defaults to basic_cleaning.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,
}

fn run(cli: Cli, config: CleaningConfig) -> anyhow::Result<()> {
    let params = CleaningParams {
        input_artifact: cli
            .input_artifact
            .parse::<ArtifactRef>()
            .context("parsing --input_artifact")?,
        output_artifact: cli.output_artifact,
        output_type: cli.output_type,
        output_description: cli.output_description,
        price_range: PriceRange::new(cli.min_price, cli.max_price)?,
        sample: Some(cli.sample).filter(|s| !s.is_empty()),
    };

    let ctx = config.run_context();
    info!(run_id = %ctx.run_id, project = %ctx.project, job_type = %ctx.job_type, "Starting run");

    let store = config
        .build_store(ctx.clone())
        .context("connecting to artifact store")?;
    let mirror = config.build_mirror();

    let mut step = CleaningStep::new(store.as_ref(), &ctx, config.run.work_dir.clone());
    if let Some(mirror) = mirror.as_ref() {
        step = step.with_mirror(mirror);
    }

    let report = step.run(&params)?;
    println!(
        "Cleaned {} -> {} ({} of {} rows kept, {} after price filter)",
        report.input.reference(),
        report.output.reference(),
        report.rows_written,
        report.rows_loaded,
        report.rows_after_price,
    );
    Ok(())
}

fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let config = match CleaningConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let _log_guard = logging::init_logging(&config.logging);

    match run(cli, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Basic cleaning failed: {:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
