//! rq - range maintenance queue simulator
//!
//! CLI entry point for running simulations and inspecting configuration.

use std::fs;
use std::path::PathBuf;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use tracing::info;

use rangequeue::cli::{Cli, Command, OutputFormat};
use rangequeue::config::Config;
use rangequeue::sim::{SimulationReport, run_simulation};

fn setup_logging(verbose: bool) -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("rangequeue")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Log to a file so reports on stdout stay clean
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let log_file = fs::File::create(log_dir.join("rq.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (verbose: {})", verbose);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    match cli.command {
        Command::Simulate {
            ranges,
            duration_secs,
            concurrency,
            format,
        } => cmd_simulate(config, ranges, duration_secs, concurrency, format).await,
        Command::Config => cmd_config(&config),
    }
}

/// Run a simulation and print its report
async fn cmd_simulate(
    mut config: Config,
    ranges: Option<usize>,
    duration_secs: Option<u64>,
    concurrency: Option<usize>,
    format: OutputFormat,
) -> Result<()> {
    if let Some(ranges) = ranges {
        config.simulation.ranges = ranges;
    }
    if let Some(duration_secs) = duration_secs {
        config.simulation.duration_secs = duration_secs;
    }
    if let Some(concurrency) = concurrency {
        config.queue.max_concurrency = concurrency;
    }

    if format == OutputFormat::Text {
        println!(
            "Simulating {} ranges for {}s with {} workers...",
            config.simulation.ranges, config.simulation.duration_secs, config.queue.max_concurrency
        );
    }

    let report = run_simulation(config.queue, config.scanner, config.simulation).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print_report(&report),
    }
    Ok(())
}

fn print_report(report: &SimulationReport) {
    let metrics = &report.metrics;
    println!();
    println!("{}", "Simulation Report".bold());
    println!("  Elapsed:            {}ms ({} ticks)", report.elapsed_ms, report.ticks);
    println!(
        "  Ranges:             {} added, {} removed, {} hosted at end",
        report.ranges_added, report.ranges_removed, report.replicas
    );
    println!("  Process calls:      {}", report.process_calls);
    println!("  Successes:          {}", metrics.successes.to_string().green());
    println!("  Failures:           {}", metrics.failures.to_string().yellow());
    println!("  Evictions:          {}", metrics.evictions);
    println!("  Pending at end:     {}", metrics.pending);
    println!("  Purgatory at end:   {}", metrics.purgatory);
    println!("  Peak processing:    {}", metrics.peak_processing);
    println!("  Processing time:    {:?}", metrics.processing_time());

    let violations = if report.invariant_violations == 0 {
        "0".green()
    } else {
        report.invariant_violations.to_string().red().bold()
    };
    println!("  Invariant failures: {}", violations);
}

/// Print the effective configuration
fn cmd_config(config: &Config) -> Result<()> {
    print!("{}", config.to_yaml()?);
    Ok(())
}
