use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use traffic_fd::{chart, sweep, Config, RunController, SamplingStrategy, SumoEngine};

/// Measure the fundamental diagram of a ring road with SUMO.
#[derive(Parser)]
#[command(name = "traffic-fd")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the JSON configuration; defaults are used when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Where to write the chart (overrides the configuration)
    #[arg(long)]
    chart: Option<PathBuf>,

    /// Where to write the measured curve (overrides the configuration)
    #[arg(long)]
    data: Option<PathBuf>,

    /// The sampling strategy (overrides the configuration)
    #[arg(long, value_enum)]
    sampling: Option<Sampling>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy, ValueEnum)]
enum Sampling {
    MeanSpeed,
    EdgeCrossings,
}

impl From<Sampling> for SamplingStrategy {
    fn from(sampling: Sampling) -> Self {
        match sampling {
            Sampling::MeanSpeed => SamplingStrategy::MeanSpeed,
            Sampling::EdgeCrossings => SamplingStrategy::EdgeCrossings,
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(chart) = cli.chart {
        config.output.chart = chart;
    }
    if let Some(data) = cli.data {
        config.output.data = data;
    }
    if let Some(sampling) = cli.sampling {
        config.protocol.sampling = sampling.into();
    }
    config.validate().context("invalid configuration")?;

    let vehicle_counts = config.sweep.vehicle_counts()?;
    let mut engine = SumoEngine::new(config.engine.clone());
    let mut controller = RunController::new(&mut engine, &config)?;
    let diagram = sweep(
        &mut controller,
        &vehicle_counts,
        config.sweep.failure_policy,
    )?;

    let data = File::create(&config.output.data)
        .with_context(|| format!("failed to create {}", config.output.data.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(data), &diagram)?;
    log::info!("wrote curve to {}", config.output.data.display());

    chart::render_svg(&diagram.densities, &diagram.flows, &config.output.chart)?;

    for point in diagram.points() {
        println!(
            "{:>5} vehicles  {:>8.2} veh/km  {:>9.2} veh/h",
            point.vehicle_count, point.density, point.flow
        );
    }
    Ok(())
}
