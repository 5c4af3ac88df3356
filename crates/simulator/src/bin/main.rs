//! Layer Switch Simulator CLI
//!
//! Run a layer-switch experiment over the reference topology.
//!
//! # Example
//!
//! ```bash
//! # Run an experiment file
//! layerswitch-sim --config switch.toml
//!
//! # Switch a seven-layer stack to direct between t=50 and t=75, over datagrams
//! layerswitch-sim --transport datagram --current-layer 7 --start 50 --end 75 -d 120
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use layerswitch_simulation::topology::TransportKind;
use layerswitch_simulator::{Experiment, ExperimentConfig};
use layerswitch_types::Layer;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "warn,layerswitch_simulator=info,layerswitch_control=info";

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Transport {
    Stream,
    Datagram,
}

impl From<Transport> for TransportKind {
    fn from(transport: Transport) -> Self {
        match transport {
            Transport::Stream => TransportKind::Stream,
            Transport::Datagram => TransportKind::Datagram,
        }
    }
}

/// Layer Switch Simulator
///
/// Runs deterministic layer-switch experiments. Single-threaded, reproducible
/// when the same seed is used. Command-line values override the experiment
/// file.
#[derive(Parser, Debug)]
#[command(name = "layerswitch-sim")]
#[command(version, about, long_about = None)]
struct Args {
    /// Experiment file (TOML)
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Transport the nodes use
    #[arg(short = 't', long, value_enum)]
    transport: Option<Transport>,

    /// Simulated duration in time-units
    #[arg(short = 'd', long)]
    duration: Option<f64>,

    /// Random seed for reproducible results. When omitted and the file sets
    /// none, a random seed is used.
    #[arg(long)]
    seed: Option<u64>,

    /// Layer count active outside the switch window
    #[arg(long)]
    current_layer: Option<u8>,

    /// Layer count active inside the switch window
    #[arg(long)]
    target_layer: Option<u8>,

    /// Switch window start in time-units
    #[arg(long)]
    start: Option<f64>,

    /// Switch window end in time-units
    #[arg(long)]
    end: Option<f64>,

    /// Keep the coordinator silent for the whole run
    #[arg(long)]
    no_switch: bool,

    /// Log filter, overriding RUST_LOG
    #[arg(long)]
    log_level: Option<String>,
}

fn units(value: f64, what: &str) -> Result<Duration> {
    Duration::try_from_secs_f64(value).with_context(|| format!("invalid {what}: {value}"))
}

fn layer(count: u8, what: &str) -> Result<Layer> {
    Layer::try_from(count).with_context(|| format!("invalid {what}"))
}

fn load(args: &Args) -> Result<ExperimentConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            ExperimentConfig::from_toml(&text)
                .with_context(|| format!("failed to parse {}", path.display()))?
        }
        None => ExperimentConfig::default(),
    };

    if let Some(transport) = args.transport {
        config.transport = transport.into();
    }
    if let Some(duration) = args.duration {
        config.duration = units(duration, "duration")?;
    }
    match args.seed {
        Some(seed) => config.network.seed = seed,
        None if args.config.is_none() => config.network.seed = rand::random(),
        None => {}
    }
    if let Some(count) = args.current_layer {
        config.control.current_layer = layer(count, "current layer")?;
    }
    if let Some(count) = args.target_layer {
        config.control.target_layer = layer(count, "target layer")?;
    }
    if let Some(start) = args.start {
        config.control.start_time = units(start, "switch start")?;
    }
    if let Some(end) = args.end {
        config.control.end_time = units(end, "switch end")?;
    }
    if args.no_switch {
        config.control.switch_enabled = false;
    }

    if config.duration.is_zero() {
        bail!("duration must be positive");
    }
    Ok(config)
}

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = match &args.log_level {
        Some(level) => EnvFilter::try_new(level).context("invalid log filter")?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = load(&args)?;
    info!(
        transport = %config.transport,
        duration_secs = config.duration.as_secs_f64(),
        seed = config.network.seed,
        nodes_overridden = config.nodes.len(),
        "Starting experiment"
    );

    let mut experiment = Experiment::new(&config).context("failed to set up experiment")?;
    let report = experiment.run().context("experiment failed")?;

    println!("\n{report}");
    Ok(())
}
