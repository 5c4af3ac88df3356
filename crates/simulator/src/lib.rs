//! Layer Switch Simulator
//!
//! Runs the reference sensor/aggregator/master topology through a layer
//! switch and reports the latency each delivery path achieved.
//!
//! # Architecture
//!
//! The simulator builds on `layerswitch-simulation` to provide:
//!
//! - **Experiment files**: TOML with `[control]`, `[network]`, `[defaults]`
//!   and per-node `[[node]]` tables
//! - **Topology wiring**: stream or datagram addressing for the seven nodes
//! - **Reporting**: coordinator latency summaries plus runner and transport
//!   counters
//!
//! # Example
//!
//! ```ignore
//! use layerswitch_simulator::{Experiment, ExperimentConfig};
//!
//! let config = ExperimentConfig::from_toml(&std::fs::read_to_string("switch.toml")?)?;
//! let mut experiment = Experiment::new(&config)?;
//! let report = experiment.run()?;
//!
//! println!("{report}");
//! ```

mod config;
mod runner;

pub use config::{ExperimentConfig, NodeOverride};
pub use runner::{Experiment, ExperimentReport};
