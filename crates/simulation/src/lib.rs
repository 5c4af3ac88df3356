//! Deterministic simulation runner.
//!
//! Drives one [`ExperimentControl`](layerswitch_control::ExperimentControl)
//! and a set of [`Node`](layerswitch_node::Node)s through simulated time.
//! Given the same seed, it produces identical results every run.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                  SimulationRunner                       │
//! │                                                         │
//! │  ┌────────────────────────────────────────────────────┐ │
//! │  │     Event Queue (BTreeMap<EventKey, QueuedEvent>)  │ │
//! │  │     Ordered by: time, priority, recipient, sequence│ │
//! │  └────────────────────────┬───────────────────────────┘ │
//! │                           │                             │
//! │             ┌─────────────┴─────────────┐               │
//! │             ▼                           ▼               │
//! │  ┌─────────────────────┐   ┌──────────────────────────┐ │
//! │  │  ExperimentControl  │   │  nodes: Vec<Node>        │ │
//! │  │  (view ▶ each node) │   │  one event at a time     │ │
//! │  └──────────┬──────────┘   └────────────┬─────────────┘ │
//! │             │                           │               │
//! │             ▼                           ▼               │
//! │  ┌────────────────────────────────────────────────────┐ │
//! │  │  ControlAction / Action → schedule new events      │ │
//! │  │  TransportCommand → SimulatedTransport             │ │
//! │  └────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────┘
//! ```

mod error;
mod event_queue;
mod network;
mod runner;
pub mod topology;
mod transport;

pub use error::SimulationError;
pub use network::NetworkConfig;
pub use runner::{SimulationRunner, SimulationStats};
pub use transport::{SimulatedTransport, TransportStats};

/// Index of a node in the runner, assigned in registration order.
pub type NodeIndex = u32;
