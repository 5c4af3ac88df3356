//! Sensor, aggregator and master node state machines.
//!
//! Every node variant is one [`Node`] parameterized over two capabilities:
//!
//! - a [`TransportStrategy`]: [`StreamTransport`] (connection-oriented
//!   request/reply with reassembly) or [`DatagramTransport`] (periodic
//!   datagrams with echo and loss counting)
//! - a [`ForwardingStrategy`]: [`Fanout`] to a fixed target list, [`Routed`]
//!   by message kind, or [`ReplyOnly`]
//!
//! # Lifecycle
//!
//! ```text
//!   Idle ──Start──▶ TransportActive ──StopTransport──▶ Draining ──in-flight = 0──▶ Stopped
//!                     ▲       │ DrainComplete (sources)                              │
//!                     │       ▼                                                      │
//!                     └── DirectActive ◀──────────── DrainComplete ──────────────────┤
//!                     ▲                                                              │
//!                     └──────────────────── ResumeTransport ◀────────────────────────┘
//! ```
//!
//! While `DirectActive` the node ticks every `frequency`, and each tick
//! delivers to its targets after `propagation_delay`. Targets answer after
//! the same delay; the round trip becomes a direct-path latency sample.

pub mod codec;
mod config;
mod error;
mod forwarding;
mod node;
mod state;
mod timer;
mod transport;

pub use config::NodeConfig;
pub use error::{ConfigError, NodeError};
pub use forwarding::{Fanout, ForwardingStrategy, ReplyOnly, Routed};
pub use node::{DataRecord, Node};
pub use state::{NodeCounters, NodeState};
pub use timer::{SessionTimer, TimerSlot};
pub use transport::{DatagramTransport, NodeContext, StreamTransport, TransportStrategy};
