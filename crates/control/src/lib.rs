//! Experiment coordinator for runtime transport-layer switching.
//!
//! [`ExperimentControl`] is the single source of truth for which layer is
//! active and whether a switch is in progress. It is constructed by the
//! runner and injected into the run; nodes only ever see a read-only
//! [`ControlView`](layerswitch_core::ControlView) of it.
//!
//! # Switch protocol
//!
//! ```text
//!            start_time                                   end_time
//!   ───────────┬──────────────────────────────────────────────┬──────────▶
//!              │ SwitchBegin: layer := target, active := true │ SwitchEnd
//!              │ DrainPoll:   StopTransport ▶ downstream      │  active := false
//!              │              ... TransportStopped ◀ each ... │  layer := current
//!              │              DrainComplete ▶ upstream        │  ResumeTransport ▶ downstream
//! ```
//!
//! If the drain has not completed by `end_time` the end is deferred and the
//! switch stays active until the last downstream node reports.

mod config;
mod coordinator;
mod error;
mod stats;

pub use config::ControlConfig;
pub use coordinator::{ControlAction, ControlEvent, ExperimentControl};
pub use error::ControlError;
pub use stats::{ControlReport, LatencyStats, LatencySummary};
