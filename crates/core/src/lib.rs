//! Core types for the layer-switching state machines.
//!
//! This crate provides the vocabulary shared by the coordinator, the nodes
//! and the runner:
//!
//! - [`ProtocolEvent`]: All events a node state machine processes
//! - [`Action`]: All outputs a node state machine can request
//! - [`ControlMessage`] / [`DirectMessage`]: Coordinator notifications and
//!   direct-path payloads
//! - [`TransportCommand`] / [`TransportIndication`]: The transport endpoint
//!   collaborator's command set and callback contract
//! - [`EventPriority`]: Ordering priority for events at the same timestamp
//! - [`StateMachine`]: The trait node state machines implement
//!
//! # Architecture
//!
//! ```text
//! Runner ──ProtocolEvent──▶ StateMachine::handle() ──Vec<Action>──▶ Runner
//!    ▲                            │ reads                             │
//!    │                            ▼                                   │
//!    └────────────────────── ControlView ◀── coordinator ◀────────────┘
//! ```
//!
//! The state machine is:
//! - **Synchronous**: No async, no .await
//! - **Deterministic**: Same state + event = same actions
//! - **Pure-ish**: Mutates self, but performs no I/O
//!
//! All I/O (timers, transport, direct delivery, statistics) is performed by
//! the runner executing the returned actions.

mod action;
mod message;
mod protocol_event;
mod timer;
mod traits;
mod transport;

pub use action::Action;
pub use message::{ControlMessage, DirectMessage, PropagationStep};
pub use protocol_event::{EventPriority, ProtocolEvent};
pub use timer::TimerId;
pub use traits::{ControlView, StateMachine};
pub use transport::{FailureCode, TransportCommand, TransportIndication};
