//! Action types for the node state machines.

use crate::{DirectMessage, ProtocolEvent, TimerId, TransportCommand};
use layerswitch_types::{DeliveryPath, NodeName};
use std::time::Duration;

/// Actions a node state machine asks the runner to perform.
///
/// Actions are **commands** - the state machine decides, the runner executes.
#[derive(Debug, Clone)]
pub enum Action {
    // ═══════════════════════════════════════════════════════════════════════
    // Timers
    // ═══════════════════════════════════════════════════════════════════════
    /// Schedule `id` to fire after `duration`, replacing any pending instance.
    SetTimer { id: TimerId, duration: Duration },

    /// Cancel the pending instance of `id`, if any.
    CancelTimer { id: TimerId },

    /// Deliver `event` back to this node after `delay`.
    EnqueueDelayed {
        delay: Duration,
        event: ProtocolEvent,
    },

    // ═══════════════════════════════════════════════════════════════════════
    // Delivery
    // ═══════════════════════════════════════════════════════════════════════
    /// Zero-delay delivery to another node, bypassing the transport.
    SendDirect { to: NodeName, message: DirectMessage },

    /// Command for this node's transport endpoint.
    Transport(TransportCommand),

    // ═══════════════════════════════════════════════════════════════════════
    // Coordinator
    // ═══════════════════════════════════════════════════════════════════════
    /// Add a latency sample to the coordinator's histogram for `path`.
    RecordLatency { path: DeliveryPath, sample: Duration },

    /// Add newly lost datagrams to the coordinator's counter.
    RecordPacketLoss { count: u64 },

    /// This node finished draining after a `StopTransport`.
    TransportStopped,
}

impl Action {
    /// Short name for logs.
    pub fn type_name(&self) -> &'static str {
        match self {
            Action::SetTimer { .. } => "SetTimer",
            Action::CancelTimer { .. } => "CancelTimer",
            Action::EnqueueDelayed { .. } => "EnqueueDelayed",
            Action::SendDirect { .. } => "SendDirect",
            Action::Transport(_) => "Transport",
            Action::RecordLatency { .. } => "RecordLatency",
            Action::RecordPacketLoss { .. } => "RecordPacketLoss",
            Action::TransportStopped => "TransportStopped",
        }
    }
}
