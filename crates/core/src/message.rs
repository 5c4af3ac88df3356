//! Messages exchanged between the coordinator and nodes, and between nodes
//! on the direct path.

use layerswitch_types::{MessageKind, NodeName};

/// Notifications sent by the coordinator to nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlMessage {
    /// Quiesce the transport endpoint once in-flight requests are answered.
    StopTransport,
    /// Re-open the transport endpoint and restart traffic.
    ResumeTransport,
    /// Every downstream node has stopped its transport; sources may start
    /// generating direct traffic.
    DrainComplete,
}

/// Payloads delivered on the direct path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirectMessage {
    /// Application data sent towards a target. The master tags the message
    /// with the kind it routed on.
    Sent { kind: Option<MessageKind> },
    /// The target's answer to an earlier `Sent`.
    Returned,
}

/// Second half of a direct delivery, fired after the propagation delay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropagationStep {
    /// Deliver `Sent` to this node's forwarding targets.
    Fanout,
    /// Deliver `Returned` to the node that sent us data.
    ReplyTo(NodeName),
}
