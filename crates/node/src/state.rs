//! Node lifecycle states and traffic counters.

use tracing::info;

/// Lifecycle of a node with respect to the layer switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeState {
    /// Created, not started.
    Idle,
    /// Sending and receiving through the transport endpoint.
    TransportActive,
    /// Forwarding over the direct path.
    DirectActive,
    /// Told to stop; waiting for in-flight requests to be answered.
    Draining,
    /// Transport endpoint torn down.
    Stopped,
}

impl NodeState {
    /// New transport work must not be started in this state.
    pub fn is_quiescing(self) -> bool {
        matches!(self, NodeState::Draining | NodeState::Stopped)
    }
}

/// Per-node traffic counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeCounters {
    pub msgs_sent: u64,
    pub msgs_rcvd: u64,
    pub bytes_sent: u64,
    pub bytes_rcvd: u64,
    /// Requests and datagrams answered on behalf of a peer.
    pub echoed: u64,
}

impl NodeCounters {
    pub fn sent(&mut self, bytes: usize) {
        self.msgs_sent += 1;
        self.bytes_sent += bytes as u64;
    }

    pub fn received(&mut self, bytes: usize) {
        self.msgs_rcvd += 1;
        self.bytes_rcvd += bytes as u64;
    }

    /// Log the counters at the end of a run.
    pub fn log(&self, node: &str) {
        info!(
            node,
            msgs_sent = self.msgs_sent,
            msgs_rcvd = self.msgs_rcvd,
            bytes_sent = self.bytes_sent,
            bytes_rcvd = self.bytes_rcvd,
            echoed = self.echoed,
            "Node finished"
        );
    }
}
