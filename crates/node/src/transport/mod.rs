//! Transport strategies.
//!
//! A node drives its transport endpoint through one [`TransportStrategy`]:
//! [`StreamTransport`] for connection-oriented request/reply traffic and
//! [`DatagramTransport`] for fire-and-echo datagrams. Strategies see the
//! node through a [`NodeContext`] and push their outputs into it.

mod datagram;
mod stream;

pub use datagram::DatagramTransport;
pub use stream::StreamTransport;

use crate::timer::{SessionTimer, TimerSlot};
use crate::{NodeConfig, NodeCounters, NodeError};
use bytes::Bytes;
use layerswitch_core::{
    Action, ControlView, ProtocolEvent, TransportCommand, TransportIndication,
};
use layerswitch_types::{ConnectionId, DeliveryPath, Endpoint, NodeName};
use std::time::Duration;
use tracing::debug;

/// Borrowed view of a node handed to its strategies for one event.
pub struct NodeContext<'a> {
    pub now: Duration,
    pub node: &'a NodeName,
    pub config: &'a NodeConfig,
    pub control: &'a ControlView,
    pub counters: &'a mut NodeCounters,
    /// The node is draining or stopped; no new transport work may start.
    pub quiescing: bool,
    pub actions: &'a mut Vec<Action>,
}

impl NodeContext<'_> {
    pub fn command(&mut self, command: TransportCommand) {
        self.actions.push(Action::Transport(command));
    }

    /// Send on a stream connection, counting the bytes.
    pub fn send(&mut self, conn: ConnectionId, payload: Bytes) {
        self.counters.sent(payload.len());
        self.command(TransportCommand::Send { conn, payload });
    }

    /// Send a datagram, counting the bytes.
    pub fn send_to(&mut self, dest: Endpoint, payload: Bytes) {
        self.counters.sent(payload.len());
        self.command(TransportCommand::SendTo { dest, payload });
    }

    pub fn record_latency(&mut self, path: DeliveryPath, sample: Duration) {
        self.actions.push(Action::RecordLatency { path, sample });
    }

    /// Deliver `event` back to this node after `delay`.
    pub fn delay(&mut self, delay: Duration, event: ProtocolEvent) {
        self.actions.push(Action::EnqueueDelayed { delay, event });
    }

    /// Reschedule the session timer unless that would fire at or after the
    /// stop time, in which case the timer is deleted. Returns whether it was
    /// scheduled.
    pub fn schedule_session(
        &mut self,
        slot: &mut TimerSlot<SessionTimer>,
        kind: SessionTimer,
        delay: Duration,
    ) -> bool {
        if let Some(stop) = self.config.stop_time {
            if self.now + delay >= stop {
                debug!(node = %self.node, ?kind, "Session timer past stop time, deleting");
                slot.cancel(self.actions);
                return false;
            }
        }
        slot.reschedule(kind, delay, self.actions);
        true
    }
}

/// Capability to drive a transport endpoint.
///
/// Implementations own their sockets' bookkeeping and their session timer.
/// They never decide the node's lifecycle state; the node tells them to
/// [`suspend`](Self::suspend), [`shutdown`](Self::shutdown) or
/// [`resume`](Self::resume).
pub trait TransportStrategy: Send {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Open listening or bound sockets and schedule the first session.
    fn on_start(&mut self, ctx: &mut NodeContext<'_>) -> Result<(), NodeError>;

    /// The session timer fired.
    fn on_session_timer(&mut self, ctx: &mut NodeContext<'_>) -> Result<(), NodeError>;

    /// A transport callback arrived.
    fn on_indication(
        &mut self,
        ctx: &mut NodeContext<'_>,
        indication: TransportIndication,
    ) -> Result<(), NodeError>;

    /// A command held back by a reply delay is due.
    fn on_deferred(
        &mut self,
        ctx: &mut NodeContext<'_>,
        command: TransportCommand,
    ) -> Result<(), NodeError>;

    /// Requests sent and not yet answered.
    fn in_flight(&self) -> usize;

    /// Round trips still to start in the current session.
    fn requests_left(&self) -> u32 {
        0
    }

    /// Stop scheduling new sessions; sockets stay open.
    fn suspend(&mut self, ctx: &mut NodeContext<'_>);

    /// Destroy the client socket and cancel the session timer.
    fn shutdown(&mut self, ctx: &mut NodeContext<'_>);

    /// Re-open what `shutdown` or `suspend` closed and restart traffic now.
    fn resume(&mut self, ctx: &mut NodeContext<'_>) -> Result<(), NodeError>;
}
