//! Connection-oriented request/reply transport.

use super::{NodeContext, TransportStrategy};
use crate::codec::{AppMessage, ReassemblyQueue};
use crate::timer::{SessionTimer, TimerSlot};
use crate::{NodeConfig, NodeError};
use bytes::Bytes;
use layerswitch_core::{ProtocolEvent, TimerId, TransportCommand, TransportIndication};
use layerswitch_types::{ConnectionId, DeliveryPath, Endpoint};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::time::Duration;
use tracing::{debug, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClientSocket {
    Closed,
    Connecting,
    Established(ConnectionId),
    /// We sent our close; waiting for `Closed`.
    Closing(ConnectionId),
}

/// Client side: sessions of request/reply round trips.
#[derive(Debug)]
struct StreamClient {
    remote: Endpoint,
    socket: ClientSocket,
    timer: TimerSlot<SessionTimer>,
    requests_left: u32,
    /// Send time of every unanswered request, oldest first.
    sent_at: VecDeque<Duration>,
    /// The first request was queued with the connect and goes out on establish.
    early_request: bool,
    reassembly: ReassemblyQueue,
}

impl StreamClient {
    fn new(remote: Endpoint) -> Self {
        Self {
            remote,
            socket: ClientSocket::Closed,
            timer: TimerSlot::new(TimerId::Session),
            requests_left: 0,
            sent_at: VecDeque::new(),
            early_request: false,
            reassembly: ReassemblyQueue::new(),
        }
    }

    fn owns(&self, conn: ConnectionId) -> bool {
        matches!(
            self.socket,
            ClientSocket::Established(c) | ClientSocket::Closing(c) if c == conn
        )
    }

    fn connect(&mut self, ctx: &mut NodeContext<'_>) {
        if self.socket != ClientSocket::Closed {
            debug!(node = %ctx.node, "Connect timer with socket open, ignoring");
            return;
        }
        self.socket = ClientSocket::Connecting;
        self.requests_left = ctx.config.num_requests_per_session;
        ctx.command(TransportCommand::Connect {
            remote: self.remote.clone(),
        });
        debug!(node = %ctx.node, remote = %self.remote, "Connecting");

        if ctx.config.early_send && self.requests_left > 0 {
            self.requests_left -= 1;
            self.sent_at.push_back(ctx.now);
            self.early_request = true;
        }
    }

    fn on_established(&mut self, ctx: &mut NodeContext<'_>, conn: ConnectionId) {
        if self.socket != ClientSocket::Connecting {
            warn!(node = %ctx.node, %conn, "Established without a pending connect, ignoring");
            return;
        }
        self.socket = ClientSocket::Established(conn);
        debug!(node = %ctx.node, %conn, "Connection established");

        if self.early_request {
            self.early_request = false;
            self.transmit(ctx, conn);
        }
        self.fill_pipeline(ctx, conn);
        if self.sent_at.is_empty() {
            self.close(ctx, conn);
        }
    }

    /// Send until `pipeline_depth` requests are outstanding or the session
    /// has none left.
    fn fill_pipeline(&mut self, ctx: &mut NodeContext<'_>, conn: ConnectionId) {
        let depth = ctx.config.pipeline_depth.max(1) as usize;
        while self.sent_at.len() < depth && self.requests_left > 0 {
            self.send_request(ctx, conn);
        }
    }

    fn send_request(&mut self, ctx: &mut NodeContext<'_>, conn: ConnectionId) {
        self.requests_left -= 1;
        self.sent_at.push_back(ctx.now);
        self.transmit(ctx, conn);
    }

    fn transmit(&self, ctx: &mut NodeContext<'_>, conn: ConnectionId) {
        let request = AppMessage::request(ctx.config.request_length, ctx.config.reply_length)
            .with_server_close(self.requests_left == 0);
        trace!(node = %ctx.node, %conn, remaining = self.requests_left, "Sending request");
        ctx.send(conn, request.encode());
    }

    fn on_send_timer(&mut self, ctx: &mut NodeContext<'_>) {
        match self.socket {
            ClientSocket::Established(conn) if self.requests_left > 0 => {
                self.fill_pipeline(ctx, conn)
            }
            socket => debug!(node = %ctx.node, ?socket, "Send timer without an open session"),
        }
    }

    fn on_data(
        &mut self,
        ctx: &mut NodeContext<'_>,
        conn: ConnectionId,
        bytes: Bytes,
    ) -> Result<(), NodeError> {
        ctx.counters.received(bytes.len());
        self.reassembly.push(&bytes);

        while let Some(message) = self.reassembly.pop()? {
            if !message.is_reply {
                warn!(node = %ctx.node, %conn, "Request received on a client connection, dropping");
                continue;
            }
            let sent = self
                .sent_at
                .pop_front()
                .ok_or(NodeError::UnmatchedReply { conn })?;
            ctx.record_latency(DeliveryPath::Transport, ctx.now.saturating_sub(sent));

            if self.requests_left > 0 {
                if !ctx.quiescing {
                    let think_time = ctx.config.think_time;
                    ctx.schedule_session(&mut self.timer, SessionTimer::Send, think_time);
                }
            } else if !message.server_close && self.sent_at.is_empty() {
                self.close(ctx, conn);
            }
        }
        Ok(())
    }

    fn close(&mut self, ctx: &mut NodeContext<'_>, conn: ConnectionId) {
        self.socket = ClientSocket::Closing(conn);
        ctx.command(TransportCommand::Close { conn });
    }

    fn on_peer_closed(&mut self, ctx: &mut NodeContext<'_>, conn: ConnectionId) {
        if self.socket == ClientSocket::Established(conn) {
            self.close(ctx, conn);
        }
    }

    fn on_closed(&mut self, ctx: &mut NodeContext<'_>, conn: ConnectionId) {
        self.socket = ClientSocket::Closed;
        self.reassembly.clear();
        if !self.sent_at.is_empty() {
            debug!(
                node = %ctx.node,
                %conn,
                unanswered = self.sent_at.len(),
                "Session closed with requests unanswered"
            );
            self.sent_at.clear();
        }
        if !ctx.quiescing {
            let idle = ctx.config.idle_interval;
            ctx.schedule_session(&mut self.timer, SessionTimer::Connect, idle);
        }
    }

    fn on_failure(&mut self, ctx: &mut NodeContext<'_>, reason: &dyn std::fmt::Display) {
        warn!(node = %ctx.node, remote = %self.remote, %reason, "Connection failed");
        self.socket = ClientSocket::Closed;
        self.sent_at.clear();
        self.early_request = false;
        self.reassembly.clear();
        if !ctx.quiescing {
            let backoff = ctx.config.reconnect_interval;
            ctx.schedule_session(&mut self.timer, SessionTimer::Connect, backoff);
        }
    }

    fn destroy(&mut self, ctx: &mut NodeContext<'_>) {
        self.timer.cancel(ctx.actions);
        if self.socket != ClientSocket::Closed {
            ctx.command(TransportCommand::Destroy);
            self.socket = ClientSocket::Closed;
        }
        self.sent_at.clear();
        self.early_request = false;
        self.reassembly.clear();
    }
}

/// Server side: answers requests on accepted connections.
#[derive(Debug)]
struct StreamServer {
    local: Endpoint,
    connections: BTreeMap<ConnectionId, ReassemblyQueue>,
    closing: BTreeSet<ConnectionId>,
    /// Longest reply delay seen; peer-initiated closes wait this long.
    max_msg_delay: Duration,
}

impl StreamServer {
    fn new(local: Endpoint) -> Self {
        Self {
            local,
            connections: BTreeMap::new(),
            closing: BTreeSet::new(),
            max_msg_delay: Duration::ZERO,
        }
    }

    fn owns(&self, conn: ConnectionId) -> bool {
        self.connections.contains_key(&conn)
    }

    fn on_data(
        &mut self,
        ctx: &mut NodeContext<'_>,
        conn: ConnectionId,
        bytes: Bytes,
    ) -> Result<(), NodeError> {
        ctx.counters.received(bytes.len());
        let Some(queue) = self.connections.get_mut(&conn) else {
            return Ok(());
        };
        queue.push(&bytes);
        let mut requests = Vec::new();
        while let Some(request) = queue.pop()? {
            requests.push(request);
        }

        for request in requests {
            if request.is_reply {
                warn!(node = %ctx.node, %conn, "Reply received on a server connection, dropping");
                continue;
            }
            let delay = ctx.config.reply_delay + request.reply_delay;
            self.max_msg_delay = self.max_msg_delay.max(delay);

            if request.expected_reply_length > 0 {
                ctx.counters.echoed += 1;
                let payload = request.reply().encode();
                if delay.is_zero() {
                    ctx.send(conn, payload);
                } else {
                    ctx.delay(
                        delay,
                        ProtocolEvent::DeferredCommand(TransportCommand::Send { conn, payload }),
                    );
                }
            }
            if request.server_close {
                if delay.is_zero() {
                    self.close(ctx, conn);
                } else {
                    ctx.delay(
                        delay,
                        ProtocolEvent::DeferredCommand(TransportCommand::Close { conn }),
                    );
                }
            }
        }
        Ok(())
    }

    fn close(&mut self, ctx: &mut NodeContext<'_>, conn: ConnectionId) {
        if self.owns(conn) && self.closing.insert(conn) {
            ctx.command(TransportCommand::Close { conn });
        }
    }

    fn on_peer_closed(&mut self, ctx: &mut NodeContext<'_>, conn: ConnectionId) {
        if self.max_msg_delay.is_zero() {
            self.close(ctx, conn);
        } else {
            ctx.delay(
                self.max_msg_delay,
                ProtocolEvent::DeferredCommand(TransportCommand::Close { conn }),
            );
        }
    }

    fn remove(&mut self, conn: ConnectionId) {
        self.connections.remove(&conn);
        self.closing.remove(&conn);
    }
}

/// Stream transport: an optional client session and an optional server.
#[derive(Debug)]
pub struct StreamTransport {
    client: Option<StreamClient>,
    server: Option<StreamServer>,
}

impl StreamTransport {
    /// Client if `connect_address` is set, server if `local_port` is set.
    pub fn from_config(config: &NodeConfig) -> Self {
        Self {
            client: config.connect_endpoint().map(StreamClient::new),
            server: config.local_endpoint().map(StreamServer::new),
        }
    }
}

impl TransportStrategy for StreamTransport {
    fn name(&self) -> &'static str {
        "stream"
    }

    fn on_start(&mut self, ctx: &mut NodeContext<'_>) -> Result<(), NodeError> {
        if let Some(server) = &self.server {
            ctx.command(TransportCommand::Listen {
                local: server.local.clone(),
            });
        }
        if let Some(client) = &mut self.client {
            let delay = ctx.config.start_time.saturating_sub(ctx.now);
            ctx.schedule_session(&mut client.timer, SessionTimer::Connect, delay);
        }
        Ok(())
    }

    fn on_session_timer(&mut self, ctx: &mut NodeContext<'_>) -> Result<(), NodeError> {
        let Some(client) = &mut self.client else {
            return Err(NodeError::TimerNotPending {
                timer: TimerId::Session,
            });
        };
        match client.timer.fire()? {
            SessionTimer::Connect => client.connect(ctx),
            SessionTimer::Send => client.on_send_timer(ctx),
            kind => debug!(node = %ctx.node, ?kind, "Session timer not used by stream transport"),
        }
        Ok(())
    }

    fn on_indication(
        &mut self,
        ctx: &mut NodeContext<'_>,
        indication: TransportIndication,
    ) -> Result<(), NodeError> {
        match indication {
            TransportIndication::Available { conn } => match &mut self.server {
                Some(server) => {
                    server.connections.insert(conn, ReassemblyQueue::new());
                    trace!(node = %ctx.node, %conn, "Accepted connection");
                }
                None => warn!(node = %ctx.node, %conn, "Connection accepted without a listener"),
            },

            TransportIndication::Established { conn } => match &mut self.client {
                Some(client) => client.on_established(ctx, conn),
                None => warn!(node = %ctx.node, %conn, "Established without a client"),
            },

            TransportIndication::Data { conn, bytes } => {
                if let Some(client) = self.client.as_mut().filter(|c| c.owns(conn)) {
                    client.on_data(ctx, conn, bytes)?;
                } else if let Some(server) = self.server.as_mut().filter(|s| s.owns(conn)) {
                    server.on_data(ctx, conn, bytes)?;
                } else {
                    debug!(node = %ctx.node, %conn, "Data on unknown connection, dropping");
                }
            }

            TransportIndication::PeerClosed { conn } => {
                if let Some(client) = self.client.as_mut().filter(|c| c.owns(conn)) {
                    client.on_peer_closed(ctx, conn);
                } else if let Some(server) = self.server.as_mut().filter(|s| s.owns(conn)) {
                    server.on_peer_closed(ctx, conn);
                }
            }

            TransportIndication::Closed { conn } => {
                if let Some(client) = self.client.as_mut().filter(|c| c.owns(conn)) {
                    client.on_closed(ctx, conn);
                } else if let Some(server) = self.server.as_mut() {
                    server.remove(conn);
                }
            }

            TransportIndication::Failure { conn, code } => {
                if let Some(server) = self.server.as_mut().filter(|s| s.owns(conn)) {
                    debug!(node = %ctx.node, %conn, %code, "Accepted connection failed");
                    server.remove(conn);
                } else if let Some(client) = self.client.as_mut().filter(|c| {
                    c.owns(conn) || c.socket == ClientSocket::Connecting
                }) {
                    client.on_failure(ctx, &code);
                }
            }

            TransportIndication::Datagram { from, .. } => {
                warn!(node = %ctx.node, %from, "Datagram on a stream transport, dropping");
            }

            TransportIndication::Other { name } => {
                warn!(node = %ctx.node, indication = name, "Unhandled transport indication");
            }
        }
        Ok(())
    }

    fn on_deferred(
        &mut self,
        ctx: &mut NodeContext<'_>,
        command: TransportCommand,
    ) -> Result<(), NodeError> {
        let Some(server) = &mut self.server else {
            return Ok(());
        };
        match command {
            TransportCommand::Send { conn, payload } if server.owns(conn) => {
                ctx.send(conn, payload);
            }
            TransportCommand::Close { conn } => server.close(ctx, conn),
            command => {
                debug!(node = %ctx.node, ?command, "Deferred command for a gone connection")
            }
        }
        Ok(())
    }

    fn in_flight(&self) -> usize {
        self.client.as_ref().map_or(0, |c| c.sent_at.len())
    }

    fn requests_left(&self) -> u32 {
        self.client.as_ref().map_or(0, |c| c.requests_left)
    }

    fn suspend(&mut self, ctx: &mut NodeContext<'_>) {
        if let Some(client) = &mut self.client {
            client.timer.cancel(ctx.actions);
        }
    }

    fn shutdown(&mut self, ctx: &mut NodeContext<'_>) {
        if let Some(client) = &mut self.client {
            client.destroy(ctx);
        }
    }

    fn resume(&mut self, ctx: &mut NodeContext<'_>) -> Result<(), NodeError> {
        let Some(client) = &mut self.client else {
            return Ok(());
        };
        match client.socket {
            ClientSocket::Closed => {
                let delay = ctx.config.start_time.saturating_sub(ctx.now);
                ctx.schedule_session(&mut client.timer, SessionTimer::Connect, delay);
            }
            ClientSocket::Established(_) if client.requests_left > 0 => {
                ctx.schedule_session(&mut client.timer, SessionTimer::Send, Duration::ZERO);
            }
            _ => {}
        }
        Ok(())
    }
}
