//! Simulated transport collaborator.
//!
//! Executes the [`TransportCommand`]s nodes emit and returns the
//! [`TransportIndication`]s they cause, each stamped with a delivery time.
//! Nothing is delivered synchronously: every indication reaches its node as
//! a scheduled event.
//!
//! Stream connections deliver in order per direction: a segment never
//! overtakes an earlier one, whatever latency the jitter model samples.
//! Datagrams are independent and may be lost.

use crate::{NetworkConfig, NodeIndex};
use bytes::Bytes;
use layerswitch_core::{FailureCode, TransportCommand, TransportIndication};
use layerswitch_types::{ConnectionId, Endpoint, NodeName};
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, trace};

/// An indication to schedule for a node.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub to: NodeIndex,
    pub at: Duration,
    pub indication: TransportIndication,
}

const CLIENT_TO_SERVER: usize = 0;
const SERVER_TO_CLIENT: usize = 1;

#[derive(Debug)]
struct Connection {
    client: NodeIndex,
    server: NodeIndex,
    /// Close requested, by direction of the closing side.
    closed: [bool; 2],
    /// Delivery time of the last segment sent in each direction.
    last_delivery: [Duration; 2],
}

impl Connection {
    fn direction(&self, from: NodeIndex) -> usize {
        if from == self.client {
            CLIENT_TO_SERVER
        } else {
            SERVER_TO_CLIENT
        }
    }

    fn peer(&self, from: NodeIndex) -> NodeIndex {
        if from == self.client {
            self.server
        } else {
            self.client
        }
    }

    /// Delivery time for a segment sent now, kept in order per direction.
    fn schedule(&mut self, direction: usize, earliest: Duration) -> Duration {
        let at = earliest.max(self.last_delivery[direction]);
        self.last_delivery[direction] = at;
        at
    }
}

/// Counters kept by the transport.
#[derive(Debug, Default, Clone)]
pub struct TransportStats {
    pub connections_opened: u64,
    pub connections_refused: u64,
    pub segments_sent: u64,
    pub datagrams_sent: u64,
    pub datagrams_lost: u64,
    /// Datagrams to an endpoint nobody is bound on.
    pub datagrams_unreachable: u64,
}

/// In-memory transport shared by every node of a run.
pub struct SimulatedTransport {
    config: NetworkConfig,
    /// Address book: node names are the only resolvable addresses.
    addresses: BTreeMap<String, NodeIndex>,
    names: BTreeMap<NodeIndex, NodeName>,
    listeners: BTreeMap<Endpoint, NodeIndex>,
    bound: BTreeMap<Endpoint, NodeIndex>,
    bound_by_node: BTreeMap<NodeIndex, Endpoint>,
    connections: BTreeMap<ConnectionId, Connection>,
    /// The client connection each node currently owns.
    client_connections: BTreeMap<NodeIndex, ConnectionId>,
    /// Connection ends torn down with `Destroy`, with the delivery time of
    /// the last indication already in flight toward them. Indications to a
    /// listed end are dropped; entries expire once that time has passed.
    destroyed: BTreeMap<(NodeIndex, ConnectionId), Duration>,
    next_connection: u32,
    stats: TransportStats,
}

impl std::fmt::Debug for SimulatedTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedTransport")
            .field("config", &self.config)
            .field("listeners", &self.listeners.len())
            .field("bound", &self.bound.len())
            .field("connections", &self.connections.len())
            .finish()
    }
}

impl SimulatedTransport {
    pub fn new(config: NetworkConfig) -> Self {
        Self {
            config,
            addresses: BTreeMap::new(),
            names: BTreeMap::new(),
            listeners: BTreeMap::new(),
            bound: BTreeMap::new(),
            bound_by_node: BTreeMap::new(),
            connections: BTreeMap::new(),
            client_connections: BTreeMap::new(),
            destroyed: BTreeMap::new(),
            next_connection: 1,
            stats: TransportStats::default(),
        }
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn stats(&self) -> &TransportStats {
        &self.stats
    }

    /// Make `name` resolvable as an address of `node`.
    pub fn register(&mut self, node: NodeIndex, name: &NodeName) {
        self.addresses.insert(name.as_str().to_string(), node);
        self.names.insert(node, name.clone());
    }

    /// Node reachable at `address`, if any.
    pub fn resolve(&self, address: &str) -> Option<NodeIndex> {
        self.addresses.get(address).copied()
    }

    /// Connections open or closing.
    pub fn open_connections(&self) -> usize {
        self.connections.len()
    }

    /// Whether `to` should still receive `indication`.
    ///
    /// Indications for connection ends that were destroyed, and datagrams
    /// for nodes no longer bound, are dropped at delivery.
    pub fn accepts(&self, to: NodeIndex, indication: &TransportIndication) -> bool {
        match indication {
            TransportIndication::Datagram { .. } => self.bound_by_node.contains_key(&to),
            other => other
                .connection()
                .map_or(true, |conn| !self.destroyed.contains_key(&(to, conn))),
        }
    }

    /// Local endpoints default to the node's own name.
    fn local_endpoint(&self, node: NodeIndex, local: Endpoint) -> Endpoint {
        if local.address.is_empty() {
            let address = self
                .names
                .get(&node)
                .map(|n| n.as_str().to_string())
                .unwrap_or_default();
            Endpoint::new(address, local.port)
        } else {
            local
        }
    }

    /// Execute `command` for node `from` at `now`.
    pub fn execute(
        &mut self,
        from: NodeIndex,
        command: TransportCommand,
        now: Duration,
        rng: &mut ChaCha8Rng,
    ) -> Vec<Delivery> {
        self.destroyed.retain(|_, drained_at| *drained_at >= now);
        match command {
            TransportCommand::Listen { local } => {
                let local = self.local_endpoint(from, local);
                trace!(node = from, %local, "Listening");
                self.listeners.insert(local, from);
                vec![]
            }
            TransportCommand::Bind { local } => {
                let local = self.local_endpoint(from, local);
                trace!(node = from, %local, "Bound");
                self.bound.insert(local.clone(), from);
                self.bound_by_node.insert(from, local);
                vec![]
            }
            TransportCommand::Connect { remote } => self.connect(from, remote, now, rng),
            TransportCommand::Send { conn, payload } => self.send(from, conn, payload, now, rng),
            TransportCommand::SendTo { dest, payload } => {
                self.send_to(from, dest, payload, now, rng)
            }
            TransportCommand::Close { conn } => self.close(from, conn, now, rng),
            TransportCommand::Destroy => self.destroy(from, now, rng),
        }
    }

    fn connect(
        &mut self,
        from: NodeIndex,
        remote: Endpoint,
        now: Duration,
        rng: &mut ChaCha8Rng,
    ) -> Vec<Delivery> {
        let conn = ConnectionId(self.next_connection);
        self.next_connection += 1;

        let listener = self.listeners.get(&remote).copied();
        let Some(server) = listener else {
            self.stats.connections_refused += 1;
            let code = if self.resolve(&remote.address).is_some() {
                FailureCode::Refused
            } else {
                FailureCode::Unreachable
            };
            debug!(node = from, %remote, %conn, %code, "Connect failed");
            let round_trip =
                self.config.sample_latency(rng) + self.config.sample_latency(rng);
            return vec![Delivery {
                to: from,
                at: now + round_trip,
                indication: TransportIndication::Failure { conn, code },
            }];
        };

        let syn = now + self.config.sample_latency(rng);
        let syn_ack = syn + self.config.sample_latency(rng);
        self.connections.insert(
            conn,
            Connection {
                client: from,
                server,
                closed: [false; 2],
                last_delivery: [syn, syn_ack],
            },
        );
        self.client_connections.insert(from, conn);
        self.stats.connections_opened += 1;
        debug!(node = from, %remote, %conn, "Connecting");

        vec![
            Delivery {
                to: server,
                at: syn,
                indication: TransportIndication::Available { conn },
            },
            Delivery {
                to: from,
                at: syn_ack,
                indication: TransportIndication::Established { conn },
            },
        ]
    }

    fn send(
        &mut self,
        from: NodeIndex,
        conn: ConnectionId,
        payload: Bytes,
        now: Duration,
        rng: &mut ChaCha8Rng,
    ) -> Vec<Delivery> {
        let Some(connection) = self.connections.get_mut(&conn) else {
            debug!(node = from, %conn, "Send on a gone connection, dropping");
            return vec![];
        };
        let direction = connection.direction(from);
        if connection.closed[direction] {
            debug!(node = from, %conn, "Send after close, dropping");
            return vec![];
        }
        let to = connection.peer(from);

        let mss = self.config.segment_size();
        let mut deliveries = Vec::new();
        let mut offset = 0;
        while offset < payload.len() {
            let end = payload.len().min(offset.saturating_add(mss));
            let at = connection.schedule(direction, now + self.config.sample_latency(rng));
            deliveries.push(Delivery {
                to,
                at,
                indication: TransportIndication::Data {
                    conn,
                    bytes: payload.slice(offset..end),
                },
            });
            offset = end;
        }
        self.stats.segments_sent += deliveries.len() as u64;
        deliveries
    }

    fn send_to(
        &mut self,
        from: NodeIndex,
        dest: Endpoint,
        payload: Bytes,
        now: Duration,
        rng: &mut ChaCha8Rng,
    ) -> Vec<Delivery> {
        let target = self.bound.get(&dest).copied();
        let Some(to) = target else {
            self.stats.datagrams_unreachable += 1;
            debug!(node = from, %dest, "Datagram to an unbound endpoint, dropping");
            return vec![];
        };
        if self.config.should_drop_packet(rng) {
            self.stats.datagrams_lost += 1;
            trace!(node = from, %dest, "Datagram lost");
            return vec![];
        }
        let source = self
            .bound_by_node
            .get(&from)
            .cloned()
            .unwrap_or_else(|| self.local_endpoint(from, Endpoint::new("", 0)));
        self.stats.datagrams_sent += 1;
        vec![Delivery {
            to,
            at: now + self.config.sample_latency(rng),
            indication: TransportIndication::Datagram {
                from: source,
                bytes: payload,
            },
        }]
    }

    fn close(
        &mut self,
        from: NodeIndex,
        conn: ConnectionId,
        now: Duration,
        rng: &mut ChaCha8Rng,
    ) -> Vec<Delivery> {
        let Some(connection) = self.connections.get_mut(&conn) else {
            debug!(node = from, %conn, "Close on a gone connection, ignoring");
            return vec![];
        };
        let direction = connection.direction(from);
        if connection.closed[direction] {
            return vec![];
        }
        connection.closed[direction] = true;
        let peer = connection.peer(from);
        let fin = connection.schedule(direction, now + self.config.sample_latency(rng));

        if !connection.closed[1 - direction] {
            trace!(node = from, %conn, "Half close");
            return vec![Delivery {
                to: peer,
                at: fin,
                indication: TransportIndication::PeerClosed { conn },
            }];
        }

        // Both sides closed: the peer sees the final FIN, we see its ACK.
        let ack = fin + self.config.sample_latency(rng);
        self.remove(conn);
        trace!(node = from, %conn, "Connection closed");
        vec![
            Delivery {
                to: peer,
                at: fin,
                indication: TransportIndication::Closed { conn },
            },
            Delivery {
                to: from,
                at: ack,
                indication: TransportIndication::Closed { conn },
            },
        ]
    }

    /// Tear down the node's client connection and datagram socket. Listeners
    /// survive.
    fn destroy(&mut self, from: NodeIndex, now: Duration, rng: &mut ChaCha8Rng) -> Vec<Delivery> {
        let mut deliveries = Vec::new();

        if let Some(local) = self.bound_by_node.remove(&from) {
            debug!(node = from, %local, "Datagram socket destroyed");
            self.bound.remove(&local);
        }

        if let Some(conn) = self.client_connections.remove(&from) {
            if let Some(mut connection) = self.connections.remove(&conn) {
                let direction = connection.direction(from);
                let peer = connection.peer(from);
                let inbound = connection.last_delivery[connection.direction(peer)];
                self.destroyed.insert((from, conn), inbound);
                let at = connection.schedule(direction, now + self.config.sample_latency(rng));
                debug!(node = from, %conn, "Client socket destroyed, resetting peer");
                deliveries.push(Delivery {
                    to: peer,
                    at,
                    indication: TransportIndication::Failure {
                        conn,
                        code: FailureCode::Reset,
                    },
                });
            }
        }
        deliveries
    }

    fn remove(&mut self, conn: ConnectionId) {
        if let Some(connection) = self.connections.remove(&conn) {
            if self.client_connections.get(&connection.client) == Some(&conn) {
                self.client_connections.remove(&connection.client);
            }
        }
    }
}
