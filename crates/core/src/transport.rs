//! The transport endpoint collaborator's command set and callback contract.
//!
//! Nodes never touch sockets. They emit [`TransportCommand`]s and receive
//! [`TransportIndication`]s, always as scheduled events and never
//! synchronously.

use bytes::Bytes;
use layerswitch_types::{ConnectionId, Endpoint};
use std::fmt;

/// Requests a node makes of its transport endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCommand {
    /// Accept stream connections on `local`.
    Listen { local: Endpoint },
    /// Open the node's client stream connection to `remote`.
    Connect { remote: Endpoint },
    /// Open the node's datagram socket on `local`.
    Bind { local: Endpoint },
    /// Send bytes on an established stream connection.
    Send { conn: ConnectionId, payload: Bytes },
    /// Send a datagram from the bound socket.
    SendTo { dest: Endpoint, payload: Bytes },
    /// Orderly close of one stream connection.
    Close { conn: ConnectionId },
    /// Tear down the node's client stream connection or datagram socket
    /// without a handshake. Listening sockets survive.
    Destroy,
}

/// Reasons a stream connection can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureCode {
    /// Nobody listens on the remote endpoint.
    Refused,
    /// The remote endpoint is not known to the network.
    Unreachable,
    /// The peer aborted the connection.
    Reset,
}

impl fmt::Display for FailureCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureCode::Refused => f.write_str("connection refused"),
            FailureCode::Unreachable => f.write_str("destination unreachable"),
            FailureCode::Reset => f.write_str("connection reset"),
        }
    }
}

/// Callbacks from the transport endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportIndication {
    /// A peer connected to one of our listening sockets.
    Available { conn: ConnectionId },
    /// Our client connection finished its handshake.
    Established { conn: ConnectionId },
    /// Bytes arrived on a stream connection.
    Data { conn: ConnectionId, bytes: Bytes },
    /// A datagram arrived on the bound socket.
    Datagram { from: Endpoint, bytes: Bytes },
    /// The peer closed its side of the connection.
    PeerClosed { conn: ConnectionId },
    /// Both sides have closed; the connection is gone.
    Closed { conn: ConnectionId },
    /// The connection attempt or the connection failed.
    Failure { conn: ConnectionId, code: FailureCode },
    /// Any other status indication. Not part of the protocol surface.
    Other { name: &'static str },
}

impl TransportIndication {
    /// Connection the indication refers to, if any.
    pub fn connection(&self) -> Option<ConnectionId> {
        match self {
            TransportIndication::Available { conn }
            | TransportIndication::Established { conn }
            | TransportIndication::Data { conn, .. }
            | TransportIndication::PeerClosed { conn }
            | TransportIndication::Closed { conn }
            | TransportIndication::Failure { conn, .. } => Some(*conn),
            TransportIndication::Datagram { .. } | TransportIndication::Other { .. } => None,
        }
    }
}
