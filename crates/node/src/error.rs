//! Node errors.
//!
//! Every variant is fatal: it signals a bug in the coordination logic or a
//! broken configuration, never a recoverable runtime condition. Transport
//! failures are handled locally and never surface here.

use crate::codec::CodecError;
use crate::NodeState;
use layerswitch_core::TimerId;
use layerswitch_types::{ConnectionId, Layer, MessageKind};
use std::time::Duration;

/// Configuration errors, detected at setup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("stop time {stop:?} is before start time {start:?}")]
    InvalidStartStop { start: Duration, stop: Duration },

    #[error("destination address {0:?} does not resolve to any node")]
    UnresolvableAddress(String),

    #[error("no route configured for message kind {0}")]
    MissingRoute(MessageKind),
}

/// Protocol invariant violations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NodeError {
    #[error("unexpected {event} in state {state:?}")]
    UnexpectedEvent { state: NodeState, event: &'static str },

    #[error("{timer:?} timer fired with nothing pending")]
    TimerNotPending { timer: TimerId },

    #[error("direct delivery attempted while layer {layer} is active")]
    InvalidRoute { layer: Layer },

    #[error("message kind {kind} has no route")]
    NoRoute { kind: MessageKind },

    #[error("reply on {conn} without a matching request")]
    UnmatchedReply { conn: ConnectionId },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Codec(#[from] CodecError),
}
