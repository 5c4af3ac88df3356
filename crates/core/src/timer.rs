//! Timer identification.
//!
//! The state machine emits `Action::SetTimer` and `Action::CancelTimer`; the
//! runner keeps at most one pending instance per `(node, TimerId)`.

use crate::ProtocolEvent;

/// Timer identification for scheduled events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimerId {
    /// Session lifecycle timer (start, connect, send, stop)
    Session,
    /// Direct-path send loop
    DirectTick,
    /// Periodic packet-loss report on the master
    Report,
}

impl TimerId {
    /// The event delivered when this timer fires.
    pub fn event(self) -> ProtocolEvent {
        match self {
            TimerId::Session => ProtocolEvent::SessionTimer,
            TimerId::DirectTick => ProtocolEvent::DirectTick,
            TimerId::Report => ProtocolEvent::ReportTimer,
        }
    }
}
