//! Protocol events for the node state machines.

use crate::{
    ControlMessage, DirectMessage, PropagationStep, TransportCommand, TransportIndication,
};
use layerswitch_types::NodeName;

/// Priority levels for event ordering within the same timestamp.
///
/// Events at the same simulation time are processed in priority order.
/// Lower values = higher priority (processed first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum EventPriority {
    /// Internal events: consequences of prior event processing.
    Internal = 0,

    /// Timer events: scheduled by a node or the coordinator itself.
    Timer = 1,

    /// Network events: transport callbacks and direct deliveries.
    Network = 2,

    /// Control events: coordinator notifications to nodes.
    Control = 3,
}

/// Events that a node state machine processes.
#[derive(Debug, Clone)]
pub enum ProtocolEvent {
    // ═══════════════════════════════════════════════════════════════════════
    // Lifecycle
    // ═══════════════════════════════════════════════════════════════════════
    /// Delivered once at simulation start.
    Start,

    // ═══════════════════════════════════════════════════════════════════════
    // Timers
    // ═══════════════════════════════════════════════════════════════════════
    /// Session lifecycle timer fired.
    SessionTimer,

    /// Direct-path send loop fired.
    DirectTick,

    /// Periodic report timer fired.
    ReportTimer,

    // ═══════════════════════════════════════════════════════════════════════
    // Coordinator
    // ═══════════════════════════════════════════════════════════════════════
    /// Notification from the coordinator.
    Control(ControlMessage),

    // ═══════════════════════════════════════════════════════════════════════
    // Direct path
    // ═══════════════════════════════════════════════════════════════════════
    /// Direct-path delivery from another node.
    Direct {
        from: NodeName,
        message: DirectMessage,
    },

    /// Propagation delay elapsed; perform the delivery.
    Propagate(PropagationStep),

    // ═══════════════════════════════════════════════════════════════════════
    // Transport
    // ═══════════════════════════════════════════════════════════════════════
    /// Callback from the transport endpoint.
    Transport(TransportIndication),

    /// A transport command held back by a reply delay.
    DeferredCommand(TransportCommand),
}

impl ProtocolEvent {
    /// Get the priority for this event type.
    pub fn priority(&self) -> EventPriority {
        match self {
            ProtocolEvent::SessionTimer | ProtocolEvent::DirectTick | ProtocolEvent::ReportTimer => {
                EventPriority::Timer
            }
            ProtocolEvent::Direct { .. } | ProtocolEvent::Transport(_) => EventPriority::Network,
            ProtocolEvent::Control(_) => EventPriority::Control,
            ProtocolEvent::Start
            | ProtocolEvent::Propagate(_)
            | ProtocolEvent::DeferredCommand(_) => EventPriority::Internal,
        }
    }

    /// Short name for logs and error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            ProtocolEvent::Start => "Start",
            ProtocolEvent::SessionTimer => "SessionTimer",
            ProtocolEvent::DirectTick => "DirectTick",
            ProtocolEvent::ReportTimer => "ReportTimer",
            ProtocolEvent::Control(ControlMessage::StopTransport) => "StopTransport",
            ProtocolEvent::Control(ControlMessage::ResumeTransport) => "ResumeTransport",
            ProtocolEvent::Control(ControlMessage::DrainComplete) => "DrainComplete",
            ProtocolEvent::Direct {
                message: DirectMessage::Sent { .. },
                ..
            } => "DirectSent",
            ProtocolEvent::Direct {
                message: DirectMessage::Returned,
                ..
            } => "DirectReturned",
            ProtocolEvent::Propagate(_) => "Propagate",
            ProtocolEvent::Transport(_) => "Transport",
            ProtocolEvent::DeferredCommand(_) => "DeferredCommand",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_events_before_network_events() {
        let indication = ProtocolEvent::Transport(TransportIndication::Other { name: "x" });
        assert!(ProtocolEvent::DirectTick.priority() < indication.priority());
    }

    #[test]
    fn test_control_events_last() {
        let control = ProtocolEvent::Control(ControlMessage::StopTransport);
        assert_eq!(control.priority(), EventPriority::Control);
        assert_eq!(control.type_name(), "StopTransport");
    }
}
