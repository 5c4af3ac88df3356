//! Event queue with deterministic ordering.

use crate::NodeIndex;
use layerswitch_control::ControlEvent;
use layerswitch_core::{EventPriority, ProtocolEvent};
use std::cmp::Ordering;
use std::time::Duration;

/// Who processes a queued event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Recipient {
    /// The coordinator. Sorts before every node.
    Control,
    Node(NodeIndex),
}

/// A queued event.
#[derive(Debug, Clone)]
pub enum QueuedEvent {
    Control(ControlEvent),
    Node(ProtocolEvent),
}

impl QueuedEvent {
    /// Coordinator events run before node events at the same instant, so a
    /// layer flip is visible to every node handler at that time.
    pub fn priority(&self) -> EventPriority {
        match self {
            QueuedEvent::Control(_) => EventPriority::Internal,
            QueuedEvent::Node(event) => event.priority(),
        }
    }
}

/// Key for ordering events in the queue.
///
/// Events are ordered by:
/// 1. Time (earlier first)
/// 2. Priority (internal before timers before network before control)
/// 3. Recipient (coordinator, then node index)
/// 4. Sequence number (FIFO for same time/priority/recipient)
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct EventKey {
    /// When this event should be processed.
    pub time: Duration,
    /// Priority for ordering at same time.
    pub priority: EventPriority,
    /// Who receives this event.
    pub recipient: Recipient,
    /// Sequence number for deterministic FIFO ordering.
    pub sequence: u64,
}

impl EventKey {
    pub fn new(time: Duration, event: &QueuedEvent, recipient: Recipient, sequence: u64) -> Self {
        Self {
            time,
            priority: event.priority(),
            recipient,
            sequence,
        }
    }
}

impl Ord for EventKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.time.cmp(&other.time) {
            Ordering::Equal => {}
            ord => return ord,
        }

        match self.priority.cmp(&other.priority) {
            Ordering::Equal => {}
            ord => return ord,
        }

        match self.recipient.cmp(&other.recipient) {
            Ordering::Equal => {}
            ord => return ord,
        }

        self.sequence.cmp(&other.sequence)
    }
}

impl PartialOrd for EventKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(secs: u64, priority: EventPriority, recipient: Recipient, sequence: u64) -> EventKey {
        EventKey {
            time: Duration::from_secs(secs),
            priority,
            recipient,
            sequence,
        }
    }

    #[test]
    fn test_event_key_ordering() {
        let earlier = key(1, EventPriority::Network, Recipient::Node(0), 2);
        let later = key(2, EventPriority::Internal, Recipient::Node(0), 1);
        assert!(earlier < later);
    }

    #[test]
    fn test_priority_ordering_at_same_time() {
        let timer = key(1, EventPriority::Timer, Recipient::Node(3), 9);
        let network = key(1, EventPriority::Network, Recipient::Node(0), 1);
        assert!(timer < network, "Timers should fire before deliveries");
    }

    #[test]
    fn test_coordinator_first_at_same_priority() {
        let control = key(1, EventPriority::Internal, Recipient::Control, 5);
        let node = key(1, EventPriority::Internal, Recipient::Node(0), 1);
        assert!(control < node);
    }

    #[test]
    fn test_fifo_for_same_recipient() {
        let begin = key(50, EventPriority::Internal, Recipient::Control, 1);
        let poll = key(50, EventPriority::Internal, Recipient::Control, 2);
        assert!(begin < poll, "Submission order must hold at equal time");
    }

    #[test]
    fn test_control_events_are_internal() {
        let event = QueuedEvent::Control(ControlEvent::SwitchEnd);
        assert_eq!(event.priority(), EventPriority::Internal);
        let event = QueuedEvent::Node(ProtocolEvent::DirectTick);
        assert_eq!(event.priority(), EventPriority::Timer);
    }
}
