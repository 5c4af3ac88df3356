//! Single-slot timer handles.
//!
//! A node owns one [`TimerSlot`] per [`TimerId`]. Rescheduling cancels the
//! pending instance before setting the new one, so a slot never has more
//! than one outstanding firing.

use crate::NodeError;
use layerswitch_core::{Action, TimerId};
use std::time::Duration;

/// What the session timer does when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionTimer {
    /// Open the datagram send loop.
    Start,
    /// Open a stream connection.
    Connect,
    /// Send the next request or datagram.
    Send,
    /// Close the datagram socket at the stop time.
    Stop,
}

/// Owned handle to at most one pending timer.
#[derive(Debug)]
pub struct TimerSlot<K> {
    id: TimerId,
    pending: Option<K>,
}

impl<K: Copy> TimerSlot<K> {
    pub fn new(id: TimerId) -> Self {
        Self { id, pending: None }
    }

    /// Cancel any pending instance, then schedule `kind` after `delay`.
    pub fn reschedule(&mut self, kind: K, delay: Duration, actions: &mut Vec<Action>) {
        if self.pending.is_some() {
            actions.push(Action::CancelTimer { id: self.id });
        }
        self.pending = Some(kind);
        actions.push(Action::SetTimer {
            id: self.id,
            duration: delay,
        });
    }

    /// Cancel the pending instance, if any.
    pub fn cancel(&mut self, actions: &mut Vec<Action>) {
        if self.pending.take().is_some() {
            actions.push(Action::CancelTimer { id: self.id });
        }
    }

    /// Consume the pending instance when its event arrives.
    ///
    /// A firing with nothing pending means a cancelled timer was still
    /// delivered.
    pub fn fire(&mut self) -> Result<K, NodeError> {
        self.pending
            .take()
            .ok_or(NodeError::TimerNotPending { timer: self.id })
    }

    pub fn pending(&self) -> Option<K> {
        self.pending
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reschedule_cancels_previous() {
        let mut slot = TimerSlot::new(TimerId::Session);
        let mut actions = Vec::new();
        slot.reschedule(SessionTimer::Connect, Duration::from_secs(1), &mut actions);
        slot.reschedule(SessionTimer::Send, Duration::from_secs(2), &mut actions);
        slot.reschedule(SessionTimer::Send, Duration::from_secs(3), &mut actions);

        let sets = actions
            .iter()
            .filter(|a| matches!(a, Action::SetTimer { .. }))
            .count();
        let cancels = actions
            .iter()
            .filter(|a| matches!(a, Action::CancelTimer { .. }))
            .count();
        assert_eq!(sets, 3);
        assert_eq!(cancels, 2);
        assert_eq!(slot.pending(), Some(SessionTimer::Send));
    }

    #[test]
    fn test_fire_consumes_pending() {
        let mut slot = TimerSlot::new(TimerId::DirectTick);
        let mut actions = Vec::new();
        slot.reschedule((), Duration::ZERO, &mut actions);
        assert_eq!(slot.fire(), Ok(()));
        assert_eq!(
            slot.fire(),
            Err(NodeError::TimerNotPending {
                timer: TimerId::DirectTick
            })
        );
    }

    #[test]
    fn test_cancel_when_idle_is_silent() {
        let mut slot: TimerSlot<()> = TimerSlot::new(TimerId::Report);
        let mut actions = Vec::new();
        slot.cancel(&mut actions);
        assert!(actions.is_empty());
        assert!(!slot.is_pending());
    }
}
