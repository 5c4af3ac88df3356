//! Direct-path forwarding strategies.
//!
//! Decide where a node sends data when the direct path is active. Replies to
//! data received on the direct path always go back to the sender and don't
//! involve the strategy.

use crate::NodeError;
use layerswitch_core::{ControlView, DirectMessage};
use layerswitch_types::{MessageKind, NodeName};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Capability to pick direct-path targets.
pub trait ForwardingStrategy: Send {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Whether this node generates direct traffic once the drain completes.
    fn originates(&self) -> bool;

    /// Targets and payloads for one direct-path send.
    fn next_targets(
        &mut self,
        control: &ControlView,
    ) -> Result<Vec<(NodeName, DirectMessage)>, NodeError>;

    /// Message kinds this strategy may route on.
    fn kinds(&self) -> &[MessageKind] {
        &[]
    }
}

/// Send to every node in a fixed list.
#[derive(Debug, Clone)]
pub struct Fanout {
    targets: Vec<NodeName>,
}

impl Fanout {
    pub fn new(targets: Vec<NodeName>) -> Self {
        Self { targets }
    }
}

impl ForwardingStrategy for Fanout {
    fn name(&self) -> &'static str {
        "fanout"
    }

    fn originates(&self) -> bool {
        !self.targets.is_empty()
    }

    fn next_targets(
        &mut self,
        _control: &ControlView,
    ) -> Result<Vec<(NodeName, DirectMessage)>, NodeError> {
        Ok(self
            .targets
            .iter()
            .map(|to| (to.clone(), DirectMessage::Sent { kind: None }))
            .collect())
    }
}

/// Pick a message kind at random and send to the first hop of its route.
pub struct Routed {
    kinds: Vec<MessageKind>,
    rng: ChaCha8Rng,
}

impl Routed {
    pub fn new(kinds: Vec<MessageKind>, seed: u64) -> Self {
        Self {
            kinds,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }
}

impl ForwardingStrategy for Routed {
    fn name(&self) -> &'static str {
        "routed"
    }

    fn originates(&self) -> bool {
        !self.kinds.is_empty()
    }

    fn next_targets(
        &mut self,
        control: &ControlView,
    ) -> Result<Vec<(NodeName, DirectMessage)>, NodeError> {
        if self.kinds.is_empty() {
            return Ok(vec![]);
        }
        let kind = self.kinds[self.rng.gen_range(0..self.kinds.len())];
        let next_hop = control
            .routes
            .route(kind)
            .into_iter()
            .next()
            .filter(|hop| !hop.is_none())
            .ok_or(NodeError::NoRoute { kind })?;
        Ok(vec![(next_hop, DirectMessage::Sent { kind: Some(kind) })])
    }

    fn kinds(&self) -> &[MessageKind] {
        &self.kinds
    }
}

/// Never originates; only answers.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplyOnly;

impl ForwardingStrategy for ReplyOnly {
    fn name(&self) -> &'static str {
        "reply-only"
    }

    fn originates(&self) -> bool {
        false
    }

    fn next_targets(
        &mut self,
        _control: &ControlView,
    ) -> Result<Vec<(NodeName, DirectMessage)>, NodeError> {
        Ok(vec![])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use layerswitch_types::{Layer, RoutingTable};
    use std::sync::Arc;

    fn view(routes: RoutingTable) -> ControlView {
        ControlView {
            layer: Layer::DIRECT,
            switch_active: true,
            routes: Arc::new(routes),
            packets_lost: 0,
        }
    }

    #[test]
    fn test_fanout_targets_in_order() {
        let mut fanout = Fanout::new(vec!["SN1".into(), "SN2".into()]);
        let targets = fanout.next_targets(&view(RoutingTable::new())).unwrap();
        let names: Vec<_> = targets.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["SN1", "SN2"]);
        assert!(fanout.originates());
        assert!(!Fanout::new(vec![]).originates());
    }

    #[test]
    fn test_routed_uses_first_hop() {
        let mut routed = Routed::new(vec![MessageKind(50), MessageKind(51)], 7);
        let control = view(RoutingTable::default());
        for _ in 0..20 {
            let targets = routed.next_targets(&control).unwrap();
            assert_eq!(targets.len(), 1);
            assert_eq!(targets[0].0.as_str(), "DF1");
            assert!(matches!(
                targets[0].1,
                DirectMessage::Sent {
                    kind: Some(MessageKind(50 | 51))
                }
            ));
        }
    }

    #[test]
    fn test_routed_missing_kind_is_fatal() {
        let mut routed = Routed::new(vec![MessageKind(99)], 1);
        assert_eq!(
            routed.next_targets(&view(RoutingTable::default())),
            Err(NodeError::NoRoute {
                kind: MessageKind(99)
            })
        );
    }

    #[test]
    fn test_reply_only_never_originates() {
        let mut strategy = ReplyOnly;
        assert!(!strategy.originates());
        assert!(strategy.next_targets(&view(RoutingTable::new())).unwrap().is_empty());
    }
}
