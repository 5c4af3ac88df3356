//! Message-kind routing table used by the master node.

use crate::{MessageKind, NodeName};
use serde::Deserialize;
use std::collections::BTreeMap;

/// Maps each message kind to the ordered chain of nodes it travels through.
///
/// Kinds without an entry resolve to the single-element chain
/// `[NodeName::none()]`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "BTreeMap<String, Vec<NodeName>>")]
pub struct RoutingTable(BTreeMap<MessageKind, Vec<NodeName>>);

impl RoutingTable {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Add or replace the route for `kind`.
    pub fn with_route(mut self, kind: MessageKind, chain: Vec<NodeName>) -> Self {
        self.0.insert(kind, chain);
        self
    }

    /// Look up the chain for `kind`.
    pub fn route(&self, kind: MessageKind) -> Vec<NodeName> {
        match self.0.get(&kind) {
            Some(chain) if !chain.is_empty() => chain.clone(),
            _ => vec![NodeName::none()],
        }
    }

    pub fn contains(&self, kind: MessageKind) -> bool {
        self.0.contains_key(&kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = MessageKind> + '_ {
        self.0.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl TryFrom<BTreeMap<String, Vec<NodeName>>> for RoutingTable {
    type Error = String;

    /// Configuration files key routes by the kind's decimal value.
    fn try_from(raw: BTreeMap<String, Vec<NodeName>>) -> Result<Self, Self::Error> {
        raw.into_iter()
            .map(|(key, chain)| {
                key.trim()
                    .parse::<u16>()
                    .map(|kind| (MessageKind(kind), chain))
                    .map_err(|_| format!("invalid message kind {key:?}"))
            })
            .collect::<Result<BTreeMap<_, _>, _>>()
            .map(Self)
    }
}

impl Default for RoutingTable {
    /// Kinds 50..=53 route from the master through one aggregator to one sensor.
    fn default() -> Self {
        Self::new()
            .with_route(MessageKind(50), vec!["DF1".into(), "SN1".into()])
            .with_route(MessageKind(51), vec!["DF1".into(), "SN2".into()])
            .with_route(MessageKind(52), vec!["DF2".into(), "SN3".into()])
            .with_route(MessageKind(53), vec!["DF2".into(), "SN4".into()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_routes() {
        let table = RoutingTable::default();
        assert_eq!(
            table.route(MessageKind(52)),
            vec![NodeName::new("DF2"), NodeName::new("SN3")]
        );
        assert_eq!(table.kinds().count(), 4);
    }

    #[test]
    fn test_routes_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            routes: RoutingTable,
        }
        let parsed: Wrapper = toml::from_str("[routes]\n60 = [\"DF1\", \"SN2\"]\n").unwrap();
        assert_eq!(
            parsed.routes.route(MessageKind(60)),
            vec![NodeName::new("DF1"), NodeName::new("SN2")]
        );
        assert!(toml::from_str::<Wrapper>("[routes]\nabc = []\n").is_err());
    }

    #[test]
    fn test_missing_kind_yields_sentinel() {
        let table = RoutingTable::default();
        let chain = table.route(MessageKind(99));
        assert_eq!(chain.len(), 1);
        assert!(chain[0].is_none());
    }
}
