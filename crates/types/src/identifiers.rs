//! Identifier types for nodes, connections and message kinds.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of a node in the experiment topology (e.g. `SN1`, `DF2`, `M`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeName(String);

impl NodeName {
    /// Name returned by the routing table for kinds without a route.
    pub const NONE: &'static str = "none";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The "no destination" sentinel.
    pub fn none() -> Self {
        Self(Self::NONE.to_string())
    }

    pub fn is_none(&self) -> bool {
        self.0 == Self::NONE
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Resolve this name to the path of its application module under `root`.
    pub fn module_path(&self, root: &str) -> ModulePath {
        ModulePath(format!("{root}.{}.app[0]", self.0))
    }
}

impl fmt::Display for NodeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Fully qualified address of a node's application module.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModulePath(String);

impl ModulePath {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModulePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Application message kind used by the master to pick a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageKind(pub u16);

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of one transport connection, unique for the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(pub u32);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// Role of a node in the experiment topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    /// Leaf node producing and answering data.
    Sensor,
    /// Data-fusion node between sensors and the master.
    Aggregator,
    /// Root node driving traffic towards the aggregators.
    Master,
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRole::Sensor => f.write_str("sensor"),
            NodeRole::Aggregator => f.write_str("aggregator"),
            NodeRole::Master => f.write_str("master"),
        }
    }
}

/// Which path a latency sample was measured on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliveryPath {
    Transport,
    Direct,
}

/// Network address and port of a transport endpoint.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub address: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_path_concatenation() {
        let name = NodeName::new("DF1");
        assert_eq!(name.module_path("Network").as_str(), "Network.DF1.app[0]");
    }

    #[test]
    fn test_none_sentinel() {
        assert!(NodeName::none().is_none());
        assert!(!NodeName::new("M").is_none());
    }
}
