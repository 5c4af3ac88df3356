//! Simulated transport layers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of protocol layers a message traverses in the current mode.
///
/// Layer 1 bypasses the transport stack entirely: nodes deliver to each
/// other directly after a fixed propagation delay. Higher counts route
/// through the simulated transport endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Layer(u8);

/// A layer count of zero was supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("layer count must be at least 1")]
pub struct InvalidLayer;

impl Layer {
    /// Direct delivery between nodes.
    pub const DIRECT: Layer = Layer(1);

    /// Full stack: application, transport, network, link and physical.
    pub const FULL_STACK: Layer = Layer(5);

    /// Create a layer from its count. Returns `None` for zero.
    pub const fn new(count: u8) -> Option<Self> {
        if count == 0 {
            None
        } else {
            Some(Layer(count))
        }
    }

    /// The raw layer count.
    pub const fn count(self) -> u8 {
        self.0
    }

    /// Whether this layer delivers directly, bypassing the transport.
    pub const fn is_direct(self) -> bool {
        self.0 == 1
    }
}

impl TryFrom<u8> for Layer {
    type Error = InvalidLayer;

    fn try_from(count: u8) -> Result<Self, Self::Error> {
        Layer::new(count).ok_or(InvalidLayer)
    }
}

impl From<Layer> for u8 {
    fn from(layer: Layer) -> u8 {
        layer.0
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_layer_rejected() {
        assert_eq!(Layer::new(0), None);
        assert_eq!(Layer::try_from(0u8), Err(InvalidLayer));
    }

    #[test]
    fn test_direct_layer() {
        assert!(Layer::DIRECT.is_direct());
        assert!(!Layer::new(5).unwrap().is_direct());
        assert_eq!(Layer::new(7).unwrap().to_string(), "L7");
    }

    #[test]
    fn test_layer_deserializes_from_count() {
        #[derive(Deserialize)]
        struct Wrapper {
            layer: Layer,
        }
        let parsed: Wrapper = toml::from_str("layer = 5").unwrap();
        assert_eq!(parsed.layer.count(), 5);
        assert!(toml::from_str::<Wrapper>("layer = 0").is_err());
    }
}
