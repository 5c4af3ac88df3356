//! Simulation errors.

use layerswitch_control::ControlError;
use layerswitch_node::{ConfigError, NodeError};
use layerswitch_types::{ModulePath, NodeName};

/// A fatal error that ends the run.
#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error("coordinator: {0}")]
    Control(#[from] ControlError),

    #[error("node {node}: {source}")]
    Node {
        node: NodeName,
        #[source]
        source: NodeError,
    },

    #[error("node {node} is misconfigured: {source}")]
    Config {
        node: NodeName,
        #[source]
        source: ConfigError,
    },

    #[error("no node at module path {0}")]
    UnknownModule(ModulePath),

    #[error("node {0} registered twice")]
    DuplicateNode(NodeName),
}
