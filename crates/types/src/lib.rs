//! Shared value types for the layer-switching experiment.
//!
//! This crate provides the vocabulary every other workspace crate speaks:
//!
//! - **Layers**: [`Layer`], the number of simulated protocol layers a message
//!   traverses (layer 1 is direct delivery)
//! - **Identifiers**: [`NodeName`], [`ModulePath`], [`MessageKind`],
//!   [`ConnectionId`], [`Endpoint`]
//! - **Topology**: [`NodeRole`], [`RoutingTable`]
//! - **Time**: serde helpers that read simulated time as fractional seconds
//!
//! # Design Philosophy
//!
//! This crate does not depend on any other workspace crate, making it the
//! foundation layer.

mod identifiers;
mod layer;
mod routing;
pub mod time;

pub use identifiers::{
    ConnectionId, DeliveryPath, Endpoint, MessageKind, ModulePath, NodeName, NodeRole,
};
pub use layer::{InvalidLayer, Layer};
pub use routing::RoutingTable;
