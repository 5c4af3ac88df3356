//! Reference topology.
//!
//! ```text
//!                    M
//!                 ┌──┴──┐
//!               DF1     DF2
//!              ┌─┴─┐   ┌─┴─┐
//!            SN1  SN2 SN3  SN4
//! ```
//!
//! Under the stream transport every child connects to its parent, which
//! listens on port 1000. Under the datagram transport every node binds port
//! 1000, sensors send to their aggregator, aggregators to the master and the
//! master to both aggregators.
//!
//! In direct mode each aggregator fans out to its two sensors and the master
//! to both aggregators (stream), or routes by message kind (datagram).

use crate::{NetworkConfig, SimulationError, SimulationRunner};
use layerswitch_control::ControlConfig;
use layerswitch_node::{
    Fanout, ForwardingStrategy, Node, NodeConfig, NodeError, ReplyOnly, Routed,
};
use layerswitch_types::{MessageKind, NodeName, NodeRole};
use serde::Deserialize;
use std::fmt;

/// Port every reference node listens or binds on.
pub const PORT: u16 = 1000;

/// Message kinds the master routes on in datagram mode.
pub const MASTER_KINDS: [MessageKind; 4] = [
    MessageKind(50),
    MessageKind(51),
    MessageKind(52),
    MessageKind(53),
];

/// Transport the reference nodes use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    #[default]
    Stream,
    Datagram,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Stream => f.write_str("stream"),
            TransportKind::Datagram => f.write_str("datagram"),
        }
    }
}

/// Sensors and the aggregator each reports to.
const SENSORS: [(&str, &str); 4] = [
    ("SN1", "DF1"),
    ("SN2", "DF1"),
    ("SN3", "DF2"),
    ("SN4", "DF2"),
];
/// Aggregators and their sensors.
const AGGREGATORS: [(&str, [&str; 2]); 2] = [("DF1", ["SN1", "SN2"]), ("DF2", ["SN3", "SN4"])];
const MASTER: &str = "M";

fn names(list: &[&str]) -> Vec<NodeName> {
    list.iter().map(|n| NodeName::new(*n)).collect()
}

/// Per-node seed derived from the run seed.
fn node_seed(seed: u64, index: usize) -> u64 {
    seed.wrapping_add(index as u64).wrapping_mul(0x517cc1b727220a95)
}

/// Fill in the notification lists of `config` for `kind`.
pub fn control_config(kind: TransportKind, config: ControlConfig) -> ControlConfig {
    let downstream = names(&["SN1", "SN2", "SN3", "SN4", "DF1", "DF2"]);
    let upstream = match kind {
        TransportKind::Stream => names(&["DF1", "DF2", MASTER]),
        TransportKind::Datagram => names(&[MASTER]),
    };
    config.with_upstream(upstream).with_downstream(downstream)
}

/// Build the seven reference nodes. `base` supplies timing and sizes; the
/// addressing is overwritten.
pub fn nodes(
    kind: TransportKind,
    base: &NodeConfig,
    seed: u64,
) -> Result<Vec<Node>, SimulationError> {
    nodes_with(kind, |_| base.clone(), seed)
}

/// Like [`nodes`], with the timing and sizes of each node looked up by name.
pub fn nodes_with<F>(
    kind: TransportKind,
    config_for: F,
    seed: u64,
) -> Result<Vec<Node>, SimulationError>
where
    F: Fn(&str) -> NodeConfig,
{
    let mut nodes = Vec::with_capacity(7);
    let mut index = 0;
    let mut next_seed = || {
        index += 1;
        node_seed(seed, index - 1)
    };

    for (name, parent) in SENSORS {
        let config = match kind {
            TransportKind::Stream => config_for(name).with_connect(parent, PORT),
            TransportKind::Datagram => config_for(name)
                .with_local("", Some(PORT))
                .with_destinations(vec![parent.to_string()], PORT),
        };
        let seed = next_seed();
        nodes.push(build(kind, name, NodeRole::Sensor, config, Box::new(ReplyOnly), seed)?);
    }

    for (name, children) in AGGREGATORS {
        let (config, forwarding): (NodeConfig, Box<dyn ForwardingStrategy>) = match kind {
            TransportKind::Stream => (
                config_for(name)
                    .with_local("", Some(PORT))
                    .with_connect(MASTER, PORT),
                Box::new(Fanout::new(names(&children))),
            ),
            TransportKind::Datagram => (
                config_for(name)
                    .with_local("", Some(PORT))
                    .with_destinations(vec![MASTER.to_string()], PORT),
                Box::new(ReplyOnly),
            ),
        };
        let seed = next_seed();
        nodes.push(build(kind, name, NodeRole::Aggregator, config, forwarding, seed)?);
    }

    let aggregators: Vec<&str> = AGGREGATORS.iter().map(|(name, _)| *name).collect();
    let (config, forwarding): (NodeConfig, Box<dyn ForwardingStrategy>) = match kind {
        TransportKind::Stream => (
            config_for(MASTER).with_local("", Some(PORT)),
            Box::new(Fanout::new(names(&aggregators))),
        ),
        TransportKind::Datagram => (
            config_for(MASTER).with_local("", Some(PORT)).with_destinations(
                aggregators.iter().map(|a| a.to_string()).collect(),
                PORT,
            ),
            Box::new(Routed::new(MASTER_KINDS.to_vec(), next_seed())),
        ),
    };
    let seed = next_seed();
    nodes.push(build(kind, MASTER, NodeRole::Master, config, forwarding, seed)?);

    Ok(nodes)
}

fn build(
    kind: TransportKind,
    name: &str,
    role: NodeRole,
    config: NodeConfig,
    forwarding: Box<dyn ForwardingStrategy>,
    seed: u64,
) -> Result<Node, SimulationError> {
    let node_name = NodeName::new(name);
    let node = match kind {
        TransportKind::Stream => Node::stream(node_name.clone(), role, config, forwarding),
        TransportKind::Datagram => {
            Node::datagram(node_name.clone(), role, config, forwarding, seed)
        }
    };
    node.map_err(|source: NodeError| SimulationError::Node {
        node: node_name,
        source,
    })
}

/// A runner holding the reference topology, not yet initialized.
pub fn runner(
    kind: TransportKind,
    control: ControlConfig,
    network: NetworkConfig,
    base: &NodeConfig,
) -> Result<SimulationRunner, SimulationError> {
    runner_with(kind, control, network, |_| base.clone())
}

/// Like [`runner`], with per-node timing and sizes.
pub fn runner_with<F>(
    kind: TransportKind,
    control: ControlConfig,
    network: NetworkConfig,
    config_for: F,
) -> Result<SimulationRunner, SimulationError>
where
    F: Fn(&str) -> NodeConfig,
{
    let seed = network.seed;
    let mut runner = SimulationRunner::new(control_config(kind, control), network)?;
    for node in nodes_with(kind, config_for, seed)? {
        runner.add_node(node)?;
    }
    Ok(runner)
}
