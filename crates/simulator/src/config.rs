//! Experiment file.

use layerswitch_control::ControlConfig;
use layerswitch_node::NodeConfig;
use layerswitch_simulation::topology::TransportKind;
use layerswitch_simulation::NetworkConfig;
use layerswitch_types::{time, NodeName};
use serde::Deserialize;
use std::time::Duration;

/// Per-node settings replacing [`ExperimentConfig::defaults`] for one node.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeOverride {
    pub name: NodeName,
    #[serde(default)]
    pub config: NodeConfig,
}

/// A complete experiment: coordinator, network, node timing and run length.
///
/// ```toml
/// transport = "datagram"
/// duration = 300
///
/// [control]
/// current_layer = 5
/// target_layer = 1
/// start_time = 100
/// end_time = 200
///
/// [network]
/// latency = 0.01
/// packet_loss_rate = 0.01
///
/// [defaults]
/// send_interval = 0.5
///
/// [[node]]
/// name = "M"
/// [node.config]
/// frequency = 1
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Transport the reference nodes use.
    pub transport: TransportKind,

    /// Simulated time to run for.
    #[serde(deserialize_with = "time::deserialize")]
    pub duration: Duration,

    pub control: ControlConfig,

    pub network: NetworkConfig,

    /// Node settings used unless a [`NodeOverride`] names the node.
    /// Addressing is always taken from the topology.
    pub defaults: NodeConfig,

    #[serde(rename = "node")]
    pub nodes: Vec<NodeOverride>,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::default(),
            duration: Duration::from_secs(300),
            control: ControlConfig::default(),
            network: NetworkConfig::default(),
            defaults: NodeConfig::default(),
            nodes: Vec::new(),
        }
    }
}

impl ExperimentConfig {
    /// Create a new experiment with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an experiment from TOML.
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn with_transport(mut self, transport: TransportKind) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_control(mut self, control: ControlConfig) -> Self {
        self.control = control;
        self
    }

    pub fn with_network(mut self, network: NetworkConfig) -> Self {
        self.network = network;
        self
    }

    pub fn with_defaults(mut self, defaults: NodeConfig) -> Self {
        self.defaults = defaults;
        self
    }

    /// Replace the settings of one node.
    pub fn with_node(mut self, name: impl Into<String>, config: NodeConfig) -> Self {
        self.nodes.push(NodeOverride {
            name: NodeName::new(name),
            config,
        });
        self
    }

    /// Settings for `name`. The last override naming the node wins.
    pub fn node_config(&self, name: &str) -> NodeConfig {
        self.nodes
            .iter()
            .rev()
            .find(|o| o.name.as_str() == name)
            .map(|o| o.config.clone())
            .unwrap_or_else(|| self.defaults.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use layerswitch_types::Layer;

    #[test]
    fn test_empty_file_is_default() {
        let config = ExperimentConfig::from_toml("").unwrap();
        assert_eq!(config.transport, TransportKind::Stream);
        assert_eq!(config.duration, Duration::from_secs(300));
        assert!(config.nodes.is_empty());
    }

    #[test]
    fn test_full_file() {
        let text = r#"
            transport = "datagram"
            duration = 60

            [control]
            current_layer = 5
            target_layer = 1
            start_time = 20
            end_time = 40

            [network]
            packet_loss_rate = 0.25

            [defaults]
            send_interval = 0.5

            [[node]]
            name = "M"
            [node.config]
            frequency = 1
        "#;
        let config = ExperimentConfig::from_toml(text).unwrap();
        assert_eq!(config.transport, TransportKind::Datagram);
        assert_eq!(config.duration, Duration::from_secs(60));
        assert_eq!(config.control.current_layer, Layer::new(5).unwrap());
        assert_eq!(config.control.end_time, Duration::from_secs(40));
        assert_eq!(config.network.packet_loss_rate, 0.25);

        assert_eq!(
            config.node_config("SN1").send_interval,
            Duration::from_millis(500)
        );
        let master = config.node_config("M");
        assert_eq!(master.frequency, Duration::from_secs(1));
        assert_eq!(master.send_interval, NodeConfig::default().send_interval);
    }

    #[test]
    fn test_bundled_experiments_parse() {
        let stream =
            ExperimentConfig::from_toml(include_str!("../experiments/stream-switch.toml")).unwrap();
        assert_eq!(stream.node_config("DF1").reply_delay, Duration::from_millis(500));

        let datagram =
            ExperimentConfig::from_toml(include_str!("../experiments/datagram-switch.toml"))
                .unwrap();
        assert_eq!(datagram.transport, TransportKind::Datagram);
        assert_eq!(datagram.control.current_layer, Layer::new(7).unwrap());
    }

    #[test]
    fn test_unknown_transport_rejected() {
        assert!(ExperimentConfig::from_toml("transport = \"carrier-pigeon\"").is_err());
    }

    #[test]
    fn test_last_override_wins() {
        let config = ExperimentConfig::new()
            .with_node("DF1", NodeConfig::new().with_reply_delay(Duration::from_secs(1)))
            .with_node("DF1", NodeConfig::new().with_reply_delay(Duration::from_secs(2)));
        assert_eq!(config.node_config("DF1").reply_delay, Duration::from_secs(2));
    }
}
