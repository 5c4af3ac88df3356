//! Coordinator configuration.

use crate::ControlError;
use layerswitch_types::{Layer, NodeName, RoutingTable};
use serde::Deserialize;
use std::time::Duration;

/// Coordinator configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// When false the fan-out lists are emptied and nodes never hear from
    /// the coordinator.
    pub switch_enabled: bool,

    /// Layer active outside the switch window.
    pub current_layer: Layer,

    /// Layer active inside the switch window.
    pub target_layer: Layer,

    /// Switch window start.
    #[serde(deserialize_with = "layerswitch_types::time::deserialize")]
    pub start_time: Duration,

    /// Switch window end.
    #[serde(deserialize_with = "layerswitch_types::time::deserialize")]
    pub end_time: Duration,

    /// Sources, told when the drain has completed. Order is delivery order.
    pub upstream: Vec<NodeName>,

    /// Targets, told to stop and resume their transport. Order is delivery order.
    pub downstream: Vec<NodeName>,

    /// Message-kind routes for the master.
    pub routing_table: RoutingTable,

    /// Prefix used to resolve node names to module paths.
    pub topology_root: String,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            switch_enabled: true,
            current_layer: Layer::FULL_STACK,
            target_layer: Layer::DIRECT,
            start_time: Duration::from_secs(100),
            end_time: Duration::from_secs(200),
            upstream: Vec::new(),
            downstream: Vec::new(),
            routing_table: RoutingTable::default(),
            topology_root: "Network".to_string(),
        }
    }
}

impl ControlConfig {
    /// Create a new coordinator configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the switch window.
    pub fn with_window(mut self, start: Duration, end: Duration) -> Self {
        self.start_time = start;
        self.end_time = end;
        self
    }

    /// Set the layers active outside and inside the window.
    pub fn with_layers(mut self, current: Layer, target: Layer) -> Self {
        self.current_layer = current;
        self.target_layer = target;
        self
    }

    /// Set the layers from raw counts.
    pub fn with_layer_counts(self, current: u8, target: u8) -> Result<Self, ControlError> {
        Ok(self.with_layers(Layer::try_from(current)?, Layer::try_from(target)?))
    }

    /// Enable or disable the switch.
    pub fn with_switch_enabled(mut self, enabled: bool) -> Self {
        self.switch_enabled = enabled;
        self
    }

    /// Set the upstream (source) nodes.
    pub fn with_upstream(mut self, nodes: Vec<NodeName>) -> Self {
        self.upstream = nodes;
        self
    }

    /// Set the downstream (target) nodes.
    pub fn with_downstream(mut self, nodes: Vec<NodeName>) -> Self {
        self.downstream = nodes;
        self
    }

    /// Set the master's routing table.
    pub fn with_routing_table(mut self, table: RoutingTable) -> Self {
        self.routing_table = table;
        self
    }

    /// Set the topology root prefix.
    pub fn with_topology_root(mut self, root: impl Into<String>) -> Self {
        self.topology_root = root.into();
        self
    }

    /// Check the window and layer combination.
    pub fn validate(&self) -> Result<(), ControlError> {
        if self.end_time < self.start_time {
            return Err(ControlError::InvalidSwitchWindow {
                start: self.start_time,
                end: self.end_time,
            });
        }
        if self.current_layer != self.target_layer && !self.target_layer.is_direct() {
            return Err(ControlError::UnsupportedTargetLayer(self.target_layer));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ControlConfig::default();
        assert!(config.switch_enabled);
        assert_eq!(config.current_layer.count(), 5);
        assert!(config.target_layer.is_direct());
        assert_eq!(config.start_time, Duration::from_secs(100));
        assert_eq!(config.end_time, Duration::from_secs(200));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_reversed_window_rejected() {
        let config =
            ControlConfig::new().with_window(Duration::from_secs(10), Duration::from_secs(5));
        assert!(matches!(
            config.validate(),
            Err(ControlError::InvalidSwitchWindow { .. })
        ));
    }

    #[test]
    fn test_non_direct_target_rejected() {
        let config = ControlConfig::new().with_layer_counts(5, 3).unwrap();
        assert_eq!(
            config.validate(),
            Err(ControlError::UnsupportedTargetLayer(Layer::new(3).unwrap()))
        );
        // Equal layers never switch, so any layer is acceptable.
        assert!(ControlConfig::new().with_layer_counts(3, 3).unwrap().validate().is_ok());
    }

    #[test]
    fn test_zero_layer_count_rejected() {
        assert!(matches!(
            ControlConfig::new().with_layer_counts(0, 1),
            Err(ControlError::InvalidLayer(_))
        ));
    }

    #[test]
    fn test_from_toml() {
        let config: ControlConfig = toml::from_str(
            r#"
            current_layer = 7
            target_layer = 1
            start_time = 50
            end_time = 75.5
            downstream = ["SN1", "SN2"]
            "#,
        )
        .unwrap();
        assert_eq!(config.current_layer.count(), 7);
        assert_eq!(config.end_time, Duration::from_secs_f64(75.5));
        assert_eq!(config.downstream.len(), 2);
        assert!(config.upstream.is_empty());
        assert_eq!(config.topology_root, "Network");
    }
}
