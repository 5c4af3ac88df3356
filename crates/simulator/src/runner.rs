//! Experiment driver.

use crate::ExperimentConfig;
use layerswitch_control::ControlReport;
use layerswitch_simulation::{
    topology, SimulationError, SimulationRunner, SimulationStats, TransportStats,
};
use std::fmt;
use std::time::Duration;
use tracing::info;

/// What a finished experiment produced.
#[derive(Debug, Clone)]
pub struct ExperimentReport {
    /// Coordinator latency and loss summary.
    pub control: ControlReport,
    /// Runner counters.
    pub stats: SimulationStats,
    /// Simulated-transport counters.
    pub transport: TransportStats,
    /// Simulated time at the end of the run.
    pub ended_at: Duration,
}

impl fmt::Display for ExperimentReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Layer Switch Report ===")?;
        writeln!(f, "ended at:        {:.3}", self.ended_at.as_secs_f64())?;
        writeln!(f, "{}", self.control)?;
        writeln!(f)?;
        writeln!(f, "events:          {}", self.stats.events_processed)?;
        writeln!(f, "notifications:   {}", self.stats.notifications_sent)?;
        writeln!(f, "direct messages: {}", self.stats.direct_messages)?;
        writeln!(f, "connections:     {}", self.transport.connections_opened)?;
        writeln!(f, "segments sent:   {}", self.transport.segments_sent)?;
        write!(
            f,
            "datagrams:       {} sent, {} lost",
            self.transport.datagrams_sent, self.transport.datagrams_lost
        )
    }
}

/// The reference topology wired up from an [`ExperimentConfig`].
pub struct Experiment {
    runner: SimulationRunner,
    duration: Duration,
}

impl Experiment {
    /// Build the topology and schedule the switch.
    pub fn new(config: &ExperimentConfig) -> Result<Self, SimulationError> {
        let mut runner = topology::runner_with(
            config.transport,
            config.control.clone(),
            config.network.clone(),
            |name| config.node_config(name),
        )?;
        runner.initialize()?;

        info!(
            transport = %config.transport,
            current_layer = %config.control.current_layer,
            target_layer = %config.control.target_layer,
            duration = ?config.duration,
            seed = config.network.seed,
            "Experiment ready"
        );

        Ok(Self {
            runner,
            duration: config.duration,
        })
    }

    /// Run to the configured duration and collect the report.
    pub fn run(&mut self) -> Result<ExperimentReport, SimulationError> {
        self.runner.run_until(self.duration)?;
        Ok(self.report())
    }

    pub fn runner(&self) -> &SimulationRunner {
        &self.runner
    }

    fn report(&self) -> ExperimentReport {
        ExperimentReport {
            control: self.runner.finish(),
            stats: self.runner.stats().clone(),
            transport: self.runner.transport_stats().clone(),
            ended_at: self.runner.now(),
        }
    }
}

impl fmt::Debug for Experiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Experiment")
            .field("now", &self.runner.now())
            .field("duration", &self.duration)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use layerswitch_control::ControlConfig;
    use layerswitch_node::{NodeConfig, NodeState};
    use layerswitch_simulation::topology::TransportKind;
    use layerswitch_simulation::NetworkConfig;
    use layerswitch_types::Layer;

    fn short_experiment(transport: TransportKind) -> ExperimentConfig {
        ExperimentConfig::new()
            .with_transport(transport)
            .with_duration(Duration::from_secs(40))
            .with_control(
                ControlConfig::new()
                    .with_layers(Layer::new(5).unwrap(), Layer::DIRECT)
                    .with_window(Duration::from_secs(10), Duration::from_secs(20)),
            )
            .with_network(NetworkConfig::new().with_seed(7))
    }

    #[test]
    fn test_stream_experiment_runs_to_duration() {
        let mut experiment = Experiment::new(&short_experiment(TransportKind::Stream)).unwrap();
        let report = experiment.run().unwrap();

        assert_eq!(report.ended_at, Duration::from_secs(40));
        assert!(report.control.transport.count > 0);
        assert!(report.control.direct.count > 0);
        assert!(report.transport.connections_opened > 0);
        assert_eq!(report.control.packets_lost, 0);
    }

    #[test]
    fn test_datagram_experiment_reports_loss() {
        let mut config = short_experiment(TransportKind::Datagram);
        config.network = config.network.with_packet_loss(0.2);
        let report = Experiment::new(&config).unwrap().run().unwrap();

        assert!(report.transport.datagrams_sent > 0);
        assert!(report.control.packets_lost > 0);
    }

    #[test]
    fn test_override_applies_to_one_node() {
        let config = short_experiment(TransportKind::Stream)
            .with_node("SN1", NodeConfig::new().with_window(Duration::from_secs(35), None));
        let mut experiment = Experiment::new(&config).unwrap();
        experiment.run().unwrap();

        let runner = experiment.runner();
        let sn1 = runner.node_by_name("SN1").unwrap();
        assert_eq!(sn1.config().start_time, Duration::from_secs(35));
        assert_eq!(sn1.config().connect_address.as_deref(), Some("DF1"));
        assert_eq!(sn1.state(), NodeState::TransportActive);
    }

    #[test]
    fn test_report_display() {
        let report = Experiment::new(&short_experiment(TransportKind::Stream))
            .unwrap()
            .run()
            .unwrap();
        let text = report.to_string();
        assert!(text.contains("transport delay"));
        assert!(text.contains("datagrams:"));
    }
}
