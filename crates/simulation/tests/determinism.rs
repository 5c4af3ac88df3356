//! Full reference runs and seed determinism.

use layerswitch_control::{ControlConfig, ControlReport};
use layerswitch_node::{NodeConfig, NodeState};
use layerswitch_simulation::topology::{self, TransportKind};
use layerswitch_simulation::{NetworkConfig, SimulationRunner, SimulationStats};
use std::time::Duration;
use tracing_test::traced_test;

fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

fn reference_run(kind: TransportKind, seed: u64) -> (SimulationRunner, ControlReport) {
    let control = ControlConfig::new()
        .with_layer_counts(5, 1)
        .unwrap()
        .with_window(secs(20), secs(40));
    let network = NetworkConfig::new()
        .with_latency(Duration::from_millis(10), 0.1)
        .with_packet_loss(0.05)
        .with_seed(seed);
    let base = NodeConfig::new().with_requests_per_session(3);

    let mut runner = topology::runner(kind, control, network, &base).unwrap();
    runner.initialize().unwrap();
    runner.run_until(secs(60)).unwrap();
    let report = runner.finish();
    (runner, report)
}

fn fingerprint(runner: &SimulationRunner, report: &ControlReport) -> (SimulationStats, String) {
    (runner.stats().clone(), report.to_string())
}

#[traced_test]
#[test]
fn test_stream_reference_run() {
    let (runner, report) = reference_run(TransportKind::Stream, 42);

    assert!(report.transport.count > 0);
    assert!(report.direct.count > 0);
    assert_eq!(report.packets_lost, 0, "stream transport never loses data");
    assert!(!runner.control().get_switch_status());
    for node in runner.nodes() {
        assert_eq!(node.state(), NodeState::TransportActive, "{}", node.name());
    }
}

#[test]
fn test_datagram_reference_run() {
    let (runner, report) = reference_run(TransportKind::Datagram, 42);

    assert!(report.transport.count > 0);
    assert!(report.direct.count > 0);
    assert!(report.packets_lost > 0);
    assert_eq!(runner.control().packets_lost(), report.packets_lost);
    for node in runner.nodes() {
        assert_eq!(node.state(), NodeState::TransportActive, "{}", node.name());
    }
}

#[test]
fn test_same_seed_same_run() {
    for kind in [TransportKind::Stream, TransportKind::Datagram] {
        let (first, first_report) = reference_run(kind, 7);
        let (second, second_report) = reference_run(kind, 7);
        assert_eq!(
            fingerprint(&first, &first_report),
            fingerprint(&second, &second_report)
        );
    }
}

#[test]
fn test_different_seed_different_run() {
    let (first, first_report) = reference_run(TransportKind::Datagram, 1);
    let (second, second_report) = reference_run(TransportKind::Datagram, 2);
    assert_ne!(
        fingerprint(&first, &first_report),
        fingerprint(&second, &second_report)
    );
}
