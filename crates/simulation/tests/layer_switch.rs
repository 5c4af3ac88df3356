//! End-to-end layer switch scenarios.

use layerswitch_control::ControlConfig;
use layerswitch_node::{Fanout, Node, NodeConfig, NodeState, ReplyOnly};
use layerswitch_simulation::{NetworkConfig, SimulationError, SimulationRunner};
use layerswitch_types::{Layer, NodeName, NodeRole};
use std::time::Duration;
use tracing_test::traced_test;

fn secs(s: f64) -> Duration {
    Duration::from_secs_f64(s)
}

fn switch_config(current: u8, target: u8, start: f64, end: f64) -> ControlConfig {
    ControlConfig::new()
        .with_layer_counts(current, target)
        .unwrap()
        .with_window(secs(start), secs(end))
}

fn exact_network(latency: f64) -> NetworkConfig {
    NetworkConfig::new().with_latency(secs(latency), 0.0)
}

fn status(runner: &SimulationRunner) -> (u8, bool) {
    let control = runner.control();
    (control.get_state().count(), control.get_switch_status())
}

/// A server `DF1` and a client `SN1` connecting to it at `start`.
fn client_server(runner: &mut SimulationRunner, client: NodeConfig, server: NodeConfig) {
    let server = Node::stream(
        "DF1".into(),
        NodeRole::Aggregator,
        server.with_local("", Some(1000)),
        Box::new(ReplyOnly),
    )
    .unwrap();
    let client = Node::stream(
        "SN1".into(),
        NodeRole::Sensor,
        client.with_connect("DF1", 1000),
        Box::new(ReplyOnly),
    )
    .unwrap();
    runner.add_node(server).unwrap();
    runner.add_node(client).unwrap();
}

#[traced_test]
#[test]
fn test_instantaneous_switch() {
    let mut runner =
        SimulationRunner::new(switch_config(7, 1, 50.0, 75.0), NetworkConfig::default()).unwrap();
    runner.initialize().unwrap();

    runner.run_until(secs(0.0)).unwrap();
    assert_eq!(status(&runner), (7, false));
    runner.run_until(secs(49.9)).unwrap();
    assert_eq!(status(&runner), (7, false));
    runner.run_until(secs(50.0)).unwrap();
    assert_eq!(status(&runner), (1, true));
    runner.run_until(secs(74.9)).unwrap();
    assert_eq!(status(&runner), (1, true));
    runner.run_until(secs(75.0)).unwrap();
    assert_eq!(status(&runner), (7, false));

    assert_eq!(runner.stats().control_events, 3);
}

#[test]
fn test_equal_layers_schedule_nothing() {
    let mut runner =
        SimulationRunner::new(switch_config(3, 3, 10.0, 20.0), NetworkConfig::default()).unwrap();
    runner.initialize().unwrap();
    for t in [0.0, 10.0, 15.0, 20.0, 30.0] {
        runner.run_until(secs(t)).unwrap();
        assert_eq!(status(&runner), (3, false));
    }
    assert_eq!(runner.stats().control_events, 0);
    assert_eq!(runner.pending_events(), 0);
}

#[test]
fn test_disabled_switch_notifies_nobody() {
    let config = switch_config(5, 1, 10.0, 20.0)
        .with_switch_enabled(false)
        .with_upstream(vec!["DF1".into()])
        .with_downstream(vec!["SN1".into()]);
    let mut runner = SimulationRunner::new(config, exact_network(1.0)).unwrap();
    client_server(&mut runner, NodeConfig::new(), NodeConfig::new());
    runner.run_until(secs(30.0)).unwrap();

    assert_eq!(runner.stats().notifications_sent, 0);
    assert_eq!(
        runner.node_by_name("SN1").unwrap().state(),
        NodeState::TransportActive
    );
}

#[traced_test]
#[test]
fn test_request_reply_latency() {
    let config = switch_config(5, 5, 100.0, 200.0);
    let mut runner = SimulationRunner::new(config, exact_network(2.5)).unwrap();
    let client = NodeConfig::new()
        .with_window(secs(5.0), None)
        .with_lengths(200, 100)
        .with_requests_per_session(2);
    client_server(&mut runner, client, NodeConfig::new());
    runner.initialize().unwrap();

    // Connecting since 5; nothing sent yet.
    runner.run_until(secs(7.5)).unwrap();
    assert_eq!(runner.node_by_name("SN1").unwrap().requests_left(), 2);

    // Connected at 10, request reaches the server at 12.5.
    runner.run_until(secs(12.5)).unwrap();
    assert_eq!(runner.node_by_name("SN1").unwrap().in_flight(), 1);
    assert_eq!(runner.control().finish().transport.count, 0);

    // The echo lands at 15; the next request waits out the think time.
    runner.run_until(secs(15.0)).unwrap();
    let sensor = runner.node_by_name("SN1").unwrap();
    assert_eq!(sensor.in_flight(), 0);
    assert_eq!(sensor.requests_left(), 1);
    let report = runner.control().finish();
    assert_eq!(report.transport.count, 1);
    assert_eq!(report.transport.min, secs(5.0));
    assert_eq!(report.transport.max, secs(5.0));
    assert_eq!(report.direct.count, 0);
}

#[traced_test]
#[test]
fn test_drain_extends_switch() {
    // The server answers 30 units late, so the only request stays in flight
    // well past the end of the window.
    let config = switch_config(5, 1, 10.0, 20.0).with_downstream(vec!["SN1".into()]);
    let mut runner = SimulationRunner::new(config, exact_network(1.0)).unwrap();
    client_server(
        &mut runner,
        NodeConfig::new(),
        NodeConfig::new().with_reply_delay(secs(30.0)),
    );
    runner.initialize().unwrap();

    runner.run_until(secs(10.0)).unwrap();
    assert_eq!(status(&runner), (1, true));
    let sensor = runner.node_by_name("SN1").unwrap();
    assert_eq!(sensor.state(), NodeState::Draining);
    assert_eq!(sensor.in_flight(), 1);

    runner.run_until(secs(30.0)).unwrap();
    assert_eq!(status(&runner), (1, true), "switch held open by the drain");

    // Request sent at 3, reply leaves the server at 34 and lands at 35.
    runner.run_until(secs(35.0)).unwrap();
    assert_eq!(status(&runner), (5, false));
    assert_eq!(
        runner.node_by_name("SN1").unwrap().state(),
        NodeState::TransportActive
    );
    assert_eq!(runner.control().finish().transport.count, 1);
}

#[test]
fn test_direct_round_trip_through_runner() {
    let config = switch_config(5, 1, 10.0, 20.0)
        .with_upstream(vec!["DF1".into()])
        .with_downstream(vec!["SN1".into(), "SN2".into(), "DF1".into()]);
    let mut runner = SimulationRunner::new(config, exact_network(0.5)).unwrap();

    let aggregator = Node::stream(
        "DF1".into(),
        NodeRole::Aggregator,
        NodeConfig::new(),
        Box::new(Fanout::new(vec!["SN1".into(), "SN2".into()])),
    )
    .unwrap();
    runner.add_node(aggregator).unwrap();
    for name in ["SN1", "SN2"] {
        let sensor = Node::stream(
            NodeName::new(name),
            NodeRole::Sensor,
            NodeConfig::new(),
            Box::new(ReplyOnly),
        )
        .unwrap();
        runner.add_node(sensor).unwrap();
    }
    runner.initialize().unwrap();

    // Tick at 10, targets reached at 10.1, replies back at 10.2.
    runner.run_until(secs(10.25)).unwrap();
    let aggregator = runner.node_by_name("DF1").unwrap();
    assert_eq!(aggregator.state(), NodeState::DirectActive);
    assert_eq!(aggregator.received_data().len(), 2);
    assert_eq!(runner.control().finish().direct.count, 2);

    runner.run_until(secs(30.0)).unwrap();
    let aggregator = runner.node_by_name("DF1").unwrap();
    assert_eq!(aggregator.state(), NodeState::TransportActive);
    // Ticks at 10, 12, ..., 18: five rounds of two replies.
    assert_eq!(aggregator.received_data().len(), 10);
    assert_eq!(status(&runner), (5, false));
}

#[test]
fn test_direct_traffic_stops_at_switch_end() {
    // The window closes halfway through the first propagation delay.
    let config = switch_config(5, 1, 10.0, 10.05)
        .with_upstream(vec!["DF1".into()])
        .with_downstream(vec!["SN1".into(), "SN2".into(), "DF1".into()]);
    let mut runner = SimulationRunner::new(config, exact_network(0.5)).unwrap();
    runner
        .add_node(
            Node::stream(
                "DF1".into(),
                NodeRole::Aggregator,
                NodeConfig::new(),
                Box::new(Fanout::new(vec!["SN1".into(), "SN2".into()])),
            )
            .unwrap(),
        )
        .unwrap();
    for name in ["SN1", "SN2"] {
        let sensor = Node::stream(
            NodeName::new(name),
            NodeRole::Sensor,
            NodeConfig::new(),
            Box::new(ReplyOnly),
        )
        .unwrap();
        runner.add_node(sensor).unwrap();
    }
    runner.initialize().unwrap();

    runner.run_until(secs(10.06)).unwrap();
    assert_eq!(status(&runner), (5, false));
    assert_eq!(
        runner.node_by_name("DF1").unwrap().state(),
        NodeState::TransportActive
    );

    runner.run_until(secs(10.3)).unwrap();
    assert_eq!(runner.stats().direct_messages, 0);
    assert!(runner.node_by_name("DF1").unwrap().received_data().is_empty());
    assert_eq!(runner.control().finish().direct.count, 0);
}

#[test]
fn test_unknown_downstream_is_fatal() {
    let config = switch_config(5, 1, 10.0, 20.0).with_downstream(vec!["SN9".into()]);
    let mut runner = SimulationRunner::new(config, NetworkConfig::default()).unwrap();
    assert!(matches!(
        runner.initialize(),
        Err(SimulationError::UnknownModule(_))
    ));
}

#[test]
fn test_unresolvable_destination_is_fatal() {
    let mut runner =
        SimulationRunner::new(switch_config(5, 5, 10.0, 20.0), NetworkConfig::default()).unwrap();
    let sensor = Node::stream(
        "SN1".into(),
        NodeRole::Sensor,
        NodeConfig::new().with_connect("nowhere", 1000),
        Box::new(ReplyOnly),
    )
    .unwrap();
    runner.add_node(sensor).unwrap();
    assert!(matches!(
        runner.initialize(),
        Err(SimulationError::Config { .. })
    ));
}

#[test]
fn test_duplicate_node_rejected() {
    let mut runner =
        SimulationRunner::new(ControlConfig::default(), NetworkConfig::default()).unwrap();
    for expect_ok in [true, false] {
        let node = Node::stream(
            "SN1".into(),
            NodeRole::Sensor,
            NodeConfig::new(),
            Box::new(ReplyOnly),
        )
        .unwrap();
        assert_eq!(runner.add_node(node).is_ok(), expect_ok);
    }
}

#[test]
fn test_target_layer_must_be_direct() {
    let config = ControlConfig::new().with_layers(Layer::DIRECT, Layer::FULL_STACK);
    assert!(matches!(
        SimulationRunner::new(config, NetworkConfig::default()),
        Err(SimulationError::Control(_))
    ));
}
