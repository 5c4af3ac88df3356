//! Deterministic simulation runner.
//!
//! Owns the coordinator, every node and the simulated transport. Nodes see
//! the coordinator only through the [`ControlView`](layerswitch_core::ControlView)
//! refreshed before each of their events, and talk to it only through the
//! actions they return.

use crate::event_queue::{EventKey, QueuedEvent, Recipient};
use crate::transport::{Delivery, TransportStats};
use crate::{NetworkConfig, NodeIndex, SimulatedTransport, SimulationError};
use layerswitch_control::{
    ControlAction, ControlConfig, ControlReport, ExperimentControl,
};
use layerswitch_core::{Action, ProtocolEvent, StateMachine, TimerId};
use layerswitch_node::{ConfigError, Node};
use layerswitch_types::{DeliveryPath, ModulePath, NodeName};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::{debug, info, trace};

/// Deterministic simulation runner.
///
/// Processes events in deterministic order and executes actions.
/// Given the same seed, produces identical results every run.
pub struct SimulationRunner {
    /// All nodes in the simulation, indexed by NodeIndex.
    nodes: Vec<Node>,

    /// Module path of every node, for direct delivery and notifications.
    modules: BTreeMap<ModulePath, NodeIndex>,

    control: ExperimentControl,

    /// Global event queue, ordered deterministically.
    event_queue: BTreeMap<EventKey, QueuedEvent>,

    /// Sequence counter for deterministic ordering.
    sequence: u64,

    /// Current simulation time.
    now: Duration,

    transport: SimulatedTransport,

    /// RNG for network conditions (seeded for determinism).
    rng: ChaCha8Rng,

    /// Timer registry for cancellation support.
    /// Maps (node, timer_id) -> event_key for removal.
    timers: HashMap<(NodeIndex, TimerId), EventKey>,

    stats: SimulationStats,

    initialized: bool,
}

/// Statistics collected during simulation.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SimulationStats {
    /// Total events processed.
    pub events_processed: u64,
    /// Events processed by priority.
    pub events_by_priority: [u64; 4],
    /// Total actions generated by nodes.
    pub actions_generated: u64,
    /// Coordinator events processed.
    pub control_events: u64,
    /// Control messages delivered to nodes.
    pub notifications_sent: u64,
    /// Messages delivered on the direct path.
    pub direct_messages: u64,
    /// Transport indications scheduled.
    pub indications_scheduled: u64,
    /// Transport indications dropped because their socket was destroyed.
    pub indications_dropped: u64,
    /// Timers set.
    pub timers_set: u64,
    /// Timers cancelled.
    pub timers_cancelled: u64,
}

impl SimulationStats {
    /// Fraction of scheduled transport indications that reached their node.
    pub fn delivery_rate(&self) -> f64 {
        if self.indications_scheduled == 0 {
            1.0
        } else {
            1.0 - self.indications_dropped as f64 / self.indications_scheduled as f64
        }
    }
}

impl SimulationRunner {
    /// Create a runner with no nodes.
    pub fn new(
        control_config: ControlConfig,
        network_config: NetworkConfig,
    ) -> Result<Self, SimulationError> {
        let control = ExperimentControl::new(control_config)?;
        let rng = ChaCha8Rng::seed_from_u64(network_config.seed);

        Ok(Self {
            nodes: Vec::new(),
            modules: BTreeMap::new(),
            control,
            event_queue: BTreeMap::new(),
            sequence: 0,
            now: Duration::ZERO,
            transport: SimulatedTransport::new(network_config),
            rng,
            timers: HashMap::new(),
            stats: SimulationStats::default(),
            initialized: false,
        })
    }

    /// Register a node. Node names must be unique.
    pub fn add_node(&mut self, node: Node) -> Result<NodeIndex, SimulationError> {
        let path = node.name().module_path(self.control.topology_root());
        if self.modules.contains_key(&path) {
            return Err(SimulationError::DuplicateNode(node.name().clone()));
        }
        let index = self.nodes.len() as NodeIndex;
        self.transport.register(index, node.name());
        self.modules.insert(path, index);
        self.nodes.push(node);
        Ok(index)
    }

    /// Get simulation statistics.
    pub fn stats(&self) -> &SimulationStats {
        &self.stats
    }

    pub fn transport_stats(&self) -> &TransportStats {
        self.transport.stats()
    }

    /// Get current simulation time.
    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn control(&self) -> &ExperimentControl {
        &self.control
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Get a reference to a node by index.
    pub fn node(&self, index: NodeIndex) -> Option<&Node> {
        self.nodes.get(index as usize)
    }

    /// Get a node by name.
    pub fn node_by_name(&self, name: &str) -> Option<&Node> {
        self.resolve(&NodeName::new(name))
            .ok()
            .and_then(|index| self.node(index))
    }

    /// Events still queued.
    pub fn pending_events(&self) -> usize {
        self.event_queue.len()
    }

    /// Validate the topology, schedule the switch and start every node.
    ///
    /// Must be called once, before the first [`run_until`](Self::run_until).
    pub fn initialize(&mut self) -> Result<(), SimulationError> {
        self.validate()?;

        for action in self.control.schedule_switch()? {
            self.process_control_action(action)?;
        }

        for index in 0..self.nodes.len() as NodeIndex {
            self.schedule_event(
                Recipient::Node(index),
                self.now,
                QueuedEvent::Node(ProtocolEvent::Start),
            );
        }
        self.initialized = true;

        info!(
            nodes = self.nodes.len(),
            layer = %self.control.get_state(),
            "Simulation initialized"
        );
        Ok(())
    }

    /// Configuration errors are fatal at setup.
    fn validate(&self) -> Result<(), SimulationError> {
        for name in self.control.upstream().iter().chain(self.control.downstream()) {
            self.resolve(name)?;
        }

        let routes = self.control.view().routes;
        for node in &self.nodes {
            let config_error = |source| SimulationError::Config {
                node: node.name().clone(),
                source,
            };
            let config = node.config();
            let addresses = config.connect_address.iter().chain(&config.dest_addresses);
            for address in addresses {
                if self.transport.resolve(address).is_none() {
                    return Err(config_error(ConfigError::UnresolvableAddress(
                        address.clone(),
                    )));
                }
            }
            for &kind in node.forwarding().kinds() {
                if !routes.contains(kind) {
                    return Err(config_error(ConfigError::MissingRoute(kind)));
                }
            }
        }
        Ok(())
    }

    /// Run simulation until no more events or time limit reached.
    ///
    /// Stops at the first fatal error; the runner is not usable afterwards.
    pub fn run_until(&mut self, end_time: Duration) -> Result<(), SimulationError> {
        if !self.initialized {
            self.initialize()?;
        }
        trace!(
            end_time_secs = end_time.as_secs_f64(),
            "Running simulation step"
        );

        while let Some((&key, _)) = self.event_queue.first_key_value() {
            if key.time > end_time {
                debug!(
                    remaining_events = self.event_queue.len(),
                    "Time limit reached"
                );
                break;
            }

            let Some((key, event)) = self.event_queue.pop_first() else {
                break;
            };
            self.now = key.time;

            self.stats.events_processed += 1;
            self.stats.events_by_priority[key.priority as usize] += 1;

            match (key.recipient, event) {
                (Recipient::Control, QueuedEvent::Control(event)) => {
                    self.stats.control_events += 1;
                    let actions = self.control.handle(event, self.now)?;
                    for action in actions {
                        self.process_control_action(action)?;
                    }
                }
                (Recipient::Node(index), QueuedEvent::Node(event)) => {
                    self.deliver_to_node(index, key, event)?;
                }
                (recipient, event) => {
                    debug!(?recipient, ?event, "Event queued for the wrong recipient, dropping");
                }
            }
        }

        // Always advance time to end_time, even if we ran out of events.
        if self.now < end_time {
            self.now = end_time;
        }

        trace!(
            events_processed = self.stats.events_processed,
            actions_generated = self.stats.actions_generated,
            final_time = ?self.now,
            "Simulation step complete"
        );
        Ok(())
    }

    /// Log every node's counters and return the coordinator's report.
    pub fn finish(&self) -> ControlReport {
        for node in &self.nodes {
            node.finish();
        }
        info!(
            events = self.stats.events_processed,
            direct_messages = self.stats.direct_messages,
            indications_dropped = self.stats.indications_dropped,
            "Simulation finished"
        );
        self.control.finish()
    }

    fn deliver_to_node(
        &mut self,
        index: NodeIndex,
        key: EventKey,
        event: ProtocolEvent,
    ) -> Result<(), SimulationError> {
        if let ProtocolEvent::Transport(indication) = &event {
            if !self.transport.accepts(index, indication) {
                self.stats.indications_dropped += 1;
                trace!(node = index, ?indication, "Indication for a destroyed socket, dropping");
                return Ok(());
            }
        }
        if let Some(id) = timer_of(&event) {
            if self.timers.get(&(index, id)) == Some(&key) {
                self.timers.remove(&(index, id));
            }
        }

        trace!(time = ?self.now, node = index, event = event.type_name(), "Processing event");

        let view = self.control.view();
        let node = &mut self.nodes[index as usize];
        node.set_time(self.now);
        node.set_control(view);
        let actions = node.handle(event).map_err(|source| SimulationError::Node {
            node: node.name().clone(),
            source,
        })?;

        self.stats.actions_generated += actions.len() as u64;
        for action in actions {
            self.process_action(index, action)?;
        }
        Ok(())
    }

    /// Process an action from a node.
    fn process_action(&mut self, from: NodeIndex, action: Action) -> Result<(), SimulationError> {
        match action {
            Action::SetTimer { id, duration } => {
                let fire_time = self.now + duration;
                let key = self.schedule_event(
                    Recipient::Node(from),
                    fire_time,
                    QueuedEvent::Node(id.event()),
                );
                if let Some(previous) = self.timers.insert((from, id), key) {
                    self.event_queue.remove(&previous);
                }
                self.stats.timers_set += 1;
            }

            Action::CancelTimer { id } => {
                if let Some(key) = self.timers.remove(&(from, id)) {
                    self.event_queue.remove(&key);
                    self.stats.timers_cancelled += 1;
                }
            }

            Action::EnqueueDelayed { delay, event } => {
                self.schedule_event(
                    Recipient::Node(from),
                    self.now + delay,
                    QueuedEvent::Node(event),
                );
            }

            Action::SendDirect { to, message } => {
                let target = self.resolve(&to)?;
                let from = self.nodes[from as usize].name().clone();
                self.schedule_event(
                    Recipient::Node(target),
                    self.now,
                    QueuedEvent::Node(ProtocolEvent::Direct { from, message }),
                );
                self.stats.direct_messages += 1;
            }

            Action::Transport(command) => {
                let deliveries = self
                    .transport
                    .execute(from, command, self.now, &mut self.rng);
                for Delivery { to, at, indication } in deliveries {
                    self.schedule_event(
                        Recipient::Node(to),
                        at,
                        QueuedEvent::Node(ProtocolEvent::Transport(indication)),
                    );
                    self.stats.indications_scheduled += 1;
                }
            }

            Action::RecordLatency { path, sample } => match path {
                DeliveryPath::Transport => self.control.record_transport_latency(sample),
                DeliveryPath::Direct => self.control.record_direct_latency(sample),
            },

            Action::RecordPacketLoss { count } => self.control.record_packet_loss(count),

            Action::TransportStopped => {
                let name = self.nodes[from as usize].name().clone();
                let actions = self.control.on_transport_stopped(&name, self.now)?;
                for action in actions {
                    self.process_control_action(action)?;
                }
            }
        }
        Ok(())
    }

    fn process_control_action(&mut self, action: ControlAction) -> Result<(), SimulationError> {
        match action {
            ControlAction::ScheduleAt { at, event } => {
                self.schedule_event(Recipient::Control, at, QueuedEvent::Control(event));
            }
            ControlAction::Notify { to, message } => {
                let target = self.resolve(&to)?;
                self.schedule_event(
                    Recipient::Node(target),
                    self.now,
                    QueuedEvent::Node(ProtocolEvent::Control(message)),
                );
                self.stats.notifications_sent += 1;
            }
        }
        Ok(())
    }

    /// Resolve a node name through its module path under the topology root.
    fn resolve(&self, name: &NodeName) -> Result<NodeIndex, SimulationError> {
        let path = name.module_path(self.control.topology_root());
        self.modules
            .get(&path)
            .copied()
            .ok_or(SimulationError::UnknownModule(path))
    }

    /// Schedule an event.
    fn schedule_event(
        &mut self,
        recipient: Recipient,
        time: Duration,
        event: QueuedEvent,
    ) -> EventKey {
        self.sequence += 1;
        let key = EventKey::new(time, &event, recipient, self.sequence);
        self.event_queue.insert(key, event);
        key
    }
}

impl std::fmt::Debug for SimulationRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationRunner")
            .field("now", &self.now)
            .field("nodes", &self.nodes.len())
            .field("pending_events", &self.event_queue.len())
            .field("control", &self.control)
            .finish_non_exhaustive()
    }
}

/// Timer an event is the firing of, if any.
fn timer_of(event: &ProtocolEvent) -> Option<TimerId> {
    match event {
        ProtocolEvent::SessionTimer => Some(TimerId::Session),
        ProtocolEvent::DirectTick => Some(TimerId::DirectTick),
        ProtocolEvent::ReportTimer => Some(TimerId::Report),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use layerswitch_core::EventPriority;
    use layerswitch_node::{Fanout, NodeConfig};
    use layerswitch_types::NodeRole;

    fn secs(s: f64) -> Duration {
        Duration::from_secs_f64(s)
    }

    /// A started master, whose report timer is due at 1.
    fn runner_with_master() -> SimulationRunner {
        let config = ControlConfig::new().with_layer_counts(5, 5).unwrap();
        let mut runner = SimulationRunner::new(config, NetworkConfig::default()).unwrap();
        let master = Node::stream(
            "M".into(),
            NodeRole::Master,
            NodeConfig::new(),
            Box::new(Fanout::new(vec![])),
        )
        .unwrap();
        runner.add_node(master).unwrap();
        runner.run_until(Duration::ZERO).unwrap();
        runner
    }

    fn queued_report_timers(runner: &SimulationRunner) -> usize {
        runner
            .event_queue
            .values()
            .filter(|e| matches!(e, QueuedEvent::Node(ProtocolEvent::ReportTimer)))
            .count()
    }

    fn timer_events(runner: &SimulationRunner) -> u64 {
        runner.stats().events_by_priority[EventPriority::Timer as usize]
    }

    #[test]
    fn test_rescheduled_timer_fires_once() {
        let mut runner = runner_with_master();
        assert_eq!(queued_report_timers(&runner), 1);

        for _ in 0..3 {
            runner
                .process_action(
                    0,
                    Action::SetTimer {
                        id: TimerId::Report,
                        duration: secs(0.5),
                    },
                )
                .unwrap();
        }
        assert_eq!(queued_report_timers(&runner), 1);
        assert_eq!(runner.stats().timers_set, 4);

        // The replaced firing at 1 is gone; the next one follows at 1.5.
        runner.run_until(secs(1.2)).unwrap();
        assert_eq!(timer_events(&runner), 1);
        runner.run_until(secs(1.5)).unwrap();
        assert_eq!(timer_events(&runner), 2);
    }

    #[test]
    fn test_cancelled_timer_never_fires() {
        let mut runner = runner_with_master();
        runner
            .process_action(0, Action::CancelTimer { id: TimerId::Report })
            .unwrap();
        assert_eq!(queued_report_timers(&runner), 0);
        assert!(runner.timers.is_empty());

        runner.run_until(secs(5.0)).unwrap();
        assert_eq!(timer_events(&runner), 0);
        assert_eq!(runner.stats().timers_cancelled, 1);
    }
}
