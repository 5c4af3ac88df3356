//! The node state machine.

use crate::transport::{DatagramTransport, NodeContext, StreamTransport, TransportStrategy};
use crate::{ForwardingStrategy, NodeConfig, NodeCounters, NodeError, NodeState, TimerSlot};
use layerswitch_core::{
    Action, ControlMessage, ControlView, DirectMessage, PropagationStep, ProtocolEvent,
    StateMachine, TimerId, TransportIndication,
};
use layerswitch_types::{DeliveryPath, Layer, NodeName, NodeRole};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, instrument, trace, warn};

/// Interval of the master's packet-loss report.
const REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// Application data received on the direct path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataRecord {
    pub at: Duration,
    pub from: NodeName,
}

/// Fields the transport strategy borrows alongside the node.
struct Shared {
    name: NodeName,
    config: NodeConfig,
    control: ControlView,
    counters: NodeCounters,
    now: Duration,
}

impl Shared {
    fn context<'a>(&'a mut self, quiescing: bool, actions: &'a mut Vec<Action>) -> NodeContext<'a> {
        NodeContext {
            now: self.now,
            node: &self.name,
            config: &self.config,
            control: &self.control,
            counters: &mut self.counters,
            quiescing,
            actions,
        }
    }
}

/// A sensor, aggregator or master node.
pub struct Node {
    shared: Shared,
    role: NodeRole,
    state: NodeState,
    transport: Box<dyn TransportStrategy>,
    forwarding: Box<dyn ForwardingStrategy>,
    direct_timer: TimerSlot<()>,
    report_timer: TimerSlot<()>,
    last_direct_send: Option<Duration>,
    received: Vec<DataRecord>,
}

impl Node {
    /// Build a node from its strategies. Fails on an invalid configuration.
    pub fn new(
        name: NodeName,
        role: NodeRole,
        config: NodeConfig,
        transport: Box<dyn TransportStrategy>,
        forwarding: Box<dyn ForwardingStrategy>,
    ) -> Result<Self, NodeError> {
        config.validate()?;
        Ok(Self {
            shared: Shared {
                name,
                config,
                control: ControlView::initial(Layer::FULL_STACK),
                counters: NodeCounters::default(),
                now: Duration::ZERO,
            },
            role,
            state: NodeState::Idle,
            transport,
            forwarding,
            direct_timer: TimerSlot::new(TimerId::DirectTick),
            report_timer: TimerSlot::new(TimerId::Report),
            last_direct_send: None,
            received: Vec::new(),
        })
    }

    /// Node on a stream transport.
    pub fn stream(
        name: NodeName,
        role: NodeRole,
        config: NodeConfig,
        forwarding: Box<dyn ForwardingStrategy>,
    ) -> Result<Self, NodeError> {
        let transport = Box::new(StreamTransport::from_config(&config));
        Self::new(name, role, config, transport, forwarding)
    }

    /// Node on a datagram transport; `seed` drives destination choice.
    pub fn datagram(
        name: NodeName,
        role: NodeRole,
        config: NodeConfig,
        forwarding: Box<dyn ForwardingStrategy>,
        seed: u64,
    ) -> Result<Self, NodeError> {
        let transport = Box::new(DatagramTransport::from_config(&config, seed));
        Self::new(name, role, config, transport, forwarding)
    }

    pub fn name(&self) -> &NodeName {
        &self.shared.name
    }

    pub fn role(&self) -> NodeRole {
        self.role
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn config(&self) -> &NodeConfig {
        &self.shared.config
    }

    pub fn counters(&self) -> &NodeCounters {
        &self.shared.counters
    }

    pub fn forwarding(&self) -> &dyn ForwardingStrategy {
        self.forwarding.as_ref()
    }

    /// Data received on the direct path, in arrival order.
    pub fn received_data(&self) -> &[DataRecord] {
        &self.received
    }

    /// Transport requests sent and not yet answered.
    pub fn in_flight(&self) -> usize {
        self.transport.in_flight()
    }

    /// Request/reply round trips still to start in the current session.
    pub fn requests_left(&self) -> u32 {
        self.transport.requests_left()
    }

    /// Log the node's counters at the end of a run.
    pub fn finish(&self) {
        self.shared.counters.log(self.shared.name.as_str());
        debug!(
            node = %self.shared.name,
            state = ?self.state,
            saved = self.received.len(),
            "Final node state"
        );
    }

    fn unexpected(&self, event: &'static str) -> NodeError {
        NodeError::UnexpectedEvent {
            state: self.state,
            event,
        }
    }

    fn with_transport<R>(
        &mut self,
        actions: &mut Vec<Action>,
        f: impl FnOnce(&mut dyn TransportStrategy, &mut NodeContext<'_>) -> R,
    ) -> R {
        let quiescing = self.state.is_quiescing();
        let mut ctx = self.shared.context(quiescing, actions);
        f(self.transport.as_mut(), &mut ctx)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Lifecycle
    // ═══════════════════════════════════════════════════════════════════════

    fn on_start(&mut self, actions: &mut Vec<Action>) -> Result<(), NodeError> {
        if self.state != NodeState::Idle {
            return Err(self.unexpected("Start"));
        }
        self.with_transport(actions, |t, ctx| t.on_start(ctx))?;
        self.state = NodeState::TransportActive;
        if self.role == NodeRole::Master {
            self.report_timer.reschedule((), REPORT_INTERVAL, actions);
        }
        debug!(
            node = %self.shared.name,
            role = %self.role,
            transport = self.transport.name(),
            forwarding = self.forwarding.name(),
            "Node started"
        );
        Ok(())
    }

    fn on_report_timer(&mut self, actions: &mut Vec<Action>) -> Result<(), NodeError> {
        self.report_timer.fire()?;
        info!(
            node = %self.shared.name,
            packets_lost = self.shared.control.packets_lost,
            "Packet loss report"
        );
        self.report_timer.reschedule((), REPORT_INTERVAL, actions);
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Coordinator notifications
    // ═══════════════════════════════════════════════════════════════════════

    fn on_stop_transport(&mut self, actions: &mut Vec<Action>) -> Result<(), NodeError> {
        match self.state {
            NodeState::Idle => self.finish_stop(actions),
            NodeState::TransportActive if self.transport.in_flight() == 0 => {
                self.finish_stop(actions)
            }
            NodeState::TransportActive => {
                self.state = NodeState::Draining;
                self.with_transport(actions, |t, ctx| t.suspend(ctx));
                info!(
                    node = %self.shared.name,
                    in_flight = self.transport.in_flight(),
                    "Draining transport"
                );
            }
            _ => return Err(self.unexpected("StopTransport")),
        }
        Ok(())
    }

    fn finish_stop(&mut self, actions: &mut Vec<Action>) {
        self.with_transport(actions, |t, ctx| t.shutdown(ctx));
        self.state = NodeState::Stopped;
        actions.push(Action::TransportStopped);
        info!(node = %self.shared.name, "Transport stopped");
    }

    fn on_resume_transport(&mut self, actions: &mut Vec<Action>) -> Result<(), NodeError> {
        match self.state {
            NodeState::Stopped | NodeState::DirectActive => {
                self.direct_timer.cancel(actions);
                self.state = NodeState::TransportActive;
                self.with_transport(actions, |t, ctx| t.resume(ctx))?;
                info!(node = %self.shared.name, "Transport resumed");
                Ok(())
            }
            _ => Err(self.unexpected("ResumeTransport")),
        }
    }

    fn on_drain_complete(&mut self, actions: &mut Vec<Action>) -> Result<(), NodeError> {
        if !self.shared.control.switch_active {
            debug!(node = %self.shared.name, "Drain complete after switch end, ignoring");
            return Ok(());
        }
        if !self.forwarding.originates() {
            debug!(node = %self.shared.name, "Drain complete on a non-originating node");
            return Ok(());
        }
        match self.state {
            NodeState::TransportActive | NodeState::Stopped => {
                if self.state == NodeState::TransportActive {
                    self.with_transport(actions, |t, ctx| t.suspend(ctx));
                }
                self.state = NodeState::DirectActive;
                self.direct_timer.reschedule((), Duration::ZERO, actions);
                info!(node = %self.shared.name, "Direct forwarding started");
                Ok(())
            }
            _ => Err(self.unexpected("DrainComplete")),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Direct path
    // ═══════════════════════════════════════════════════════════════════════

    fn on_direct_tick(&mut self, actions: &mut Vec<Action>) -> Result<(), NodeError> {
        self.direct_timer.fire()?;
        let control = &self.shared.control;

        if !control.switch_active {
            if self.state == NodeState::DirectActive {
                debug!(node = %self.shared.name, "Switch over, leaving direct forwarding");
                self.state = NodeState::TransportActive;
                self.with_transport(actions, |t, ctx| t.resume(ctx))?;
            }
            return Ok(());
        }
        if !control.layer.is_direct() {
            return Err(NodeError::InvalidRoute {
                layer: control.layer,
            });
        }

        let now = self.shared.now;
        self.last_direct_send = Some(now);
        self.direct_timer
            .reschedule((), self.shared.config.frequency, actions);
        actions.push(Action::EnqueueDelayed {
            delay: self.shared.config.propagation_delay,
            event: ProtocolEvent::Propagate(PropagationStep::Fanout),
        });
        Ok(())
    }

    /// Whether this node is sending on the direct path.
    fn originating_direct(&self) -> bool {
        self.shared.control.switch_active && self.state == NodeState::DirectActive
    }

    fn on_propagate(
        &mut self,
        step: PropagationStep,
        actions: &mut Vec<Action>,
    ) -> Result<(), NodeError> {
        match step {
            PropagationStep::Fanout => {
                if !self.originating_direct() {
                    debug!(
                        node = %self.shared.name,
                        state = ?self.state,
                        "Fanout after leaving direct forwarding, dropping"
                    );
                    return Ok(());
                }
                for (to, message) in self.forwarding.next_targets(&self.shared.control)? {
                    trace!(node = %self.shared.name, %to, ?message, "Direct send");
                    self.shared.counters.msgs_sent += 1;
                    actions.push(Action::SendDirect { to, message });
                }
            }
            PropagationStep::ReplyTo(to) => {
                if !self.shared.control.switch_active {
                    debug!(node = %self.shared.name, %to, "Direct reply after switch end, dropping");
                    return Ok(());
                }
                self.shared.counters.msgs_sent += 1;
                actions.push(Action::SendDirect {
                    to,
                    message: DirectMessage::Returned,
                });
            }
        }
        Ok(())
    }

    fn on_direct(
        &mut self,
        from: NodeName,
        message: DirectMessage,
        actions: &mut Vec<Action>,
    ) -> Result<(), NodeError> {
        self.shared.counters.msgs_rcvd += 1;
        match message {
            DirectMessage::Sent { kind } => {
                if !self.shared.control.switch_active {
                    debug!(node = %self.shared.name, %from, "Direct data after switch end, dropping");
                    return Ok(());
                }
                trace!(node = %self.shared.name, %from, ?kind, "Direct data received");
                actions.push(Action::EnqueueDelayed {
                    delay: self.shared.config.propagation_delay,
                    event: ProtocolEvent::Propagate(PropagationStep::ReplyTo(from)),
                });
            }
            DirectMessage::Returned => {
                if !self.originating_direct() {
                    debug!(
                        node = %self.shared.name,
                        %from,
                        state = ?self.state,
                        "Direct reply outside direct forwarding, dropping"
                    );
                    return Ok(());
                }
                let sent = self
                    .last_direct_send
                    .ok_or_else(|| self.unexpected("DirectReturned"))?;
                let now = self.shared.now;
                self.received.push(DataRecord { at: now, from });
                actions.push(Action::RecordLatency {
                    path: DeliveryPath::Direct,
                    sample: now.saturating_sub(sent),
                });
            }
        }
        Ok(())
    }
}

impl StateMachine for Node {
    type Error = NodeError;

    #[instrument(
        level = "trace",
        skip(self, event),
        fields(node = %self.shared.name, state = ?self.state, event = event.type_name())
    )]
    fn handle(&mut self, event: ProtocolEvent) -> Result<Vec<Action>, NodeError> {
        let mut actions = Vec::new();

        match event {
            ProtocolEvent::Start => self.on_start(&mut actions)?,
            ProtocolEvent::SessionTimer => {
                self.with_transport(&mut actions, |t, ctx| t.on_session_timer(ctx))?
            }
            ProtocolEvent::DirectTick => self.on_direct_tick(&mut actions)?,
            ProtocolEvent::ReportTimer => self.on_report_timer(&mut actions)?,
            ProtocolEvent::Control(ControlMessage::StopTransport) => {
                self.on_stop_transport(&mut actions)?
            }
            ProtocolEvent::Control(ControlMessage::ResumeTransport) => {
                self.on_resume_transport(&mut actions)?
            }
            ProtocolEvent::Control(ControlMessage::DrainComplete) => {
                self.on_drain_complete(&mut actions)?
            }
            ProtocolEvent::Direct { from, message } => {
                self.on_direct(from, message, &mut actions)?
            }
            ProtocolEvent::Propagate(step) => self.on_propagate(step, &mut actions)?,
            ProtocolEvent::Transport(TransportIndication::Other { name }) => {
                warn!(node = %self.shared.name, indication = name, "Ignoring transport indication");
            }
            ProtocolEvent::Transport(indication) => self
                .with_transport(&mut actions, |t, ctx| t.on_indication(ctx, indication))?,
            ProtocolEvent::DeferredCommand(command) => {
                self.with_transport(&mut actions, |t, ctx| t.on_deferred(ctx, command))?
            }
        }

        if self.state == NodeState::Draining && self.transport.in_flight() == 0 {
            self.finish_stop(&mut actions);
        }

        Ok(actions)
    }

    fn set_time(&mut self, now: Duration) {
        self.shared.now = now;
    }

    fn now(&self) -> Duration {
        self.shared.now
    }

    fn set_control(&mut self, view: ControlView) {
        self.shared.control = view;
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.shared.name)
            .field("role", &self.role)
            .field("state", &self.state)
            .field("transport", &self.transport.name())
            .field("forwarding", &self.forwarding.name())
            .field("in_flight", &self.transport.in_flight())
            .finish_non_exhaustive()
    }
}
