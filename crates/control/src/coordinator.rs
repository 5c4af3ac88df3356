//! The experiment coordinator.

use crate::{ControlConfig, ControlError, ControlReport, LatencyStats};
use layerswitch_core::{ControlMessage, ControlView};
use layerswitch_types::{Layer, MessageKind, NodeName, RoutingTable};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Timed events the coordinator schedules for itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlEvent {
    /// Flip to the target layer.
    SwitchBegin,
    /// Restore the original layer.
    SwitchEnd,
    /// Start draining downstream transports.
    DrainPoll,
}

/// Outputs of the coordinator, executed by the runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlAction {
    /// Deliver `event` back to the coordinator at the absolute time `at`.
    ScheduleAt { at: Duration, event: ControlEvent },
    /// Deliver `message` to the node called `to`.
    Notify { to: NodeName, message: ControlMessage },
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
enum Drain {
    /// Nothing requested yet.
    #[default]
    Idle,
    /// The drain poll fired before the switch began; start on `SwitchBegin`.
    Waiting,
    /// `StopTransport` sent; waiting for these nodes to report.
    InProgress { pending: BTreeSet<NodeName> },
    /// Every downstream node reported.
    Complete,
}

/// Coordinator of the layer switch.
///
/// Owns the active layer, the switch-in-progress flag, the notification
/// topology and the run-wide latency statistics. All transitions happen in
/// [`handle`](Self::handle) and [`on_transport_stopped`](Self::on_transport_stopped);
/// state is always updated before the notifications that depend on it are
/// returned.
#[derive(Debug)]
pub struct ExperimentControl {
    current_layer: Layer,
    target_layer: Layer,
    start_time: Duration,
    end_time: Duration,
    upstream: Vec<NodeName>,
    downstream: Vec<NodeName>,
    topology_root: String,
    routes: Arc<RoutingTable>,

    state: Layer,
    switch_active: bool,
    scheduled: bool,
    drain: Drain,
    end_deferred: bool,

    transport_latency: LatencyStats,
    direct_latency: LatencyStats,
    packets_lost: u64,
}

impl ExperimentControl {
    /// Validate `config` and build the coordinator.
    pub fn new(config: ControlConfig) -> Result<Self, ControlError> {
        config.validate()?;

        let ControlConfig {
            switch_enabled,
            current_layer,
            target_layer,
            start_time,
            end_time,
            mut upstream,
            mut downstream,
            routing_table,
            topology_root,
        } = config;

        if !switch_enabled {
            info!("Layer switch disabled, no node will be notified");
            upstream.clear();
            downstream.clear();
        }

        Ok(Self {
            current_layer,
            target_layer,
            start_time,
            end_time,
            upstream,
            downstream,
            topology_root,
            routes: Arc::new(routing_table),
            state: current_layer,
            switch_active: false,
            scheduled: false,
            drain: Drain::Idle,
            end_deferred: false,
            transport_latency: LatencyStats::new(),
            direct_latency: LatencyStats::new(),
            packets_lost: 0,
        })
    }

    /// Schedule the switch events. Must be called exactly once per run.
    ///
    /// Returns no actions when the current and target layers are equal.
    pub fn schedule_switch(&mut self) -> Result<Vec<ControlAction>, ControlError> {
        if self.scheduled {
            return Err(ControlError::AlreadyScheduled);
        }
        self.scheduled = true;

        if self.current_layer == self.target_layer {
            info!(layer = %self.current_layer, "Current and target layers match, no switch");
            return Ok(vec![]);
        }

        info!(
            from = %self.current_layer,
            to = %self.target_layer,
            start = ?self.start_time,
            end = ?self.end_time,
            "Layer switch scheduled"
        );

        Ok(vec![
            ControlAction::ScheduleAt {
                at: self.start_time,
                event: ControlEvent::SwitchBegin,
            },
            ControlAction::ScheduleAt {
                at: self.start_time,
                event: ControlEvent::DrainPoll,
            },
            ControlAction::ScheduleAt {
                at: self.end_time,
                event: ControlEvent::SwitchEnd,
            },
        ])
    }

    /// Process one of the coordinator's own timed events.
    #[instrument(level = "debug", skip(self))]
    pub fn handle(
        &mut self,
        event: ControlEvent,
        now: Duration,
    ) -> Result<Vec<ControlAction>, ControlError> {
        if !self.scheduled {
            return Err(ControlError::NotScheduled);
        }
        Ok(match event {
            ControlEvent::SwitchBegin => self.on_switch_start(now),
            ControlEvent::SwitchEnd => self.on_switch_end(now),
            ControlEvent::DrainPoll => self.on_drain_poll(now),
        })
    }

    /// A downstream node finished draining its transport.
    pub fn on_transport_stopped(
        &mut self,
        node: &NodeName,
        now: Duration,
    ) -> Result<Vec<ControlAction>, ControlError> {
        if !self.scheduled {
            return Err(ControlError::NotScheduled);
        }

        let Drain::InProgress { pending } = &mut self.drain else {
            debug!(node = %node, "Transport stop reported outside a drain");
            return Ok(vec![]);
        };

        if !pending.remove(node) {
            debug!(node = %node, "Transport stop from a node not being drained");
            return Ok(vec![]);
        }

        debug!(node = %node, remaining = pending.len(), ?now, "Downstream transport stopped");

        if pending.is_empty() {
            Ok(self.complete_drain(now))
        } else {
            Ok(vec![])
        }
    }

    fn on_switch_start(&mut self, now: Duration) -> Vec<ControlAction> {
        self.state = self.target_layer;
        self.switch_active = true;
        info!(layer = %self.state, ?now, "Switch started");

        if self.drain == Drain::Waiting {
            self.start_drain(now)
        } else {
            vec![]
        }
    }

    fn on_drain_poll(&mut self, now: Duration) -> Vec<ControlAction> {
        if !self.switch_active {
            if now < self.end_time {
                debug!(?now, "Drain requested before switch start, waiting");
                self.drain = Drain::Waiting;
            }
            return vec![];
        }
        self.start_drain(now)
    }

    fn on_switch_end(&mut self, now: Duration) -> Vec<ControlAction> {
        if let Drain::InProgress { pending } = &self.drain {
            warn!(
                pending = pending.len(),
                ?now,
                "Switch end reached with transports still draining, extending switch"
            );
            self.end_deferred = true;
            return vec![];
        }
        self.finish_switch(now)
    }

    fn start_drain(&mut self, now: Duration) -> Vec<ControlAction> {
        let pending: BTreeSet<NodeName> = self.downstream.iter().cloned().collect();
        debug!(nodes = pending.len(), ?now, "Draining downstream transports");

        let mut actions: Vec<ControlAction> = self
            .downstream
            .iter()
            .map(|to| ControlAction::Notify {
                to: to.clone(),
                message: ControlMessage::StopTransport,
            })
            .collect();

        if pending.is_empty() {
            actions.extend(self.complete_drain(now));
        } else {
            self.drain = Drain::InProgress { pending };
        }
        actions
    }

    fn complete_drain(&mut self, now: Duration) -> Vec<ControlAction> {
        self.drain = Drain::Complete;
        info!(?now, "Drain complete, notifying sources");

        let mut actions: Vec<ControlAction> = self
            .upstream
            .iter()
            .map(|to| ControlAction::Notify {
                to: to.clone(),
                message: ControlMessage::DrainComplete,
            })
            .collect();

        if self.end_deferred {
            self.end_deferred = false;
            actions.extend(self.finish_switch(now));
        }
        actions
    }

    fn finish_switch(&mut self, now: Duration) -> Vec<ControlAction> {
        self.switch_active = false;
        self.state = self.current_layer;
        info!(layer = %self.state, ?now, "Switch ended");

        self.downstream
            .iter()
            .map(|to| ControlAction::Notify {
                to: to.clone(),
                message: ControlMessage::ResumeTransport,
            })
            .collect()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Accessors
    // ═══════════════════════════════════════════════════════════════════════

    /// Currently active layer.
    pub fn get_state(&self) -> Layer {
        self.state
    }

    /// Whether a switch is in progress.
    pub fn get_switch_status(&self) -> bool {
        self.switch_active
    }

    /// Route chain for `kind`; `[NodeName::none()]` when there is none.
    pub fn get_route(&self, kind: MessageKind) -> Vec<NodeName> {
        self.routes.route(kind)
    }

    /// Snapshot handed to nodes before each event.
    pub fn view(&self) -> ControlView {
        ControlView {
            layer: self.state,
            switch_active: self.switch_active,
            routes: Arc::clone(&self.routes),
            packets_lost: self.packets_lost,
        }
    }

    pub fn is_scheduled(&self) -> bool {
        self.scheduled
    }

    pub fn upstream(&self) -> &[NodeName] {
        &self.upstream
    }

    pub fn downstream(&self) -> &[NodeName] {
        &self.downstream
    }

    pub fn topology_root(&self) -> &str {
        &self.topology_root
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Statistics
    // ═══════════════════════════════════════════════════════════════════════

    pub fn record_transport_latency(&mut self, sample: Duration) {
        self.transport_latency.record(sample);
    }

    pub fn record_direct_latency(&mut self, sample: Duration) {
        self.direct_latency.record(sample);
    }

    pub fn record_packet_loss(&mut self, count: u64) {
        self.packets_lost = self.packets_lost.saturating_add(count);
    }

    pub fn packets_lost(&self) -> u64 {
        self.packets_lost
    }

    /// Summarize the run's statistics and log them.
    pub fn finish(&self) -> ControlReport {
        let report = ControlReport {
            transport: self.transport_latency.summary(),
            direct: self.direct_latency.summary(),
            packets_lost: self.packets_lost,
        };
        info!(
            samples = report.transport.count,
            mean = report.transport.mean.as_secs_f64(),
            min = report.transport.min.as_secs_f64(),
            max = report.transport.max.as_secs_f64(),
            "Transport path delay"
        );
        info!(
            samples = report.direct.count,
            mean = report.direct.mean.as_secs_f64(),
            min = report.direct.min.as_secs_f64(),
            max = report.direct.max.as_secs_f64(),
            "Direct path delay"
        );
        info!(packets_lost = report.packets_lost, "Packet loss");
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn names(list: &[&str]) -> Vec<NodeName> {
        list.iter().map(|n| NodeName::new(*n)).collect()
    }

    fn control(upstream: &[&str], downstream: &[&str]) -> ExperimentControl {
        let config = ControlConfig::new()
            .with_layer_counts(7, 1)
            .unwrap()
            .with_window(secs(50), secs(75))
            .with_upstream(names(upstream))
            .with_downstream(names(downstream));
        ExperimentControl::new(config).unwrap()
    }

    fn notified(actions: &[ControlAction], message: ControlMessage) -> Vec<String> {
        actions
            .iter()
            .filter_map(|a| match a {
                ControlAction::Notify { to, message: m } if *m == message => {
                    Some(to.to_string())
                }
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_equal_layers_schedule_nothing() {
        let config = ControlConfig::new().with_layer_counts(3, 3).unwrap();
        let mut control = ExperimentControl::new(config).unwrap();
        assert!(control.schedule_switch().unwrap().is_empty());
        assert!(!control.get_switch_status());
        assert_eq!(control.get_state().count(), 3);
    }

    #[test]
    fn test_schedule_twice_fails() {
        let mut control = control(&[], &[]);
        control.schedule_switch().unwrap();
        assert_eq!(control.schedule_switch(), Err(ControlError::AlreadyScheduled));
    }

    #[test]
    fn test_events_before_schedule_fail() {
        let mut control = control(&[], &[]);
        assert_eq!(
            control.handle(ControlEvent::SwitchBegin, secs(50)),
            Err(ControlError::NotScheduled)
        );
        assert_eq!(
            control.on_transport_stopped(&NodeName::new("SN1"), secs(50)),
            Err(ControlError::NotScheduled)
        );
    }

    #[test]
    fn test_schedule_creates_three_events() {
        let mut control = control(&[], &[]);
        let actions = control.schedule_switch().unwrap();
        assert_eq!(
            actions,
            vec![
                ControlAction::ScheduleAt {
                    at: secs(50),
                    event: ControlEvent::SwitchBegin
                },
                ControlAction::ScheduleAt {
                    at: secs(50),
                    event: ControlEvent::DrainPoll
                },
                ControlAction::ScheduleAt {
                    at: secs(75),
                    event: ControlEvent::SwitchEnd
                },
            ]
        );
    }

    #[test]
    fn test_on_time_switch_sequence() {
        let mut control = control(&["DF1", "M"], &["SN1", "SN2"]);
        control.schedule_switch().unwrap();
        assert_eq!((control.get_state().count(), control.get_switch_status()), (7, false));

        let actions = control.handle(ControlEvent::SwitchBegin, secs(50)).unwrap();
        assert!(actions.is_empty());
        assert_eq!((control.get_state().count(), control.get_switch_status()), (1, true));

        let actions = control.handle(ControlEvent::DrainPoll, secs(50)).unwrap();
        assert_eq!(notified(&actions, ControlMessage::StopTransport), ["SN1", "SN2"]);

        let actions = control.on_transport_stopped(&NodeName::new("SN2"), secs(51)).unwrap();
        assert!(actions.is_empty());
        let actions = control.on_transport_stopped(&NodeName::new("SN1"), secs(52)).unwrap();
        assert_eq!(notified(&actions, ControlMessage::DrainComplete), ["DF1", "M"]);
        assert!(control.get_switch_status());

        let actions = control.handle(ControlEvent::SwitchEnd, secs(75)).unwrap();
        assert_eq!(notified(&actions, ControlMessage::ResumeTransport), ["SN1", "SN2"]);
        assert_eq!((control.get_state().count(), control.get_switch_status()), (7, false));
    }

    #[test]
    fn test_drain_poll_before_begin_waits_for_switch() {
        let mut control = control(&["M"], &["SN1"]);
        control.schedule_switch().unwrap();

        let actions = control.handle(ControlEvent::DrainPoll, secs(50)).unwrap();
        assert!(actions.is_empty());

        let actions = control.handle(ControlEvent::SwitchBegin, secs(50)).unwrap();
        assert_eq!(notified(&actions, ControlMessage::StopTransport), ["SN1"]);
    }

    #[traced_test]
    #[test]
    fn test_extended_drain_keeps_switch_active() {
        let mut control = control(&["M"], &["SN1"]);
        control.schedule_switch().unwrap();
        control.handle(ControlEvent::SwitchBegin, secs(50)).unwrap();
        control.handle(ControlEvent::DrainPoll, secs(50)).unwrap();

        let actions = control.handle(ControlEvent::SwitchEnd, secs(75)).unwrap();
        assert!(actions.is_empty());
        assert!(control.get_switch_status());
        assert!(control.get_state().is_direct());
        assert!(logs_contain("extending switch"));

        let actions = control.on_transport_stopped(&NodeName::new("SN1"), secs(80)).unwrap();
        assert_eq!(notified(&actions, ControlMessage::DrainComplete), ["M"]);
        assert_eq!(notified(&actions, ControlMessage::ResumeTransport), ["SN1"]);
        assert!(!control.get_switch_status());
        assert_eq!(control.get_state().count(), 7);
    }

    #[test]
    fn test_empty_downstream_completes_drain_immediately() {
        let mut control = control(&["M"], &[]);
        control.schedule_switch().unwrap();
        control.handle(ControlEvent::SwitchBegin, secs(50)).unwrap();
        let actions = control.handle(ControlEvent::DrainPoll, secs(50)).unwrap();
        assert_eq!(notified(&actions, ControlMessage::DrainComplete), ["M"]);
    }

    #[test]
    fn test_disabled_switch_empties_fanout() {
        let config = ControlConfig::new()
            .with_switch_enabled(false)
            .with_upstream(names(&["M"]))
            .with_downstream(names(&["SN1"]));
        let control = ExperimentControl::new(config).unwrap();
        assert!(control.upstream().is_empty());
        assert!(control.downstream().is_empty());
    }

    #[test]
    fn test_accessors_have_no_side_effects() {
        let mut control = control(&[], &["SN1"]);
        control.schedule_switch().unwrap();
        control.handle(ControlEvent::SwitchBegin, secs(50)).unwrap();
        for _ in 0..10 {
            assert!(control.get_switch_status());
            assert!(control.get_state().is_direct());
            assert_eq!(control.get_route(MessageKind(50)), names(&["DF1", "SN1"]));
        }
        assert!(control.get_route(MessageKind(7))[0].is_none());
    }

    #[test]
    fn test_finish_report() {
        let mut control = control(&[], &[]);
        control.record_transport_latency(Duration::from_secs(5));
        control.record_direct_latency(Duration::from_millis(200));
        control.record_direct_latency(Duration::from_millis(400));
        control.record_packet_loss(2);
        control.record_packet_loss(1);

        let report = control.finish();
        assert_eq!(report.transport.count, 1);
        assert_eq!(report.transport.mean, Duration::from_secs(5));
        assert_eq!(report.direct.mean, Duration::from_millis(300));
        assert_eq!(report.packets_lost, 3);
        assert_eq!(control.view().packets_lost, 3);
    }
}
