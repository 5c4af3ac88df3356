//! Datagram transport: periodic sends to a random destination, echoed back.

use super::{NodeContext, TransportStrategy};
use crate::codec::AppMessage;
use crate::timer::{SessionTimer, TimerSlot};
use crate::{NodeConfig, NodeError};
use bytes::Bytes;
use layerswitch_core::{Action, TimerId, TransportCommand, TransportIndication};
use layerswitch_types::{DeliveryPath, Endpoint};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Datagram transport.
///
/// Every node binds a socket and echoes any request it receives. Nodes with
/// destinations also send one datagram per `send_interval` and count the
/// echoes; the growth of `sent - received` is reported as packet loss. Only
/// the newest send time is kept, so an echo is always paired with the most
/// recent datagram and lost ones never skew the latency samples.
pub struct DatagramTransport {
    local: Endpoint,
    destinations: Vec<Endpoint>,
    rng: ChaCha8Rng,
    timer: TimerSlot<SessionTimer>,
    bound: bool,
    sent: u64,
    received: u64,
    reported_lost: u64,
    last_sent_at: Option<Duration>,
}

impl DatagramTransport {
    /// Bind on `local_port` (or `dest_port` when unset); `seed` drives the
    /// destination choice.
    pub fn from_config(config: &NodeConfig, seed: u64) -> Self {
        let port = config.local_port.unwrap_or(config.dest_port);
        Self {
            local: Endpoint::new(config.local_address.clone(), port),
            destinations: config.destinations(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            timer: TimerSlot::new(TimerId::Session),
            bound: false,
            sent: 0,
            received: 0,
            reported_lost: 0,
            last_sent_at: None,
        }
    }

    fn bind(&mut self, ctx: &mut NodeContext<'_>) {
        if !self.bound {
            ctx.command(TransportCommand::Bind {
                local: self.local.clone(),
            });
            self.bound = true;
        }
    }

    fn send_datagram(&mut self, ctx: &mut NodeContext<'_>) {
        let dest = self.destinations[self.rng.gen_range(0..self.destinations.len())].clone();
        let length = ctx.config.message_length;
        let payload = AppMessage::request(length, length).encode();
        trace!(node = %ctx.node, %dest, seq = self.sent, "Sending datagram");
        ctx.send_to(dest, payload);
        self.sent += 1;
        self.last_sent_at = Some(ctx.now);
    }

    fn schedule_next(&mut self, ctx: &mut NodeContext<'_>) {
        let interval = ctx.config.send_interval;
        match ctx.config.stop_time {
            Some(stop) if ctx.now + interval >= stop => {
                let delay = stop.saturating_sub(ctx.now);
                self.timer.reschedule(SessionTimer::Stop, delay, ctx.actions);
            }
            _ => self.timer.reschedule(SessionTimer::Send, interval, ctx.actions),
        }
    }

    fn on_datagram(
        &mut self,
        ctx: &mut NodeContext<'_>,
        from: Endpoint,
        bytes: Bytes,
    ) -> Result<(), NodeError> {
        ctx.counters.received(bytes.len());
        let Some(message) = AppMessage::decode(&bytes)? else {
            warn!(node = %ctx.node, %from, len = bytes.len(), "Runt datagram, dropping");
            return Ok(());
        };

        if !message.is_reply {
            if self.bound {
                ctx.counters.echoed += 1;
                ctx.send_to(from, message.reply().encode());
            }
            return Ok(());
        }

        self.received += 1;
        if let Some(sent) = self.last_sent_at.take() {
            ctx.record_latency(DeliveryPath::Transport, ctx.now.saturating_sub(sent));
        }
        let lost = self.sent.saturating_sub(self.received);
        if lost > self.reported_lost {
            ctx.actions.push(Action::RecordPacketLoss {
                count: lost - self.reported_lost,
            });
            self.reported_lost = lost;
        }
        Ok(())
    }
}

impl TransportStrategy for DatagramTransport {
    fn name(&self) -> &'static str {
        "datagram"
    }

    fn on_start(&mut self, ctx: &mut NodeContext<'_>) -> Result<(), NodeError> {
        self.bind(ctx);
        if !self.destinations.is_empty() {
            let delay = ctx.config.start_time.saturating_sub(ctx.now);
            ctx.schedule_session(&mut self.timer, SessionTimer::Start, delay);
        }
        Ok(())
    }

    fn on_session_timer(&mut self, ctx: &mut NodeContext<'_>) -> Result<(), NodeError> {
        match self.timer.fire()? {
            SessionTimer::Start | SessionTimer::Send => {
                if self.bound && !self.destinations.is_empty() {
                    self.send_datagram(ctx);
                    self.schedule_next(ctx);
                }
            }
            SessionTimer::Stop => {
                debug!(node = %ctx.node, "Stop time reached, closing socket");
                if self.bound {
                    ctx.command(TransportCommand::Destroy);
                    self.bound = false;
                }
            }
            SessionTimer::Connect => {
                debug!(node = %ctx.node, "Connect timer on a datagram transport, ignoring")
            }
        }
        Ok(())
    }

    fn on_indication(
        &mut self,
        ctx: &mut NodeContext<'_>,
        indication: TransportIndication,
    ) -> Result<(), NodeError> {
        match indication {
            TransportIndication::Datagram { from, bytes } => self.on_datagram(ctx, from, bytes),
            TransportIndication::Other { name } => {
                warn!(node = %ctx.node, indication = name, "Unhandled transport indication");
                Ok(())
            }
            other => {
                warn!(node = %ctx.node, ?other, "Stream indication on a datagram transport");
                Ok(())
            }
        }
    }

    fn on_deferred(
        &mut self,
        ctx: &mut NodeContext<'_>,
        command: TransportCommand,
    ) -> Result<(), NodeError> {
        debug!(node = %ctx.node, ?command, "Deferred command on a datagram transport, dropping");
        Ok(())
    }

    /// Datagrams are never waited for.
    fn in_flight(&self) -> usize {
        0
    }

    fn suspend(&mut self, ctx: &mut NodeContext<'_>) {
        self.timer.cancel(ctx.actions);
    }

    fn shutdown(&mut self, ctx: &mut NodeContext<'_>) {
        self.timer.cancel(ctx.actions);
        if self.bound {
            ctx.command(TransportCommand::Destroy);
            self.bound = false;
        }
        self.last_sent_at = None;
    }

    fn resume(&mut self, ctx: &mut NodeContext<'_>) -> Result<(), NodeError> {
        self.bind(ctx);
        if !self.destinations.is_empty() {
            let delay = ctx.config.start_time.saturating_sub(ctx.now);
            ctx.schedule_session(&mut self.timer, SessionTimer::Start, delay);
        }
        Ok(())
    }
}
