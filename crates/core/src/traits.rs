//! Core traits for state machines.

use crate::{Action, ProtocolEvent};
use layerswitch_types::{Layer, RoutingTable};
use std::sync::Arc;
use std::time::Duration;

/// Read-only snapshot of the coordinator handed to a node before each event.
///
/// Nodes consult the coordinator on every message; the runner refreshes the
/// view immediately before calling [`StateMachine::handle`], so it always
/// reflects every coordinator transition processed so far.
#[derive(Debug, Clone)]
pub struct ControlView {
    /// Currently active layer.
    pub layer: Layer,
    /// Whether a switch window is open.
    pub switch_active: bool,
    /// Message-kind routes for the master.
    pub routes: Arc<RoutingTable>,
    /// Total datagrams reported lost so far.
    pub packets_lost: u64,
}

impl ControlView {
    /// View used before the coordinator publishes its first state.
    pub fn initial(layer: Layer) -> Self {
        Self {
            layer,
            switch_active: false,
            routes: Arc::new(RoutingTable::new()),
            packets_lost: 0,
        }
    }
}

/// A state machine that processes events.
///
/// - **Synchronous**: No async, no `.await`
/// - **Deterministic**: Same state + event = same actions
/// - **Pure-ish**: Mutates self, but performs no I/O
///
/// # Example
///
/// ```ignore
/// impl StateMachine for Node {
///     type Error = NodeError;
///
///     fn handle(&mut self, event: ProtocolEvent) -> Result<Vec<Action>, NodeError> {
///         match event {
///             ProtocolEvent::DirectTick => self.on_direct_tick(),
///             ProtocolEvent::Control(msg) => self.on_control(msg),
///             // ... etc
///         }
///     }
///     // ...
/// }
/// ```
pub trait StateMachine {
    /// Fatal protocol or configuration error.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Process a protocol event, returning actions to perform.
    ///
    /// An `Err` means an invariant of the protocol was violated; the runner
    /// aborts the run.
    fn handle(&mut self, event: ProtocolEvent) -> Result<Vec<Action>, Self::Error>;

    /// Set the current time.
    ///
    /// Called by the runner before each `handle()` call.
    fn set_time(&mut self, now: Duration);

    /// Get the current time.
    fn now(&self) -> Duration;

    /// Refresh the coordinator view.
    ///
    /// Called by the runner before each `handle()` call.
    fn set_control(&mut self, view: ControlView);
}
