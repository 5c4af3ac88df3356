//! Coordinator errors.

use layerswitch_types::Layer;
use std::time::Duration;

/// Fatal coordinator errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControlError {
    #[error("switch already scheduled")]
    AlreadyScheduled,

    #[error("coordinator used before the switch was scheduled")]
    NotScheduled,

    #[error("switch window ends at {end:?}, before it starts at {start:?}")]
    InvalidSwitchWindow { start: Duration, end: Duration },

    #[error("cannot switch to {0}: only direct delivery is supported as a target")]
    UnsupportedTargetLayer(Layer),

    #[error(transparent)]
    InvalidLayer(#[from] layerswitch_types::InvalidLayer),
}
