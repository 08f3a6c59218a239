use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::event::Lifecycle;
use crate::motion::FailureReason;

/// Error type shared by every patrol crate.
///
/// Safety halts are deliberately absent: a halt is a [`SafetyVerdict`]
/// surfaced as an event, never an error.
///
/// [`SafetyVerdict`]: crate::safety::SafetyVerdict
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PatrolError {
    #[error("Invalid route: {0}")]
    InvalidRoute(String),

    #[error("Patrol already running (state: {0})")]
    PatrolAlreadyRunning(Lifecycle),

    #[error("Patrol is not halted (state: {0})")]
    NotHalted(Lifecycle),

    #[error("No patrol is running")]
    NotRunning,

    #[error("Route change refused while degraded")]
    RouteChangeBlocked,

    #[error("Motion execution failed: {0}")]
    MotionExecution(#[from] FailureReason),

    #[error("Motion SDK error: {0}")]
    Sdk(String),

    #[error("Patrol control loop is not running")]
    ControlLoopClosed,
}
