//! `patrol-types` – shared vocabulary of the patrol orchestration core.
//!
//! Every other crate in the workspace speaks in these types: the waypoint
//! model ([`Route`], [`Segment`]), obstacle and safety verdicts, motion
//! primitives, status events, and the shared [`PatrolError`].

pub mod error;
pub mod event;
pub mod geometry;
pub mod motion;
pub mod obstacle;
pub mod route;
pub mod safety;

pub use error::PatrolError;
pub use event::{EventKind, EventPayload, Lifecycle, PatrolEvent, PatrolState, StatusReporter};
pub use geometry::{Bounds, POSITION_EPSILON, Pose, normalize_angle};
pub use motion::{ExecutionStatus, FailureReason, MotionPrimitive, PrimitiveHandle, PrimitiveStatus};
pub use obstacle::{ObstacleReading, ObstacleScan, ObstacleVerdict, StopCause};
pub use route::{MAX_DWELL_S, Route, RouteSpec, Segment, TraversalMode, Waypoint};
pub use safety::{DegradeReason, HaltReason, HardwareFault, LinkStatus, SafetyVerdict, Telemetry};
