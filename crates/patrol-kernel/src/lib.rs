//! `patrol-kernel` – Safety layer
//!
//! Decides whether the robot may move, and how fast. It holds no patrol
//! state of its own; the runtime feeds it fresh inputs every tick.
//!
//! # Modules
//!
//! - [`obstacle_gate`] – [`ObstacleGate`][obstacle_gate::ObstacleGate]:
//!   reduces classified obstacle readings to `Clear`, `Slow(factor)` or
//!   `Stop`, treating stale or missing data as blindness.
//! - [`safety_monitor`] – [`SafetyMonitor`][safety_monitor::SafetyMonitor]:
//!   priority-ordered fusion of telemetry, the obstacle verdict, and link
//!   health into a [`SafetyVerdict`][patrol_types::SafetyVerdict].
//! - [`link_monitor`] – [`LinkMonitor`][link_monitor::LinkMonitor]:
//!   heartbeat tracker for the operator network link.
//! - [`primitive_guard`] – [`PrimitiveGuard`][primitive_guard::PrimitiveGuard]:
//!   rule engine every motion primitive passes before it reaches the SDK.

pub mod link_monitor;
pub mod obstacle_gate;
pub mod primitive_guard;
pub mod safety_monitor;

pub use link_monitor::LinkMonitor;
pub use obstacle_gate::{ObstacleGate, ObstacleGateConfig};
pub use primitive_guard::{GeofenceRule, PrimitiveGuard, Rule, SpeedCapRule};
pub use safety_monitor::{SafetyConfig, SafetyMonitor};
