//! `patrol-runtime` – patrol orchestration
//!
//! Turns route requests into motion, one control tick at a time.
//!
//! # Modules
//!
//! - [`route_planner`] – [`RoutePlanner`][route_planner::RoutePlanner]:
//!   expands shapes and goals into validated routes, yields segments in
//!   traversal order, and inserts or drops detours.
//! - [`motion_executor`] – [`MotionExecutor`][motion_executor::MotionExecutor]:
//!   decomposes a segment into turn, walk and dwell primitives and polls the
//!   motion SDK without ever blocking.
//! - [`retry_guard`] – [`RetryGuard`][retry_guard::RetryGuard]:
//!   detects repeated detours towards the same waypoint.
//! - [`patrol_machine`] – [`PatrolMachine`][patrol_machine::PatrolMachine]:
//!   the lifecycle state machine tying planner, safety layer and executor
//!   together.
//! - [`patrol_loop`] – the periodic Tokio control loop and its
//!   [`PatrolHandle`][patrol_loop::PatrolHandle].
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: console or
//!   JSON logs with optional OTLP span export.
//!
//! # Safety layer
//!
//! Every tick re-derives a fresh verdict through `patrol-kernel`; nothing
//! the machine does bypasses it, and every primitive the executor sends
//! passes the kernel's [`PrimitiveGuard`] first.

pub mod motion_executor;
pub mod patrol_loop;
pub mod patrol_machine;
pub mod retry_guard;
pub mod route_planner;
pub mod telemetry;

pub use motion_executor::{ExecutorConfig, MotionExecutor};
pub use patrol_loop::{LoopConfig, PatrolHandle, PatrolLoop, patrol_loop};
pub use patrol_machine::{MachineConfig, PatrolMachine, PatrolSettings};
pub use retry_guard::RetryGuard;
pub use route_planner::{NextSegment, PlannerConfig, RouteCursor, RoutePlanner, route_spec_schema};
pub use telemetry::{TracerProviderGuard, init_tracing};

// Re-exported so callers wiring a machine need no direct kernel dependency.
pub use patrol_kernel::{LinkMonitor, PrimitiveGuard};
