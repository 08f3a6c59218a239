//! [`PatrolMachine`] – the patrol lifecycle state machine.
//!
//! # States
//!
//! ```text
//!            start            Clear/Degrade           route done
//!   Idle ───────────▶ Planning ─────────────▶ Moving ───────────▶ Idle
//!                        ▲                   ▲  │ ▲
//!                 resume │          Clear    │  │ │ detour planned
//!                        │                   │  ▼ │
//!                     Halted ◀── any Halt ── Degraded   Avoiding
//! ```
//!
//! Each [`tick`][PatrolMachine::tick] gathers telemetry and obstacle
//! readings, derives a fresh [`SafetyVerdict`], and then advances the
//! current state:
//!
//! - **Planning** picks the first segment (or re-derives the interrupted one
//!   from the robot's reported pose) and starts executing it.
//! - **Moving / Degraded** drive the executor; the verdict decides which of
//!   the two applies and caps the speed.
//! - **Avoiding** holds position while a close obstacle persists, then
//!   inserts a detour and resumes.
//! - **Halted** polls nothing until [`resume`][PatrolMachine::resume].
//!
//! A confident close obstacle met while traversing is treated like an
//! obstacle-related motion failure and leads to `Avoiding`, not `Halted`.
//! Sensor blindness and obstacles in any other state halt.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use patrol_hal::{MotionSdk, ObstacleSource};
use patrol_kernel::{
    ObstacleGate, ObstacleGateConfig, SafetyConfig, SafetyMonitor,
};
use patrol_types::{
    EventPayload, ExecutionStatus, FailureReason, HaltReason, Lifecycle, LinkStatus,
    MotionPrimitive, ObstacleVerdict, PatrolError, PatrolEvent, PatrolState, Pose, Route,
    RouteSpec, SafetyVerdict, Segment, StatusReporter, StopCause,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::motion_executor::{ExecutorConfig, MotionExecutor};
use crate::retry_guard::RetryGuard;
use crate::route_planner::{NextSegment, PlannerConfig, RouteCursor, RoutePlanner};

const SOURCE: &str = "patrol-runtime::patrol_machine";

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

/// Recovery limits of the state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineConfig {
    /// Retries of a timed-out or rejected segment before halting.
    pub max_retries: u32,
    /// Ticks to wait in `Avoiding` for a close obstacle to clear.
    pub max_blocked_ticks: u32,
    /// Consecutive detours towards one waypoint before halting.
    pub max_detours: usize,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            max_blocked_ticks: 20,
            max_detours: 3,
        }
    }
}

/// Every component setting the machine is built from.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PatrolSettings {
    pub obstacle_gate: ObstacleGateConfig,
    pub safety: SafetyConfig,
    pub planner: PlannerConfig,
    pub executor: ExecutorConfig,
    pub machine: MachineConfig,
}

#[derive(Debug, Clone, Copy)]
struct Blocked {
    bearing_rad: f32,
    ticks: u32,
}

// ────────────────────────────────────────────────────────────────────────────
// PatrolMachine
// ────────────────────────────────────────────────────────────────────────────

pub struct PatrolMachine {
    planner: RoutePlanner,
    gate: ObstacleGate,
    monitor: SafetyMonitor,
    executor: MotionExecutor,
    retry_guard: RetryGuard,
    config: MachineConfig,
    reporter: Arc<dyn StatusReporter>,

    lifecycle: Lifecycle,
    last_verdict: Option<SafetyVerdict>,
    retry_count: u32,
    route: Option<Route>,
    cursor: RouteCursor,
    segment: Option<Segment>,
    last_pose: Pose,
    blocked: Option<Blocked>,
}

impl PatrolMachine {
    /// Route speeds above the executor's `max_linear_speed` are lowered to
    /// it, since the primitive guard would reject every walk otherwise.
    pub fn new(settings: PatrolSettings, reporter: Arc<dyn StatusReporter>) -> Self {
        let mut planner = settings.planner;
        let limit = settings.executor.max_linear_speed;
        for (name, speed) in [
            ("cruise_speed", &mut planner.cruise_speed),
            ("detour_speed", &mut planner.detour_speed),
        ] {
            if *speed > limit {
                warn!(setting = name, configured = *speed, limit, "route speed above platform limit; clamped");
                *speed = limit;
            }
        }
        if planner.bounds.is_some_and(|b| !b.is_valid()) {
            warn!(bounds = ?planner.bounds, "site bounds are inverted or not finite; every route will be rejected");
        }

        let executor = MotionExecutor::new(settings.executor, Arc::clone(&reporter))
            .with_geofence(planner.bounds);
        Self {
            planner: RoutePlanner::new(planner),
            gate: ObstacleGate::new(settings.obstacle_gate),
            monitor: SafetyMonitor::new(settings.safety),
            executor,
            retry_guard: RetryGuard::new(settings.machine.max_detours),
            config: settings.machine,
            reporter,
            lifecycle: Lifecycle::Idle,
            last_verdict: None,
            retry_count: 0,
            route: None,
            cursor: RouteCursor::start(),
            segment: None,
            last_pose: Pose::default(),
            blocked: None,
        }
    }

    // ── read access ─────────────────────────────────────────────────────────

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn route(&self) -> Option<&Route> {
        self.route.as_ref()
    }

    /// Segment currently being executed (or queued for the next tick).
    pub fn current_segment(&self) -> Option<&Segment> {
        self.segment.as_ref()
    }

    /// Pose from the most recent telemetry read.
    pub fn last_pose(&self) -> Pose {
        self.last_pose
    }

    pub fn snapshot(&self) -> PatrolState {
        PatrolState {
            route_id: self.route.as_ref().map(Route::id),
            segment_index: self.route.as_ref().and(self.cursor.current()),
            lifecycle: self.lifecycle,
            last_verdict: self.last_verdict,
            retry_count: self.retry_count,
        }
    }

    // ── commands ────────────────────────────────────────────────────────────

    /// Plan `spec` from the robot's current pose and begin patrolling.
    pub fn start(&mut self, spec: &RouteSpec, sdk: &mut dyn MotionSdk) -> Result<Uuid, PatrolError> {
        if self.lifecycle != Lifecycle::Idle {
            return Err(PatrolError::PatrolAlreadyRunning(self.lifecycle));
        }
        if let Ok(telemetry) = sdk.get_telemetry() {
            self.last_pose = telemetry.pose;
        }
        let route = self.planner.plan(spec, self.last_pose)?;
        let id = route.id();
        self.install_route(route);
        self.transition(Lifecycle::Planning);
        Ok(id)
    }

    /// Abort the patrol from any state. A no-op when already idle.
    pub fn stop(&mut self, sdk: &mut dyn MotionSdk) {
        if self.lifecycle == Lifecycle::Idle {
            return;
        }
        self.stop_motion(sdk);
        self.clear_route();
        info!("patrol stopped by operator");
        self.transition(Lifecycle::Idle);
    }

    /// Leave `Halted`: the route is re-validated and the next tick re-derives
    /// the interrupted segment from the robot's reported pose.
    pub fn resume(&mut self) -> Result<(), PatrolError> {
        if self.lifecycle != Lifecycle::Halted {
            return Err(PatrolError::NotHalted(self.lifecycle));
        }
        let route = self.route.as_ref().ok_or(PatrolError::NotRunning)?;
        let revalidated = self.planner.revalidate(route)?;
        self.route = Some(revalidated);
        self.retry_count = 0;
        info!("patrol resumed");
        self.transition(Lifecycle::Planning);
        Ok(())
    }

    /// Replace the route of a running patrol.
    pub fn change_route(&mut self, spec: &RouteSpec, sdk: &mut dyn MotionSdk) -> Result<Uuid, PatrolError> {
        match self.lifecycle {
            Lifecycle::Idle => return Err(PatrolError::NotRunning),
            Lifecycle::Degraded => return Err(PatrolError::RouteChangeBlocked),
            _ => {}
        }
        let route = self.planner.plan(spec, self.last_pose)?;
        let id = route.id();
        if self.lifecycle == Lifecycle::Halted {
            self.install_route(route);
            info!(route_id = %id, "route replaced while halted");
            return Ok(id);
        }
        self.executor.cancel(sdk);
        self.install_route(route);
        info!(route_id = %id, "route changed");
        self.transition(Lifecycle::Planning);
        Ok(id)
    }

    // ── control tick ────────────────────────────────────────────────────────

    /// Run one control cycle at time `now`.
    pub fn tick(
        &mut self,
        sdk: &mut dyn MotionSdk,
        sensors: &mut dyn ObstacleSource,
        link: LinkStatus,
        now: DateTime<Utc>,
    ) {
        if matches!(self.lifecycle, Lifecycle::Idle | Lifecycle::Halted) {
            return;
        }

        let telemetry = match sdk.get_telemetry() {
            Ok(t) => t,
            Err(e) => {
                warn!(error = %e, "telemetry unavailable");
                self.halt(sdk, HaltReason::Hardware);
                return;
            }
        };
        self.last_pose = telemetry.pose;
        let scan = sensors.get_obstacle_readings();
        let obstacle = self.gate.evaluate_scan(scan.as_ref(), now);
        let verdict = self.monitor.assess(&telemetry, obstacle, link);
        self.note_verdict(verdict);

        match self.lifecycle {
            Lifecycle::Planning => self.tick_planning(sdk, verdict, obstacle, now),
            Lifecycle::Moving | Lifecycle::Degraded => self.tick_traversing(sdk, verdict, obstacle, now),
            Lifecycle::Avoiding => self.tick_avoiding(sdk, verdict, obstacle, now),
            Lifecycle::Idle | Lifecycle::Halted => {}
        }
    }

    fn tick_planning(
        &mut self,
        sdk: &mut dyn MotionSdk,
        verdict: SafetyVerdict,
        obstacle: ObstacleVerdict,
        now: DateTime<Utc>,
    ) {
        if let SafetyVerdict::Halt(reason) = verdict {
            self.halt(sdk, reason);
            return;
        }
        let Some(segment) = self.pick_segment() else {
            self.finish_route();
            return;
        };
        debug!(target = %segment.target.id, from_x = segment.from.x, from_y = segment.from.y, "segment planned");
        self.segment = Some(segment);
        self.transition(traversal_state(verdict));
        self.drive(sdk, verdict, obstacle, now);
    }

    fn tick_traversing(
        &mut self,
        sdk: &mut dyn MotionSdk,
        verdict: SafetyVerdict,
        obstacle: ObstacleVerdict,
        now: DateTime<Utc>,
    ) {
        if let SafetyVerdict::Halt(reason) = verdict {
            match (reason, obstacle) {
                (
                    HaltReason::Obstacle,
                    ObstacleVerdict::Stop(StopCause::Proximity {
                        distance_m,
                        bearing_rad,
                    }),
                ) => {
                    info!(distance_m, bearing_rad, "obstacle in path; avoiding");
                    self.executor.cancel(sdk);
                    self.begin_avoiding(bearing_rad);
                }
                _ => self.halt(sdk, reason),
            }
            return;
        }
        self.transition(traversal_state(verdict));
        self.drive(sdk, verdict, obstacle, now);
    }

    fn tick_avoiding(
        &mut self,
        sdk: &mut dyn MotionSdk,
        verdict: SafetyVerdict,
        obstacle: ObstacleVerdict,
        now: DateTime<Utc>,
    ) {
        if let SafetyVerdict::Halt(reason) = verdict {
            if let (
                HaltReason::Obstacle,
                ObstacleVerdict::Stop(StopCause::Proximity { bearing_rad, .. }),
            ) = (reason, obstacle)
            {
                let blocked = self.blocked.get_or_insert(Blocked {
                    bearing_rad,
                    ticks: 0,
                });
                blocked.bearing_rad = bearing_rad;
                blocked.ticks += 1;
                if blocked.ticks > self.config.max_blocked_ticks {
                    warn!(ticks = blocked.ticks, "path stayed blocked");
                    self.halt(sdk, HaltReason::Obstacle);
                }
            } else {
                self.halt(sdk, reason);
            }
            return;
        }

        let bearing = self.blocked.map_or(0.0, |b| b.bearing_rad);
        let Some(route) = self.route.as_ref() else {
            self.halt(sdk, HaltReason::Obstacle);
            return;
        };
        let revised = match self
            .planner
            .replan(route, &mut self.cursor, self.last_pose, bearing)
        {
            Ok(revised) => revised,
            Err(e) => {
                warn!(error = %e, "no detour available");
                self.halt(sdk, HaltReason::Obstacle);
                return;
            }
        };

        let detour_id = self
            .cursor
            .current()
            .and_then(|i| revised.get(i))
            .map(|wp| wp.id.clone());
        let target_id = self
            .cursor
            .upcoming()
            .and_then(|i| revised.get(i))
            .map(|wp| wp.id.clone())
            .unwrap_or_default();
        self.report(EventPayload::RouteReplanned {
            route_id: revised.id(),
            detour_waypoint: detour_id,
        });
        let segment = self
            .cursor
            .current()
            .and_then(|i| self.planner.segment_to(&revised, i, self.last_pose));
        self.route = Some(revised);

        if self.retry_guard.record(&target_id) {
            warn!(target = %target_id, detours = self.retry_guard.streak(), "detour limit reached");
            self.halt(sdk, HaltReason::Obstacle);
            return;
        }
        self.blocked = None;
        self.segment = segment;
        self.transition(traversal_state(verdict));
        self.drive(sdk, verdict, obstacle, now);
    }

    /// Step the executor on the current segment and react to its outcome.
    fn drive(
        &mut self,
        sdk: &mut dyn MotionSdk,
        verdict: SafetyVerdict,
        obstacle: ObstacleVerdict,
        now: DateTime<Utc>,
    ) {
        let Some(segment) = self.segment.clone() else {
            return;
        };
        let cap = segment.max_speed * self.monitor.speed_factor(verdict, obstacle);
        match self.executor.execute(sdk, &segment, cap, now) {
            ExecutionStatus::Pending => {}
            ExecutionStatus::Completed => self.on_segment_completed(sdk, &segment),
            ExecutionStatus::Failed(reason) => self.on_motion_failed(sdk, reason, &segment),
        }
    }

    fn on_segment_completed(&mut self, sdk: &mut dyn MotionSdk, segment: &Segment) {
        self.retry_count = 0;
        self.report(EventPayload::SegmentCompleted {
            route_id: segment.route_id,
            target_index: segment.target_index,
            waypoint_id: segment.target.id.clone(),
        });

        if segment.target.detour {
            if let Some(route) = self.route.as_ref() {
                match self
                    .planner
                    .discard_detour(route, &mut self.cursor, segment.target_index)
                {
                    Ok(restored) => {
                        self.report(EventPayload::RouteReplanned {
                            route_id: restored.id(),
                            detour_waypoint: None,
                        });
                        self.route = Some(restored);
                    }
                    Err(e) => warn!(error = %e, "could not drop reached detour"),
                }
            }
        } else {
            self.retry_guard.reset();
        }

        let pose = sdk
            .get_telemetry()
            .map(|t| t.pose)
            .unwrap_or(segment.target.pose);
        self.last_pose = pose;
        let Some(route) = self.route.as_ref() else {
            self.finish_route();
            return;
        };
        match self.planner.next_segment(route, &mut self.cursor, pose) {
            NextSegment::Segment(next) => self.segment = Some(next),
            NextSegment::RouteComplete => self.finish_route(),
        }
    }

    fn on_motion_failed(&mut self, sdk: &mut dyn MotionSdk, reason: FailureReason, segment: &Segment) {
        if reason.is_obstacle_related() {
            info!(%reason, "motion blocked; avoiding");
            self.begin_avoiding(0.0);
            return;
        }
        if reason.is_hardware_related() {
            warn!(%reason, "actuator fault during motion");
            self.halt(sdk, HaltReason::Hardware);
            return;
        }
        self.retry_count += 1;
        if self.retry_count > self.config.max_retries {
            warn!(%reason, retries = self.retry_count - 1, "segment retries exhausted");
            self.halt(sdk, HaltReason::Motion);
            return;
        }
        warn!(%reason, attempt = self.retry_count, "retrying segment");
        self.segment = self
            .route
            .as_ref()
            .and_then(|r| self.planner.segment_to(r, segment.target_index, self.last_pose));
    }

    // ── helpers ─────────────────────────────────────────────────────────────

    /// The interrupted segment re-derived from the last pose, or the next
    /// one in traversal order.
    fn pick_segment(&mut self) -> Option<Segment> {
        let route = self.route.as_ref()?;
        if let Some(index) = self.cursor.current() {
            return self.planner.segment_to(route, index, self.last_pose);
        }
        match self.planner.next_segment(route, &mut self.cursor, self.last_pose) {
            NextSegment::Segment(s) => Some(s),
            NextSegment::RouteComplete => None,
        }
    }

    fn begin_avoiding(&mut self, bearing_rad: f32) {
        self.segment = None;
        self.blocked = Some(Blocked {
            bearing_rad,
            ticks: 0,
        });
        self.transition(Lifecycle::Avoiding);
    }

    fn halt(&mut self, sdk: &mut dyn MotionSdk, reason: HaltReason) {
        self.stop_motion(sdk);
        self.segment = None;
        self.blocked = None;
        warn!(%reason, "safety halt");
        self.transition(Lifecycle::Halted);
        self.report(EventPayload::SafetyHalt { reason });
    }

    fn stop_motion(&mut self, sdk: &mut dyn MotionSdk) {
        self.executor.cancel(sdk);
        if let Err(e) = sdk.send_primitive(&MotionPrimitive::Stop) {
            warn!(error = %e, "stop primitive not accepted");
        }
    }

    fn finish_route(&mut self) {
        if let Some(route) = self.route.as_ref() {
            info!(route_id = %route.id(), "route completed");
            self.report(EventPayload::RouteCompleted {
                route_id: route.id(),
            });
        }
        self.clear_route();
        self.transition(Lifecycle::Idle);
    }

    fn install_route(&mut self, route: Route) {
        self.route = Some(route);
        self.cursor = RouteCursor::start();
        self.segment = None;
        self.blocked = None;
        self.retry_count = 0;
        self.retry_guard.reset();
    }

    fn clear_route(&mut self) {
        self.route = None;
        self.cursor = RouteCursor::start();
        self.segment = None;
        self.blocked = None;
        self.retry_count = 0;
    }

    fn note_verdict(&mut self, verdict: SafetyVerdict) {
        if self.last_verdict != Some(verdict) {
            debug!(%verdict, "safety verdict changed");
            self.last_verdict = Some(verdict);
            self.report(EventPayload::VerdictChanged { verdict });
        }
    }

    fn transition(&mut self, to: Lifecycle) {
        let from = self.lifecycle;
        if from == to {
            return;
        }
        self.lifecycle = to;
        info!(%from, %to, "patrol state changed");
        self.report(EventPayload::StateChanged { from, to });
    }

    fn report(&self, payload: EventPayload) {
        self.reporter.report(PatrolEvent::new(SOURCE, payload));
    }
}

fn traversal_state(verdict: SafetyVerdict) -> Lifecycle {
    match verdict {
        SafetyVerdict::Degrade(_) => Lifecycle::Degraded,
        _ => Lifecycle::Moving,
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
