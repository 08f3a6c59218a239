//! [`MotionExecutor`] – drives one [`Segment`] to completion through the
//! motion SDK, one non-blocking step per control tick.
//!
//! A segment decomposes into up to three steps:
//!
//! 1. `Turn` to the leg heading, skipped when already aligned within
//!    `heading_tolerance_rad`;
//! 2. `Walk` to the target waypoint, skipped when the robot already stands
//!    within the waypoint's tolerance;
//! 3. a dwell at the waypoint, timed by the executor against the tick's
//!    `now`.
//!
//! Every call to [`MotionExecutor::execute`] polls the primitive in flight.
//! When it finishes a `PositionUpdate` event is reported and the next
//! primitive is issued straight away. SDK failures are surfaced as
//! [`ExecutionStatus::Failed`]; retrying is the caller's decision.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use patrol_hal::MotionSdk;
use patrol_kernel::{GeofenceRule, PrimitiveGuard, SpeedCapRule};
use patrol_types::{
    Bounds, EventPayload, ExecutionStatus, FailureReason, MotionPrimitive, PatrolEvent, Pose,
    PrimitiveHandle, PrimitiveStatus, Segment, StatusReporter, normalize_angle,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

const SOURCE: &str = "patrol-runtime::motion_executor";

/// Executor parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Headings closer than this to the leg direction skip the turn (rad).
    pub heading_tolerance_rad: f32,
    /// Turn rate requested for alignment turns (rad/s).
    pub angular_speed: f32,
    /// Platform walking limit enforced by the primitive guard (m/s).
    pub max_linear_speed: f32,
    /// Platform turning limit enforced by the primitive guard (rad/s).
    pub max_angular_speed: f32,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            heading_tolerance_rad: 0.1,
            angular_speed: 0.8,
            max_linear_speed: 1.5,
            max_angular_speed: 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Step {
    Turn,
    Walk,
    Dwell,
}

#[derive(Debug)]
enum InFlight {
    Nothing,
    Primitive {
        handle: PrimitiveHandle,
        primitive: MotionPrimitive,
    },
    Dwelling {
        until: DateTime<Utc>,
    },
}

#[derive(Debug)]
struct ActiveSegment {
    segment_id: Uuid,
    steps: Vec<Step>,
    next_step: usize,
    in_flight: InFlight,
}

/// Per-segment primitive sequencer.
pub struct MotionExecutor {
    config: ExecutorConfig,
    guard: PrimitiveGuard,
    reporter: Arc<dyn StatusReporter>,
    active: Option<ActiveSegment>,
    last_reported_pose: Option<Pose>,
}

impl MotionExecutor {
    /// Build an executor whose guard enforces the platform speed limits.
    pub fn new(config: ExecutorConfig, reporter: Arc<dyn StatusReporter>) -> Self {
        let mut guard = PrimitiveGuard::new();
        guard.add_rule(Box::new(SpeedCapRule {
            max_linear: config.max_linear_speed,
            max_angular: config.max_angular_speed,
        }));
        Self {
            config,
            guard,
            reporter,
            active: None,
            last_reported_pose: None,
        }
    }

    /// Additionally reject walks that leave `bounds`.
    pub fn with_geofence(mut self, bounds: Option<Bounds>) -> Self {
        if let Some(bounds) = bounds {
            self.guard.add_rule(Box::new(GeofenceRule { bounds }));
        }
        self
    }

    /// `true` while a segment is being executed.
    pub fn is_busy(&self) -> bool {
        self.active.is_some()
    }

    /// Pose carried by the most recent `PositionUpdate`.
    pub fn last_reported_pose(&self) -> Option<Pose> {
        self.last_reported_pose
    }

    /// Advance `segment` by one step.
    ///
    /// Passing a segment other than the one in progress abandons the old one
    /// (cancelling its primitive) and starts the new one. `speed_cap` (m/s)
    /// bounds the walking speed together with the segment's own limit.
    /// `now` times the dwell.
    pub fn execute(
        &mut self,
        sdk: &mut dyn MotionSdk,
        segment: &Segment,
        speed_cap: f32,
        now: DateTime<Utc>,
    ) -> ExecutionStatus {
        if self.active.as_ref().is_none_or(|a| a.segment_id != segment.id) {
            self.cancel(sdk);
            self.active = Some(self.plan_steps(segment));
        }
        let speed = segment.max_speed.min(speed_cap);

        let status = self.step(sdk, segment, speed, now);
        if !matches!(status, ExecutionStatus::Pending) {
            self.active = None;
        }
        status
    }

    /// Best-effort abort of the primitive in flight. The SDK may still
    /// finish a short motion it already committed to.
    pub fn cancel(&mut self, sdk: &mut dyn MotionSdk) {
        if let Some(active) = self.active.take() {
            if let InFlight::Primitive { handle, primitive } = active.in_flight {
                sdk.cancel(handle);
                debug!(handle = handle.0, primitive = primitive.name(), "primitive cancelled");
            }
        }
    }

    fn plan_steps(&self, segment: &Segment) -> ActiveSegment {
        let mut steps = Vec::with_capacity(3);
        let needs_walk = segment.distance_m > segment.target.tolerance_m;
        if needs_walk {
            let misalignment = normalize_angle(segment.heading_rad - segment.from.heading_rad);
            if misalignment.abs() > self.config.heading_tolerance_rad {
                steps.push(Step::Turn);
            }
            steps.push(Step::Walk);
        }
        if segment.target.dwell_s.is_some_and(|d| d > 0.0) {
            steps.push(Step::Dwell);
        }
        debug!(segment = %segment.id, target = %segment.target.id, ?steps, "segment decomposed");
        ActiveSegment {
            segment_id: segment.id,
            steps,
            next_step: 0,
            in_flight: InFlight::Nothing,
        }
    }

    fn step(
        &mut self,
        sdk: &mut dyn MotionSdk,
        segment: &Segment,
        speed: f32,
        now: DateTime<Utc>,
    ) -> ExecutionStatus {
        let Some(active) = self.active.as_mut() else {
            return ExecutionStatus::Completed;
        };

        match std::mem::replace(&mut active.in_flight, InFlight::Nothing) {
            InFlight::Nothing => {}
            InFlight::Dwelling { until } => {
                if now < until {
                    active.in_flight = InFlight::Dwelling { until };
                    return ExecutionStatus::Pending;
                }
            }
            InFlight::Primitive { handle, primitive } => match sdk.poll(handle) {
                PrimitiveStatus::Pending => {
                    active.in_flight = InFlight::Primitive {
                        handle,
                        primitive: primitive.clone(),
                    };
                    return self.enforce_speed_cap(sdk, segment, handle, &primitive, speed);
                }
                PrimitiveStatus::Failed(reason) => {
                    warn!(primitive = primitive.name(), %reason, "primitive failed");
                    return ExecutionStatus::Failed(reason);
                }
                PrimitiveStatus::Done => self.report_position(sdk, &primitive, segment),
            },
        }

        self.issue_next(sdk, segment, speed, now)
    }

    /// Start the next step of the active segment, or report completion.
    fn issue_next(
        &mut self,
        sdk: &mut dyn MotionSdk,
        segment: &Segment,
        speed: f32,
        now: DateTime<Utc>,
    ) -> ExecutionStatus {
        let Some(active) = self.active.as_mut() else {
            return ExecutionStatus::Completed;
        };
        let Some(&step) = active.steps.get(active.next_step) else {
            info!(segment = %segment.id, target = %segment.target.id, "segment completed");
            return ExecutionStatus::Completed;
        };
        active.next_step += 1;

        let primitive = match step {
            Step::Dwell => {
                let secs = segment.target.dwell_s.unwrap_or(0.0);
                let Some(until) = dwell_deadline(now, secs) else {
                    warn!(target = %segment.target.id, secs, "dwell out of range");
                    return ExecutionStatus::Failed(FailureReason::Rejected(format!(
                        "dwell of {secs} s at '{}' is out of range",
                        segment.target.id
                    )));
                };
                active.in_flight = InFlight::Dwelling { until };
                debug!(target = %segment.target.id, secs, "dwelling");
                return ExecutionStatus::Pending;
            }
            Step::Turn => MotionPrimitive::Turn {
                target_heading_rad: segment.heading_rad,
                angular_speed: self.config.angular_speed,
            },
            Step::Walk => MotionPrimitive::Walk {
                target_x: segment.target.pose.x,
                target_y: segment.target.pose.y,
                speed,
            },
        };

        match self.dispatch(sdk, &primitive) {
            Ok(handle) => {
                if let Some(active) = self.active.as_mut() {
                    active.in_flight = InFlight::Primitive { handle, primitive };
                }
                ExecutionStatus::Pending
            }
            Err(reason) => ExecutionStatus::Failed(reason),
        }
    }

    /// A running walk faster than the current cap is cancelled and
    /// re-issued at the cap.
    fn enforce_speed_cap(
        &mut self,
        sdk: &mut dyn MotionSdk,
        segment: &Segment,
        handle: PrimitiveHandle,
        primitive: &MotionPrimitive,
        cap: f32,
    ) -> ExecutionStatus {
        let MotionPrimitive::Walk { speed, .. } = *primitive else {
            return ExecutionStatus::Pending;
        };
        if speed <= cap + f32::EPSILON {
            return ExecutionStatus::Pending;
        }
        sdk.cancel(handle);
        info!(from = speed, to = cap, "speed cap lowered; re-issuing walk");
        let slower = MotionPrimitive::Walk {
            target_x: segment.target.pose.x,
            target_y: segment.target.pose.y,
            speed: cap,
        };
        match self.dispatch(sdk, &slower) {
            Ok(handle) => {
                if let Some(active) = self.active.as_mut() {
                    active.in_flight = InFlight::Primitive {
                        handle,
                        primitive: slower,
                    };
                }
                ExecutionStatus::Pending
            }
            Err(reason) => ExecutionStatus::Failed(reason),
        }
    }

    fn dispatch(
        &self,
        sdk: &mut dyn MotionSdk,
        primitive: &MotionPrimitive,
    ) -> Result<PrimitiveHandle, FailureReason> {
        self.guard.verify(primitive)?;
        let handle = sdk
            .send_primitive(primitive)
            .map_err(|e| FailureReason::Rejected(e.to_string()))?;
        debug!(handle = handle.0, primitive = primitive.name(), "primitive issued");
        Ok(handle)
    }

    fn report_position(&mut self, sdk: &mut dyn MotionSdk, primitive: &MotionPrimitive, segment: &Segment) {
        let pose = match sdk.get_telemetry() {
            Ok(t) => t.pose,
            Err(e) => {
                debug!(error = %e, "telemetry unavailable; reporting commanded pose");
                commanded_pose(primitive, segment)
            }
        };
        self.last_reported_pose = Some(pose);
        self.reporter.report(PatrolEvent::new(
            SOURCE,
            EventPayload::PositionUpdate {
                pose,
                primitive: primitive.name().to_string(),
            },
        ));
    }
}

/// `now + secs`, or `None` when `secs` is not a representable duration.
fn dwell_deadline(now: DateTime<Utc>, secs: f32) -> Option<DateTime<Utc>> {
    let pause = std::time::Duration::try_from_secs_f32(secs).ok()?;
    now.checked_add_signed(chrono::Duration::from_std(pause).ok()?)
}

fn commanded_pose(primitive: &MotionPrimitive, segment: &Segment) -> Pose {
    match *primitive {
        MotionPrimitive::Turn {
            target_heading_rad, ..
        } => Pose {
            heading_rad: target_heading_rad,
            ..segment.from
        },
        MotionPrimitive::Walk {
            target_x, target_y, ..
        } => Pose::new(target_x, target_y, segment.heading_rad),
        MotionPrimitive::Stop => segment.from,
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use chrono::Utc;

    use patrol_hal::SimMotionSdk;
    use patrol_types::{EventKind, Waypoint};

    #[derive(Default)]
    struct Recorder(Mutex<Vec<PatrolEvent>>);

    impl StatusReporter for Recorder {
        fn report(&self, event: PatrolEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    impl Recorder {
        fn count(&self, kind: EventKind) -> usize {
            self.0.lock().unwrap().iter().filter(|e| e.kind == kind).count()
        }
    }

    fn segment(from: Pose, x: f32, y: f32) -> Segment {
        let target = Waypoint::new("wp-1", Pose::new(x, y, 0.0), 0.2);
        Segment {
            id: Uuid::new_v4(),
            route_id: Uuid::new_v4(),
            target_index: 1,
            heading_rad: from.bearing_to(&target.pose),
            distance_m: from.distance_to(&target.pose),
            from,
            target,
            max_speed: 0.6,
        }
    }

    fn executor() -> (MotionExecutor, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        (
            MotionExecutor::new(ExecutorConfig::default(), recorder.clone()),
            recorder,
        )
    }

    fn run(exec: &mut MotionExecutor, sdk: &mut SimMotionSdk, seg: &Segment) -> ExecutionStatus {
        for _ in 0..20 {
            match exec.execute(sdk, seg, 1.0, Utc::now()) {
                ExecutionStatus::Pending => continue,
                done => return done,
            }
        }
        panic!("segment did not settle");
    }

    #[test]
    fn aligned_segment_skips_turn() {
        let (mut exec, recorder) = executor();
        let mut sdk = SimMotionSdk::new();
        let seg = segment(Pose::default(), 3.0, 0.0);
        assert_eq!(run(&mut exec, &mut sdk, &seg), ExecutionStatus::Completed);
        let sent = sdk.control().sent_primitives();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].name(), "walk");
        assert_eq!(recorder.count(EventKind::PositionUpdate), 1);
        assert!(!exec.is_busy());
    }

    #[test]
    fn misaligned_segment_turns_then_walks() {
        let (mut exec, recorder) = executor();
        let mut sdk = SimMotionSdk::new();
        let seg = segment(Pose::default(), 0.0, 3.0);
        assert_eq!(run(&mut exec, &mut sdk, &seg), ExecutionStatus::Completed);
        let names: Vec<_> = sdk.control().sent_primitives().iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["turn", "walk"]);
        assert_eq!(recorder.count(EventKind::PositionUpdate), 2);
        let pose = exec.last_reported_pose().unwrap();
        assert_eq!((pose.x, pose.y), (0.0, 3.0));
    }

    #[test]
    fn target_within_tolerance_completes_without_motion() {
        let (mut exec, _) = executor();
        let mut sdk = SimMotionSdk::new();
        let seg = segment(Pose::default(), 0.1, 0.0);
        assert_eq!(exec.execute(&mut sdk, &seg, 1.0, Utc::now()), ExecutionStatus::Completed);
        assert!(sdk.control().sent_primitives().is_empty());
    }

    #[test]
    fn dwell_holds_segment_open() {
        let (mut exec, _) = executor();
        let mut sdk = SimMotionSdk::new();
        let mut seg = segment(Pose::default(), 2.0, 0.0);
        seg.target = seg.target.clone().with_dwell(2.0);
        let t0 = Utc::now();
        assert_eq!(exec.execute(&mut sdk, &seg, 1.0, t0), ExecutionStatus::Pending);
        // Walk finishes at t0, dwell runs until t0 + 2 s.
        assert_eq!(exec.execute(&mut sdk, &seg, 1.0, t0), ExecutionStatus::Pending);
        let later = t0 + chrono::Duration::milliseconds(1_500);
        assert_eq!(exec.execute(&mut sdk, &seg, 1.0, later), ExecutionStatus::Pending);
        let done = t0 + chrono::Duration::seconds(2);
        assert_eq!(exec.execute(&mut sdk, &seg, 1.0, done), ExecutionStatus::Completed);
    }

    #[test]
    fn unrepresentable_dwell_fails_instead_of_panicking() {
        for dwell in [1e20, f32::INFINITY] {
            let (mut exec, _) = executor();
            let mut sdk = SimMotionSdk::new();
            let mut seg = segment(Pose::default(), 2.0, 0.0);
            seg.target = seg.target.clone().with_dwell(dwell);
            assert!(matches!(
                run(&mut exec, &mut sdk, &seg),
                ExecutionStatus::Failed(FailureReason::Rejected(msg)) if msg.contains("dwell")
            ));
            assert!(!exec.is_busy());
        }
    }

    #[test]
    fn sdk_failure_is_reported_without_retry() {
        let (mut exec, _) = executor();
        let mut sdk = SimMotionSdk::new();
        sdk.control().fail_next(FailureReason::Timeout);
        let seg = segment(Pose::default(), 2.0, 0.0);
        assert_eq!(
            run(&mut exec, &mut sdk, &seg),
            ExecutionStatus::Failed(FailureReason::Timeout)
        );
        assert_eq!(sdk.control().sent_primitives().len(), 1);
    }

    #[test]
    fn walk_speed_respects_cap_and_segment_limit() {
        let (mut exec, _) = executor();
        let mut sdk = SimMotionSdk::new();
        let seg = segment(Pose::default(), 2.0, 0.0);
        exec.execute(&mut sdk, &seg, 0.25, Utc::now());
        let sent = sdk.control().sent_primitives();
        assert!(matches!(sent[0], MotionPrimitive::Walk { speed, .. } if speed == 0.25));

        let (mut exec, _) = executor();
        let mut sdk = SimMotionSdk::new();
        exec.execute(&mut sdk, &seg, 5.0, Utc::now());
        let sent = sdk.control().sent_primitives();
        assert!(matches!(sent[0], MotionPrimitive::Walk { speed, .. } if speed == 0.6));
    }

    #[test]
    fn lowered_cap_reissues_running_walk() {
        let (mut exec, _) = executor();
        let mut sdk = SimMotionSdk::new().with_polls_per_primitive(4);
        let seg = segment(Pose::default(), 2.0, 0.0);
        assert_eq!(exec.execute(&mut sdk, &seg, 1.0, Utc::now()), ExecutionStatus::Pending);
        assert_eq!(exec.execute(&mut sdk, &seg, 0.3, Utc::now()), ExecutionStatus::Pending);
        let sent = sdk.control().sent_primitives();
        assert_eq!(sent.len(), 2);
        assert!(matches!(sent[1], MotionPrimitive::Walk { speed, .. } if speed == 0.3));
        assert_eq!(sdk.control().in_flight(), 1);
    }

    #[test]
    fn guard_rejects_walk_outside_geofence() {
        let recorder = Arc::new(Recorder::default());
        let mut exec = MotionExecutor::new(ExecutorConfig::default(), recorder)
            .with_geofence(Some(Bounds::new(0.0, 0.0, 1.0, 1.0)));
        let mut sdk = SimMotionSdk::new();
        let seg = segment(Pose::default(), 2.0, 0.0);
        assert!(matches!(
            exec.execute(&mut sdk, &seg, 1.0, Utc::now()),
            ExecutionStatus::Failed(FailureReason::Rejected(_))
        ));
        assert!(sdk.control().sent_primitives().is_empty());
    }

    #[test]
    fn cancel_aborts_in_flight_primitive() {
        let (mut exec, _) = executor();
        let mut sdk = SimMotionSdk::new().with_polls_per_primitive(5);
        let seg = segment(Pose::default(), 2.0, 0.0);
        exec.execute(&mut sdk, &seg, 1.0, Utc::now());
        assert_eq!(sdk.control().in_flight(), 1);
        exec.cancel(&mut sdk);
        assert_eq!(sdk.control().in_flight(), 0);
        assert!(!exec.is_busy());
    }

    #[test]
    fn new_segment_replaces_old_one() {
        let (mut exec, _) = executor();
        let mut sdk = SimMotionSdk::new().with_polls_per_primitive(5);
        let first = segment(Pose::default(), 2.0, 0.0);
        let second = segment(Pose::default(), 3.0, 0.0);
        exec.execute(&mut sdk, &first, 1.0, Utc::now());
        exec.execute(&mut sdk, &second, 1.0, Utc::now());
        assert_eq!(sdk.control().in_flight(), 1);
        assert_eq!(sdk.control().sent_primitives().len(), 2);
    }
}
