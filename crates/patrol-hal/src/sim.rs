//! In-process simulation of the robot for CI/CD testing without hardware.
//!
//! [`SimMotionSdk`] implements [`MotionSdk`] over a shared kinematic state:
//! primitives take a configurable number of polls to finish, `Walk` and
//! `Turn` move the simulated pose, and every issued primitive drains a little
//! battery. [`SimObstacleSource`] replays a scripted obstacle scene.
//!
//! Both simulators hand out cloneable control handles so tests (and the CLI)
//! can inject faults, drop the battery, or place obstacles while the control
//! loop owns the simulator itself.
//!
//! # Example
//!
//! ```rust
//! use patrol_hal::motion_sdk::MotionSdk;
//! use patrol_hal::sim::SimMotionSdk;
//! use patrol_types::{MotionPrimitive, PrimitiveStatus};
//!
//! let mut sdk = SimMotionSdk::new().with_battery(90.0);
//! let handle = sdk
//!     .send_primitive(&MotionPrimitive::Walk { target_x: 1.0, target_y: 0.0, speed: 0.5 })
//!     .expect("sim accepts walk");
//! assert_eq!(sdk.poll(handle), PrimitiveStatus::Done);
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use patrol_types::{
    FailureReason, HardwareFault, MotionPrimitive, ObstacleReading, ObstacleScan, PatrolError,
    Pose, PrimitiveHandle, PrimitiveStatus, Telemetry,
};
use tracing::debug;

use crate::motion_sdk::MotionSdk;
use crate::sensor::ObstacleSource;

// ────────────────────────────────────────────────────────────────────────────
// Motion SDK
// ────────────────────────────────────────────────────────────────────────────

struct SimJob {
    primitive: MotionPrimitive,
    remaining_polls: u32,
    outcome: Option<FailureReason>,
}

struct SimState {
    pose: Pose,
    battery_percent: f32,
    drain_per_primitive: f32,
    faults: Vec<HardwareFault>,
    telemetry_offline: bool,
    polls_per_primitive: u32,
    next_handle: u64,
    jobs: HashMap<u64, SimJob>,
    scripted_failures: VecDeque<FailureReason>,
    sent: Vec<MotionPrimitive>,
}

impl SimState {
    fn apply(&mut self, primitive: &MotionPrimitive) {
        match *primitive {
            MotionPrimitive::Walk {
                target_x, target_y, ..
            } => {
                let target = Pose::new(target_x, target_y, self.pose.heading_rad);
                if !self.pose.same_position(&target) {
                    self.pose.heading_rad = self.pose.bearing_to(&target);
                }
                self.pose.x = target_x;
                self.pose.y = target_y;
            }
            MotionPrimitive::Turn {
                target_heading_rad, ..
            } => {
                self.pose.heading_rad = target_heading_rad;
            }
            MotionPrimitive::Stop => {}
        }
    }
}

fn lock(state: &Mutex<SimState>) -> MutexGuard<'_, SimState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Simulated motion SDK. Always accepts commands unless a failure was
/// scripted with [`SimControl::fail_next`] or the telemetry link was taken
/// offline.
pub struct SimMotionSdk {
    state: Arc<Mutex<SimState>>,
}

impl SimMotionSdk {
    /// Robot at the origin facing +x with a full battery; primitives finish
    /// on their first poll.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                pose: Pose::default(),
                battery_percent: 100.0,
                drain_per_primitive: 0.0,
                faults: Vec::new(),
                telemetry_offline: false,
                polls_per_primitive: 1,
                next_handle: 1,
                jobs: HashMap::new(),
                scripted_failures: VecDeque::new(),
                sent: Vec::new(),
            })),
        }
    }

    pub fn with_pose(self, pose: Pose) -> Self {
        lock(&self.state).pose = pose;
        self
    }

    pub fn with_battery(self, percent: f32) -> Self {
        lock(&self.state).battery_percent = percent;
        self
    }

    /// Battery percentage consumed by each `Walk` or `Turn`.
    pub fn with_battery_drain(self, percent_per_primitive: f32) -> Self {
        lock(&self.state).drain_per_primitive = percent_per_primitive;
        self
    }

    /// Number of polls a primitive reports `Pending` before settling, plus
    /// one. Clamped to at least 1.
    pub fn with_polls_per_primitive(self, polls: u32) -> Self {
        lock(&self.state).polls_per_primitive = polls.max(1);
        self
    }

    /// Handle for steering the simulation from outside the control loop.
    pub fn control(&self) -> SimControl {
        SimControl {
            state: Arc::clone(&self.state),
        }
    }
}

impl Default for SimMotionSdk {
    fn default() -> Self {
        Self::new()
    }
}

impl MotionSdk for SimMotionSdk {
    fn send_primitive(&mut self, primitive: &MotionPrimitive) -> Result<PrimitiveHandle, PatrolError> {
        let mut state = lock(&self.state);
        let handle = state.next_handle;
        state.next_handle += 1;
        state.sent.push(primitive.clone());

        let outcome = match primitive {
            MotionPrimitive::Stop => {
                state.jobs.clear();
                None
            }
            _ => {
                state.battery_percent = (state.battery_percent - state.drain_per_primitive).max(0.0);
                let fault = state
                    .faults
                    .first()
                    .map(|f| format!("{}: {}", f.component, f.message));
                match fault {
                    Some(detail) => Some(FailureReason::ActuatorFault(detail)),
                    None => state.scripted_failures.pop_front(),
                }
            }
        };

        let remaining_polls = state.polls_per_primitive;
        state.jobs.insert(
            handle,
            SimJob {
                primitive: primitive.clone(),
                remaining_polls,
                outcome,
            },
        );
        debug!(handle, primitive = primitive.name(), "sim primitive accepted");
        Ok(PrimitiveHandle(handle))
    }

    fn poll(&mut self, handle: PrimitiveHandle) -> PrimitiveStatus {
        let mut state = lock(&self.state);
        let Some(job) = state.jobs.get_mut(&handle.0) else {
            return PrimitiveStatus::Failed(FailureReason::Cancelled);
        };
        job.remaining_polls = job.remaining_polls.saturating_sub(1);
        if job.remaining_polls > 0 {
            return PrimitiveStatus::Pending;
        }
        let Some(job) = state.jobs.remove(&handle.0) else {
            return PrimitiveStatus::Failed(FailureReason::Cancelled);
        };
        match job.outcome {
            Some(reason) => PrimitiveStatus::Failed(reason),
            None => {
                state.apply(&job.primitive);
                PrimitiveStatus::Done
            }
        }
    }

    fn cancel(&mut self, handle: PrimitiveHandle) {
        if lock(&self.state).jobs.remove(&handle.0).is_some() {
            debug!(handle = handle.0, "sim primitive cancelled");
        }
    }

    fn get_telemetry(&mut self) -> Result<Telemetry, PatrolError> {
        let state = lock(&self.state);
        if state.telemetry_offline {
            return Err(PatrolError::Sdk("telemetry unavailable".into()));
        }
        Ok(Telemetry {
            pose: state.pose,
            battery_percent: state.battery_percent,
            faults: state.faults.clone(),
        })
    }
}

/// Cloneable handle onto a [`SimMotionSdk`]'s state.
#[derive(Clone)]
pub struct SimControl {
    state: Arc<Mutex<SimState>>,
}

impl SimControl {
    pub fn set_battery(&self, percent: f32) {
        lock(&self.state).battery_percent = percent;
    }

    pub fn battery(&self) -> f32 {
        lock(&self.state).battery_percent
    }

    /// Raise a hardware fault. While any fault is active, new `Walk` and
    /// `Turn` primitives fail with [`FailureReason::ActuatorFault`].
    pub fn inject_fault(&self, component: impl Into<String>, code: u32, message: impl Into<String>) {
        lock(&self.state).faults.push(HardwareFault {
            component: component.into(),
            code,
            message: message.into(),
        });
    }

    pub fn clear_faults(&self) {
        lock(&self.state).faults.clear();
    }

    /// Make the next issued `Walk` or `Turn` fail with `reason`. Calls queue.
    pub fn fail_next(&self, reason: FailureReason) {
        lock(&self.state).scripted_failures.push_back(reason);
    }

    /// Make `get_telemetry` fail until switched back.
    pub fn set_telemetry_offline(&self, offline: bool) {
        lock(&self.state).telemetry_offline = offline;
    }

    pub fn pose(&self) -> Pose {
        lock(&self.state).pose
    }

    pub fn set_pose(&self, pose: Pose) {
        lock(&self.state).pose = pose;
    }

    /// Every primitive sent so far, in order.
    pub fn sent_primitives(&self) -> Vec<MotionPrimitive> {
        lock(&self.state).sent.clone()
    }

    /// Number of primitives still in flight.
    pub fn in_flight(&self) -> usize {
        lock(&self.state).jobs.len()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Obstacle source
// ────────────────────────────────────────────────────────────────────────────

/// One obstacle in robot-relative polar coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimObstacle {
    pub distance_m: f32,
    pub bearing_rad: f32,
    pub confidence: f32,
}

struct SceneState {
    obstacles: Vec<SimObstacle>,
    live: bool,
    last: Option<ObstacleScan>,
}

fn lock_scene(scene: &Mutex<SceneState>) -> MutexGuard<'_, SceneState> {
    scene.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Simulated sensor-fusion output.
///
/// While live, every read produces a fresh scan of the current scene. Once
/// the feed is cut with [`SimSceneControl::set_live`], reads keep returning
/// the last scan so its timestamp ages.
pub struct SimObstacleSource {
    scene: Arc<Mutex<SceneState>>,
}

impl SimObstacleSource {
    /// Live feed with an empty scene.
    pub fn new() -> Self {
        Self {
            scene: Arc::new(Mutex::new(SceneState {
                obstacles: Vec::new(),
                live: true,
                last: None,
            })),
        }
    }

    pub fn with_obstacle(self, distance_m: f32, bearing_rad: f32) -> Self {
        lock_scene(&self.scene).obstacles.push(SimObstacle {
            distance_m,
            bearing_rad,
            confidence: 1.0,
        });
        self
    }

    pub fn control(&self) -> SimSceneControl {
        SimSceneControl {
            scene: Arc::clone(&self.scene),
        }
    }
}

impl Default for SimObstacleSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ObstacleSource for SimObstacleSource {
    fn get_obstacle_readings(&mut self) -> Option<ObstacleScan> {
        let mut scene = lock_scene(&self.scene);
        if !scene.live {
            return scene.last.clone();
        }
        let now = Utc::now();
        let scan = ObstacleScan {
            received_at: now,
            readings: scene
                .obstacles
                .iter()
                .map(|o| ObstacleReading {
                    distance_m: o.distance_m,
                    bearing_rad: o.bearing_rad,
                    confidence: o.confidence,
                    timestamp: now,
                })
                .collect(),
        };
        scene.last = Some(scan.clone());
        Some(scan)
    }
}

/// Cloneable handle onto a [`SimObstacleSource`]'s scene.
#[derive(Clone)]
pub struct SimSceneControl {
    scene: Arc<Mutex<SceneState>>,
}

impl SimSceneControl {
    pub fn place(&self, distance_m: f32, bearing_rad: f32, confidence: f32) {
        lock_scene(&self.scene).obstacles.push(SimObstacle {
            distance_m,
            bearing_rad,
            confidence,
        });
    }

    pub fn clear(&self) {
        lock_scene(&self.scene).obstacles.clear();
    }

    /// Cut (`false`) or restore (`true`) the sensor feed.
    pub fn set_live(&self, live: bool) {
        lock_scene(&self.scene).live = live;
    }

    pub fn obstacles(&self) -> Vec<SimObstacle> {
        lock_scene(&self.scene).obstacles.clone()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
