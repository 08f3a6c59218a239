//! Periodic control loop around a [`PatrolMachine`].
//!
//! [`PatrolLoop::run`] owns the machine, the motion SDK, the obstacle source
//! and the link monitor, and ticks the machine on a fixed period. Operator
//! commands arrive through a cloneable [`PatrolHandle`]; they are queued on a
//! channel and applied only at tick boundaries, so the machine never sees a
//! command in the middle of a cycle.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use patrol_hal::{SimMotionSdk, SimObstacleSource};
//! use patrol_kernel::LinkMonitor;
//! use patrol_middleware::EventBus;
//! use patrol_runtime::patrol_loop::{patrol_loop, LoopConfig};
//! use patrol_runtime::{PatrolMachine, PatrolSettings};
//!
//! # async fn demo() {
//! let bus = EventBus::default();
//! let machine = PatrolMachine::new(PatrolSettings::default(), Arc::new(bus.clone()));
//! let (handle, control) = patrol_loop(
//!     machine,
//!     Box::new(SimMotionSdk::new()),
//!     Box::new(SimObstacleSource::new()),
//!     LinkMonitor::new(2_000),
//!     LoopConfig::default(),
//! );
//! tokio::spawn(control.run());
//! let state = handle.status().await;
//! # }
//! ```

use std::time::{Duration, Instant};

use chrono::Utc;
use patrol_hal::{MotionSdk, ObstacleSource};
use patrol_kernel::LinkMonitor;
use patrol_types::{PatrolError, PatrolState, RouteSpec};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::patrol_machine::PatrolMachine;

/// Timing of the control loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    /// Period between two machine ticks (milliseconds).
    pub tick_period_ms: u64,
    /// Operator commands buffered between ticks before senders wait.
    pub command_buffer: usize,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            tick_period_ms: 100,
            command_buffer: 32,
        }
    }
}

type Reply<T> = oneshot::Sender<Result<T, PatrolError>>;

enum Command {
    Start { spec: RouteSpec, reply: Reply<Uuid> },
    Stop { reply: Reply<()> },
    Resume { reply: Reply<()> },
    ChangeRoute { spec: RouteSpec, reply: Reply<Uuid> },
    Status { reply: Reply<PatrolState> },
    Shutdown { reply: Reply<()> },
}

// ─────────────────────────────────────────────────────────────────────────────
// PatrolHandle
// ─────────────────────────────────────────────────────────────────────────────

/// Operator-side handle onto a running [`PatrolLoop`].
///
/// Every command also counts as a link heartbeat.
#[derive(Clone)]
pub struct PatrolHandle {
    commands: mpsc::Sender<Command>,
    link: LinkMonitor,
}

impl PatrolHandle {
    pub async fn start(&self, spec: RouteSpec) -> Result<Uuid, PatrolError> {
        self.request(|reply| Command::Start { spec, reply }).await
    }

    pub async fn stop(&self) -> Result<(), PatrolError> {
        self.request(|reply| Command::Stop { reply }).await
    }

    pub async fn resume(&self) -> Result<(), PatrolError> {
        self.request(|reply| Command::Resume { reply }).await
    }

    pub async fn change_route(&self, spec: RouteSpec) -> Result<Uuid, PatrolError> {
        self.request(|reply| Command::ChangeRoute { spec, reply })
            .await
    }

    pub async fn status(&self) -> Result<PatrolState, PatrolError> {
        self.request(|reply| Command::Status { reply }).await
    }

    /// Stop the patrol and end the loop.
    pub async fn shutdown(&self) -> Result<(), PatrolError> {
        self.request(|reply| Command::Shutdown { reply }).await
    }

    /// Record operator-link traffic without issuing a command.
    pub fn heartbeat(&self) {
        self.link.beat();
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, PatrolError> {
        self.link.beat();
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| PatrolError::ControlLoopClosed)?;
        response.await.map_err(|_| PatrolError::ControlLoopClosed)?
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// PatrolLoop
// ─────────────────────────────────────────────────────────────────────────────

/// The control side. Drive it with [`PatrolLoop::run`].
pub struct PatrolLoop {
    machine: PatrolMachine,
    sdk: Box<dyn MotionSdk>,
    sensors: Box<dyn ObstacleSource>,
    link: LinkMonitor,
    config: LoopConfig,
    commands: mpsc::Receiver<Command>,
}

/// Wire a machine and its collaborators into a loop plus its handle.
pub fn patrol_loop(
    machine: PatrolMachine,
    sdk: Box<dyn MotionSdk>,
    sensors: Box<dyn ObstacleSource>,
    link: LinkMonitor,
    config: LoopConfig,
) -> (PatrolHandle, PatrolLoop) {
    let (tx, rx) = mpsc::channel(config.command_buffer.max(1));
    let handle = PatrolHandle {
        commands: tx,
        link: link.clone(),
    };
    let control = PatrolLoop {
        machine,
        sdk,
        sensors,
        link,
        config,
        commands: rx,
    };
    (handle, control)
}

impl PatrolLoop {
    /// Tick until a shutdown command arrives or every handle is dropped.
    ///
    /// A tick that overruns its period is logged and the missed ticks are
    /// skipped rather than bunched up.
    pub async fn run(mut self) {
        let period = Duration::from_millis(self.config.tick_period_ms.max(1));
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(period_ms = period.as_millis() as u64, "patrol control loop started");

        loop {
            interval.tick().await;
            if !self.drain_commands() {
                break;
            }

            let now = Utc::now();
            let link = self.link.status(now);
            let started = Instant::now();
            self.machine
                .tick(self.sdk.as_mut(), self.sensors.as_mut(), link, now);
            let elapsed = started.elapsed();
            if elapsed > period {
                warn!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    period_ms = period.as_millis() as u64,
                    "control tick overran its period"
                );
            }
        }

        self.machine.stop(self.sdk.as_mut());
        info!("patrol control loop stopped");
    }

    /// Apply every queued command. Returns `false` when the loop should end.
    fn drain_commands(&mut self) -> bool {
        loop {
            match self.commands.try_recv() {
                Ok(Command::Shutdown { reply }) => {
                    debug!("shutdown requested");
                    let _ = reply.send(Ok(()));
                    return false;
                }
                Ok(command) => self.apply(command),
                Err(mpsc::error::TryRecvError::Empty) => return true,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    debug!("all patrol handles dropped");
                    return false;
                }
            }
        }
    }

    fn apply(&mut self, command: Command) {
        // A dropped reply receiver only means the caller stopped waiting.
        match command {
            Command::Start { spec, reply } => {
                info!(shape = spec.shape_name(), "start requested");
                let _ = reply.send(self.machine.start(&spec, self.sdk.as_mut()));
            }
            Command::Stop { reply } => {
                self.machine.stop(self.sdk.as_mut());
                let _ = reply.send(Ok(()));
            }
            Command::Resume { reply } => {
                let _ = reply.send(self.machine.resume());
            }
            Command::ChangeRoute { spec, reply } => {
                info!(shape = spec.shape_name(), "route change requested");
                let _ = reply.send(self.machine.change_route(&spec, self.sdk.as_mut()));
            }
            Command::Status { reply } => {
                let _ = reply.send(Ok(self.machine.snapshot()));
            }
            Command::Shutdown { reply } => {
                let _ = reply.send(Ok(()));
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
