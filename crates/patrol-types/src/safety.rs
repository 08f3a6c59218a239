//! Safety inputs (telemetry, link liveness) and the [`SafetyVerdict`] the
//! safety monitor produces from them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::geometry::Pose;

/// A fault flag raised by the motion SDK.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareFault {
    pub component: String,
    pub code: u32,
    pub message: String,
}

/// Robot telemetry snapshot as returned by the motion SDK.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    pub pose: Pose,
    /// State of charge, `0.0..=100.0`.
    pub battery_percent: f32,
    #[serde(default)]
    pub faults: Vec<HardwareFault>,
}

/// Liveness of the remote command link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "link", rename_all = "snake_case")]
pub enum LinkStatus {
    /// A heartbeat arrived within the grace period.
    Alive,
    /// Silent for longer than the grace period.
    Lost { silent_for_ms: u64 },
}

/// Why a patrol cycle was halted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HaltReason {
    Hardware,
    Battery,
    Obstacle,
    /// Motion kept failing after the retry budget was spent.
    Motion,
}

impl fmt::Display for HaltReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HaltReason::Hardware => write!(f, "hardware"),
            HaltReason::Battery => write!(f, "battery"),
            HaltReason::Obstacle => write!(f, "obstacle"),
            HaltReason::Motion => write!(f, "motion"),
        }
    }
}

/// Why the patrol is running in a reduced mode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DegradeReason {
    /// Remote link lost; remote route changes are refused.
    Link,
    /// Obstacle in the slow band; `factor` scales the speed cap.
    Obstacle { factor: f32 },
    BatteryLow,
}

impl fmt::Display for DegradeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DegradeReason::Link => write!(f, "link"),
            DegradeReason::Obstacle { .. } => write!(f, "obstacle"),
            DegradeReason::BatteryLow => write!(f, "battery_low"),
        }
    }
}

/// Aggregated safety decision for one tick. Never cached across ticks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verdict", content = "reason", rename_all = "snake_case")]
pub enum SafetyVerdict {
    Clear,
    Degrade(DegradeReason),
    Halt(HaltReason),
}

impl SafetyVerdict {
    pub fn is_halt(&self) -> bool {
        matches!(self, SafetyVerdict::Halt(_))
    }
}

impl fmt::Display for SafetyVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SafetyVerdict::Clear => write!(f, "clear"),
            SafetyVerdict::Degrade(r) => write!(f, "degrade({r})"),
            SafetyVerdict::Halt(r) => write!(f, "halt({r})"),
        }
    }
}
