//! Motion primitives exchanged with the vendor motion SDK.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The commands the orchestration core is allowed to send to the SDK.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "primitive", content = "params", rename_all = "snake_case")]
pub enum MotionPrimitive {
    /// Rotate in place to an absolute heading.
    Turn {
        target_heading_rad: f32,
        angular_speed: f32,
    },
    /// Walk in a straight line to an absolute position.
    Walk {
        target_x: f32,
        target_y: f32,
        speed: f32,
    },
    /// Stop all motion and hold posture.
    Stop,
}

impl MotionPrimitive {
    pub fn name(&self) -> &'static str {
        match self {
            MotionPrimitive::Turn { .. } => "turn",
            MotionPrimitive::Walk { .. } => "walk",
            MotionPrimitive::Stop => "stop",
        }
    }
}

/// Opaque handle the SDK returns for an issued primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrimitiveHandle(pub u64);

/// Why a primitive (and therefore a segment) failed.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    #[error("primitive timed out")]
    Timeout,
    #[error("actuator fault: {0}")]
    ActuatorFault(String),
    #[error("command rejected: {0}")]
    Rejected(String),
    #[error("blocked by obstacle: {0}")]
    Obstacle(String),
    #[error("cancelled")]
    Cancelled,
}

impl FailureReason {
    /// Failures that obstacle avoidance can resolve.
    pub fn is_obstacle_related(&self) -> bool {
        matches!(self, FailureReason::Obstacle(_))
    }

    /// Failures that must halt the patrol.
    pub fn is_hardware_related(&self) -> bool {
        matches!(self, FailureReason::ActuatorFault(_))
    }
}

/// SDK-side state of one primitive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrimitiveStatus {
    Pending,
    Done,
    Failed(FailureReason),
}

/// Executor-side state of one segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    Pending,
    Completed,
    Failed(FailureReason),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_classification() {
        assert!(FailureReason::Obstacle("bumper".into()).is_obstacle_related());
        assert!(!FailureReason::Obstacle("bumper".into()).is_hardware_related());
        assert!(FailureReason::ActuatorFault("knee".into()).is_hardware_related());
        assert!(!FailureReason::Timeout.is_obstacle_related());
        assert!(!FailureReason::Timeout.is_hardware_related());
    }

    #[test]
    fn primitive_wire_format_is_tagged() {
        let json = serde_json::to_string(&MotionPrimitive::Walk {
            target_x: 1.0,
            target_y: 2.0,
            speed: 0.5,
        })
        .unwrap();
        assert!(json.contains(r#""primitive":"walk""#));
        assert_eq!(MotionPrimitive::Stop.name(), "stop");
    }
}
