//! Patrol lifecycle record and the status events emitted to the reporter.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geometry::Pose;
use crate::safety::{HaltReason, SafetyVerdict};

/// Lifecycle state of the patrol state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    #[default]
    Idle,
    Planning,
    Moving,
    Avoiding,
    Degraded,
    Halted,
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Lifecycle::Idle => "idle",
            Lifecycle::Planning => "planning",
            Lifecycle::Moving => "moving",
            Lifecycle::Avoiding => "avoiding",
            Lifecycle::Degraded => "degraded",
            Lifecycle::Halted => "halted",
        };
        f.write_str(s)
    }
}

/// The orchestrator's own record. Mutated only by the state machine.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PatrolState {
    pub route_id: Option<Uuid>,
    /// Route index of the waypoint currently pursued.
    pub segment_index: Option<usize>,
    pub lifecycle: Lifecycle,
    pub last_verdict: Option<SafetyVerdict>,
    /// Consecutive motion retries for the current segment.
    pub retry_count: u32,
}

/// Coarse classification of a [`PatrolEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    StateChanged,
    SegmentCompleted,
    VerdictChanged,
    SafetyHalt,
    PositionUpdate,
    RouteReplanned,
    RouteCompleted,
}

/// Event data, one variant per [`EventKind`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    StateChanged {
        from: Lifecycle,
        to: Lifecycle,
    },
    SegmentCompleted {
        route_id: Uuid,
        target_index: usize,
        waypoint_id: String,
    },
    VerdictChanged {
        verdict: SafetyVerdict,
    },
    SafetyHalt {
        reason: HaltReason,
    },
    PositionUpdate {
        pose: Pose,
        primitive: String,
    },
    RouteReplanned {
        route_id: Uuid,
        detour_waypoint: Option<String>,
    },
    RouteCompleted {
        route_id: Uuid,
    },
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::StateChanged { .. } => EventKind::StateChanged,
            EventPayload::SegmentCompleted { .. } => EventKind::SegmentCompleted,
            EventPayload::VerdictChanged { .. } => EventKind::VerdictChanged,
            EventPayload::SafetyHalt { .. } => EventKind::SafetyHalt,
            EventPayload::PositionUpdate { .. } => EventKind::PositionUpdate,
            EventPayload::RouteReplanned { .. } => EventKind::RouteReplanned,
            EventPayload::RouteCompleted { .. } => EventKind::RouteCompleted,
        }
    }
}

/// Status event handed to the [`StatusReporter`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatrolEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g. `"patrol-runtime::patrol_machine"`
    pub source: String,
    pub kind: EventKind,
    pub payload: EventPayload,
}

impl PatrolEvent {
    pub fn new(source: &str, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.to_string(),
            kind: payload.kind(),
            payload,
        }
    }
}

/// Fire-and-forget sink for status events.
///
/// Implementations must never block the control loop.
pub trait StatusReporter: Send + Sync {
    fn report(&self, event: PatrolEvent);
}
