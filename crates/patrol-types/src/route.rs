//! Waypoint model: [`Waypoint`], [`Route`], the [`RouteSpec`] requests the
//! planner accepts, and the [`Segment`] it hands to the motion executor.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PatrolError;
use crate::geometry::Pose;

/// Longest pause a waypoint may request (seconds).
pub const MAX_DWELL_S: f32 = 3_600.0;

/// A single patrol stop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Waypoint {
    pub id: String,
    pub pose: Pose,
    /// Arrival radius (metres). Must be > 0.
    pub tolerance_m: f32,
    /// Optional pause on arrival (seconds), at most [`MAX_DWELL_S`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dwell_s: Option<f32>,
    /// Temporary waypoint inserted by obstacle avoidance; never persisted.
    #[serde(default)]
    pub detour: bool,
}

impl Waypoint {
    pub fn new(id: impl Into<String>, pose: Pose, tolerance_m: f32) -> Self {
        Self {
            id: id.into(),
            pose,
            tolerance_m,
            dwell_s: None,
            detour: false,
        }
    }

    /// A temporary detour waypoint.
    pub fn detour(id: impl Into<String>, pose: Pose, tolerance_m: f32) -> Self {
        Self {
            detour: true,
            ..Self::new(id, pose, tolerance_m)
        }
    }

    pub fn with_dwell(mut self, dwell_s: f32) -> Self {
        self.dwell_s = Some(dwell_s);
        self
    }
}

/// How the planner walks a route once the last waypoint is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TraversalMode {
    /// Wrap back to the first waypoint forever.
    Loop,
    /// Visit every waypoint once, then complete.
    #[default]
    OneShot,
    /// Reverse direction at either end forever.
    PingPong,
}

/// An immutable, validated route.
///
/// Construct through [`Route::new`]. Detour re-planning never mutates a route;
/// it builds a revised one through [`Route::revise`] that keeps the id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Route {
    id: Uuid,
    waypoints: Vec<Waypoint>,
    mode: TraversalMode,
}

impl Route {
    /// Validate `waypoints` and commit them as a route.
    ///
    /// # Errors
    ///
    /// [`PatrolError::InvalidRoute`] when fewer than two waypoints are given,
    /// two consecutive waypoints share a position, a pose is not finite, a
    /// tolerance is not strictly positive, or a dwell lies outside
    /// `0..=MAX_DWELL_S`.
    pub fn new(waypoints: Vec<Waypoint>, mode: TraversalMode) -> Result<Self, PatrolError> {
        Self::validate(&waypoints)?;
        Ok(Self {
            id: Uuid::new_v4(),
            waypoints,
            mode,
        })
    }

    /// Same route (id and mode kept) with a revised waypoint list, as
    /// produced by a detour re-plan.
    pub fn revise(&self, waypoints: Vec<Waypoint>) -> Result<Self, PatrolError> {
        Self::validate(&waypoints)?;
        Ok(Self {
            id: self.id,
            waypoints,
            mode: self.mode,
        })
    }

    fn validate(waypoints: &[Waypoint]) -> Result<(), PatrolError> {
        if waypoints.len() < 2 {
            return Err(PatrolError::InvalidRoute(format!(
                "route needs at least 2 waypoints, got {}",
                waypoints.len()
            )));
        }
        for wp in waypoints {
            if !wp.pose.is_finite() {
                return Err(PatrolError::InvalidRoute(format!(
                    "waypoint '{}' has a non-finite pose",
                    wp.id
                )));
            }
            if !(wp.tolerance_m.is_finite() && wp.tolerance_m > 0.0) {
                return Err(PatrolError::InvalidRoute(format!(
                    "waypoint '{}' has non-positive tolerance {}",
                    wp.id, wp.tolerance_m
                )));
            }
            if let Some(dwell) = wp.dwell_s {
                if !(dwell.is_finite() && (0.0..=MAX_DWELL_S).contains(&dwell)) {
                    return Err(PatrolError::InvalidRoute(format!(
                        "waypoint '{}' has dwell {} outside 0..={} s",
                        wp.id, dwell, MAX_DWELL_S
                    )));
                }
            }
        }
        if let Some(pair) = waypoints
            .windows(2)
            .find(|pair| pair[0].pose.same_position(&pair[1].pose))
        {
            return Err(PatrolError::InvalidRoute(format!(
                "consecutive waypoints '{}' and '{}' are identical",
                pair[0].id, pair[1].id
            )));
        }
        Ok(())
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn waypoints(&self) -> &[Waypoint] {
        &self.waypoints
    }

    pub fn mode(&self) -> TraversalMode {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    /// Always `false` for a validated route.
    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Waypoint> {
        self.waypoints.get(index)
    }
}

/// A route request as received from the command source.
///
/// Shapes are expanded into waypoints by the route planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum RouteSpec {
    /// Explicit waypoint list.
    Waypoints {
        waypoints: Vec<Waypoint>,
        #[serde(default)]
        mode: TraversalMode,
    },
    /// Four corners, counter-clockwise from `origin`.
    Rectangle {
        origin_x: f32,
        origin_y: f32,
        width_m: f32,
        height_m: f32,
        #[serde(default)]
        mode: TraversalMode,
    },
    /// `points` evenly spaced waypoints on a circle.
    Circle {
        center_x: f32,
        center_y: f32,
        radius_m: f32,
        points: usize,
        #[serde(default)]
        mode: TraversalMode,
    },
    /// Two tangent circles of `radius_m` traversed in opposite directions.
    FigureEight {
        center_x: f32,
        center_y: f32,
        radius_m: f32,
        points_per_lobe: usize,
        #[serde(default)]
        mode: TraversalMode,
    },
    /// Dynamic goal: a straight route from the robot's current pose to the
    /// goal, split into legs of at most `step_m`.
    Goal {
        goal_x: f32,
        goal_y: f32,
        step_m: f32,
        #[serde(default)]
        mode: TraversalMode,
    },
}

impl RouteSpec {
    pub fn mode(&self) -> TraversalMode {
        match self {
            RouteSpec::Waypoints { mode, .. }
            | RouteSpec::Rectangle { mode, .. }
            | RouteSpec::Circle { mode, .. }
            | RouteSpec::FigureEight { mode, .. }
            | RouteSpec::Goal { mode, .. } => *mode,
        }
    }

    /// Short label used in logs.
    pub fn shape_name(&self) -> &'static str {
        match self {
            RouteSpec::Waypoints { .. } => "waypoints",
            RouteSpec::Rectangle { .. } => "rectangle",
            RouteSpec::Circle { .. } => "circle",
            RouteSpec::FigureEight { .. } => "figure_eight",
            RouteSpec::Goal { .. } => "goal",
        }
    }
}

/// One directed leg towards a waypoint: the atomic unit the motion executor
/// runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub id: Uuid,
    pub route_id: Uuid,
    /// Index of [`Segment::target`] within its route.
    pub target_index: usize,
    pub from: Pose,
    pub target: Waypoint,
    /// Heading of the straight leg from `from` to the target (radians).
    pub heading_rad: f32,
    pub distance_m: f32,
    /// Maximum allowed speed on this leg (m/s).
    pub max_speed: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wp(id: &str, x: f32, y: f32) -> Waypoint {
        Waypoint::new(id, Pose::new(x, y, 0.0), 0.25)
    }

    #[test]
    fn route_requires_two_waypoints() {
        let err = Route::new(vec![wp("a", 0.0, 0.0)], TraversalMode::Loop).unwrap_err();
        assert!(matches!(err, PatrolError::InvalidRoute(msg) if msg.contains("at least 2")));
    }

    #[test]
    fn route_rejects_identical_neighbours() {
        let err = Route::new(
            vec![wp("a", 0.0, 0.0), wp("b", 1.0, 1.0), wp("c", 1.0, 1.0)],
            TraversalMode::OneShot,
        )
        .unwrap_err();
        assert!(matches!(err, PatrolError::InvalidRoute(msg) if msg.contains("'b' and 'c'")));
    }

    #[test]
    fn route_rejects_non_finite_dwell() {
        for dwell in [f32::INFINITY, f32::NAN, -1.0, 1e20] {
            let err = Route::new(
                vec![wp("a", 0.0, 0.0), wp("b", 1.0, 0.0).with_dwell(dwell)],
                TraversalMode::OneShot,
            )
            .unwrap_err();
            assert!(matches!(err, PatrolError::InvalidRoute(msg) if msg.contains("'b' has dwell")));
        }
        let ok = Route::new(
            vec![wp("a", 0.0, 0.0), wp("b", 1.0, 0.0).with_dwell(MAX_DWELL_S)],
            TraversalMode::OneShot,
        );
        assert!(ok.is_ok());
    }

    #[test]
    fn oversized_dwell_in_json_is_rejected() {
        // 1e39 overflows f32 and deserializes as infinity.
        let raw = r#"[{"id":"a","pose":{"x":0,"y":0},"tolerance_m":0.2},
                      {"id":"b","pose":{"x":2,"y":0},"tolerance_m":0.2,"dwell_s":1e39}]"#;
        let waypoints: Vec<Waypoint> = serde_json::from_str(raw).unwrap();
        assert!(Route::new(waypoints, TraversalMode::OneShot).is_err());
    }

    #[test]
    fn route_allows_revisiting_non_adjacent_positions() {
        let route = Route::new(
            vec![wp("a", 0.0, 0.0), wp("b", 1.0, 0.0), wp("c", 0.0, 0.0)],
            TraversalMode::OneShot,
        );
        assert!(route.is_ok());
    }

    #[test]
    fn route_rejects_zero_tolerance() {
        let mut bad = wp("b", 1.0, 0.0);
        bad.tolerance_m = 0.0;
        let err = Route::new(vec![wp("a", 0.0, 0.0), bad], TraversalMode::OneShot).unwrap_err();
        assert!(matches!(err, PatrolError::InvalidRoute(msg) if msg.contains("tolerance")));
    }

    #[test]
    fn route_rejects_nan_pose() {
        let err = Route::new(
            vec![wp("a", 0.0, 0.0), wp("b", f32::NAN, 0.0)],
            TraversalMode::OneShot,
        )
        .unwrap_err();
        assert!(matches!(err, PatrolError::InvalidRoute(_)));
    }

    #[test]
    fn rebuilt_routes_get_fresh_ids() {
        let wps = vec![wp("a", 0.0, 0.0), wp("b", 1.0, 0.0)];
        let r1 = Route::new(wps.clone(), TraversalMode::Loop).unwrap();
        let r2 = Route::new(wps, TraversalMode::Loop).unwrap();
        assert_ne!(r1.id(), r2.id());
    }

    #[test]
    fn route_spec_parses_from_command_json() {
        let json = r#"{"shape":"rectangle","origin_x":0,"origin_y":0,"width_m":4,"height_m":2,"mode":"loop"}"#;
        let spec: RouteSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.mode(), TraversalMode::Loop);
        assert_eq!(spec.shape_name(), "rectangle");
    }

    #[test]
    fn route_spec_mode_defaults_to_one_shot() {
        let json = r#"{"shape":"goal","goal_x":5,"goal_y":0,"step_m":1}"#;
        let spec: RouteSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.mode(), TraversalMode::OneShot);
    }

    #[test]
    fn detour_constructor_marks_waypoint() {
        let d = Waypoint::detour("detour-1", Pose::new(1.0, 1.0, 0.0), 0.3);
        assert!(d.detour);
        assert!(d.dwell_s.is_none());
    }
}
