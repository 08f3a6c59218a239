//! [`RoutePlanner`] – turns route requests into validated waypoint lists and
//! hands the patrol machine one [`Segment`] at a time.
//!
//! # Traversal
//!
//! A [`RouteCursor`] tracks progress through a [`Route`]. Each call to
//! [`RoutePlanner::next_segment`] builds a segment from the robot's current
//! pose to the next waypoint and advances the cursor according to the
//! route's [`TraversalMode`]:
//!
//! | Mode | At the last waypoint |
//! |---|---|
//! | `Loop` | wraps to waypoint 0, never completes |
//! | `OneShot` | the following call returns [`NextSegment::RouteComplete`] |
//! | `PingPong` | reverses; the first waypoint reverses again |
//!
//! # Detours
//!
//! [`RoutePlanner::replan`] inserts a detour waypoint in front of the
//! waypoint being pursued, offset sideways away from the obstacle. Once the
//! robot reaches it, [`RoutePlanner::discard_detour`] removes it again so the
//! route returns to its original shape.

use std::f32::consts::{FRAC_PI_2, TAU};

use patrol_types::{
    Bounds, PatrolError, Pose, Route, RouteSpec, Segment, TraversalMode, Waypoint,
    normalize_angle,
};
use schemars::schema_for;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

/// Planner parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Speed cap for ordinary segments (m/s).
    pub cruise_speed: f32,
    /// Speed cap for segments that target a detour waypoint (m/s).
    pub detour_speed: f32,
    /// Sideways clearance of a detour from the blocked leg (metres).
    pub detour_offset_m: f32,
    /// Arrival tolerance given to generated waypoints (metres).
    pub default_tolerance_m: f32,
    /// Optional geofence every waypoint must lie within.
    pub bounds: Option<Bounds>,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            cruise_speed: 0.6,
            detour_speed: 0.3,
            detour_offset_m: 1.0,
            default_tolerance_m: 0.3,
            bounds: None,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Cursor
// ────────────────────────────────────────────────────────────────────────────

/// Progress through a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteCursor {
    /// Index the next call to `next_segment` will target; `None` once a
    /// one-shot route is exhausted.
    next: Option<usize>,
    /// Index of the waypoint currently pursued.
    current: Option<usize>,
    /// Direction of travel, only ever `false` for ping-pong routes.
    forward: bool,
}

impl RouteCursor {
    /// Cursor positioned before the first waypoint.
    pub fn start() -> Self {
        Self {
            next: Some(0),
            current: None,
            forward: true,
        }
    }

    /// Waypoint currently pursued, if a segment has been issued.
    pub fn current(&self) -> Option<usize> {
        self.current
    }

    /// Waypoint that will be targeted next.
    pub fn upcoming(&self) -> Option<usize> {
        self.next
    }

    pub fn is_forward(&self) -> bool {
        self.forward
    }

    fn advance(&mut self, from: usize, len: usize, mode: TraversalMode) {
        self.next = match (mode, self.forward) {
            (_, true) if from + 1 < len => Some(from + 1),
            (TraversalMode::Loop, _) => Some(0),
            (TraversalMode::OneShot, _) => None,
            (TraversalMode::PingPong, true) => {
                self.forward = false;
                from.checked_sub(1)
            }
            (TraversalMode::PingPong, false) if from > 0 => Some(from - 1),
            (TraversalMode::PingPong, false) => {
                self.forward = true;
                Some(1.min(len - 1))
            }
        };
    }
}

impl Default for RouteCursor {
    fn default() -> Self {
        Self::start()
    }
}

/// Result of asking for the next segment.
#[derive(Debug, Clone, PartialEq)]
pub enum NextSegment {
    Segment(Segment),
    RouteComplete,
}

// ────────────────────────────────────────────────────────────────────────────
// Planner
// ────────────────────────────────────────────────────────────────────────────

/// Stateless route builder; all progress lives in the caller's
/// [`RouteCursor`].
#[derive(Debug, Clone, Default)]
pub struct RoutePlanner {
    config: PlannerConfig,
}

impl RoutePlanner {
    pub fn new(config: PlannerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Build and validate a route for `spec`. `origin` is the robot's pose,
    /// used by goal routes as their starting point.
    pub fn plan(&self, spec: &RouteSpec, origin: Pose) -> Result<Route, PatrolError> {
        let waypoints = match spec {
            RouteSpec::Waypoints { waypoints, .. } => waypoints.clone(),
            RouteSpec::Rectangle {
                origin_x,
                origin_y,
                width_m,
                height_m,
                ..
            } => self.rectangle(*origin_x, *origin_y, *width_m, *height_m)?,
            RouteSpec::Circle {
                center_x,
                center_y,
                radius_m,
                points,
                ..
            } => self.circle(*center_x, *center_y, *radius_m, *points)?,
            RouteSpec::FigureEight {
                center_x,
                center_y,
                radius_m,
                points_per_lobe,
                ..
            } => self.figure_eight(*center_x, *center_y, *radius_m, *points_per_lobe)?,
            RouteSpec::Goal {
                goal_x,
                goal_y,
                step_m,
                ..
            } => self.goal(origin, Pose::new(*goal_x, *goal_y, 0.0), *step_m)?,
        };
        self.check_bounds(&waypoints)?;
        let route = Route::new(waypoints, spec.mode())?;
        info!(
            route_id = %route.id(),
            shape = spec.shape_name(),
            waypoints = route.len(),
            mode = ?route.mode(),
            "route planned"
        );
        Ok(route)
    }

    /// Re-run every route check, including the geofence, on an existing
    /// route.
    pub fn revalidate(&self, route: &Route) -> Result<Route, PatrolError> {
        self.check_bounds(route.waypoints())?;
        route.revise(route.waypoints().to_vec())
    }

    /// Segment towards the cursor's next waypoint, advancing the cursor.
    pub fn next_segment(&self, route: &Route, cursor: &mut RouteCursor, from: Pose) -> NextSegment {
        let Some(index) = cursor.next else {
            cursor.current = None;
            return NextSegment::RouteComplete;
        };
        let Some(segment) = self.segment_to(route, index, from) else {
            cursor.next = None;
            cursor.current = None;
            return NextSegment::RouteComplete;
        };
        cursor.current = Some(index);
        cursor.advance(index, route.len(), route.mode());
        NextSegment::Segment(segment)
    }

    /// Segment from `from` to waypoint `index` without touching any cursor.
    /// Used to re-derive the pursued segment after a halt or a retry.
    pub fn segment_to(&self, route: &Route, index: usize, from: Pose) -> Option<Segment> {
        let target = route.get(index)?.clone();
        let heading_rad = if from.same_position(&target.pose) {
            from.heading_rad
        } else {
            from.bearing_to(&target.pose)
        };
        let max_speed = if target.detour {
            self.config.detour_speed.min(self.config.cruise_speed)
        } else {
            self.config.cruise_speed
        };
        Some(Segment {
            id: Uuid::new_v4(),
            route_id: route.id(),
            target_index: index,
            from,
            distance_m: from.distance_to(&target.pose),
            target,
            heading_rad,
            max_speed,
        })
    }

    /// Insert a detour in front of the pursued waypoint and point the cursor
    /// at it.
    ///
    /// `obstacle_bearing_rad` is relative to the robot's heading (positive
    /// means to the left). A detour that is itself blocked is replaced rather
    /// than stacked.
    pub fn replan(
        &self,
        route: &Route,
        cursor: &mut RouteCursor,
        current_pose: Pose,
        obstacle_bearing_rad: f32,
    ) -> Result<Route, PatrolError> {
        let Some(pursued) = cursor.current else {
            return Err(PatrolError::InvalidRoute(
                "cannot re-plan before a segment was issued".into(),
            ));
        };

        let mut working = route.clone();
        let mut target_index = pursued;
        if working.get(pursued).is_some_and(|wp| wp.detour) {
            working = self.discard_detour(&working, cursor, pursued)?;
            target_index = cursor.next.ok_or_else(|| {
                PatrolError::InvalidRoute("detour had no waypoint behind it".into())
            })?;
        }
        let target = working.get(target_index).cloned().ok_or_else(|| {
            PatrolError::InvalidRoute(format!("waypoint index {target_index} out of range"))
        })?;

        let detour_pose = self.detour_pose(current_pose, target.pose, obstacle_bearing_rad)?;
        let detour = Waypoint::detour(
            format!("detour-{}", target.id),
            detour_pose,
            self.config.default_tolerance_m,
        );

        let insert_at = if cursor.forward {
            target_index
        } else {
            target_index + 1
        };
        let mut waypoints = working.waypoints().to_vec();
        waypoints.insert(insert_at, detour);
        let revised = working.revise(waypoints)?;

        cursor.current = Some(insert_at);
        cursor.next = Some(if cursor.forward {
            target_index + 1
        } else {
            target_index
        });
        info!(
            route_id = %revised.id(),
            detour_index = insert_at,
            target = %target.id,
            x = detour_pose.x,
            y = detour_pose.y,
            "detour inserted"
        );
        Ok(revised)
    }

    /// Remove the detour at `index` and keep the cursor pointing at the same
    /// physical waypoints. Non-detour indices leave the route untouched.
    pub fn discard_detour(
        &self,
        route: &Route,
        cursor: &mut RouteCursor,
        index: usize,
    ) -> Result<Route, PatrolError> {
        if !route.get(index).is_some_and(|wp| wp.detour) {
            return Ok(route.clone());
        }
        let mut waypoints = route.waypoints().to_vec();
        waypoints.remove(index);
        let revised = route.revise(waypoints)?;

        let shift = |i: usize| if i > index { i - 1 } else { i };
        cursor.next = cursor.next.map(shift);
        cursor.current = match cursor.current {
            Some(i) if i == index => None,
            other => other.map(shift),
        };
        debug!(route_id = %revised.id(), index, "detour discarded");
        Ok(revised)
    }

    // ── shape generators ────────────────────────────────────────────────────

    fn waypoint(&self, index: usize, x: f32, y: f32) -> Waypoint {
        Waypoint::new(
            format!("wp-{index}"),
            Pose::new(x, y, 0.0),
            self.config.default_tolerance_m,
        )
    }

    fn rectangle(&self, x: f32, y: f32, width: f32, height: f32) -> Result<Vec<Waypoint>, PatrolError> {
        require_positive("width_m", width)?;
        require_positive("height_m", height)?;
        Ok([
            (x, y),
            (x + width, y),
            (x + width, y + height),
            (x, y + height),
        ]
        .into_iter()
        .enumerate()
        .map(|(i, (px, py))| self.waypoint(i, px, py))
        .collect())
    }

    fn circle(&self, cx: f32, cy: f32, radius: f32, points: usize) -> Result<Vec<Waypoint>, PatrolError> {
        require_positive("radius_m", radius)?;
        require_points("points", points)?;
        Ok((0..points)
            .map(|i| {
                let a = TAU * i as f32 / points as f32;
                self.waypoint(i, cx + radius * a.cos(), cy + radius * a.sin())
            })
            .collect())
    }

    /// Two touching circles, the right one counter-clockwise and the left one
    /// clockwise, both starting at the crossing point `(cx, cy)`.
    fn figure_eight(
        &self,
        cx: f32,
        cy: f32,
        radius: f32,
        per_lobe: usize,
    ) -> Result<Vec<Waypoint>, PatrolError> {
        require_positive("radius_m", radius)?;
        require_points("points_per_lobe", per_lobe)?;
        let step = TAU / per_lobe as f32;
        let right = (0..per_lobe).map(|i| {
            let a = std::f32::consts::PI + step * i as f32;
            (cx + radius + radius * a.cos(), cy + radius * a.sin())
        });
        let left = (0..per_lobe).map(|i| {
            let a = -step * i as f32;
            (cx - radius + radius * a.cos(), cy + radius * a.sin())
        });
        Ok(right
            .chain(left)
            .enumerate()
            .map(|(i, (x, y))| self.waypoint(i, x, y))
            .collect())
    }

    fn goal(&self, origin: Pose, goal: Pose, step_m: f32) -> Result<Vec<Waypoint>, PatrolError> {
        require_positive("step_m", step_m)?;
        if !origin.is_finite() || !goal.is_finite() {
            return Err(PatrolError::InvalidRoute("goal or origin is not finite".into()));
        }
        let distance = origin.distance_to(&goal);
        if origin.same_position(&goal) {
            return Err(PatrolError::InvalidRoute(
                "goal coincides with the robot's position".into(),
            ));
        }
        let legs = (distance / step_m).ceil().max(1.0) as usize;
        let heading = origin.bearing_to(&goal);
        Ok((0..=legs)
            .map(|k| {
                let t = k as f32 / legs as f32;
                let mut wp = self.waypoint(
                    k,
                    origin.x + (goal.x - origin.x) * t,
                    origin.y + (goal.y - origin.y) * t,
                );
                wp.pose.heading_rad = heading;
                wp
            })
            .collect())
    }

    // ── validation helpers ──────────────────────────────────────────────────

    fn in_bounds(&self, pose: &Pose) -> bool {
        self.config.bounds.is_none_or(|b| b.contains(pose))
    }

    fn check_bounds(&self, waypoints: &[Waypoint]) -> Result<(), PatrolError> {
        if let Some(b) = self.config.bounds.filter(|b| !b.is_valid()) {
            return Err(PatrolError::InvalidRoute(format!(
                "site bounds ({}, {})..({}, {}) are inverted or not finite",
                b.min_x, b.min_y, b.max_x, b.max_y
            )));
        }
        match waypoints.iter().find(|wp| !self.in_bounds(&wp.pose)) {
            Some(wp) => Err(PatrolError::InvalidRoute(format!(
                "waypoint '{}' at ({}, {}) lies outside the site bounds",
                wp.id, wp.pose.x, wp.pose.y
            ))),
            None => Ok(()),
        }
    }

    /// Lateral offset away from the obstacle plus a short step along the leg.
    /// Falls back to the other side when the preferred one leaves the site.
    fn detour_pose(&self, from: Pose, target: Pose, obstacle_bearing_rad: f32) -> Result<Pose, PatrolError> {
        let offset = self.config.detour_offset_m;
        let leg_heading = if from.same_position(&target) {
            from.heading_rad
        } else {
            from.bearing_to(&target)
        };
        let advance = offset.min(from.distance_to(&target) / 2.0);
        let obstacle_side = normalize_angle(from.heading_rad + obstacle_bearing_rad - leg_heading);
        // Obstacle on the left (or dead ahead) → sidestep to the right.
        let preferred = if obstacle_side >= 0.0 { -1.0 } else { 1.0 };

        [preferred, -preferred]
            .into_iter()
            .map(|side| {
                let lateral = leg_heading + side * FRAC_PI_2;
                Pose::new(
                    from.x + advance * leg_heading.cos() + offset * lateral.cos(),
                    from.y + advance * leg_heading.sin() + offset * lateral.sin(),
                    leg_heading,
                )
            })
            .find(|p| self.in_bounds(p))
            .ok_or_else(|| PatrolError::InvalidRoute("no detour fits inside the site bounds".into()))
    }
}

fn require_positive(field: &str, value: f32) -> Result<(), PatrolError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(PatrolError::InvalidRoute(format!("{field} must be positive, got {value}")))
    }
}

fn require_points(field: &str, points: usize) -> Result<(), PatrolError> {
    if points >= 3 {
        Ok(())
    } else {
        Err(PatrolError::InvalidRoute(format!("{field} must be at least 3, got {points}")))
    }
}

/// JSON Schema of [`RouteSpec`], for clients composing route requests.
pub fn route_spec_schema() -> Result<serde_json::Value, serde_json::Error> {
    serde_json::to_value(schema_for!(RouteSpec))
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn planner() -> RoutePlanner {
        RoutePlanner::default()
    }

    fn square(mode: TraversalMode) -> RouteSpec {
        RouteSpec::Rectangle {
            origin_x: 0.0,
            origin_y: 0.0,
            width_m: 4.0,
            height_m: 4.0,
            mode,
        }
    }

    fn explicit(points: &[(f32, f32)], mode: TraversalMode) -> RouteSpec {
        RouteSpec::Waypoints {
            waypoints: points
                .iter()
                .enumerate()
                .map(|(i, &(x, y))| Waypoint::new(format!("p{i}"), Pose::new(x, y, 0.0), 0.2))
                .collect(),
            mode,
        }
    }

    /// Target indices produced by `n` successive calls.
    fn walk_indices(route: &Route, n: usize) -> Vec<Option<usize>> {
        let p = planner();
        let mut cursor = RouteCursor::start();
        (0..n)
            .map(|_| match p.next_segment(route, &mut cursor, Pose::default()) {
                NextSegment::Segment(s) => Some(s.target_index),
                NextSegment::RouteComplete => None,
            })
            .collect()
    }

    // ------------------------------------------------------------------ plan

    #[test]
    fn rectangle_has_four_corners() {
        let route = planner().plan(&square(TraversalMode::OneShot), Pose::default()).unwrap();
        let corners: Vec<_> = route.waypoints().iter().map(|w| (w.pose.x, w.pose.y)).collect();
        assert_eq!(corners, vec![(0.0, 0.0), (4.0, 0.0), (4.0, 4.0), (0.0, 4.0)]);
    }

    #[test]
    fn single_waypoint_route_is_invalid() {
        let err = planner()
            .plan(&explicit(&[(1.0, 1.0)], TraversalMode::Loop), Pose::default())
            .unwrap_err();
        assert!(matches!(err, PatrolError::InvalidRoute(_)));
    }

    #[test]
    fn degenerate_shapes_are_invalid() {
        let p = planner();
        let flat = RouteSpec::Rectangle {
            origin_x: 0.0,
            origin_y: 0.0,
            width_m: 0.0,
            height_m: 3.0,
            mode: TraversalMode::Loop,
        };
        assert!(p.plan(&flat, Pose::default()).is_err());
        let sparse = RouteSpec::Circle {
            center_x: 0.0,
            center_y: 0.0,
            radius_m: 2.0,
            points: 2,
            mode: TraversalMode::Loop,
        };
        assert!(p.plan(&sparse, Pose::default()).is_err());
    }

    #[test]
    fn circle_points_lie_on_radius() {
        let spec = RouteSpec::Circle {
            center_x: 1.0,
            center_y: -1.0,
            radius_m: 3.0,
            points: 8,
            mode: TraversalMode::Loop,
        };
        let route = planner().plan(&spec, Pose::default()).unwrap();
        assert_eq!(route.len(), 8);
        let center = Pose::new(1.0, -1.0, 0.0);
        for wp in route.waypoints() {
            assert!((wp.pose.distance_to(&center) - 3.0).abs() < 1e-4);
        }
    }

    #[test]
    fn figure_eight_crosses_the_center_twice() {
        let spec = RouteSpec::FigureEight {
            center_x: 0.0,
            center_y: 0.0,
            radius_m: 2.0,
            points_per_lobe: 6,
            mode: TraversalMode::Loop,
        };
        let route = planner().plan(&spec, Pose::default()).unwrap();
        assert_eq!(route.len(), 12);
        let crossings = route
            .waypoints()
            .iter()
            .filter(|w| w.pose.distance_to(&Pose::default()) < 1e-4)
            .count();
        assert_eq!(crossings, 2);
        assert!(route.waypoints()[..6].iter().all(|w| w.pose.x >= -1e-4));
        assert!(route.waypoints()[6..].iter().all(|w| w.pose.x <= 1e-4));
    }

    #[test]
    fn goal_route_subdivides_by_step() {
        let spec = RouteSpec::Goal {
            goal_x: 5.0,
            goal_y: 0.0,
            step_m: 2.0,
            mode: TraversalMode::OneShot,
        };
        let route = planner().plan(&spec, Pose::new(0.0, 0.0, 0.0)).unwrap();
        // ceil(5 / 2) = 3 legs → 4 waypoints.
        assert_eq!(route.len(), 4);
        let last = route.waypoints().last().unwrap();
        assert!((last.pose.x - 5.0).abs() < 1e-5);
        for pair in route.waypoints().windows(2) {
            assert!(pair[0].pose.distance_to(&pair[1].pose) <= 2.0 + 1e-5);
        }
    }

    #[test]
    fn short_goal_still_has_two_waypoints() {
        let spec = RouteSpec::Goal {
            goal_x: 0.5,
            goal_y: 0.0,
            step_m: 10.0,
            mode: TraversalMode::OneShot,
        };
        assert_eq!(planner().plan(&spec, Pose::default()).unwrap().len(), 2);
    }

    #[test]
    fn goal_at_origin_is_invalid() {
        let spec = RouteSpec::Goal {
            goal_x: 0.0,
            goal_y: 0.0,
            step_m: 1.0,
            mode: TraversalMode::OneShot,
        };
        assert!(planner().plan(&spec, Pose::default()).is_err());
    }

    #[test]
    fn geofence_rejects_out_of_bounds_waypoints() {
        let p = RoutePlanner::new(PlannerConfig {
            bounds: Some(Bounds::new(-1.0, -1.0, 3.0, 3.0)),
            ..PlannerConfig::default()
        });
        let err = p.plan(&square(TraversalMode::Loop), Pose::default()).unwrap_err();
        assert!(matches!(err, PatrolError::InvalidRoute(msg) if msg.contains("outside")));
    }

    #[test]
    fn inverted_geofence_is_reported_as_such() {
        let p = RoutePlanner::new(PlannerConfig {
            bounds: Some(Bounds::new(3.0, -1.0, -1.0, 3.0)),
            ..PlannerConfig::default()
        });
        let err = p.plan(&square(TraversalMode::Loop), Pose::default()).unwrap_err();
        assert!(matches!(err, PatrolError::InvalidRoute(msg) if msg.contains("inverted")));
    }

    // ------------------------------------------------------------------ traversal

    #[test]
    fn loop_wraps_and_never_completes() {
        let route = planner().plan(&square(TraversalMode::Loop), Pose::default()).unwrap();
        let got = walk_indices(&route, 10);
        let expected: Vec<_> = [0, 1, 2, 3, 0, 1, 2, 3, 0, 1].into_iter().map(Some).collect();
        assert_eq!(got, expected);
    }

    #[test]
    fn one_shot_completes_after_last_waypoint() {
        let route = planner().plan(&square(TraversalMode::OneShot), Pose::default()).unwrap();
        assert_eq!(
            walk_indices(&route, 6),
            vec![Some(0), Some(1), Some(2), Some(3), None, None]
        );
    }

    #[test]
    fn ping_pong_reverses_at_both_ends() {
        let route = planner().plan(&square(TraversalMode::PingPong), Pose::default()).unwrap();
        let got = walk_indices(&route, 9);
        let expected: Vec<_> = [0, 1, 2, 3, 2, 1, 0, 1, 2].into_iter().map(Some).collect();
        assert_eq!(got, expected);
    }

    #[test]
    fn two_point_ping_pong_alternates() {
        let route = planner()
            .plan(&explicit(&[(0.0, 0.0), (2.0, 0.0)], TraversalMode::PingPong), Pose::default())
            .unwrap();
        let got = walk_indices(&route, 5);
        let expected: Vec<_> = [0, 1, 0, 1, 0].into_iter().map(Some).collect();
        assert_eq!(got, expected);
    }

    #[test]
    fn segment_starts_at_given_pose() {
        let route = planner().plan(&square(TraversalMode::OneShot), Pose::default()).unwrap();
        let from = Pose::new(4.0, 2.0, 0.0);
        let seg = planner().segment_to(&route, 2, from).unwrap();
        assert_eq!(seg.from, from);
        assert!((seg.distance_m - 2.0).abs() < 1e-5);
        assert!((seg.heading_rad - FRAC_PI_2).abs() < 1e-5);
        assert_eq!(seg.max_speed, PlannerConfig::default().cruise_speed);
        assert!(planner().segment_to(&route, 9, from).is_none());
    }

    // ------------------------------------------------------------------ detours

    fn straight_line() -> Route {
        planner()
            .plan(
                &explicit(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0)], TraversalMode::OneShot),
                Pose::default(),
            )
            .unwrap()
    }

    #[test]
    fn replan_inserts_detour_before_pursued_waypoint() {
        let p = planner();
        let route = straight_line();
        let mut cursor = RouteCursor::start();
        p.next_segment(&route, &mut cursor, Pose::default());
        p.next_segment(&route, &mut cursor, Pose::default());
        assert_eq!(cursor.current(), Some(1));

        // Obstacle slightly to the left while heading east → detour south.
        let here = Pose::new(4.0, 0.0, 0.0);
        let revised = p.replan(&route, &mut cursor, here, 0.2).unwrap();
        assert_eq!(revised.id(), route.id());
        assert_eq!(revised.len(), 4);
        let detour = &revised.waypoints()[1];
        assert!(detour.detour);
        assert!(detour.pose.y < 0.0);
        assert!(detour.pose.x > here.x);
        assert_eq!(cursor.current(), Some(1));
        assert_eq!(cursor.upcoming(), Some(2));

        let seg = p.segment_to(&revised, 1, here).unwrap();
        assert_eq!(seg.max_speed, PlannerConfig::default().detour_speed);
    }

    #[test]
    fn obstacle_on_the_right_sends_detour_left() {
        let p = planner();
        let route = straight_line();
        let mut cursor = RouteCursor::start();
        p.next_segment(&route, &mut cursor, Pose::default());
        p.next_segment(&route, &mut cursor, Pose::default());
        let revised = p.replan(&route, &mut cursor, Pose::new(4.0, 0.0, 0.0), -0.4).unwrap();
        assert!(revised.waypoints()[1].pose.y > 0.0);
    }

    #[test]
    fn discarding_detour_restores_route_and_cursor() {
        let p = planner();
        let route = straight_line();
        let mut cursor = RouteCursor::start();
        p.next_segment(&route, &mut cursor, Pose::default());
        p.next_segment(&route, &mut cursor, Pose::default());
        let with_detour = p.replan(&route, &mut cursor, Pose::new(4.0, 0.0, 0.0), 0.0).unwrap();

        let restored = p.discard_detour(&with_detour, &mut cursor, 1).unwrap();
        assert_eq!(restored.waypoints(), route.waypoints());
        assert_eq!(cursor.upcoming(), Some(1));
        match p.next_segment(&restored, &mut cursor, Pose::new(5.0, -1.0, 0.0)) {
            NextSegment::Segment(s) => assert_eq!(s.target.id, "p1"),
            NextSegment::RouteComplete => panic!("route ended early"),
        }
    }

    #[test]
    fn blocked_detour_is_replaced_not_stacked() {
        let p = planner();
        let route = straight_line();
        let mut cursor = RouteCursor::start();
        p.next_segment(&route, &mut cursor, Pose::default());
        p.next_segment(&route, &mut cursor, Pose::default());
        let first = p.replan(&route, &mut cursor, Pose::new(4.0, 0.0, 0.0), 0.0).unwrap();
        let second = p.replan(&first, &mut cursor, Pose::new(4.5, -0.5, 0.0), 0.0).unwrap();
        assert_eq!(second.waypoints().iter().filter(|w| w.detour).count(), 1);
        assert_eq!(second.len(), 4);
    }

    #[test]
    fn backward_ping_pong_detour_goes_after_target() {
        let p = planner();
        let route = planner()
            .plan(
                &explicit(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0)], TraversalMode::PingPong),
                Pose::default(),
            )
            .unwrap();
        let mut cursor = RouteCursor::start();
        for _ in 0..4 {
            p.next_segment(&route, &mut cursor, Pose::default());
        }
        // 0, 1, 2, then back towards 1.
        assert_eq!(cursor.current(), Some(1));
        assert!(!cursor.is_forward());
        let revised = p.replan(&route, &mut cursor, Pose::new(10.0, 6.0, -FRAC_PI_2), 0.0).unwrap();
        assert!(revised.waypoints()[2].detour);
        assert_eq!(cursor.current(), Some(2));
        assert_eq!(cursor.upcoming(), Some(1));
    }

    #[test]
    fn detour_respects_geofence() {
        let p = RoutePlanner::new(PlannerConfig {
            bounds: Some(Bounds::new(0.0, 0.0, 10.0, 10.0)),
            ..PlannerConfig::default()
        });
        let route = p
            .plan(
                &explicit(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0)], TraversalMode::OneShot),
                Pose::default(),
            )
            .unwrap();
        let mut cursor = RouteCursor::start();
        p.next_segment(&route, &mut cursor, Pose::default());
        p.next_segment(&route, &mut cursor, Pose::default());
        // Preferred side (south) is outside the fence, so the detour goes north.
        let revised = p.replan(&route, &mut cursor, Pose::new(4.0, 0.0, 0.0), 0.2).unwrap();
        assert!(revised.waypoints()[1].pose.y > 0.0);
    }

    #[test]
    fn replan_without_segment_is_an_error() {
        let mut cursor = RouteCursor::start();
        assert!(planner()
            .replan(&straight_line(), &mut cursor, Pose::default(), 0.0)
            .is_err());
    }

    #[test]
    fn schema_names_every_shape() {
        let schema = route_spec_schema().unwrap().to_string();
        for shape in ["rectangle", "circle", "figure_eight", "goal", "waypoints"] {
            assert!(schema.contains(shape), "schema missing {shape}");
        }
    }
}
