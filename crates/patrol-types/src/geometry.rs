//! Planar geometry shared by every crate: robot [`Pose`], the site
//! [`Bounds`] (geofence), and angle helpers.

use std::f32::consts::{PI, TAU};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Two positions closer than this (metres) are considered identical.
pub const POSITION_EPSILON: f32 = 1e-4;

/// Robot pose in the site frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct Pose {
    /// X position (metres).
    pub x: f32,
    /// Y position (metres).
    pub y: f32,
    /// Heading, counter-clockwise from +X (radians).
    #[serde(default)]
    pub heading_rad: f32,
}

impl Pose {
    pub fn new(x: f32, y: f32, heading_rad: f32) -> Self {
        Self { x, y, heading_rad }
    }

    /// Euclidean distance to `other`, ignoring heading.
    pub fn distance_to(&self, other: &Pose) -> f32 {
        (other.x - self.x).hypot(other.y - self.y)
    }

    /// Direction of travel from `self` to `other` (radians).
    pub fn bearing_to(&self, other: &Pose) -> f32 {
        (other.y - self.y).atan2(other.x - self.x)
    }

    /// `true` when both poses occupy the same position (heading ignored).
    pub fn same_position(&self, other: &Pose) -> bool {
        self.distance_to(other) <= POSITION_EPSILON
    }

    /// `true` when every component is finite.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.heading_rad.is_finite()
    }
}

/// Wrap `angle` into `(-π, π]`.
pub fn normalize_angle(angle: f32) -> f32 {
    let mut a = angle % TAU;
    if a > PI {
        a -= TAU;
    } else if a <= -PI {
        a += TAU;
    }
    a
}

/// Axis-aligned bounding map of the patrol site.
///
/// When supplied to the planner every waypoint (including detours) must lie
/// inside it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Bounds {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
}

impl Bounds {
    pub fn new(min_x: f32, min_y: f32, max_x: f32, max_y: f32) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Finite corners with `min <= max` on both axes.
    pub fn is_valid(&self) -> bool {
        [self.min_x, self.min_y, self.max_x, self.max_y]
            .iter()
            .all(|v| v.is_finite())
            && self.min_x <= self.max_x
            && self.min_y <= self.max_y
    }

    /// Inclusive containment test.
    pub fn contains(&self, pose: &Pose) -> bool {
        pose.x >= self.min_x && pose.x <= self.max_x && pose.y >= self.min_y && pose.y <= self.max_y
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_and_bearing() {
        let a = Pose::new(0.0, 0.0, 0.0);
        let b = Pose::new(3.0, 4.0, 0.0);
        assert!((a.distance_to(&b) - 5.0).abs() < 1e-6);
        assert!((a.bearing_to(&Pose::new(0.0, 2.0, 0.0)) - PI / 2.0).abs() < 1e-6);
    }

    #[test]
    fn same_position_ignores_heading() {
        let a = Pose::new(1.0, 1.0, 0.0);
        let b = Pose::new(1.0, 1.0, 2.0);
        assert!(a.same_position(&b));
        assert!(!a.same_position(&Pose::new(1.01, 1.0, 0.0)));
    }

    #[test]
    fn normalize_angle_wraps_into_half_open_range() {
        assert!((normalize_angle(3.0 * PI) - PI).abs() < 1e-5);
        assert!((normalize_angle(-3.0 * PI / 2.0) - PI / 2.0).abs() < 1e-5);
        assert!((normalize_angle(0.25) - 0.25).abs() < 1e-6);
    }

    #[test]
    fn bounds_are_inclusive() {
        let b = Bounds::new(0.0, 0.0, 10.0, 5.0);
        assert!(b.contains(&Pose::new(10.0, 5.0, 0.0)));
        assert!(b.contains(&Pose::new(0.0, 0.0, 0.0)));
        assert!(!b.contains(&Pose::new(10.1, 2.0, 0.0)));
        assert!(!b.contains(&Pose::new(2.0, -0.1, 0.0)));
    }

    #[test]
    fn inverted_or_non_finite_bounds_are_invalid() {
        assert!(Bounds::new(0.0, 0.0, 10.0, 5.0).is_valid());
        assert!(Bounds::new(1.0, 1.0, 1.0, 1.0).is_valid());
        assert!(!Bounds::new(10.0, 0.0, 0.0, 5.0).is_valid());
        assert!(!Bounds::new(0.0, 5.0, 10.0, 0.0).is_valid());
        assert!(!Bounds::new(0.0, 0.0, f32::NAN, 5.0).is_valid());
    }
}
