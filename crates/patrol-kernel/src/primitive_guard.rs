//! [`PrimitiveGuard`] – physical interlock in front of the motion SDK.
//!
//! Before a [`MotionPrimitive`] is sent to the robot, pass it through
//! [`PrimitiveGuard::verify`]. Every registered [`Rule`] is evaluated in
//! order; the first violation returns [`FailureReason::Rejected`] and the
//! primitive is **not** sent.
//!
//! Two built-in rules are provided:
//! - [`SpeedCapRule`] – rejects walks and turns faster than the platform's
//!   absolute limits, or with a non-finite / negative speed.
//! - [`GeofenceRule`] – rejects walks whose target lies outside the site
//!   [`Bounds`].
//!
//! `Stop` always passes.

use patrol_types::{Bounds, FailureReason, MotionPrimitive, Pose};
use tracing::warn;

// ────────────────────────────────────────────────────────────────────────────
// Rule trait
// ────────────────────────────────────────────────────────────────────────────

/// A single physical invariant a primitive must satisfy.
pub trait Rule: Send + Sync {
    /// Human-readable name used in rejection messages.
    fn name(&self) -> &str;

    /// `Ok(())` when the primitive satisfies the invariant.
    fn check(&self, primitive: &MotionPrimitive) -> Result<(), FailureReason>;
}

// ────────────────────────────────────────────────────────────────────────────
// PrimitiveGuard
// ────────────────────────────────────────────────────────────────────────────

/// Rule engine applied to every primitive before dispatch.
///
/// # Example
///
/// ```
/// use patrol_kernel::primitive_guard::{PrimitiveGuard, SpeedCapRule};
/// use patrol_types::MotionPrimitive;
///
/// let mut guard = PrimitiveGuard::new();
/// guard.add_rule(Box::new(SpeedCapRule { max_linear: 1.0, max_angular: 1.0 }));
///
/// let ok = MotionPrimitive::Walk { target_x: 1.0, target_y: 0.0, speed: 0.5 };
/// assert!(guard.verify(&ok).is_ok());
///
/// let too_fast = MotionPrimitive::Walk { target_x: 1.0, target_y: 0.0, speed: 3.0 };
/// assert!(guard.verify(&too_fast).is_err());
/// ```
#[derive(Default)]
pub struct PrimitiveGuard {
    rules: Vec<Box<dyn Rule>>,
}

impl PrimitiveGuard {
    /// Create an empty guard with no rules.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new [`Rule`]. Rules are evaluated in insertion order.
    pub fn add_rule(&mut self, rule: Box<dyn Rule>) {
        self.rules.push(rule);
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Validate `primitive` against every registered rule, returning the
    /// first violation.
    pub fn verify(&self, primitive: &MotionPrimitive) -> Result<(), FailureReason> {
        if matches!(primitive, MotionPrimitive::Stop) {
            return Ok(());
        }
        for rule in &self.rules {
            if let Err(reason) = rule.check(primitive) {
                warn!(rule = rule.name(), primitive = primitive.name(), %reason, "primitive rejected");
                return Err(reason);
            }
        }
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Built-in rules
// ────────────────────────────────────────────────────────────────────────────

/// Absolute platform speed limits.
pub struct SpeedCapRule {
    /// Maximum walking speed (m/s).
    pub max_linear: f32,
    /// Maximum turning rate (rad/s).
    pub max_angular: f32,
}

fn check_speed(kind: &str, speed: f32, cap: f32) -> Result<(), FailureReason> {
    if !speed.is_finite() || speed < 0.0 {
        return Err(FailureReason::Rejected(format!("{kind} speed {speed} is invalid")));
    }
    if speed > cap {
        return Err(FailureReason::Rejected(format!(
            "{kind} speed {speed} exceeds cap {cap}"
        )));
    }
    Ok(())
}

impl Rule for SpeedCapRule {
    fn name(&self) -> &str {
        "speed_cap"
    }

    fn check(&self, primitive: &MotionPrimitive) -> Result<(), FailureReason> {
        match *primitive {
            MotionPrimitive::Walk { speed, .. } => check_speed("walk", speed, self.max_linear),
            MotionPrimitive::Turn { angular_speed, .. } => {
                check_speed("turn", angular_speed, self.max_angular)
            }
            MotionPrimitive::Stop => Ok(()),
        }
    }
}

/// Keeps walk targets inside the site bounds.
pub struct GeofenceRule {
    pub bounds: Bounds,
}

impl Rule for GeofenceRule {
    fn name(&self) -> &str {
        "geofence"
    }

    fn check(&self, primitive: &MotionPrimitive) -> Result<(), FailureReason> {
        if let MotionPrimitive::Walk {
            target_x, target_y, ..
        } = *primitive
        {
            if !self.bounds.contains(&Pose::new(target_x, target_y, 0.0)) {
                return Err(FailureReason::Rejected(format!(
                    "walk target ({target_x}, {target_y}) is outside the geofence"
                )));
            }
        }
        Ok(())
    }
}
