//! Narrow capability interface to the vendor motion SDK.
//!
//! The orchestration core never touches the SDK transport. Vendor bindings
//! implement [`MotionSdk`] and the rest of the workspace only ever talks to
//! the trait, so SDK churn stays behind this boundary.

use patrol_types::{MotionPrimitive, PatrolError, PrimitiveHandle, PrimitiveStatus, Telemetry};

/// The four operations the core is allowed to invoke on the robot.
///
/// All methods must return promptly; long-running motion is observed through
/// repeated [`poll`][MotionSdk::poll] calls, one per control tick.
pub trait MotionSdk: Send {
    /// Issue a primitive and return a handle for tracking it.
    ///
    /// # Errors
    ///
    /// [`PatrolError::Sdk`] when the SDK session cannot accept commands.
    fn send_primitive(&mut self, primitive: &MotionPrimitive) -> Result<PrimitiveHandle, PatrolError>;

    /// Report the current state of a previously issued primitive.
    fn poll(&mut self, handle: PrimitiveHandle) -> PrimitiveStatus;

    /// Best-effort abort of an in-flight primitive. The robot may already
    /// have committed to a short motion.
    fn cancel(&mut self, handle: PrimitiveHandle);

    /// Latest battery, fault, and pose snapshot.
    ///
    /// # Errors
    ///
    /// [`PatrolError::Sdk`] when telemetry cannot be retrieved.
    fn get_telemetry(&mut self) -> Result<Telemetry, PatrolError>;
}
