//! Pull-based interface to the sensor-fusion collaborator.

use patrol_types::ObstacleScan;

/// Source of already-classified obstacle readings.
pub trait ObstacleSource: Send {
    /// Latest scan, without blocking.
    ///
    /// Returns the last known scan when no fresh read is available, and
    /// `None` only if nothing was ever received. Freshness is judged by the
    /// obstacle gate from [`ObstacleScan::received_at`].
    fn get_obstacle_readings(&mut self) -> Option<ObstacleScan>;
}
