//! Obstacle signals as delivered by the sensor-fusion collaborator and the
//! verdict the obstacle gate derives from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One classified obstacle observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObstacleReading {
    /// Range to the obstacle (metres).
    pub distance_m: f32,
    /// Bearing relative to the robot heading, counter-clockwise positive
    /// (radians).
    pub bearing_rad: f32,
    /// Classifier confidence in `[0, 1]`.
    pub confidence: f32,
    pub timestamp: DateTime<Utc>,
}

/// One sensor-fusion update: the reading set plus the time it was produced.
///
/// An empty, fresh scan means "nothing in range"; an old scan means the
/// sensor has gone quiet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObstacleScan {
    pub received_at: DateTime<Utc>,
    pub readings: Vec<ObstacleReading>,
}

/// Why the gate returned [`ObstacleVerdict::Stop`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cause", rename_all = "snake_case")]
pub enum StopCause {
    /// A confident reading inside the hard-stop radius.
    Proximity { distance_m: f32, bearing_rad: f32 },
    /// Missing or stale sensor data; the surroundings are unknown.
    Blind,
}

/// Go / slow / stop decision for a single tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verdict", content = "detail", rename_all = "snake_case")]
pub enum ObstacleVerdict {
    Clear,
    /// Speed multiplier in `(0, 1]`.
    Slow(f32),
    Stop(StopCause),
}

impl ObstacleVerdict {
    /// 0 = Clear, 1 = Slow, 2 = Stop.
    pub fn severity(&self) -> u8 {
        match self {
            ObstacleVerdict::Clear => 0,
            ObstacleVerdict::Slow(_) => 1,
            ObstacleVerdict::Stop(_) => 2,
        }
    }

    pub fn is_stop(&self) -> bool {
        matches!(self, ObstacleVerdict::Stop(_))
    }

    /// Combine two verdicts, keeping the more restrictive one.
    ///
    /// Among `Slow` verdicts the smaller factor wins. Among `Stop` verdicts a
    /// blind stop dominates a proximity stop, and the nearer proximity stop
    /// dominates a farther one.
    pub fn most_restrictive(self, other: ObstacleVerdict) -> ObstacleVerdict {
        use ObstacleVerdict::*;
        match (self, other) {
            (Slow(a), Slow(b)) => Slow(a.min(b)),
            (Stop(StopCause::Blind), Stop(_)) | (Stop(_), Stop(StopCause::Blind)) => {
                Stop(StopCause::Blind)
            }
            (
                Stop(StopCause::Proximity { distance_m: da, .. }),
                Stop(StopCause::Proximity { distance_m: db, .. }),
            ) => {
                if db < da {
                    other
                } else {
                    self
                }
            }
            _ if other.severity() > self.severity() => other,
            _ => self,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proximity(d: f32) -> ObstacleVerdict {
        ObstacleVerdict::Stop(StopCause::Proximity {
            distance_m: d,
            bearing_rad: 0.0,
        })
    }

    #[test]
    fn stop_dominates_slow_dominates_clear() {
        let v = ObstacleVerdict::Clear
            .most_restrictive(ObstacleVerdict::Slow(0.5))
            .most_restrictive(proximity(0.2))
            .most_restrictive(ObstacleVerdict::Clear);
        assert!(v.is_stop());
    }

    #[test]
    fn slowest_factor_wins() {
        let v = ObstacleVerdict::Slow(0.8).most_restrictive(ObstacleVerdict::Slow(0.3));
        assert_eq!(v, ObstacleVerdict::Slow(0.3));
    }

    #[test]
    fn nearest_proximity_stop_wins() {
        let v = proximity(0.4).most_restrictive(proximity(0.1));
        assert_eq!(v, proximity(0.1));
    }

    #[test]
    fn blind_stop_dominates_proximity() {
        let v = proximity(0.1).most_restrictive(ObstacleVerdict::Stop(StopCause::Blind));
        assert_eq!(v, ObstacleVerdict::Stop(StopCause::Blind));
    }
}
