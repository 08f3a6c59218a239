//! [`ObstacleGate`] – reduces classified obstacle readings to a single
//! motion verdict.
//!
//! Every reading is classified on its own and the most restrictive result
//! wins (see [`ObstacleVerdict::most_restrictive`]):
//!
//! | Reading | Verdict |
//! |---|---|
//! | older than `stale_after_ms` | `Stop(Blind)` |
//! | closer than `hard_stop_m`, confident | `Stop(Proximity)` |
//! | closer than `soft_slow_m` | `Slow(factor)` |
//! | anything else | `Clear` |
//!
//! The slow factor ramps linearly from `min_slow_factor` at `hard_stop_m` up
//! to `1.0` at `soft_slow_m`. A close reading below `min_confidence` never
//! stops the robot but does slow it to the bottom of the ramp.

use chrono::{DateTime, Duration, Utc};
use patrol_types::{ObstacleReading, ObstacleScan, ObstacleVerdict, StopCause};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Thresholds for the obstacle gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObstacleGateConfig {
    /// Confident readings closer than this stop the robot (metres).
    pub hard_stop_m: f32,
    /// Readings closer than this slow the robot (metres).
    pub soft_slow_m: f32,
    /// Speed factor applied at the hard-stop distance.
    pub min_slow_factor: f32,
    /// Readings below this confidence can slow but never stop.
    pub min_confidence: f32,
    /// Readings older than this are treated as blindness (milliseconds).
    pub stale_after_ms: u64,
}

impl Default for ObstacleGateConfig {
    fn default() -> Self {
        Self {
            hard_stop_m: 0.5,
            soft_slow_m: 1.5,
            min_slow_factor: 0.2,
            min_confidence: 0.5,
            stale_after_ms: 500,
        }
    }
}

/// Stateless classifier over obstacle readings.
///
/// # Example
///
/// ```
/// use chrono::Utc;
/// use patrol_kernel::obstacle_gate::{ObstacleGate, ObstacleGateConfig};
/// use patrol_types::{ObstacleReading, ObstacleVerdict};
///
/// let gate = ObstacleGate::new(ObstacleGateConfig::default());
/// let now = Utc::now();
/// let far = ObstacleReading { distance_m: 4.0, bearing_rad: 0.0, confidence: 0.9, timestamp: now };
/// assert_eq!(gate.evaluate(&[far], now), ObstacleVerdict::Clear);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ObstacleGate {
    config: ObstacleGateConfig,
}

impl ObstacleGate {
    pub fn new(config: ObstacleGateConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ObstacleGateConfig {
        &self.config
    }

    /// Classify `readings` as of `now`. An empty set is `Clear`.
    pub fn evaluate(&self, readings: &[ObstacleReading], now: DateTime<Utc>) -> ObstacleVerdict {
        let verdict = readings
            .iter()
            .map(|r| self.classify(r, now))
            .fold(ObstacleVerdict::Clear, ObstacleVerdict::most_restrictive);
        trace!(readings = readings.len(), ?verdict, "obstacle gate evaluated");
        verdict
    }

    /// Classify a whole scan. A missing scan, or one received longer than
    /// `stale_after_ms` ago, means the robot is blind.
    pub fn evaluate_scan(&self, scan: Option<&ObstacleScan>, now: DateTime<Utc>) -> ObstacleVerdict {
        match scan {
            Some(scan) if !self.is_stale(scan.received_at, now) => {
                self.evaluate(&scan.readings, now)
            }
            _ => ObstacleVerdict::Stop(StopCause::Blind),
        }
    }

    fn is_stale(&self, stamp: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        let limit = Duration::milliseconds(i64::try_from(self.config.stale_after_ms).unwrap_or(i64::MAX));
        now.signed_duration_since(stamp) > limit
    }

    fn classify(&self, reading: &ObstacleReading, now: DateTime<Utc>) -> ObstacleVerdict {
        let cfg = &self.config;
        if self.is_stale(reading.timestamp, now) || reading.distance_m.is_nan() {
            return ObstacleVerdict::Stop(StopCause::Blind);
        }
        let d = reading.distance_m;
        if d < cfg.hard_stop_m && reading.confidence >= cfg.min_confidence {
            return ObstacleVerdict::Stop(StopCause::Proximity {
                distance_m: d,
                bearing_rad: reading.bearing_rad,
            });
        }
        if d < cfg.soft_slow_m {
            return ObstacleVerdict::Slow(self.slow_factor(d));
        }
        ObstacleVerdict::Clear
    }

    fn slow_factor(&self, distance_m: f32) -> f32 {
        let cfg = &self.config;
        let span = cfg.soft_slow_m - cfg.hard_stop_m;
        if span <= f32::EPSILON {
            return cfg.min_slow_factor;
        }
        let t = ((distance_m - cfg.hard_stop_m) / span).clamp(0.0, 1.0);
        cfg.min_slow_factor + (1.0 - cfg.min_slow_factor) * t
    }
}
