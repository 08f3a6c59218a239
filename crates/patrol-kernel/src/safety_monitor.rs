//! [`SafetyMonitor`] – fuses telemetry, the obstacle verdict, and link
//! health into one [`SafetyVerdict`] per tick.
//!
//! Conditions are checked in strict priority order and the first match wins:
//!
//! 1. any active hardware fault → `Halt(Hardware)`
//! 2. battery below `battery_critical_percent` → `Halt(Battery)`
//! 3. obstacle `Stop` → `Halt(Obstacle)`
//! 4. link lost → `Degrade(Link)`
//! 5. obstacle `Slow` → `Degrade(Obstacle)`
//! 6. battery below `battery_low_percent` → `Degrade(BatteryLow)`
//! 7. otherwise `Clear`
//!
//! The monitor holds no state between ticks; a verdict is always derived
//! from fresh inputs.

use patrol_types::{
    DegradeReason, HaltReason, LinkStatus, ObstacleVerdict, SafetyVerdict, Telemetry,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Thresholds for the safety monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    /// Below this the robot halts.
    pub battery_critical_percent: f32,
    /// Below this the robot keeps patrolling at reduced speed.
    pub battery_low_percent: f32,
    /// Speed factor applied for non-obstacle degradations.
    pub degraded_speed_factor: f32,
    /// Operator link silence tolerated before degrading (milliseconds).
    pub link_grace_ms: u64,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            battery_critical_percent: 15.0,
            battery_low_percent: 25.0,
            degraded_speed_factor: 0.5,
            link_grace_ms: 2_000,
        }
    }
}

/// Priority-ordered safety rule set.
#[derive(Debug, Clone, Default)]
pub struct SafetyMonitor {
    config: SafetyConfig,
}

impl SafetyMonitor {
    pub fn new(config: SafetyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SafetyConfig {
        &self.config
    }

    /// Derive this tick's verdict.
    pub fn assess(
        &self,
        telemetry: &Telemetry,
        obstacle: ObstacleVerdict,
        link: LinkStatus,
    ) -> SafetyVerdict {
        let cfg = &self.config;
        let battery = telemetry.battery_percent;

        let verdict = if !telemetry.faults.is_empty() {
            SafetyVerdict::Halt(HaltReason::Hardware)
        } else if battery.is_nan() || battery < cfg.battery_critical_percent {
            SafetyVerdict::Halt(HaltReason::Battery)
        } else if obstacle.is_stop() {
            SafetyVerdict::Halt(HaltReason::Obstacle)
        } else if matches!(link, LinkStatus::Lost { .. }) {
            SafetyVerdict::Degrade(DegradeReason::Link)
        } else if let ObstacleVerdict::Slow(factor) = obstacle {
            SafetyVerdict::Degrade(DegradeReason::Obstacle { factor })
        } else if battery < cfg.battery_low_percent {
            SafetyVerdict::Degrade(DegradeReason::BatteryLow)
        } else {
            SafetyVerdict::Clear
        };

        debug!(
            battery,
            faults = telemetry.faults.len(),
            ?obstacle,
            ?link,
            %verdict,
            "safety assessed"
        );
        verdict
    }

    /// Fraction of the segment's speed the robot may use under `verdict`.
    ///
    /// A slow obstacle verdict still caps speed when a higher-priority
    /// degradation (link loss) was reported instead.
    pub fn speed_factor(&self, verdict: SafetyVerdict, obstacle: ObstacleVerdict) -> f32 {
        let obstacle_factor = match obstacle {
            ObstacleVerdict::Slow(f) => f,
            _ => 1.0,
        };
        match verdict {
            SafetyVerdict::Halt(_) => 0.0,
            SafetyVerdict::Clear => 1.0,
            SafetyVerdict::Degrade(DegradeReason::Obstacle { factor }) => factor,
            SafetyVerdict::Degrade(_) => self.config.degraded_speed_factor.min(obstacle_factor),
        }
    }
}
