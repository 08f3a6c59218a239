//! Configuration vault – reads/writes `~/.patrol/config.toml`.
//!
//! Every component's settings live in their own table:
//!
//! ```toml
//! [loop]
//! tick_period_ms = 100
//!
//! [safety]
//! battery_critical_percent = 15.0
//!
//! [planner]
//! cruise_speed = 0.6
//! ```
//!
//! Missing tables and keys fall back to defaults.

use std::fs;
use std::path::{Path, PathBuf};

use patrol_kernel::{ObstacleGateConfig, SafetyConfig};
use patrol_runtime::{ExecutorConfig, LoopConfig, MachineConfig, PatrolSettings, PlannerConfig};
use serde::{Deserialize, Serialize};

/// Starting conditions of the simulated robot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub start_x: f32,
    pub start_y: f32,
    pub battery_percent: f32,
    /// Battery spent per turn or walk primitive.
    pub battery_drain_per_primitive: f32,
    /// Polls before a simulated primitive finishes.
    pub polls_per_primitive: u32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            start_x: 0.0,
            start_y: 0.0,
            battery_percent: 100.0,
            battery_drain_per_primitive: 0.2,
            polls_per_primitive: 5,
        }
    }
}

/// Persisted configuration stored in `~/.patrol/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(rename = "loop")]
    pub control_loop: LoopConfig,
    pub obstacle_gate: ObstacleGateConfig,
    pub safety: SafetyConfig,
    pub planner: PlannerConfig,
    pub executor: ExecutorConfig,
    pub machine: MachineConfig,
    pub sim: SimConfig,
}

impl Config {
    /// The component settings the patrol machine is built from.
    pub fn patrol_settings(&self) -> PatrolSettings {
        PatrolSettings {
            obstacle_gate: self.obstacle_gate.clone(),
            safety: self.safety.clone(),
            planner: self.planner.clone(),
            executor: self.executor.clone(),
            machine: self.machine.clone(),
        }
    }
}

/// Path to `~/.patrol/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".patrol").join("config.toml")
}

/// Load the config from disk. `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `PATROL_*` environment overrides to `cfg`. Unparsable values are
/// ignored.
///
/// | Variable | Config field |
/// |---|---|
/// | `PATROL_TICK_PERIOD_MS` | `loop.tick_period_ms` |
/// | `PATROL_CRUISE_SPEED` | `planner.cruise_speed` |
/// | `PATROL_BATTERY_CRITICAL` | `safety.battery_critical_percent` |
/// | `PATROL_LINK_GRACE_MS` | `safety.link_grace_ms` |
/// | `PATROL_HARD_STOP_M` | `obstacle_gate.hard_stop_m` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Some(v) = env_parse("PATROL_TICK_PERIOD_MS") {
        cfg.control_loop.tick_period_ms = v;
    }
    if let Some(v) = env_parse("PATROL_CRUISE_SPEED") {
        cfg.planner.cruise_speed = v;
    }
    if let Some(v) = env_parse("PATROL_BATTERY_CRITICAL") {
        cfg.safety.battery_critical_percent = v;
    }
    if let Some(v) = env_parse("PATROL_LINK_GRACE_MS") {
        cfg.safety.link_grace_ms = v;
    }
    if let Some(v) = env_parse("PATROL_HARD_STOP_M") {
        cfg.obstacle_gate.hard_stop_m = v;
    }
}

fn env_parse<T: std::str::FromStr>(var: &str) -> Option<T> {
    std::env::var(var).ok()?.trim().parse().ok()
}

/// Save the config to disk, creating `~/.patrol/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}
