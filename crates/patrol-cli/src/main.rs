//! `patrol-cli` – operator console for the patrol orchestration core.
//!
//! This binary:
//!
//! 1. Loads `~/.patrol/config.toml`, writing the defaults on first run.
//! 2. Wires the patrol machine to the simulated robot and starts the
//!    control loop on a Tokio runtime.
//! 3. Streams status events to the terminal.
//! 4. Drops the user into an **interactive REPL** (`/start`, `/stop`,
//!    `/resume`, `/route`, `/status`, `/help`, ...).
//! 5. Intercepts **Ctrl-C** to stop the robot before exiting.

mod config;
mod repl;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use colored::Colorize;
use patrol_hal::{SimMotionSdk, SimObstacleSource};
use patrol_middleware::EventBus;
use patrol_runtime::{LinkMonitor, PatrolHandle, PatrolMachine, init_tracing, patrol_loop};
use patrol_types::{EventPayload, PatrolEvent};
use tracing::{error, warn};

fn main() {
    // PATROL_LOG_FORMAT=json switches to newline-delimited JSON records.
    // User-facing output still goes through println!.
    let _tracing = init_tracing("patrol");

    print_banner();

    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => write_default_config(),
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            config::Config::default()
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to start the async runtime");
            return;
        }
    };

    // ── Patrol wiring ─────────────────────────────────────────────────────
    let bus = EventBus::default();
    let sdk = SimMotionSdk::new()
        .with_pose(patrol_types::Pose::new(cfg.sim.start_x, cfg.sim.start_y, 0.0))
        .with_battery(cfg.sim.battery_percent)
        .with_battery_drain(cfg.sim.battery_drain_per_primitive)
        .with_polls_per_primitive(cfg.sim.polls_per_primitive);
    let sensors = SimObstacleSource::new();
    let link = LinkMonitor::new(cfg.safety.link_grace_ms);

    let session_sim = sdk.control();
    let session_scene = sensors.control();
    let machine = PatrolMachine::new(cfg.patrol_settings(), Arc::new(bus.clone()));
    let (handle, control) = patrol_loop(
        machine,
        Box::new(sdk),
        Box::new(sensors),
        link.clone(),
        cfg.control_loop.clone(),
    );
    let control_task = runtime.spawn(control.run());
    runtime.spawn(print_events(bus.clone()));

    let link_up = Arc::new(AtomicBool::new(true));
    runtime.spawn(operator_heartbeat(
        handle.clone(),
        link_up.clone(),
        Duration::from_millis((cfg.safety.link_grace_ms / 2).max(50)),
    ));

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    let ctrlc_handle = handle.clone();
    let ctrlc_rt = runtime.handle().clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping the robot …".yellow().bold());
        match ctrlc_rt.block_on(ctrlc_handle.stop()) {
            Ok(()) => println!("{}", "  ✓ Stop issued.".green()),
            Err(e) => println!("{} {}", "  ✗ Stop failed:".red(), e),
        }
        println!("{}", "  ✓ Exiting.".green());
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; Ctrl-C will not stop the robot");
    }

    println!();
    println!("  Type {} for a list of commands.\n", "/help".bold().cyan());

    let session = repl::Session {
        runtime: runtime.handle().clone(),
        patrol: handle.clone(),
        sim: session_sim,
        scene: session_scene,
        link_up,
    };
    repl::run(&session, shutdown);

    if let Err(e) = runtime.block_on(handle.shutdown()) {
        warn!(error = %e, "control loop already gone");
    }
    let _ = runtime.block_on(control_task);
}

fn write_default_config() -> config::Config {
    let cfg = config::Config::default();
    match config::save(&cfg) {
        Ok(()) => println!(
            "  {} Default config written to {}",
            "✓".green().bold(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
    cfg
}

// ─────────────────────────────────────────────────────────────────────────────
// Background tasks
// ─────────────────────────────────────────────────────────────────────────────

/// Stands in for the remote operator: beats the link while it is "up".
async fn operator_heartbeat(handle: PatrolHandle, link_up: Arc<AtomicBool>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        if link_up.load(Ordering::SeqCst) {
            handle.heartbeat();
        }
    }
}

async fn print_events(bus: EventBus) {
    let mut events = bus.subscribe();
    loop {
        match events.recv().await {
            Ok(event) => print_event(&event),
            Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                warn!(skipped = n, "event printer lagged");
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn print_event(event: &PatrolEvent) {
    let at = event.timestamp.with_timezone(&chrono::Local).format("%H:%M:%S");
    let line = match &event.payload {
        EventPayload::StateChanged { from, to } => format!("state {} → {}", from, to.to_string().bold()),
        EventPayload::SegmentCompleted { target_index, waypoint_id, .. } => {
            format!("reached {} (#{})", waypoint_id.green(), target_index)
        }
        EventPayload::SafetyHalt { reason } => format!("{} {}", "HALT".red().bold(), reason),
        EventPayload::RouteReplanned { detour_waypoint: Some(id), .. } => {
            format!("detour via {}", id.yellow())
        }
        EventPayload::RouteReplanned { detour_waypoint: None, .. } => "detour cleared".to_string(),
        EventPayload::RouteCompleted { route_id } => format!("{} {}", "route complete".green(), route_id),
        // Verdicts and positions are visible through /status.
        EventPayload::VerdictChanged { .. } | EventPayload::PositionUpdate { .. } => return,
    };
    println!("\r  {} {}", at.to_string().dimmed(), line);
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"    ___  ____ ___ ____ ____ _    "#.bold().cyan());
    println!("{}", r#"    |__] |__|  |  |__/ |  | |    "#.bold().cyan());
    println!("{}", r#"    |    |  |  |  |  \ |__| |___ "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "Patrol".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Patrol orchestration core · simulated robot");
    println!();
}
