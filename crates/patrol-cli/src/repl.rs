//! REPL – interactive operator console for the patrol core.
//!
//! Supported slash-commands:
//!   /start <route>        – begin a patrol
//!   /route <route>        – change the route of a running patrol
//!   /stop                 – abort the patrol
//!   /resume               – continue after a safety halt
//!   /status               – show the patrol state
//!   /schema               – print the JSON schema of route requests
//!   /battery <percent>    – set the simulated battery level
//!   /obstacle <m> <rad>   – place a simulated obstacle (bearing relative to heading)
//!   /clear                – remove all simulated obstacles
//!   /fault | /unfault     – raise or clear a simulated actuator fault
//!   /link up|down         – resume or suspend operator heartbeats
//!   /help                 – show this list
//!   /quit | /exit         – stop and exit
//!
//! `<route>` is either a shape shorthand (`rectangle 4 2 loop`,
//! `circle 3 8`, `eight 2 6`, `goal 5 3 1`) or a JSON route request.

use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use colored::Colorize;
use patrol_hal::{SimControl, SimSceneControl};
use patrol_runtime::{PatrolHandle, route_spec_schema};
use patrol_types::{RouteSpec, TraversalMode};
use tokio::runtime::Handle;

/// Everything the console needs to drive a running patrol.
pub struct Session {
    pub runtime: Handle,
    pub patrol: PatrolHandle,
    pub sim: SimControl,
    pub scene: SimSceneControl,
    /// Cleared to simulate an operator link outage.
    pub link_up: Arc<AtomicBool>,
}

/// Entry point for the interactive REPL.
///
/// `shutdown` is polled each iteration; when set the REPL exits cleanly.
pub fn run(session: &Session, shutdown: Arc<AtomicBool>) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        print!("{} ", "patrol>".bold().cyan());
        stdout.flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        }

        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (cmd, rest) = line.split_once(' ').unwrap_or((line, ""));
        let rest = rest.trim();

        match cmd {
            "/help" => cmd_help(),
            "/start" => cmd_start(session, rest),
            "/route" => cmd_route(session, rest),
            "/stop" => report(session.runtime.block_on(session.patrol.stop()), "patrol stopped"),
            "/resume" => report(session.runtime.block_on(session.patrol.resume()), "resuming"),
            "/status" => cmd_status(session),
            "/schema" => cmd_schema(),
            "/battery" => cmd_battery(session, rest),
            "/obstacle" => cmd_obstacle(session, rest),
            "/clear" => {
                session.scene.clear();
                println!("{}", "✓ obstacles removed".green());
            }
            "/fault" => {
                session.sim.inject_fault("front_left_knee", 21, "motor overtemperature");
                println!("{}", "✓ actuator fault raised".yellow());
            }
            "/unfault" => {
                session.sim.clear_faults();
                println!("{}", "✓ faults cleared".green());
            }
            "/link" => cmd_link(session, rest),
            "/quit" | "/exit" => {
                let _ = session.runtime.block_on(session.patrol.stop());
                println!("{}", "Goodbye.".green());
                shutdown.store(true, Ordering::SeqCst);
                break;
            }
            other => {
                println!(
                    "{} '{}'. Type {} for available commands.",
                    "Unknown command:".red(),
                    other.yellow(),
                    "/help".bold()
                );
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Command handlers
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_help() {
    println!();
    println!("{}", "Patrol Commands".bold().underline());
    println!("  {}   – begin a patrol", "/start <route>".bold().cyan());
    println!("  {}   – change the running route", "/route <route>".bold().cyan());
    println!("  {}            – abort the patrol", "/stop".bold().cyan());
    println!("  {}          – continue after a halt", "/resume".bold().cyan());
    println!("  {}          – show patrol state", "/status".bold().cyan());
    println!("  {}          – JSON schema of route requests", "/schema".bold().cyan());
    println!("  {}  – set simulated battery", "/battery <pct>".bold().cyan());
    println!("  {} – place simulated obstacle", "/obstacle <m> <rad>".bold().cyan());
    println!("  {}           – remove obstacles", "/clear".bold().cyan());
    println!("  {} – raise / clear actuator fault", "/fault  /unfault".bold().cyan());
    println!("  {}   – toggle operator heartbeats", "/link up|down".bold().cyan());
    println!("  {}     – exit the CLI", "/quit  /exit".bold().cyan());
    println!();
    println!("  Routes: {}", "rectangle <w> <h> [mode]".dimmed());
    println!("          {}", "circle <radius> <points> [mode]".dimmed());
    println!("          {}", "eight <radius> <points-per-lobe> [mode]".dimmed());
    println!("          {}", "goal <x> <y> [step] [mode]".dimmed());
    println!("          {}", "{ ...json route request... }".dimmed());
    println!("  Modes:  {}", "loop | once | pingpong".dimmed());
    println!();
}

fn cmd_start(session: &Session, args: &str) {
    let spec = match parse_route(args) {
        Ok(spec) => spec,
        Err(e) => return println!("{}: {}", "Bad route".red(), e),
    };
    match session.runtime.block_on(session.patrol.start(spec)) {
        Ok(id) => println!("{} {}", "✓ patrol started, route".green(), id.to_string().bold()),
        Err(e) => println!("{}: {}", "Start refused".red(), e),
    }
}

fn cmd_route(session: &Session, args: &str) {
    let spec = match parse_route(args) {
        Ok(spec) => spec,
        Err(e) => return println!("{}: {}", "Bad route".red(), e),
    };
    match session.runtime.block_on(session.patrol.change_route(spec)) {
        Ok(id) => println!("{} {}", "✓ route changed to".green(), id.to_string().bold()),
        Err(e) => println!("{}: {}", "Route change refused".red(), e),
    }
}

fn cmd_status(session: &Session) {
    let state = match session.runtime.block_on(session.patrol.status()) {
        Ok(state) => state,
        Err(e) => return println!("{}: {}", "Status unavailable".red(), e),
    };
    let pose = session.sim.pose();
    println!("{}", "Patrol Status".bold().underline());
    println!("  State      : {}", state.lifecycle.to_string().yellow());
    match state.route_id {
        Some(id) => println!("  Route      : {}", id),
        None => println!("  Route      : {}", "none".dimmed()),
    }
    if let Some(index) = state.segment_index {
        println!("  Waypoint   : #{}", index);
    }
    if let Some(verdict) = state.last_verdict {
        println!("  Verdict    : {}", verdict);
    }
    println!("  Retries    : {}", state.retry_count);
    println!(
        "  Pose       : ({:.2}, {:.2}) heading {:.2} rad",
        pose.x, pose.y, pose.heading_rad
    );
    println!("  Battery    : {:.1}%", session.sim.battery());
    println!(
        "  Link       : {}",
        if session.link_up.load(Ordering::SeqCst) { "up".green() } else { "down".red() }
    );
}

fn cmd_schema() {
    match route_spec_schema().and_then(|s| serde_json::to_string_pretty(&s)) {
        Ok(json) => println!("{}", json),
        Err(e) => println!("{}: {}", "Schema error".red(), e),
    }
}

fn cmd_battery(session: &Session, args: &str) {
    match args.parse::<f32>() {
        Ok(pct) if (0.0..=100.0).contains(&pct) => {
            session.sim.set_battery(pct);
            println!("{} {:.1}%", "✓ battery set to".green(), pct);
        }
        _ => println!("{} expected a percentage 0–100", "Bad value:".red()),
    }
}

fn cmd_obstacle(session: &Session, args: &str) {
    let nums: Result<Vec<f32>, _> = args.split_whitespace().map(str::parse).collect();
    match nums.as_deref() {
        Ok([distance, bearing]) => {
            session.scene.place(*distance, *bearing, 0.9);
            println!(
                "{} {:.2} m at {:.2} rad",
                "✓ obstacle placed".green(),
                distance,
                bearing
            );
        }
        _ => println!("{} /obstacle <distance_m> <bearing_rad>", "Usage:".red()),
    }
}

fn cmd_link(session: &Session, args: &str) {
    match args {
        "up" => {
            session.link_up.store(true, Ordering::SeqCst);
            session.patrol.heartbeat();
            println!("{}", "✓ operator heartbeats resumed".green());
        }
        "down" => {
            session.link_up.store(false, Ordering::SeqCst);
            println!("{}", "✓ operator heartbeats suspended".yellow());
        }
        _ => println!("{} /link up|down", "Usage:".red()),
    }
}

fn report<T>(result: Result<T, patrol_types::PatrolError>, ok: &str) {
    match result {
        Ok(_) => println!("{} {}", "✓".green(), ok),
        Err(e) => println!("{}: {}", "Refused".red(), e),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Route parsing
// ─────────────────────────────────────────────────────────────────────────────

/// Parse a shape shorthand or a JSON route request.
pub(crate) fn parse_route(input: &str) -> Result<RouteSpec, String> {
    let input = input.trim();
    if input.starts_with('{') {
        return serde_json::from_str(input).map_err(|e| format!("invalid JSON route: {}", e));
    }

    let mut words = input.split_whitespace();
    let shape = words.next().ok_or("missing route shape")?;
    let rest: Vec<&str> = words.collect();
    let (numbers, mode) = split_mode(&rest)?;

    match shape {
        "rectangle" | "rect" => {
            let [w, h] = take::<2>(&numbers, "rectangle <width> <height>")?;
            Ok(RouteSpec::Rectangle {
                origin_x: 0.0,
                origin_y: 0.0,
                width_m: w,
                height_m: h,
                mode: mode.unwrap_or(TraversalMode::Loop),
            })
        }
        "circle" => {
            let [r, n] = take::<2>(&numbers, "circle <radius> <points>")?;
            Ok(RouteSpec::Circle {
                center_x: 0.0,
                center_y: 0.0,
                radius_m: r,
                points: count(n)?,
                mode: mode.unwrap_or(TraversalMode::Loop),
            })
        }
        "eight" | "figure_eight" => {
            let [r, n] = take::<2>(&numbers, "eight <radius> <points-per-lobe>")?;
            Ok(RouteSpec::FigureEight {
                center_x: 0.0,
                center_y: 0.0,
                radius_m: r,
                points_per_lobe: count(n)?,
                mode: mode.unwrap_or(TraversalMode::Loop),
            })
        }
        "goal" => {
            let step = if numbers.len() == 3 { numbers[2] } else { 1.0 };
            let head = numbers.get(..2).ok_or("usage: goal <x> <y> [step]")?;
            let [x, y] = take::<2>(head, "goal <x> <y> [step]")?;
            Ok(RouteSpec::Goal {
                goal_x: x,
                goal_y: y,
                step_m: step,
                mode: mode.unwrap_or(TraversalMode::OneShot),
            })
        }
        other => Err(format!("unknown shape '{}'", other)),
    }
}

/// Numeric arguments plus an optional trailing traversal mode.
fn split_mode(words: &[&str]) -> Result<(Vec<f32>, Option<TraversalMode>), String> {
    let (mode, numeric) = match words.split_last() {
        Some((last, head)) if last.parse::<f32>().is_err() => (Some(parse_mode(last)?), head),
        _ => (None, words),
    };
    let numbers = numeric
        .iter()
        .map(|w| w.parse::<f32>().map_err(|_| format!("'{}' is not a number", w)))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((numbers, mode))
}

fn parse_mode(word: &str) -> Result<TraversalMode, String> {
    match word {
        "loop" => Ok(TraversalMode::Loop),
        "once" | "one_shot" | "oneshot" => Ok(TraversalMode::OneShot),
        "pingpong" | "ping_pong" => Ok(TraversalMode::PingPong),
        other => Err(format!("unknown mode '{}'", other)),
    }
}

fn take<const N: usize>(numbers: &[f32], usage: &str) -> Result<[f32; N], String> {
    numbers
        .try_into()
        .map_err(|_| format!("usage: {}", usage))
}

fn count(value: f32) -> Result<usize, String> {
    if value.fract() == 0.0 && value >= 0.0 {
        Ok(value as usize)
    } else {
        Err(format!("'{}' is not a whole number", value))
    }
}
