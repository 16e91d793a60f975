//! `chassisd` – chassis status daemon
//!
//! This binary runs the status pipeline against an in-process simulated
//! chassis.  It:
//!
//! 1. Loads `~/.chassisd/config.toml` (or `--config PATH`), writing the
//!    defaults there on first run.
//! 2. Initialises logging and optional OTLP span export.
//! 3. Drives the [`Scheduler`] every tick period and prints every bus event.
//! 4. Intercepts **Ctrl-C** to drain pending commands and exit cleanly.
//!
//! ```text
//! chassisd [--config PATH] [--ticks N] [--slots N]
//! ```

mod config;

use clap::Parser;
use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

use chassis_hal::SimChassis;
use chassis_middleware::{EventBus, TopicReceiver};
use chassis_runtime::{Scheduler, init_tracing};
use chassis_types::{EventPayload, SystemClock};

/// Chassis status synchronization daemon.
#[derive(Parser, Debug)]
#[command(name = "chassisd", version)]
#[command(about = "Chassis status synchronization daemon", long_about = None)]
struct Args {
    /// Config file (default: ~/.chassisd/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Stop after this many scheduler steps
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    ticks: Option<u64>,

    /// Override the number of simulated controller slots
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..))]
    slots: Option<u8>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    // ── Configuration ─────────────────────────────────────────────────────
    let config_path = args.config.clone().unwrap_or_else(config::config_path);
    let mut cfg = match config::load_from(&config_path) {
        Ok(Some(cfg)) => cfg,
        Ok(None) => {
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            match config::save_to(&config::Config::default(), &config_path) {
                Ok(()) => println!(
                    "  {} Default config written to {}",
                    "✓".green().bold(),
                    config_path.display().to_string().bold()
                ),
                Err(e) => println!("{}: {}", "Error saving config".red(), e),
            }
            cfg
        }
        Err(e) => {
            eprintln!("{}: {}", "Config error".red(), e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(slots) = args.slots {
        cfg.sim.slots = slots;
    }
    if cfg.sim.local_slot >= cfg.sim.slots {
        eprintln!(
            "{}: local slot {} does not exist in a {}-slot chassis",
            "Config error".red(),
            cfg.sim.local_slot,
            cfg.sim.slots
        );
        return ExitCode::FAILURE;
    }

    // ── Structured logging ────────────────────────────────────────────────
    // Installed before the Tokio runtime exists; see telemetry.
    let _telemetry = init_tracing("chassisd", &cfg.telemetry);

    print_banner(&config_path);

    // ── Shared shutdown flag ──────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – draining and shutting down …".yellow().bold());
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; Ctrl-C will not shut down cleanly");
    }

    // ── Pipeline ──────────────────────────────────────────────────────────
    let sim = SimChassis::builder()
        .clock(Arc::new(SystemClock))
        .slots(cfg.sim.slots)
        .local_slot(cfg.sim.local_slot)
        .psus(cfg.sim.psus)
        .fans(cfg.sim.fans)
        .temperature_sensors(cfg.sim.temperature_sensors)
        .build();
    let bus = EventBus::default();
    let events = bus.subscribe_all();

    let mut scheduler =
        match Scheduler::new(cfg.chassis, Box::new(sim), Arc::new(SystemClock), bus) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("{}: {}", "Config error".red(), e);
                return ExitCode::FAILURE;
            }
        };

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{}: {}", "Failed to start runtime".red(), e);
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(async move {
        let printer = tokio::spawn(print_events(events));
        let result = scheduler.run(shutdown, args.ticks).await;
        let final_state = scheduler.state();
        // Dropping the scheduler closes the bus and ends the printer.
        drop(scheduler);
        let _ = printer.await;
        result.map(|steps| (steps, final_state))
    });

    match result {
        Ok((steps, state)) => {
            info!(steps, %state, "chassisd exiting");
            println!("\n  {} {} steps, final state {}", "✓".green().bold(), steps, state);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}: {}", "Scheduler error".red(), e);
            ExitCode::FAILURE
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Event printer
// ─────────────────────────────────────────────────────────────────────────────

async fn print_events(mut events: TopicReceiver) {
    while let Some(event) = events.next().await {
        let ts = event.timestamp.format("%H:%M:%S").to_string().dimmed();
        match event.payload {
            EventPayload::ComponentChanged(c) => println!(
                "  {ts} {} {}[{}] @{} → {} (rev {})",
                "change".cyan(),
                c.family,
                c.index,
                c.location,
                c.status,
                c.revision
            ),
            EventPayload::LifecycleTransition { from, to } => {
                println!("  {ts} {} {from} → {}", "state ".bold(), to.to_string().bold())
            }
            EventPayload::FupGranted {
                holder,
                reclaimed_from,
                ..
            } => match reclaimed_from {
                Some(from) => println!("  {ts} {} {holder} (reclaimed from {from})", "fup   ".yellow()),
                None => println!("  {ts} {} {holder}", "fup   ".green()),
            },
            EventPayload::FupReleased { holder, .. } => {
                println!("  {ts} {} released by {holder}", "fup   ".green())
            }
            EventPayload::CommandCompleted { command_id, outcome } => {
                let label = if outcome.is_success() {
                    "cmd   ".green()
                } else {
                    "cmd   ".red()
                };
                println!("  {ts} {label} {command_id} {outcome:?}")
            }
            EventPayload::HardwareFault { component, message, .. } => {
                println!("  {ts} {} {component}: {message}", "fault ".red().bold())
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner(config_path: &std::path::Path) {
    println!();
    println!("  {} {}",
        "chassisd".bold().cyan(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Chassis status synchronization daemon");
    println!("  Config: {}", config_path.display().to_string().dimmed());
    println!();
}
