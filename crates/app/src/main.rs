//! Verdict - headless decision-room runner
//!
//! Opens the configured store and plays one scripted room through every
//! phase with several simulated clients, then prints the outcome.
//!
//! Usage: `verdict-app [CONFIG] [--json]`. The config path falls back to
//! `VERDICT_CONFIG`, then to `verdict.toml` in the working directory.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use verdict_core::{EngineConfig, SqliteStore, Store};

mod simulation;

use simulation::{Report, SimulationConfig};

fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut json = false;
    let mut config_path = None;
    for arg in std::env::args().skip(1) {
        if arg == "--json" {
            json = true;
        } else {
            config_path = Some(PathBuf::from(arg));
        }
    }
    let config_path = config_path
        .or_else(|| std::env::var_os("VERDICT_CONFIG").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("verdict.toml"));

    info!("Starting Verdict");

    let config = match EngineConfig::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            std::process::exit(1);
        }
    };

    let store: Arc<dyn Store> = match SqliteStore::open(&config) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("Failed to open store: {}", e);
            std::process::exit(1);
        }
    };

    let result = runtime.block_on(simulation::run(
        store,
        &config,
        &SimulationConfig::default(),
    ));

    match result {
        Ok(report) => print_report(&report, json),
        Err(e) => {
            error!("Session failed: {}", e);
            std::process::exit(1);
        }
    }
}

fn print_report(report: &Report, json: bool) {
    if json {
        match report.snapshot.to_json() {
            Ok(out) => println!("{out}"),
            Err(e) => {
                error!("Failed to encode snapshot: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    println!("Room {} ({})", report.room.name, report.room.code);
    if let Some(tally) = &report.tally {
        for option in &report.snapshot.options {
            println!("  {:<12} {}", option.text, tally.count(option.id));
        }
    }
    match &report.winner {
        Some(winner) if report.decision.tie_breaker_used => {
            println!("Winner: {winner} (tie broken)")
        }
        Some(winner) => println!("Winner: {winner}"),
        None => println!("No winner"),
    }
}
