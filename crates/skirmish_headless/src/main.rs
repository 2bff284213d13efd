//! Headless skirmish runner.
//!
//! Runs scenarios without graphics and reports JSON on stdout.
//!
//! # Usage
//!
//! ```bash
//! # Run a scenario and print metrics
//! cargo run -p skirmish_headless -- run --scenario line_battle --ticks 2400
//!
//! # Stop as soon as one team is wiped out, write metrics to a file
//! cargo run -p skirmish_headless -- run --scenario gate.ron --until-decided --output out.json
//!
//! # Verify determinism across parallel runs
//! cargo run -p skirmish_headless -- verify --scenario large_battle --runs 8
//!
//! # Measure tick throughput
//! cargo run -p skirmish_headless -- bench --scenario large_battle --ticks 1200
//! ```
//!
//! Scenarios are built-in names (`line_battle`, `large_battle`,
//! `walled_crossing`) or paths to RON files. Logs go to stderr.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use skirmish_headless::{
    runner::{bench_scenario, run_scenario, verify_scenario, RunConfig},
    scenario::Scenario,
};

#[derive(Parser)]
#[command(name = "skirmish_headless")]
#[command(about = "Headless skirmish runner for CI and tuning")]
#[command(version)]
struct Cli {
    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario and report metrics
    Run {
        /// Built-in scenario name or RON file
        #[arg(short, long, default_value = "line_battle")]
        scenario: String,

        /// Ticks to run (defaults to the scenario's own length)
        #[arg(short, long)]
        ticks: Option<u64>,

        /// Stop once only one team is left
        #[arg(long)]
        until_decided: bool,

        /// Write metrics JSON here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Verify determinism by running the same scenario multiple times
    Verify {
        /// Built-in scenario name or RON file
        #[arg(short, long, default_value = "line_battle")]
        scenario: String,

        /// Number of verification runs
        #[arg(short, long, default_value = "4")]
        runs: u32,

        /// Ticks per run (defaults to the scenario's own length)
        #[arg(short, long)]
        ticks: Option<u64>,
    },

    /// Run N ticks for benchmarking
    Bench {
        /// Built-in scenario name or RON file
        #[arg(short, long, default_value = "large_battle")]
        scenario: String,

        /// Number of ticks to run
        #[arg(short, long, default_value = "1200")]
        ticks: u64,
    },
}

fn main() {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries JSON
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(true),
        )
        .with(filter)
        .init();

    let code = match cli.command {
        Commands::Run {
            scenario,
            ticks,
            until_decided,
            output,
        } => cmd_run(&scenario, ticks, until_decided, output),
        Commands::Verify {
            scenario,
            runs,
            ticks,
        } => cmd_verify(&scenario, runs, ticks),
        Commands::Bench { scenario, ticks } => cmd_bench(&scenario, ticks),
    };
    std::process::exit(code);
}

fn load(name: &str) -> Option<Scenario> {
    match Scenario::resolve(name) {
        Ok(scenario) => Some(scenario),
        Err(e) => {
            tracing::error!(error = %e, scenario = name, "Failed to load scenario");
            eprintln!("FATAL: {e}");
            None
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> i32 {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            println!("{json}");
            0
        }
        Err(e) => {
            eprintln!("FATAL: Failed to encode output: {e}");
            1
        }
    }
}

/// Run a scenario and report metrics
fn cmd_run(name: &str, ticks: Option<u64>, until_decided: bool, output: Option<PathBuf>) -> i32 {
    let Some(scenario) = load(name) else {
        return 1;
    };
    let config = RunConfig {
        max_ticks: ticks.unwrap_or(scenario.ticks),
        stop_when_decided: until_decided,
    };

    let metrics = match run_scenario(&scenario, config) {
        Ok(metrics) => metrics,
        Err(e) => {
            tracing::error!(error = %e, "Run failed");
            eprintln!("FATAL: {e}");
            return 1;
        }
    };

    let Some(path) = output else {
        return print_json(&metrics);
    };
    let written = serde_json::to_string_pretty(&metrics)
        .map_err(std::io::Error::other)
        .and_then(|json| std::fs::write(&path, json));
    match written {
        Ok(()) => {
            tracing::info!(path = %path.display(), "Metrics written");
            0
        }
        Err(e) => {
            tracing::error!(error = %e, path = %path.display(), "Failed to save metrics");
            eprintln!("FATAL: Failed to save metrics: {e}");
            1
        }
    }
}

/// Verify determinism
fn cmd_verify(name: &str, runs: u32, ticks: Option<u64>) -> i32 {
    let Some(scenario) = load(name) else {
        return 1;
    };
    let ticks = ticks.unwrap_or(scenario.ticks);
    tracing::info!(scenario = %scenario.name, runs, ticks, "Verifying determinism");

    match verify_scenario(&scenario, runs, ticks) {
        Ok(report) => {
            let code = print_json(&report);
            if report.is_deterministic() {
                eprintln!("PASS: {} runs produced identical hashes", report.hashes.len());
                code
            } else {
                eprintln!("FAIL: runs diverged");
                1
            }
        }
        Err(e) => {
            eprintln!("FATAL: {e}");
            1
        }
    }
}

/// Benchmark tick throughput
fn cmd_bench(name: &str, ticks: u64) -> i32 {
    let Some(scenario) = load(name) else {
        return 1;
    };

    match bench_scenario(&scenario, ticks) {
        Ok(report) => {
            eprintln!(
                "{} actors, {} ticks in {:.2}s ({:.0} ticks/s, {:.1}x realtime, worst tick {:.2}ms)",
                report.actors,
                report.ticks,
                report.elapsed_seconds,
                report.ticks_per_second,
                report.realtime_factor,
                report.worst_tick_ms
            );
            print_json(&report)
        }
        Err(e) => {
            eprintln!("FATAL: {e}");
            1
        }
    }
}
