//! Headless scenario runner for CI verification and tuning.
//!
//! Loads a scenario (bounds, obstacles, actor groups with standing orders,
//! optional simulation tuning), ticks the deterministic core without any
//! presentation layer, and reports what happened:
//!
//! - **Runs**: per-team combat totals, path planner activity, final state hash
//! - **Verification**: N parallel runs of one scenario must hash identically
//! - **Benchmarks**: ticks per second for a scenario
//!
//! # Example
//!
//! ```bash
//! # Run a built-in scenario and print JSON metrics
//! cargo run -p skirmish_headless -- run --scenario line_battle
//!
//! # Run a scenario file
//! cargo run -p skirmish_headless -- run --scenario crates/skirmish_headless/scenarios/gate_defense.ron
//!
//! # Verify determinism
//! cargo run -p skirmish_headless -- verify --scenario large_battle --runs 8
//! ```

pub mod metrics;
pub mod runner;
pub mod scenario;

pub use metrics::{MetricsCollector, RunMetrics, TeamMetrics};
pub use runner::{bench_scenario, run_scenario, verify_scenario, BenchReport, RunConfig, VerifyReport};
pub use scenario::{Scenario, ScenarioError};
