//! Headless scenario execution.
//!
//! Three entry points back the command line: [`run_scenario`] plays one
//! scenario and collects [`RunMetrics`], [`verify_scenario`] plays it several
//! times in parallel and compares final state hashes, and [`bench_scenario`]
//! measures tick throughput.

use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::metrics::{MetricsCollector, RunMetrics};
use crate::scenario::{Scenario, ScenarioError};

/// Options for a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Maximum ticks to simulate.
    pub max_ticks: u64,
    /// Stop as soon as only one team is left.
    pub stop_when_decided: bool,
}

impl RunConfig {
    /// Run for exactly `max_ticks`.
    #[must_use]
    pub fn fixed(max_ticks: u64) -> Self {
        Self {
            max_ticks,
            stop_when_decided: false,
        }
    }
}

/// Play one scenario to completion.
pub fn run_scenario(scenario: &Scenario, config: RunConfig) -> Result<RunMetrics, ScenarioError> {
    let mut sim = scenario.build()?;
    let mut collector = MetricsCollector::new(scenario.name.clone(), &sim);

    info!(
        scenario = %scenario.name,
        actors = sim.entities().len(),
        max_ticks = config.max_ticks,
        "Starting run"
    );

    while sim.get_tick() < config.max_ticks {
        let tick = sim.get_tick();
        let events = sim.tick();
        collector.record_tick(tick, &events);

        if config.stop_when_decided && collector.is_decided() {
            debug!(tick, "Run decided, stopping early");
            break;
        }
    }

    let metrics = collector.finish(&sim);
    info!(
        ticks = metrics.duration_ticks,
        winner = ?metrics.winner,
        state_hash = metrics.final_state_hash,
        "Run finished"
    );
    Ok(metrics)
}

/// Result of a determinism verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyReport {
    /// Scenario name.
    pub scenario: String,
    /// Ticks per run.
    pub ticks: u64,
    /// Final state hash of each run.
    pub hashes: Vec<u64>,
}

impl VerifyReport {
    /// Whether every run produced the same hash.
    #[must_use]
    pub fn is_deterministic(&self) -> bool {
        self.hashes.windows(2).all(|w| w[0] == w[1])
    }
}

/// Play the same scenario `runs` times in parallel and compare final hashes.
pub fn verify_scenario(
    scenario: &Scenario,
    runs: u32,
    ticks: u64,
) -> Result<VerifyReport, ScenarioError> {
    let hashes = (0..runs)
        .into_par_iter()
        .map(|run| {
            let metrics = run_scenario(scenario, RunConfig::fixed(ticks))?;
            debug!(run, hash = metrics.final_state_hash, "Verification run complete");
            Ok(metrics.final_state_hash)
        })
        .collect::<Result<Vec<u64>, ScenarioError>>()?;

    let report = VerifyReport {
        scenario: scenario.name.clone(),
        ticks,
        hashes,
    };
    if !report.is_deterministic() {
        warn!(hashes = ?report.hashes, "Runs diverged");
    }
    Ok(report)
}

/// Tick throughput measurement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchReport {
    /// Scenario name.
    pub scenario: String,
    /// Actors at the start.
    pub actors: usize,
    /// Ticks simulated.
    pub ticks: u64,
    /// Wall-clock seconds spent ticking.
    pub elapsed_seconds: f64,
    /// Ticks per wall-clock second.
    pub ticks_per_second: f64,
    /// Slowest single tick in milliseconds.
    pub worst_tick_ms: f64,
    /// Simulated seconds per wall-clock second.
    pub realtime_factor: f64,
}

/// Time `ticks` ticks of a scenario, excluding setup.
pub fn bench_scenario(scenario: &Scenario, ticks: u64) -> Result<BenchReport, ScenarioError> {
    let mut sim = scenario.build()?;
    let actors = sim.entities().len();
    let tick_rate = f64::from(sim.config().tick_rate);

    let mut worst = 0.0f64;
    let started = Instant::now();
    for _ in 0..ticks {
        let tick_started = Instant::now();
        sim.tick();
        worst = worst.max(tick_started.elapsed().as_secs_f64());
    }
    let elapsed = started.elapsed().as_secs_f64();

    let ticks_per_second = if elapsed > 0.0 {
        ticks as f64 / elapsed
    } else {
        f64::INFINITY
    };
    Ok(BenchReport {
        scenario: scenario.name.clone(),
        actors,
        ticks,
        elapsed_seconds: elapsed,
        ticks_per_second,
        worst_tick_ms: worst * 1000.0,
        realtime_factor: ticks_per_second / tick_rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::{ActorPlacement, Order};
    use skirmish_core::components::ActorKind;

    fn duel() -> Scenario {
        Scenario {
            name: "Duel".to_string(),
            actors: vec![
                ActorPlacement::new(ActorKind::Player, 0, (20.0, 20.0), 1),
                ActorPlacement::new(ActorKind::Hostile, 1, (25.0, 20.0), 1),
            ],
            ..Scenario::default()
        }
    }

    #[test]
    fn test_run_collects_metrics() {
        let metrics = run_scenario(&duel(), RunConfig::fixed(40)).unwrap();
        assert_eq!(metrics.duration_ticks, 40);
        assert_eq!(metrics.scenario, "Duel");
        assert_eq!(metrics.teams.len(), 2);
        assert!(metrics.teams.values().any(|t| t.damage_dealt > 0.0));
    }

    #[test]
    fn test_run_stops_when_decided() {
        let config = RunConfig {
            max_ticks: 2000,
            stop_when_decided: true,
        };
        let metrics = run_scenario(&duel(), config).unwrap();
        assert!(metrics.winner.is_some());
        assert!(metrics.duration_ticks < 2000);
        assert_eq!(metrics.standing_teams().len(), 1);
    }

    #[test]
    fn test_move_order_arrives() {
        let scenario = Scenario {
            name: "Walk".to_string(),
            actors: vec![ActorPlacement {
                order: Some(Order::MoveTo((40.0, 20.0))),
                ..ActorPlacement::new(ActorKind::Player, 0, (20.0, 20.0), 1)
            }],
            ..Scenario::default()
        };
        let metrics = run_scenario(&scenario, RunConfig::fixed(200)).unwrap();
        assert_eq!(metrics.teams[&0].arrivals, 1);
        assert_eq!(metrics.paths.complete, 1);
        assert!(metrics.winner.is_none());
    }

    #[test]
    fn test_verify_is_deterministic() {
        let report = verify_scenario(&Scenario::line_battle(12), 3, 120).unwrap();
        assert_eq!(report.hashes.len(), 3);
        assert!(report.is_deterministic());
    }

    #[test]
    fn test_verify_propagates_build_errors() {
        let mut scenario = duel();
        scenario.nav_cell_size = 0.0;
        assert!(verify_scenario(&scenario, 2, 10).is_err());
    }

    #[test]
    fn test_bench_reports_throughput() {
        let report = bench_scenario(&duel(), 20).unwrap();
        assert_eq!(report.ticks, 20);
        assert_eq!(report.actors, 2);
        assert!(report.ticks_per_second > 0.0);
    }
}
