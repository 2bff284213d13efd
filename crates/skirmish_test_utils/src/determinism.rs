//! Lockstep determinism checks.
//!
//! Everything here boils a simulation down to `u64` state hashes and compares
//! them: across repeated runs, across threads, tick by tick, and across a
//! snapshot/restore boundary.
//!
//! What keeps a tick reproducible:
//!
//! - simulation math is [`skirmish_core::math::Fixed`], never host floats
//! - stages walk entities in sorted id order, not hash map order
//! - per-actor results from rayon are applied sequentially by id
//! - wander points come from a ChaCha RNG seeded by id and tick
//!
//! A failing check names the tick where two runs first disagree, which is
//! usually enough to find the stage at fault.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::panic;
use std::thread;

use skirmish_core::simulation::Simulation;

/// Final hashes of several runs of the same setup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismReport {
    /// One final hash per run, in run order.
    pub hashes: Vec<u64>,
    /// Ticks every run simulated.
    pub ticks: u64,
}

impl DeterminismReport {
    /// True when every run ended on the same hash.
    #[must_use]
    pub fn is_deterministic(&self) -> bool {
        self.distinct().len() <= 1
    }

    /// Hashes with duplicates removed, sorted.
    #[must_use]
    pub fn distinct(&self) -> Vec<u64> {
        let mut distinct = self.hashes.clone();
        distinct.sort_unstable();
        distinct.dedup();
        distinct
    }

    /// Panic with every run's hash unless all runs agree.
    ///
    /// # Panics
    ///
    /// Panics if two runs ended on different hashes.
    pub fn assert_deterministic(&self) {
        assert!(
            self.is_deterministic(),
            "{} runs of {} ticks ended on {} different hashes: {:?}",
            self.hashes.len(),
            self.ticks,
            self.distinct().len(),
            self.hashes
        );
    }
}

/// Where two runs first disagreed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Divergence {
    /// Ticks completed when the hashes differed (0 = right after setup).
    pub tick: u64,
    /// Hash of the first run.
    pub left: u64,
    /// Hash of the second run.
    pub right: u64,
}

/// Run `setup` `runs` times, stepping each `ticks` times, and hash the results.
///
/// Generic over the state so the same harness covers whole simulations and
/// single stages.
///
/// ```
/// use skirmish_test_utils::determinism::repeat_runs;
/// use skirmish_test_utils::fixtures::battle_scenario;
///
/// let report = repeat_runs(
///     3,
///     50,
///     || battle_scenario(4),
///     |sim| { sim.tick(); },
///     |sim| sim.state_hash(),
/// );
/// report.assert_deterministic();
/// ```
pub fn repeat_runs<S>(
    runs: usize,
    ticks: u64,
    setup: impl Fn() -> S,
    step: impl Fn(&mut S),
    hash: impl Fn(&S) -> u64,
) -> DeterminismReport {
    let hashes = (0..runs)
        .map(|_| {
            let mut state = setup();
            (0..ticks).for_each(|_| step(&mut state));
            hash(&state)
        })
        .collect();
    DeterminismReport { hashes, ticks }
}

/// Run a simulation setup `runs` times on the calling thread.
pub fn check_simulation(
    runs: usize,
    ticks: u64,
    setup: impl Fn() -> Simulation,
) -> DeterminismReport {
    repeat_runs(
        runs,
        ticks,
        setup,
        |sim| {
            sim.tick();
        },
        Simulation::state_hash,
    )
}

/// Run a simulation setup on `threads` scoped threads at once.
///
/// Each simulation fans its per-actor stages out over the shared rayon pool,
/// so the runs contend with each other.
///
/// # Panics
///
/// Re-raises a panic from any of the runs.
pub fn check_threaded(
    threads: usize,
    ticks: u64,
    setup: impl Fn() -> Simulation + Sync,
) -> DeterminismReport {
    let setup = &setup;
    let hashes = thread::scope(|scope| {
        let workers: Vec<_> = (0..threads)
            .map(|_| {
                scope.spawn(move || {
                    let mut sim = setup();
                    (0..ticks).for_each(|_| {
                        sim.tick();
                    });
                    sim.state_hash()
                })
            })
            .collect();

        workers
            .into_iter()
            .map(|worker| worker.join().unwrap_or_else(|e| panic::resume_unwind(e)))
            .collect()
    });
    DeterminismReport { hashes, ticks }
}

/// Hash after setup and after each of `ticks` ticks.
pub fn hash_trail(ticks: u64, setup: impl FnOnce() -> Simulation) -> Vec<u64> {
    let mut sim = setup();
    let mut trail = Vec::with_capacity(usize::try_from(ticks).unwrap_or(0) + 1);
    trail.push(sim.state_hash());
    for _ in 0..ticks {
        sim.tick();
        trail.push(sim.state_hash());
    }
    trail
}

/// Step two copies of a setup side by side and report the first mismatch.
pub fn first_divergence(ticks: u64, setup: impl Fn() -> Simulation) -> Option<Divergence> {
    let left = hash_trail(ticks, &setup);
    let right = hash_trail(ticks, &setup);
    left.iter()
        .zip(&right)
        .zip(0u64..)
        .find(|((l, r), _)| l != r)
        .map(|((&left, &right), tick)| Divergence { tick, left, right })
}

/// Tick `before` times, round-trip through bincode, then tick the original
/// and the copy `after` more times each.
///
/// # Errors
///
/// Describes the first step that failed or disagreed.
pub fn check_snapshot_restore(
    before: u64,
    after: u64,
    setup: impl FnOnce() -> Simulation,
) -> Result<(), String> {
    let mut original = setup();
    for _ in 0..before {
        original.tick();
    }

    let bytes = original.serialize().map_err(|e| e.to_string())?;
    let mut restored = Simulation::deserialize(&bytes).map_err(|e| e.to_string())?;
    if restored.state_hash() != original.state_hash() {
        return Err(format!("restored state differs at tick {before}"));
    }

    for offset in 1..=after {
        original.tick();
        restored.tick();
        if restored.state_hash() != original.state_hash() {
            return Err(format!("restored copy drifted at tick {}", before + offset));
        }
    }
    Ok(())
}

/// Hash any hashable value with the std hasher.
pub fn hash_of<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{battle_scenario, movement_scenario, point, spawn_unit, walled_scenario};
    use crate::strategies;
    use proptest::prelude::*;
    use skirmish_core::components::Command;

    #[test]
    fn test_report_detects_mismatch() {
        let report = DeterminismReport {
            hashes: vec![4, 4, 9],
            ticks: 1,
        };
        assert!(!report.is_deterministic());
        assert_eq!(report.distinct(), vec![4, 9]);
    }

    #[test]
    #[should_panic(expected = "different hashes")]
    fn test_assert_panics_on_mismatch() {
        DeterminismReport {
            hashes: vec![1, 2],
            ticks: 3,
        }
        .assert_deterministic();
    }

    #[test]
    fn test_repeat_runs_on_plain_state() {
        let report = repeat_runs(3, 10, || 0u64, |n| *n += 7, |n| *n);
        assert!(report.is_deterministic());
        assert_eq!(report.distinct(), vec![70]);
    }

    #[test]
    fn test_empty_simulation() {
        check_simulation(2, 100, Simulation::new).assert_deterministic();
    }

    #[test]
    fn test_battle_never_diverges() {
        assert_eq!(first_divergence(150, || battle_scenario(6)), None);
    }

    #[test]
    fn test_hash_trail_moves_every_tick() {
        let trail = hash_trail(5, || battle_scenario(2));
        assert_eq!(trail.len(), 6);
        // Tick count is part of the hash.
        assert!(trail.windows(2).all(|w| w[0] != w[1]));
    }

    #[test]
    fn test_battle_repeats() {
        check_simulation(3, 300, || battle_scenario(8)).assert_deterministic();
    }

    #[test]
    fn test_walled_scenario_repeats() {
        check_simulation(2, 300, walled_scenario).assert_deterministic();
    }

    #[test]
    fn test_threaded_battles_agree() {
        check_threaded(4, 200, || battle_scenario(10)).assert_deterministic();
    }

    #[test]
    fn test_threaded_movement_agrees() {
        check_threaded(4, 300, || movement_scenario(20)).assert_deterministic();
    }

    #[test]
    fn test_snapshot_restore_mid_battle() {
        assert_eq!(check_snapshot_restore(80, 20, || battle_scenario(6)), Ok(()));
    }

    #[test]
    fn test_hash_of_is_stable() {
        assert_eq!(hash_of(&(1u64, 2u64)), hash_of(&(1u64, 2u64)));
        assert_ne!(hash_of(&1u64), hash_of(&2u64));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn prop_random_actors_repeat(actors in strategies::arb_actor_list(12)) {
            let setup = move || {
                let mut sim = Simulation::new();
                for params in &actors {
                    sim.spawn_actor(params.clone());
                }
                sim
            };
            prop_assert!(check_simulation(2, 120, setup).is_deterministic());
        }

        #[test]
        fn prop_command_scripts_replay(commands in strategies::arb_command_sequence(8)) {
            // One command every 10 ticks, then 40 ticks to settle.
            let setup = move || {
                let mut sim = Simulation::new();
                let unit = spawn_unit(&mut sim, point(128, 128));
                for command in &commands {
                    let _ = sim.issue_command(unit, *command);
                    (0..10).for_each(|_| {
                        sim.tick();
                    });
                }
                sim
            };
            prop_assert!(check_simulation(2, 40, setup).is_deterministic());
        }

        #[test]
        fn prop_snapshot_restore_anywhere(pairs in 1i32..6, before in 0u64..60) {
            prop_assert_eq!(check_snapshot_restore(before, 10, || battle_scenario(pairs)), Ok(()));
        }

        #[test]
        fn prop_move_orders_never_diverge(target in strategies::arb_vec2_position()) {
            let setup = move || {
                let mut sim = Simulation::new();
                let unit = spawn_unit(&mut sim, point(20, 20));
                let _ = sim.issue_command(unit, Command::MoveTo(target));
                sim
            };
            prop_assert_eq!(first_divergence(80, setup), None);
        }
    }

    #[test]
    #[ignore = "Long-running stress test"]
    fn stress_large_battle() {
        check_simulation(3, 1000, || battle_scenario(200)).assert_deterministic();
    }

    #[test]
    #[ignore = "Long-running stress test"]
    fn stress_many_threads() {
        check_threaded(16, 1000, || battle_scenario(40)).assert_deterministic();
    }
}
