//! Run metrics collection.
//!
//! Folds the per-tick event stream of a headless run into a JSON-friendly
//! summary: per-team combat totals, path planner activity and a short log of
//! notable events.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use skirmish_core::components::EntityId;
use skirmish_core::planner::PathStatus;
use skirmish_core::simulation::{Simulation, TickEvents};
use skirmish_core::targeting::TargetChange;

/// Complete metrics for a single run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunMetrics {
    /// Scenario name.
    pub scenario: String,
    /// Ticks simulated.
    pub duration_ticks: u64,
    /// Team left standing alone, if the fight was decided.
    pub winner: Option<u8>,
    /// Per-team metrics keyed by team index.
    pub teams: BTreeMap<u8, TeamMetrics>,
    /// Path planner activity.
    pub paths: PathMetrics,
    /// Timed events log.
    pub events: Vec<TimedEvent>,
    /// Final simulation state hash (for determinism validation).
    pub final_state_hash: u64,
}

impl RunMetrics {
    /// Teams with at least one surviving actor.
    #[must_use]
    pub fn standing_teams(&self) -> Vec<u8> {
        self.teams
            .values()
            .filter(|team| team.survivors > 0)
            .map(|team| team.team)
            .collect()
    }
}

/// Metrics for one team.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TeamMetrics {
    /// Team index.
    pub team: u8,
    /// Actors present at the start.
    pub spawned: u32,
    /// Actors alive at the end.
    pub survivors: u32,
    /// Actors lost.
    pub deaths: u32,
    /// Enemy actors killed by the team's last hit.
    pub kills: u32,
    /// Total damage dealt.
    pub damage_dealt: f64,
    /// Total damage taken.
    pub damage_taken: f64,
    /// Ranged strikes fired.
    pub shots_fired: u32,
    /// Targets acquired.
    pub acquisitions: u32,
    /// Movement orders completed.
    pub arrivals: u32,
    /// Tick of the team's first strike.
    pub first_strike_tick: Option<u64>,
}

impl TeamMetrics {
    /// Create empty metrics for a team.
    #[must_use]
    pub fn new(team: u8) -> Self {
        Self {
            team,
            ..Default::default()
        }
    }

    /// Kill/death ratio; infinite when the team lost nothing but killed.
    #[must_use]
    pub fn kd_ratio(&self) -> f64 {
        if self.deaths > 0 {
            f64::from(self.kills) / f64::from(self.deaths)
        } else if self.kills > 0 {
            f64::INFINITY
        } else {
            1.0
        }
    }
}

/// Path planner totals.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathMetrics {
    /// Requests served.
    pub requests: u64,
    /// Routes reaching the destination.
    pub complete: u64,
    /// Routes stopping short.
    pub partial: u64,
    /// Requests with no route.
    pub failed: u64,
    /// Ticks on which the budget deferred at least one request.
    pub budget_exhausted_ticks: u64,
    /// Largest number of requests deferred on one tick.
    pub peak_deferred: usize,
}

/// A timed event during the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimedEvent {
    /// Tick when the event occurred.
    pub tick: u64,
    /// Type of event.
    pub event_type: EventType,
    /// Team involved.
    pub team: u8,
    /// Event details.
    pub details: String,
}

/// Types of events that can be recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    /// First strike by any team.
    FirstContact,
    /// An actor was killed.
    ActorKilled,
    /// Only one team is left standing.
    Decided,
}

/// Accumulates [`RunMetrics`] tick by tick.
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    metrics: RunMetrics,
    team_of: HashMap<EntityId, u8>,
    last_attacker: HashMap<EntityId, EntityId>,
}

impl MetricsCollector {
    /// Start collecting for a freshly built simulation.
    #[must_use]
    pub fn new(scenario: impl Into<String>, sim: &Simulation) -> Self {
        let mut metrics = RunMetrics {
            scenario: scenario.into(),
            ..Default::default()
        };
        let mut team_of = HashMap::new();

        for (&id, entity) in sim.entities().iter() {
            if entity.projectile.is_some() {
                continue;
            }
            let team = entity.team.0;
            team_of.insert(id, team);
            let entry = metrics
                .teams
                .entry(team)
                .or_insert_with(|| TeamMetrics::new(team));
            entry.spawned += 1;
            entry.survivors += 1;
        }

        Self {
            metrics,
            team_of,
            last_attacker: HashMap::new(),
        }
    }

    /// Fold one tick's events in. `tick` is the tick the events came from.
    pub fn record_tick(&mut self, tick: u64, events: &TickEvents) {
        for damage in &events.damage_events {
            let amount = damage.amount.to_num::<f64>();
            self.last_attacker.insert(damage.target, damage.attacker);
            let first_contact = self
                .metrics
                .teams
                .values()
                .all(|team| team.first_strike_tick.is_none());

            if let Some(team) = self.team(damage.attacker) {
                let attacker = self.team_mut(team);
                attacker.damage_dealt += amount;
                if damage.ranged {
                    attacker.shots_fired += 1;
                }
                attacker.first_strike_tick.get_or_insert(tick);
                if first_contact {
                    self.log(tick, EventType::FirstContact, team, || {
                        format!("{} struck {}", damage.attacker, damage.target)
                    });
                }
            }
            if let Some(team) = self.team(damage.target) {
                self.team_mut(team).damage_taken += amount;
            }
        }

        for &dead in &events.deaths {
            let Some(team) = self.team(dead) else {
                continue;
            };
            let victim = self.team_mut(team);
            victim.deaths += 1;
            victim.survivors = victim.survivors.saturating_sub(1);

            let killer = self.last_attacker.remove(&dead);
            if let Some(killer_team) = killer.and_then(|k| self.team(k)) {
                self.team_mut(killer_team).kills += 1;
            }
            self.log(tick, EventType::ActorKilled, team, || match killer {
                Some(killer) => format!("{dead} killed by {killer}"),
                None => format!("{dead} died"),
            });
        }

        for (actor, change) in &events.target_changes {
            if let (TargetChange::Acquired(_), Some(team)) = (change, self.team(*actor)) {
                self.team_mut(team).acquisitions += 1;
            }
        }

        for arrival in &events.arrivals {
            if let Some(team) = self.team(arrival.entity) {
                self.team_mut(team).arrivals += 1;
            }
        }

        let paths = &mut self.metrics.paths;
        for result in &events.path_results {
            paths.requests += 1;
            match result.status {
                PathStatus::Complete => paths.complete += 1,
                PathStatus::Partial => paths.partial += 1,
                PathStatus::Failed(_) => paths.failed += 1,
            }
        }
        if events.deferred_paths > 0 {
            paths.budget_exhausted_ticks += 1;
            paths.peak_deferred = paths.peak_deferred.max(events.deferred_paths);
        }

        if !events.deaths.is_empty() && self.metrics.winner.is_none() {
            let standing = self.metrics.standing_teams();
            if let &[winner] = standing.as_slice() {
                if self.metrics.teams.len() > 1 {
                    self.metrics.winner = Some(winner);
                    self.log(tick, EventType::Decided, winner, || {
                        format!("team {winner} is the last one standing")
                    });
                }
            }
        }
    }

    /// Whether only one of several teams is left.
    #[must_use]
    pub fn is_decided(&self) -> bool {
        self.metrics.winner.is_some()
    }

    /// Metrics gathered so far.
    #[must_use]
    pub fn metrics(&self) -> &RunMetrics {
        &self.metrics
    }

    /// Finish the run.
    #[must_use]
    pub fn finish(mut self, sim: &Simulation) -> RunMetrics {
        self.metrics.duration_ticks = sim.get_tick();
        self.metrics.final_state_hash = sim.state_hash();
        self.metrics
    }

    fn team(&self, id: EntityId) -> Option<u8> {
        self.team_of.get(&id).copied()
    }

    fn team_mut(&mut self, team: u8) -> &mut TeamMetrics {
        self.metrics
            .teams
            .entry(team)
            .or_insert_with(|| TeamMetrics::new(team))
    }

    fn log(&mut self, tick: u64, event_type: EventType, team: u8, details: impl FnOnce() -> String) {
        self.metrics.events.push(TimedEvent {
            tick,
            event_type,
            team,
            details: details(),
        });
    }
}
