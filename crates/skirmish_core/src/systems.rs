//! Simulation systems.
//!
//! The [`Pipeline`] runs one tick over the entity table in a fixed stage
//! order. Per-actor stages (targeting, integration, attacks) gather their
//! inputs in ascending id order, compute results in parallel from a
//! read-only [`Snapshot`], and write them back in the same order, so the
//! outcome never depends on thread scheduling.
//!
//! Stage order:
//!
//! 1. Projectile aging and aggro lock countdown
//! 2. Snapshot and spatial hashes
//! 3. Targeting (hostiles, then player units)
//! 4. Budgeted path planning
//! 5. Path following
//! 6. Movement integration
//! 7. Arrival detection
//! 8. Attack resolution against a post-movement snapshot
//! 9. Damage reactions, damage application, death removal

use rayon::prelude::*;

use crate::attack::{self, AttackContext, AttackOutcome, AttackState, Strike};
use crate::components::{
    ActorKind, DamageEntry, EntityId, Intent, MovementGoal, Position, Projectile, Velocity,
};
use crate::config::SimConfig;
use crate::error::NavError;
use crate::math::{Fixed, Vec2Fixed};
use crate::movement::{self, MotionState, MovementContext};
use crate::navigation::NavigationService;
use crate::obstacles::ObstacleQuery;
use crate::planner::{self, PathPlanner, PathResult, PathStatus};
use crate::simulation::{Entity, EntityStorage, TickEvents};
use crate::snapshot::{ActorSnapshot, Snapshot};
use crate::spatial::SpatialHash;
use crate::targeting::{self, TargetChange, TargetingContext, TargetingOutcome, TargetingState};

/// Damage queued on a target this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DamageEvent {
    /// Entity that attacked.
    pub attacker: EntityId,
    /// Entity that was hit.
    pub target: EntityId,
    /// Damage after defense.
    pub amount: Fixed,
    /// Whether the hit came from a ranged attack.
    pub ranged: bool,
}

/// An actor reached the end of its path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arrival {
    /// Actor that arrived.
    pub entity: EntityId,
    /// Where it stopped.
    pub position: Vec2Fixed,
}

/// Everything one tick needs besides the mutable state.
pub struct Pipeline<'a> {
    /// Tuning.
    pub config: &'a SimConfig,
    /// Path queries.
    pub nav: &'a dyn NavigationService,
    /// Static geometry for wall sliding.
    pub obstacles: &'a dyn ObstacleQuery,
    /// Tick being simulated.
    pub tick: u64,
    /// Simulation time at the start of the tick.
    pub time: Fixed,
}

impl Pipeline<'_> {
    /// Run every stage once.
    pub fn run(&self, entities: &mut EntityStorage, planner: &mut PathPlanner) -> TickEvents {
        let mut events = TickEvents::default();
        let dt = self.config.dt();

        age_projectiles(entities);
        tick_aggro_locks(entities, dt);

        let snapshot = take_snapshot(entities);
        let hash = snapshot.targeting_hash(self.config.targeting.cell_size);
        self.run_targeting(entities, &snapshot, &hash, &mut events);

        let report = {
            let dirty = dirty_goals(entities);
            planner.run(&dirty, &self.config.planner, |id| self.serve_path(entities, id))
        };
        events.path_results = report.served;
        events.deferred_paths = report.deferred;

        follow_paths(entities);

        let avoidance = snapshot.avoidance_hash(self.config.steering.avoidance_cell_size);
        self.run_movement(entities, &avoidance);
        self.run_arrival(entities, &mut events);

        let after_move = take_snapshot(entities);
        for strike in self.run_attacks(entities, &after_move) {
            self.deliver(entities, &after_move, strike, &mut events);
        }

        react_to_damage(entities, &after_move);
        events.deaths = apply_damage(entities);
        for &dead in &events.deaths {
            entities.remove(dead);
            tracing::debug!(entity = dead, tick = self.tick, "actor died");
        }

        events
    }

    fn run_targeting(
        &self,
        entities: &mut EntityStorage,
        snapshot: &Snapshot,
        hash: &SpatialHash,
        events: &mut TickEvents,
    ) {
        let ctx = TargetingContext {
            tick: self.tick,
            time: self.time,
            config: self.config,
            snapshot,
            hash,
        };
        let ids = entities.sorted_ids();

        // Hostiles and units never share a record, but the passes stay
        // sequential so each one sees a settled table.
        for kind in [ActorKind::Hostile, ActorKind::Player] {
            let states: Vec<TargetingState> = ids
                .iter()
                .filter_map(|&id| entities.get(id))
                .filter(|entity| entity.kind == kind && entity.is_alive())
                .filter_map(targeting_state)
                .collect();
            let outcomes: Vec<TargetingOutcome> = states
                .par_iter()
                .map(|state| targeting::resolve(&ctx, *state))
                .collect();

            for outcome in outcomes {
                let state = outcome.state;
                let Some(entity) = entities.get_mut(state.id) else {
                    continue;
                };
                entity.aggro_target = Some(state.target);
                entity.aggro_lock = Some(state.lock);
                if let Some(goal) = entity.movement_goal.as_mut() {
                    *goal = state.goal;
                }
                if entity.orders.is_some() {
                    entity.orders = state.orders;
                }
                if outcome.searched {
                    events.searches.push(state.id);
                }
                if let Some(change) = outcome.change {
                    match change {
                        TargetChange::Acquired(target) => {
                            tracing::debug!(entity = state.id, target, "target acquired");
                        }
                        TargetChange::Lost(target) => {
                            tracing::debug!(entity = state.id, target, "target lost");
                        }
                    }
                    events.target_changes.push((state.id, change));
                }
            }
        }
    }

    fn serve_path(&self, entities: &mut EntityStorage, id: EntityId) -> PathResult {
        let not_served = PathResult {
            actor: id,
            status: PathStatus::Failed(NavError::StartNotNavigable),
            corners: 0,
        };
        let Some(entity) = entities.get_mut(id) else {
            return not_served;
        };
        let (Some(position), Some(goal), Some(waypoints), Some(lookahead)) = (
            entity.position,
            entity.movement_goal.as_mut(),
            entity.waypoints.as_mut(),
            entity.lookahead.as_mut(),
        ) else {
            return not_served;
        };

        let status = planner::plan_path(
            self.nav,
            &self.config.planner,
            self.time,
            position.value,
            goal,
            waypoints,
            lookahead,
        );
        match status {
            PathStatus::Complete => {
                tracing::trace!(entity = id, corners = waypoints.len(), "path found");
            }
            PathStatus::Partial => {
                tracing::debug!(entity = id, corners = waypoints.len(), "partial path");
            }
            PathStatus::Failed(error) => {
                tracing::debug!(entity = id, %error, "cannot path");
            }
        }
        PathResult {
            actor: id,
            status,
            corners: waypoints.len(),
        }
    }

    fn run_movement(&self, entities: &mut EntityStorage, avoidance: &SpatialHash) {
        let ctx = MovementContext {
            dt: self.config.dt(),
            config: &self.config.steering,
            avoidance,
            obstacles: self.obstacles,
        };
        let states: Vec<MotionState> = entities
            .sorted_ids()
            .into_iter()
            .filter_map(|id| entities.get(id))
            .filter(|entity| entity.is_alive())
            .filter_map(motion_state)
            .collect();
        let moved: Vec<MotionState> = states
            .par_iter()
            .map_init(Vec::new, |scratch, state| {
                movement::integrate(&ctx, *state, scratch)
            })
            .collect();

        for state in moved {
            let Some(entity) = entities.get_mut(state.id) else {
                continue;
            };
            if let Some(position) = entity.position.as_mut() {
                position.value = state.position;
            }
            if let Some(rotation) = entity.rotation.as_mut() {
                rotation.facing = state.facing;
            }
            entity.velocity = Some(Velocity::new(state.velocity));
            entity.locomotion = Some(state.locomotion);
            entity.lookahead = Some(state.lookahead);
        }
    }

    fn run_arrival(&self, entities: &mut EntityStorage, events: &mut TickEvents) {
        let margin = self.config.steering.arrival_margin;
        for id in entities.sorted_ids() {
            let Some(entity) = entities.get_mut(id) else {
                continue;
            };
            let velocity = entity.velocity.map_or(Vec2Fixed::ZERO, |v| v.value);
            let (Some(position), Some(radius), Some(goal), Some(waypoints), Some(lookahead)) = (
                entity.position,
                entity.radius,
                entity.movement_goal.as_mut(),
                entity.waypoints.as_ref(),
                entity.lookahead.as_mut(),
            ) else {
                continue;
            };

            // A corner promoted during integration gets its Next back before
            // the final-leg check.
            planner::follow_path(goal, waypoints, lookahead);
            let arrival_radius = movement::arrival_radius(goal, radius.value, margin);
            if !movement::has_arrived(position.value, velocity, lookahead, arrival_radius) {
                continue;
            }

            lookahead.disable();
            goal.is_wandering = false;
            arrive(entity);
            tracing::trace!(entity = id, "arrived");
            events.arrivals.push(Arrival {
                entity: id,
                position: position.value,
            });
        }
    }

    fn run_attacks(&self, entities: &mut EntityStorage, after_move: &Snapshot) -> Vec<Strike> {
        let ctx = AttackContext {
            dt: self.config.dt(),
            snapshot: after_move,
            retarget_threshold_sq: self.config.targeting.retarget_threshold_sq,
        };
        let states: Vec<AttackState> = entities
            .sorted_ids()
            .into_iter()
            .filter_map(|id| entities.get(id))
            .filter(|entity| entity.is_alive())
            .filter_map(attack_state)
            .collect();
        let outcomes: Vec<AttackOutcome> = states
            .par_iter()
            .map(|state| attack::resolve_attack(&ctx, *state))
            .collect();

        let mut strikes = Vec::new();
        for outcome in outcomes {
            let state = outcome.state;
            let Some(entity) = entities.get_mut(state.id) else {
                continue;
            };
            entity.cooldown = Some(state.cooldown);
            if let Some(rotation) = entity.rotation.as_mut() {
                rotation.facing = state.facing;
            }
            if let Some(goal) = entity.movement_goal.as_mut() {
                *goal = state.goal;
            }
            if let Some(lookahead) = entity.lookahead.as_mut() {
                *lookahead = state.lookahead;
            }
            strikes.extend(outcome.strike);
        }
        strikes
    }

    /// Queue a strike on its target and spawn the cosmetic projectile.
    fn deliver(
        &self,
        entities: &mut EntityStorage,
        after_move: &Snapshot,
        strike: Strike,
        events: &mut TickEvents,
    ) {
        let Some(queue) = entities
            .get_mut(strike.target)
            .and_then(|target| target.damage_queue.as_mut())
        else {
            return;
        };
        queue.push(DamageEntry {
            source: strike.attacker,
            amount: strike.amount,
        });
        events.damage_events.push(DamageEvent {
            attacker: strike.attacker,
            target: strike.target,
            amount: strike.amount,
            ranged: strike.ranged,
        });

        if strike.ranged {
            let origin = after_move
                .get(strike.attacker)
                .map_or(strike.target_position, |actor| actor.position);
            let mut projectile = Entity::new(0);
            projectile.position = Some(Position::new(origin));
            projectile.projectile = Some(Projectile {
                source: strike.attacker,
                target: strike.target,
                target_position: strike.target_position,
                remaining_ticks: self.config.combat.projectile_lifetime_ticks,
            });
            events.projectiles.push(entities.insert(projectile));
        }
    }
}

/// Capture every living or dying actor; projectiles are left out.
#[must_use]
pub fn take_snapshot(entities: &EntityStorage) -> Snapshot {
    Snapshot::from_actors(
        entities
            .iter()
            .filter(|(_, entity)| entity.projectile.is_none())
            .filter_map(|(_, entity)| actor_snapshot(entity)),
    )
}

fn actor_snapshot(entity: &Entity) -> Option<ActorSnapshot> {
    Some(ActorSnapshot {
        id: entity.id,
        kind: entity.kind,
        team: entity.team,
        position: entity.position?.value,
        radius: entity.radius?.value,
        defense: entity.combat_stats.map_or(Fixed::ZERO, |stats| stats.defense),
        alive: entity.is_alive(),
        gathering: entity.gathering,
    })
}

fn targeting_state(entity: &Entity) -> Option<TargetingState> {
    let position = entity.position?.value;
    Some(TargetingState {
        id: entity.id,
        kind: entity.kind,
        team: entity.team,
        position,
        aggro_radius: entity.combat_stats?.aggro_radius,
        orders: entity.orders,
        target: entity.aggro_target?,
        lock: entity.aggro_lock?,
        goal: entity
            .movement_goal
            .unwrap_or_else(|| MovementGoal::at(position)),
    })
}

fn motion_state(entity: &Entity) -> Option<MotionState> {
    Some(MotionState {
        id: entity.id,
        position: entity.position?.value,
        facing: entity.rotation?.facing,
        velocity: entity.velocity?.value,
        radius: entity.radius?.value,
        locomotion: entity.locomotion?,
        lookahead: entity.lookahead?,
        gathering: entity.gathering,
    })
}

fn attack_state(entity: &Entity) -> Option<AttackState> {
    let position = entity.position?.value;
    Some(AttackState {
        id: entity.id,
        kind: entity.kind,
        position,
        facing: entity.rotation?.facing,
        stats: entity.combat_stats?,
        cooldown: entity.cooldown?,
        target: entity.aggro_target?.target,
        orders: entity.orders,
        goal: entity
            .movement_goal
            .unwrap_or_else(|| MovementGoal::at(position)),
        lookahead: entity.lookahead.unwrap_or_default(),
    })
}

/// Count projectile lifetimes down and despawn the expired ones.
fn age_projectiles(entities: &mut EntityStorage) {
    let mut expired = Vec::new();
    for (&id, entity) in entities.iter_mut() {
        if let Some(projectile) = entity.projectile.as_mut() {
            projectile.remaining_ticks = projectile.remaining_ticks.saturating_sub(1);
            if projectile.remaining_ticks == 0 {
                expired.push(id);
            }
        }
    }
    for id in expired {
        entities.remove(id);
    }
}

fn tick_aggro_locks(entities: &mut EntityStorage, dt: Fixed) {
    for (_, entity) in entities.iter_mut() {
        if let Some(lock) = entity.aggro_lock.as_mut() {
            lock.tick(dt);
        }
    }
}

/// Movement goals waiting for a path, in ascending id order.
fn dirty_goals(entities: &EntityStorage) -> Vec<EntityId> {
    entities
        .sorted_ids()
        .into_iter()
        .filter(|&id| {
            entities.get(id).is_some_and(|entity| {
                entity.is_alive()
                    && entity.position.is_some()
                    && entity.waypoints.is_some()
                    && entity.lookahead.is_some()
                    && entity.movement_goal.is_some_and(|goal| goal.path_dirty)
            })
        })
        .collect()
}

fn follow_paths(entities: &mut EntityStorage) {
    for (_, entity) in entities.iter_mut() {
        if let (Some(goal), Some(waypoints), Some(lookahead)) = (
            entity.movement_goal.as_mut(),
            entity.waypoints.as_ref(),
            entity.lookahead.as_mut(),
        ) {
            planner::follow_path(goal, waypoints, lookahead);
        }
    }
}

/// Settle an actor that reached its destination and advance its orders.
fn arrive(entity: &mut Entity) {
    entity.velocity = Some(Velocity::ZERO);
    if let Some(locomotion) = entity.locomotion.as_mut() {
        locomotion.current_speed = Fixed::ZERO;
    }

    let has_target = entity.aggro_target.is_some_and(|t| t.target.is_some());
    let Some(orders) = entity.orders.as_mut() else {
        return;
    };
    match orders.intent {
        Intent::Move => orders.reset(),
        Intent::AttackMove if !has_target => orders.reset(),
        Intent::Gather => entity.gathering = true,
        Intent::Patrol => {
            if let Some(patrol) = entity.patrol_state.as_mut() {
                patrol.heading_to_target = !patrol.heading_to_target;
                let next = patrol.current_leg_end();
                if let Some(goal) = entity.movement_goal.as_mut() {
                    goal.request(next);
                }
            }
        }
        _ => {}
    }
}

/// Turn this tick's damage into aggro overrides.
///
/// Hostiles always turn on their latest attacker and lock onto it. Units
/// only do so while idle or attack-moving.
fn react_to_damage(entities: &mut EntityStorage, after_move: &Snapshot) {
    for id in entities.sorted_ids() {
        let Some(entity) = entities.get_mut(id) else {
            continue;
        };
        let Some(attacker) = entity
            .damage_queue
            .as_ref()
            .and_then(|queue| queue.last_attacker())
            .and_then(|source| after_move.living(source))
            .copied()
        else {
            continue;
        };
        if !entity.team.is_hostile_to(attacker.team) {
            continue;
        }

        let allowed = match entity.kind {
            ActorKind::Hostile => true,
            ActorKind::Player => entity
                .orders
                .is_some_and(|orders| orders.intent.accepts_damage_override()),
        };
        if !allowed {
            continue;
        }
        let Some(target) = entity.aggro_target.as_mut() else {
            continue;
        };
        let switched = target.target != Some(attacker.id);
        target.set(attacker.id, attacker.position);

        if entity.kind == ActorKind::Hostile {
            if let Some(lock) = entity.aggro_lock.as_mut() {
                lock.arm(attacker.id);
            }
        }
        if switched {
            if let Some(goal) = entity.movement_goal.as_mut() {
                goal.request(attacker.position);
                goal.is_wandering = false;
            }
            tracing::debug!(entity = id, attacker = attacker.id, "retaliating");
        }
    }
}

/// Drain every damage queue into health. Returns the actors that died.
fn apply_damage(entities: &mut EntityStorage) -> Vec<EntityId> {
    let mut deaths = Vec::new();
    for id in entities.sorted_ids() {
        let Some(entity) = entities.get_mut(id) else {
            continue;
        };
        let (Some(queue), Some(health)) = (entity.damage_queue.as_mut(), entity.health.as_mut())
        else {
            continue;
        };
        if queue.is_empty() {
            continue;
        }
        health.apply_damage(queue.total());
        queue.clear();
        if health.is_dead() {
            deaths.push(id);
        }
    }
    deaths
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{
        AggroLock, AggroTarget, DamageQueue, Health, ObstacleRadius, Team, UnitOrders,
    };

    fn actor(team: u8, kind: ActorKind, x: i32) -> Entity {
        let mut entity = Entity::new(0);
        entity.team = Team(team);
        entity.kind = kind;
        entity.position = Some(Position::new(Vec2Fixed::from_ints(x, 0)));
        entity.radius = Some(ObstacleRadius::new(Fixed::from_num(0.5)));
        entity.health = Some(Health::new(Fixed::from_num(20)));
        entity.damage_queue = Some(DamageQueue::default());
        entity.aggro_target = Some(AggroTarget::default());
        entity.aggro_lock = Some(AggroLock::new(Fixed::from_num(3)));
        entity.movement_goal = Some(MovementGoal::at(Vec2Fixed::from_ints(x, 0)));
        if kind == ActorKind::Player {
            entity.orders = Some(UnitOrders::default());
        }
        entity
    }

    fn hit(entities: &mut EntityStorage, target: EntityId, source: EntityId, amount: i32) {
        if let Some(queue) = entities.get_mut(target).and_then(|e| e.damage_queue.as_mut()) {
            queue.push(DamageEntry {
                source,
                amount: Fixed::from_num(amount),
            });
        }
    }

    #[test]
    fn test_snapshot_skips_projectiles() {
        let mut entities = EntityStorage::new();
        entities.insert(actor(0, ActorKind::Player, 0));
        let mut shot = Entity::new(0);
        shot.position = Some(Position::ORIGIN);
        shot.projectile = Some(Projectile {
            source: 1,
            target: 1,
            target_position: Vec2Fixed::ZERO,
            remaining_ticks: 3,
        });
        entities.insert(shot);

        assert_eq!(take_snapshot(&entities).len(), 1);
    }

    #[test]
    fn test_damage_application_sums_and_clears() {
        let mut entities = EntityStorage::new();
        let victim = entities.insert(actor(0, ActorKind::Player, 0));
        hit(&mut entities, victim, 9, 5);
        hit(&mut entities, victim, 9, 7);

        assert!(apply_damage(&mut entities).is_empty());
        let entity = entities.get(victim).unwrap();
        assert_eq!(entity.health.unwrap().current, Fixed::from_num(8));
        assert!(entity.damage_queue.as_ref().unwrap().is_empty());

        hit(&mut entities, victim, 9, 50);
        assert_eq!(apply_damage(&mut entities), vec![victim]);
        assert_eq!(entities.get(victim).unwrap().health.unwrap().current, Fixed::ZERO);
    }

    #[test]
    fn test_hostile_retaliates_and_locks() {
        let mut entities = EntityStorage::new();
        let grunt = entities.insert(actor(1, ActorKind::Hostile, 0));
        let unit = entities.insert(actor(0, ActorKind::Player, 4));
        hit(&mut entities, grunt, unit, 3);

        let snapshot = take_snapshot(&entities);
        react_to_damage(&mut entities, &snapshot);

        let entity = entities.get(grunt).unwrap();
        assert_eq!(entity.aggro_target.unwrap().target, Some(unit));
        assert_eq!(entity.aggro_lock.unwrap().active_target(), Some(unit));
        let goal = entity.movement_goal.unwrap();
        assert!(goal.path_dirty);
        assert_eq!(goal.destination, Vec2Fixed::from_ints(4, 0));
    }

    #[test]
    fn test_busy_unit_ignores_damage() {
        let mut entities = EntityStorage::new();
        let grunt = entities.insert(actor(1, ActorKind::Hostile, 0));
        let unit = entities.insert(actor(0, ActorKind::Player, 4));
        if let Some(orders) = entities.get_mut(unit).and_then(|e| e.orders.as_mut()) {
            orders.intent = Intent::Move;
        }
        hit(&mut entities, unit, grunt, 3);

        let snapshot = take_snapshot(&entities);
        react_to_damage(&mut entities, &snapshot);
        assert_eq!(entities.get(unit).unwrap().aggro_target.unwrap().target, None);

        if let Some(orders) = entities.get_mut(unit).and_then(|e| e.orders.as_mut()) {
            orders.intent = Intent::Idle;
        }
        react_to_damage(&mut entities, &snapshot);
        let entity = entities.get(unit).unwrap();
        assert_eq!(entity.aggro_target.unwrap().target, Some(grunt));
        // Units never arm a lock.
        assert_eq!(entity.aggro_lock.unwrap().active_target(), None);
    }

    #[test]
    fn test_projectiles_expire() {
        let mut entities = EntityStorage::new();
        let mut shot = Entity::new(0);
        shot.position = Some(Position::ORIGIN);
        shot.projectile = Some(Projectile {
            source: 1,
            target: 2,
            target_position: Vec2Fixed::ZERO,
            remaining_ticks: 2,
        });
        let id = entities.insert(shot);

        age_projectiles(&mut entities);
        assert!(entities.contains(id));
        age_projectiles(&mut entities);
        assert!(!entities.contains(id));
    }

    #[test]
    fn test_arrive_updates_orders() {
        let mut unit = actor(0, ActorKind::Player, 0);
        unit.velocity = Some(Velocity::new(Vec2Fixed::from_ints(1, 0)));
        unit.orders = Some(UnitOrders {
            intent: Intent::Move,
            destination: Some(Vec2Fixed::ZERO),
        });
        arrive(&mut unit);
        assert_eq!(unit.orders.unwrap().intent, Intent::Idle);
        assert_eq!(unit.velocity, Some(Velocity::ZERO));

        unit.orders = Some(UnitOrders {
            intent: Intent::AttackMove,
            destination: Some(Vec2Fixed::ZERO),
        });
        unit.aggro_target = Some(AggroTarget {
            target: Some(7),
            last_known_position: Vec2Fixed::ZERO,
        });
        arrive(&mut unit);
        assert_eq!(unit.orders.unwrap().intent, Intent::AttackMove);
    }
}
