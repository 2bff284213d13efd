//! Time-sliced, hysteresis-based target selection.
//!
//! Two procedures share one protocol: hostiles seek the nearest enemy and
//! wander when there is none; player units auto-target only while their
//! orders allow it. [`resolve`] is the single dispatch point.
//!
//! Per actor and tick:
//!
//! 1. An active aggro lock on a valid target inside the retention radius is
//!    kept without searching.
//! 2. A current target that is alive, hostile and inside the retention
//!    radius is kept; the destination only moves when the target moved more
//!    than the retarget threshold.
//! 3. Otherwise the target is dropped and a full search runs only on the
//!    actor's time slice (`id % N == tick % N`).
//!
//! Stuck wanderers get a fresh wander point, and partial paths are retried at
//! a bounded rate on the actor's slice.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::components::{
    ActorKind, AggroLock, AggroTarget, EntityId, Intent, MovementGoal, Team, UnitOrders,
};
use crate::config::SimConfig;
use crate::math::{Fixed, Vec2Fixed};
use crate::snapshot::{ActorSnapshot, Snapshot};
use crate::spatial::SpatialHash;

/// Shared, read-only inputs for one targeting pass.
#[derive(Clone, Copy)]
pub struct TargetingContext<'a> {
    /// Current tick.
    pub tick: u64,
    /// Simulation time in seconds.
    pub time: Fixed,
    /// Tuning.
    pub config: &'a SimConfig,
    /// Actor table at the start of the tick.
    pub snapshot: &'a Snapshot,
    /// Coarse hash over living actors.
    pub hash: &'a SpatialHash,
}

/// The targeting-owned records of one actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetingState {
    /// Actor handle.
    pub id: EntityId,
    /// Which procedure runs.
    pub kind: ActorKind,
    /// Team.
    pub team: Team,
    /// Position at the start of the tick.
    pub position: Vec2Fixed,
    /// Acquisition radius.
    pub aggro_radius: Fixed,
    /// Player orders; `None` for hostiles.
    pub orders: Option<UnitOrders>,
    /// Current target.
    pub target: AggroTarget,
    /// Sticky lock.
    pub lock: AggroLock,
    /// Movement goal.
    pub goal: MovementGoal,
}

/// How the actor's target changed this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetChange {
    /// A new target was selected.
    Acquired(EntityId),
    /// The previous target was dropped and nothing replaced it.
    Lost(EntityId),
}

/// Result of resolving one actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetingOutcome {
    /// Updated records.
    pub state: TargetingState,
    /// Target change, if any.
    pub change: Option<TargetChange>,
    /// Whether a full spatial search ran.
    pub searched: bool,
}

/// Resolve one actor's target for this tick.
#[must_use]
pub fn resolve(ctx: &TargetingContext<'_>, state: TargetingState) -> TargetingOutcome {
    match state.kind {
        ActorKind::Hostile => resolve_hostile(ctx, state),
        ActorKind::Player => resolve_player(ctx, state),
    }
}

fn resolve_hostile(ctx: &TargetingContext<'_>, mut state: TargetingState) -> TargetingOutcome {
    let previous = state.target.target;
    let stuck = check_stuck(ctx, &mut state.goal, state.position);
    let mut searched = false;

    if !keep_current(ctx, &mut state, true) {
        if ctx.config.targeting.in_slice(state.id, ctx.tick) {
            searched = true;
            match search(ctx, &state) {
                Some(found) => {
                    acquire(&mut state, &found, true);
                    state.lock.arm(found.id);
                }
                None if !state.goal.is_wandering || stuck => wander(ctx, &mut state),
                None => {}
            }
        } else if stuck && state.goal.is_wandering {
            wander(ctx, &mut state);
        }
    }

    retry_partial(ctx, &mut state.goal, state.id);
    finish(state, previous, searched)
}

fn resolve_player(ctx: &TargetingContext<'_>, mut state: TargetingState) -> TargetingOutcome {
    let previous = state.target.target;
    let Some(mut orders) = state.orders else {
        return finish(state, previous, false);
    };
    let mut searched = false;

    match orders.intent {
        Intent::Attack => {
            let explicit = state
                .target
                .target
                .and_then(|id| ctx.snapshot.living(id))
                .filter(|target| state.team.is_hostile_to(target.team))
                .copied();
            match explicit {
                Some(target) => track(ctx, &mut state, &target, true),
                None => {
                    state.target.clear();
                    orders.reset();
                }
            }
        }
        intent if intent.allows_auto_target() => {
            let chase = intent.allows_chase();
            if !keep_current(ctx, &mut state, chase) {
                if previous.is_some() && intent == Intent::AttackMove {
                    if let Some(destination) = orders.destination {
                        state.goal.request(destination);
                    }
                }
                if ctx.config.targeting.in_slice(state.id, ctx.tick) {
                    searched = true;
                    if let Some(found) = search(ctx, &state) {
                        acquire(&mut state, &found, chase);
                    }
                }
            }
        }
        _ => {}
    }

    state.orders = Some(orders);
    retry_partial(ctx, &mut state.goal, state.id);
    finish(state, previous, searched)
}

/// Steps 1 and 2: keep a locked or current target that is still valid.
///
/// Returns `false` (with the target cleared) when nothing was kept.
fn keep_current(ctx: &TargetingContext<'_>, state: &mut TargetingState, chase: bool) -> bool {
    let retention = ctx.config.targeting.hysteresis_radius(state.aggro_radius);

    if let Some(locked) = state.lock.active_target() {
        if let Some(target) = valid_target(ctx, state, locked, retention) {
            track(ctx, state, &target, chase);
            return true;
        }
        state.lock.release();
    }

    if let Some(current) = state.target.target {
        if let Some(target) = valid_target(ctx, state, current, retention) {
            track(ctx, state, &target, chase);
            return true;
        }
        state.target.clear();
    }

    false
}

fn valid_target(
    ctx: &TargetingContext<'_>,
    state: &TargetingState,
    id: EntityId,
    radius: Fixed,
) -> Option<ActorSnapshot> {
    let target = ctx.snapshot.living(id)?;
    let hostile = state.team.is_hostile_to(target.team);
    let in_range = state.position.distance_squared(target.position) <= radius * radius;
    (hostile && in_range).then_some(*target)
}

/// Refresh a kept target's last-known position and, if it moved far enough,
/// the movement destination.
fn track(ctx: &TargetingContext<'_>, state: &mut TargetingState, target: &ActorSnapshot, chase: bool) {
    state.target.set(target.id, target.position);
    if !chase {
        return;
    }
    let moved = target.position.distance_squared(state.goal.destination);
    if moved > ctx.config.targeting.retarget_threshold_sq {
        state.goal.request(target.position);
        state.goal.is_wandering = false;
    }
}

fn acquire(state: &mut TargetingState, found: &ActorSnapshot, chase: bool) {
    state.target.set(found.id, found.position);
    if chase {
        state.goal.request(found.position);
        state.goal.is_wandering = false;
    }
}

/// Nearest living enemy within the acquisition radius.
fn search(ctx: &TargetingContext<'_>, state: &TargetingState) -> Option<ActorSnapshot> {
    let found = ctx.hash.nearest(state.position, state.aggro_radius, |entry| {
        entry.id != state.id && state.team.is_hostile_to(entry.team)
    })?;
    ctx.snapshot.living(found.id).copied()
}

/// Pick a uniformly random destination inside the world bounds.
///
/// The RNG is seeded from the actor id, tick and elapsed time, so replays
/// reproduce the same choice.
fn wander(ctx: &TargetingContext<'_>, state: &mut TargetingState) {
    let seed = state.id.wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ ctx.tick.rotate_left(21)
        ^ (ctx.time.to_bits() as u64).rotate_left(42);
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let bounds = ctx.config.bounds;
    let x = Fixed::from_bits(rng.gen_range(bounds.min.x.to_bits()..=bounds.max.x.to_bits()));
    let y = Fixed::from_bits(rng.gen_range(bounds.min.y.to_bits()..=bounds.max.y.to_bits()));
    let destination = Vec2Fixed::new(x, y);

    tracing::trace!(actor = state.id, x = %x, y = %y, "wander destination");
    state.goal.request(destination);
    state.goal.is_wandering = true;
    state.goal.last_stuck_check_time = ctx.time;
    state.goal.last_stuck_check_position = state.position;
}

/// Periodic displacement check while wandering. Returns `true` when the
/// actor barely moved since the previous check.
fn check_stuck(ctx: &TargetingContext<'_>, goal: &mut MovementGoal, position: Vec2Fixed) -> bool {
    if !goal.is_wandering {
        return false;
    }
    let targeting = &ctx.config.targeting;
    if ctx.time - goal.last_stuck_check_time < targeting.stuck_check_interval {
        return false;
    }
    let moved_sq = position.distance_squared(goal.last_stuck_check_position);
    goal.last_stuck_check_time = ctx.time;
    goal.last_stuck_check_position = position;
    moved_sq < targeting.stuck_distance * targeting.stuck_distance
}

/// Re-request a partial path at most every retry interval, on the slice.
fn retry_partial(ctx: &TargetingContext<'_>, goal: &mut MovementGoal, id: EntityId) {
    if !goal.is_partial || goal.path_dirty {
        return;
    }
    let targeting = &ctx.config.targeting;
    if ctx.time - goal.last_path_request_time >= targeting.partial_retry_interval
        && targeting.in_slice(id, ctx.tick)
    {
        goal.path_dirty = true;
    }
}

fn finish(state: TargetingState, previous: Option<EntityId>, searched: bool) -> TargetingOutcome {
    let change = match (previous, state.target.target) {
        (before, Some(now)) if before != Some(now) => Some(TargetChange::Acquired(now)),
        (Some(before), None) => Some(TargetChange::Lost(before)),
        _ => None,
    };
    TargetingOutcome {
        state,
        change,
        searched,
    }
}
