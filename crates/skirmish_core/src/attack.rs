//! Melee and ranged attack resolution.
//!
//! Attacks never touch the target directly. A successful swing or shot
//! produces a [`Strike`] that the pipeline appends to the target's
//! [`DamageQueue`](crate::components::DamageQueue); health changes happen in
//! the damage step later in the tick.

use crate::components::{
    ActorKind, AttackCooldown, AttackKind, CombatStats, EntityId, MovementGoal, MovementWaypoints,
    UnitOrders,
};
use crate::math::{Fixed, Vec2Fixed};
use crate::snapshot::Snapshot;

/// Damage after defense: `max(1, base * max(0, 1 - defense))`.
///
/// Defense is nominally a fraction in `[0, 1]` but is not clamped: values
/// above 1 floor the damage at 1 and negative values amplify it.
#[must_use]
pub fn calculate_damage(base_damage: Fixed, defense: Fixed) -> Fixed {
    let multiplier = (Fixed::ONE - defense).max(Fixed::ZERO);
    base_damage.saturating_mul(multiplier).max(Fixed::ONE)
}

/// Shared, read-only inputs for one attack pass.
#[derive(Debug, Clone, Copy)]
pub struct AttackContext<'a> {
    /// Seconds per tick.
    pub dt: Fixed,
    /// Actor table after movement.
    pub snapshot: &'a Snapshot,
    /// Squared distance a target must move before a ranged attacker re-paths.
    pub retarget_threshold_sq: Fixed,
}

/// The attack-owned records of one actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttackState {
    /// Actor handle.
    pub id: EntityId,
    /// Hostiles always attack; player units only when their orders allow it.
    pub kind: ActorKind,
    /// Position after movement.
    pub position: Vec2Fixed,
    /// Unit facing vector.
    pub facing: Vec2Fixed,
    /// Damage, range and rate.
    pub stats: CombatStats,
    /// Time until the next attack.
    pub cooldown: AttackCooldown,
    /// Target chosen by targeting this tick.
    pub target: Option<EntityId>,
    /// Player orders; `None` for hostiles.
    pub orders: Option<UnitOrders>,
    /// Movement goal.
    pub goal: MovementGoal,
    /// Waypoint lookahead.
    pub lookahead: MovementWaypoints,
}

/// A landed attack waiting to be queued on its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Strike {
    /// Attacker.
    pub attacker: EntityId,
    /// Victim.
    pub target: EntityId,
    /// Damage after defense.
    pub amount: Fixed,
    /// Victim position when struck.
    pub target_position: Vec2Fixed,
    /// Spawn a cosmetic projectile.
    pub ranged: bool,
}

/// Result of resolving one actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttackOutcome {
    /// Updated records.
    pub state: AttackState,
    /// Attack landed this tick.
    pub strike: Option<Strike>,
}

/// Resolve one actor's attack for this tick.
#[must_use]
pub fn resolve_attack(ctx: &AttackContext<'_>, mut state: AttackState) -> AttackOutcome {
    state.cooldown.tick(ctx.dt);

    let allowed = match state.kind {
        ActorKind::Hostile => true,
        ActorKind::Player => state.orders.is_some_and(|orders| orders.intent.allows_attack()),
    };
    let target = state
        .target
        .filter(|_| allowed)
        .and_then(|id| ctx.snapshot.living(id))
        .copied();
    let Some(target) = target else {
        return AttackOutcome { state, strike: None };
    };

    let ranged = state.stats.kind == AttackKind::Ranged;
    let offset = target.position - state.position;
    let effective_range = offset.length() - target.radius;

    if effective_range > state.stats.range {
        if ranged && chase_allowed(&state) {
            let moved = target.position.distance_squared(state.goal.destination);
            if moved > ctx.retarget_threshold_sq {
                state.goal.request(target.position);
            }
        }
        return AttackOutcome { state, strike: None };
    }

    // Hold position while in range, whatever the attack kind.
    state.lookahead.disable();
    if !offset.is_zero() {
        state.facing = offset.normalize();
    }

    if !state.cooldown.is_ready() {
        return AttackOutcome { state, strike: None };
    }

    state.cooldown.remaining = state.stats.attack_interval();
    let strike = Strike {
        attacker: state.id,
        target: target.id,
        amount: calculate_damage(state.stats.attack_power, target.defense),
        target_position: target.position,
        ranged,
    };
    tracing::trace!(
        attacker = strike.attacker,
        target = strike.target,
        amount = %strike.amount,
        ranged,
        "strike"
    );
    AttackOutcome {
        state,
        strike: Some(strike),
    }
}

fn chase_allowed(state: &AttackState) -> bool {
    state.orders.map_or(true, |orders| orders.intent.allows_chase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Intent, Team};
    use crate::snapshot::ActorSnapshot;
    use proptest::prelude::*;

    fn fixed(n: f64) -> Fixed {
        Fixed::from_num(n)
    }

    fn close_to(actual: Fixed, expected: f64) -> bool {
        (actual - fixed(expected)).abs() < fixed(0.000_001)
    }

    fn victim(id: EntityId, x: i32, defense: f64, alive: bool) -> ActorSnapshot {
        ActorSnapshot {
            id,
            kind: ActorKind::Player,
            team: Team(1),
            position: Vec2Fixed::from_ints(x, 0),
            radius: fixed(0.5),
            defense: fixed(defense),
            alive,
            gathering: false,
        }
    }

    fn attacker(kind: AttackKind, range: f64) -> AttackState {
        AttackState {
            id: 1,
            kind: ActorKind::Hostile,
            position: Vec2Fixed::ZERO,
            facing: Vec2Fixed::new(Fixed::ZERO, Fixed::ONE),
            stats: CombatStats::new(fixed(10.0), fixed(range), fixed(2.0)).with_kind(kind),
            cooldown: AttackCooldown::default(),
            target: Some(2),
            orders: None,
            goal: MovementGoal::at(Vec2Fixed::ZERO),
            lookahead: MovementWaypoints {
                current: Vec2Fixed::from_ints(2, 0),
                next: None,
                enabled: true,
            },
        }
    }

    fn context(snapshot: &Snapshot) -> AttackContext<'_> {
        AttackContext {
            dt: Fixed::ONE / Fixed::from_num(20),
            snapshot,
            retarget_threshold_sq: Fixed::ONE,
        }
    }

    #[test]
    fn test_damage_reference_values() {
        assert!(close_to(calculate_damage(fixed(100.0), fixed(0.3)), 70.0));
        assert_eq!(calculate_damage(fixed(100.0), Fixed::ONE), Fixed::ONE);
        assert_eq!(calculate_damage(fixed(0.5), Fixed::ZERO), Fixed::ONE);
    }

    #[test]
    fn test_damage_defense_is_not_clamped() {
        assert_eq!(calculate_damage(fixed(100.0), fixed(2.0)), Fixed::ONE);
        assert!(close_to(calculate_damage(fixed(100.0), fixed(-0.5)), 150.0));
    }

    #[test]
    fn test_melee_in_range_strikes_and_resets_cooldown() {
        let snapshot = Snapshot::from_actors([victim(2, 2, 0.0, true)]);
        let outcome = resolve_attack(&context(&snapshot), attacker(AttackKind::Melee, 1.5));

        let strike = outcome.strike.expect("in range and ready");
        assert_eq!(strike.target, 2);
        assert_eq!(strike.amount, fixed(10.0));
        assert!(!strike.ranged);
        assert_eq!(outcome.state.cooldown.remaining, fixed(0.5));
        assert_eq!(outcome.state.facing, Vec2Fixed::new(Fixed::ONE, Fixed::ZERO));
        // Stops to swing.
        assert!(!outcome.state.lookahead.enabled);
    }

    #[test]
    fn test_melee_in_range_on_cooldown_still_holds_position() {
        let snapshot = Snapshot::from_actors([victim(2, 2, 0.0, true)]);
        let mut state = attacker(AttackKind::Melee, 1.5);
        state.cooldown.remaining = fixed(0.3);
        let outcome = resolve_attack(&context(&snapshot), state);
        assert!(outcome.strike.is_none());
        assert!(!outcome.state.lookahead.enabled);
    }

    #[test]
    fn test_melee_out_of_range_keeps_closing_in() {
        let snapshot = Snapshot::from_actors([victim(2, 20, 0.0, true)]);
        let outcome = resolve_attack(&context(&snapshot), attacker(AttackKind::Melee, 1.5));
        assert!(outcome.strike.is_none());
        assert!(outcome.state.lookahead.enabled);
    }

    #[test]
    fn test_effective_range_subtracts_target_radius() {
        // Distance 2, radius 0.5: effective 1.5.
        let snapshot = Snapshot::from_actors([victim(2, 2, 0.0, true)]);
        let ctx = context(&snapshot);
        assert!(resolve_attack(&ctx, attacker(AttackKind::Melee, 1.5)).strike.is_some());
        assert!(resolve_attack(&ctx, attacker(AttackKind::Melee, 1.4)).strike.is_none());
    }

    #[test]
    fn test_cooldown_blocks_second_strike() {
        let snapshot = Snapshot::from_actors([victim(2, 2, 0.0, true)]);
        let ctx = context(&snapshot);
        let first = resolve_attack(&ctx, attacker(AttackKind::Melee, 2.0));
        assert!(first.strike.is_some());

        let mut state = first.state;
        let mut strikes = 0;
        // Interval 0.5 s is about 10 ticks; 15 leaves room for exactly one more.
        for _ in 0..15 {
            let outcome = resolve_attack(&ctx, state);
            strikes += usize::from(outcome.strike.is_some());
            state = outcome.state;
        }
        assert_eq!(strikes, 1);
    }

    #[test]
    fn test_ranged_plants_and_fires() {
        let snapshot = Snapshot::from_actors([victim(2, 6, 0.5, true)]);
        let outcome = resolve_attack(&context(&snapshot), attacker(AttackKind::Ranged, 8.0));
        let strike = outcome.strike.expect("ranged hit");
        assert!(strike.ranged);
        assert_eq!(strike.amount, fixed(5.0));
        assert!(!outcome.state.lookahead.enabled);
    }

    #[test]
    fn test_ranged_out_of_range_repaths_only_on_real_move() {
        let snapshot = Snapshot::from_actors([victim(2, 20, 0.0, true)]);
        let ctx = context(&snapshot);

        let mut state = attacker(AttackKind::Ranged, 8.0);
        state.goal.destination = Vec2Fixed::new(fixed(19.5), Fixed::ZERO);
        let outcome = resolve_attack(&ctx, state);
        assert!(outcome.strike.is_none());
        assert!(!outcome.state.goal.path_dirty);

        state.goal.destination = Vec2Fixed::from_ints(10, 0);
        let outcome = resolve_attack(&ctx, state);
        assert!(outcome.state.goal.path_dirty);
        assert_eq!(outcome.state.goal.destination, Vec2Fixed::from_ints(20, 0));
    }

    #[test]
    fn test_melee_out_of_range_does_not_repath() {
        let snapshot = Snapshot::from_actors([victim(2, 20, 0.0, true)]);
        let outcome = resolve_attack(&context(&snapshot), attacker(AttackKind::Melee, 1.5));
        assert!(outcome.strike.is_none());
        assert!(!outcome.state.goal.path_dirty);
    }

    #[test]
    fn test_dead_or_missing_target_is_ignored() {
        let snapshot = Snapshot::from_actors([victim(2, 1, 0.0, false)]);
        let ctx = context(&snapshot);
        assert!(resolve_attack(&ctx, attacker(AttackKind::Melee, 2.0)).strike.is_none());

        let mut state = attacker(AttackKind::Melee, 2.0);
        state.target = Some(99);
        assert!(resolve_attack(&ctx, state).strike.is_none());
    }

    #[test]
    fn test_unit_orders_gate_attacks() {
        let snapshot = Snapshot::from_actors([victim(2, 1, 0.0, true)]);
        let ctx = context(&snapshot);
        let mut state = attacker(AttackKind::Melee, 2.0);
        state.kind = ActorKind::Player;

        state.orders = Some(UnitOrders {
            intent: Intent::Move,
            destination: None,
        });
        assert!(resolve_attack(&ctx, state).strike.is_none());

        state.orders = Some(UnitOrders {
            intent: Intent::Hold,
            destination: None,
        });
        assert!(resolve_attack(&ctx, state).strike.is_some());
    }

    proptest! {
        #[test]
        fn prop_damage_at_least_one(base in 0.0f64..10_000.0, defense in 0.0f64..=1.0) {
            let damage = calculate_damage(fixed(base), fixed(defense));
            prop_assert!(damage >= Fixed::ONE);
            let expected = (fixed(base) * (Fixed::ONE - fixed(defense))).max(Fixed::ONE);
            prop_assert_eq!(damage, expected);
        }
    }
}
