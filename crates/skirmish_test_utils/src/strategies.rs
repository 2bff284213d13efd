//! Proptest strategies for determinism testing.
//!
//! These strategies generate random but reproducible inputs for
//! property-based testing of simulation determinism. Positions stay inside
//! the default 256 x 256 world bounds.

use proptest::prelude::*;
use skirmish_core::components::{ActorKind, AttackKind, CombatStats, Command, Team};
use skirmish_core::math::{Fixed, Vec2Fixed};
use skirmish_core::simulation::EntitySpawnParams;

/// Generate a fixed-point coordinate inside the default world bounds.
pub fn arb_fixed_position() -> impl Strategy<Value = Fixed> {
    (0i32..256i32).prop_map(Fixed::from_num)
}

/// Generate a fixed-point top speed (1 to 8 units per second).
pub fn arb_fixed_speed() -> impl Strategy<Value = Fixed> {
    (1i32..8i32).prop_map(Fixed::from_num)
}

/// Generate a fixed-point 2D vector for positions.
pub fn arb_vec2_position() -> impl Strategy<Value = Vec2Fixed> {
    (arb_fixed_position(), arb_fixed_position()).prop_map(|(x, y)| Vec2Fixed::new(x, y))
}

/// Generate any positional or stop command (no entity refs).
pub fn arb_movement_command() -> impl Strategy<Value = Command> {
    prop_oneof![
        arb_vec2_position().prop_map(Command::MoveTo),
        arb_vec2_position().prop_map(Command::AttackMove),
        arb_vec2_position().prop_map(Command::Patrol),
        arb_vec2_position().prop_map(Command::Gather),
        Just(Command::Stop),
        Just(Command::HoldPosition),
    ]
}

/// Generate a sequence of commands.
pub fn arb_command_sequence(max_len: usize) -> impl Strategy<Value = Vec<Command>> {
    proptest::collection::vec(arb_movement_command(), 0..max_len)
}

/// Generate combat stats with a random kind, power and range.
pub fn arb_combat_stats() -> impl Strategy<Value = CombatStats> {
    (1i32..30, 1i32..10, any::<bool>()).prop_map(|(power, range, ranged)| {
        let kind = if ranged {
            AttackKind::Ranged
        } else {
            AttackKind::Melee
        };
        CombatStats::new(Fixed::from_num(power), Fixed::from_num(range), Fixed::ONE).with_kind(kind)
    })
}

/// Generate spawn parameters for a combat-capable actor on team 0 or 1.
///
/// Team 1 actors are hostiles, team 0 actors are player units.
pub fn arb_actor_params() -> impl Strategy<Value = EntitySpawnParams> {
    (
        arb_vec2_position(),
        any::<bool>(),
        arb_combat_stats(),
        proptest::option::of(arb_fixed_speed()),
    )
        .prop_map(|(position, hostile, stats, speed)| {
            let mut params = EntitySpawnParams {
                kind: if hostile {
                    ActorKind::Hostile
                } else {
                    ActorKind::Player
                },
                team: Team(u8::from(hostile)),
                position,
                combat_stats: Some(stats),
                ..Default::default()
            };
            match speed {
                Some(speed) => {
                    if let Some(locomotion) = params.locomotion.as_mut() {
                        locomotion.max_speed = speed;
                    }
                }
                None => params.locomotion = None,
            }
            params
        })
}

/// Generate a list of actor spawn parameters.
pub fn arb_actor_list(max_actors: usize) -> impl Strategy<Value = Vec<EntitySpawnParams>> {
    proptest::collection::vec(arb_actor_params(), 1..max_actors)
}
