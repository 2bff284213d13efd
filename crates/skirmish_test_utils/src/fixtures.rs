//! Test fixtures and helpers.
//!
//! Pre-built simulations and actor configurations for consistent testing.

use skirmish_core::components::{ActorKind, AttackKind, CombatStats, Command, EntityId, Team};
use skirmish_core::config::SimConfig;
use skirmish_core::math::{Fixed, Vec2Fixed};
use skirmish_core::obstacles::Rect;
use skirmish_core::simulation::{EntitySpawnParams, Simulation};
use skirmish_core::terrain::Terrain;

/// Create a fixed-point number from an integer.
#[must_use]
pub fn fixed(n: i32) -> Fixed {
    Fixed::from_num(n)
}

/// Create a fixed-point number from a float (for tests only).
///
/// Note: In real simulation code, never use floats.
/// This is only for convenient test setup.
#[must_use]
pub fn fixed_f(n: f64) -> Fixed {
    Fixed::from_num(n)
}

/// Create a point from integer coordinates.
#[must_use]
pub fn point(x: i32, y: i32) -> Vec2Fixed {
    Vec2Fixed::from_ints(x, y)
}

/// Spawn a player unit on team 0 with default melee stats.
pub fn spawn_unit(sim: &mut Simulation, at: Vec2Fixed) -> EntityId {
    sim.spawn_actor(EntitySpawnParams {
        kind: ActorKind::Player,
        team: Team(0),
        position: at,
        combat_stats: Some(CombatStats::default()),
        ..Default::default()
    })
}

/// Spawn a hostile on team 1 with the given stats.
pub fn spawn_hostile(sim: &mut Simulation, at: Vec2Fixed, stats: CombatStats) -> EntityId {
    sim.spawn_actor(EntitySpawnParams {
        kind: ActorKind::Hostile,
        team: Team(1),
        position: at,
        health: fixed(60),
        combat_stats: Some(stats),
        ..Default::default()
    })
}

/// Ranged stats: 6 damage, 8 m range, one shot per second.
#[must_use]
pub fn ranged_stats() -> CombatStats {
    CombatStats::new(fixed(6), fixed(8), Fixed::ONE).with_kind(AttackKind::Ranged)
}

/// Two lines of actors facing each other: units along y = 40, hostiles along
/// y = 50, inside each other's acquisition radius. Every third hostile is
/// ranged.
#[must_use]
pub fn battle_scenario(pairs: i32) -> Simulation {
    let mut sim = Simulation::new();
    for i in 0..pairs {
        let x = 20 + (i % 40) * 3;
        let row = (i / 40) * 3;
        spawn_unit(&mut sim, point(x, 40 - row));
        let stats = if i % 3 == 0 {
            ranged_stats()
        } else {
            CombatStats::default()
        };
        spawn_hostile(&mut sim, point(x, 50 + row), stats);
    }
    sim
}

/// A squad of units ordered across the map, without enemies.
#[must_use]
pub fn movement_scenario(units: i32) -> Simulation {
    let mut sim = Simulation::new();
    for i in 0..units {
        let unit = spawn_unit(&mut sim, point(10 + (i % 10) * 2, 10 + (i / 10) * 2));
        let _ = sim.issue_command(unit, Command::MoveTo(point(200, 180)));
    }
    sim
}

/// A wall splitting the map with a single gap, and one hostile on each side.
#[must_use]
pub fn walled_scenario() -> Simulation {
    let config = SimConfig::default();
    let mut terrain = Terrain::open(config.bounds, fixed(2));
    terrain.add_obstacle(Rect::new(point(100, 0), point(104, 120)));
    terrain.add_obstacle(Rect::new(point(100, 128), point(104, 256)));

    let mut sim = Simulation::with_terrain(config, terrain);
    spawn_hostile(&mut sim, point(80, 60), CombatStats::default());
    let unit = spawn_unit(&mut sim, point(120, 60));
    let _ = sim.issue_command(unit, Command::MoveTo(point(60, 60)));
    sim
}
