//! End-to-end scenarios through the public simulation API.
//!
//! These drive whole ticks (or whole stages) and check the observable
//! effects: events, components and determinism.

use proptest::prelude::*;
use skirmish_core::components::{
    ActorKind, AggroLock, CombatStats, Command, EntityId, MovementGoal, MovementWaypoints, Team,
    WaypointBuffer,
};
use skirmish_core::config::{PlannerConfig, SimConfig};
use skirmish_core::error::NavError;
use skirmish_core::math::{Fixed, Vec2Fixed};
use skirmish_core::navigation::{NavGrid, NavPath, NavigationService, PathRequest};
use skirmish_core::obstacles::Rect;
use skirmish_core::planner::{plan_path, select_first_waypoint, PathStatus};
use skirmish_core::simulation::{EntitySpawnParams, Simulation};
use skirmish_core::snapshot::{ActorSnapshot, Snapshot};
use skirmish_core::targeting::{resolve, TargetChange, TargetingContext, TargetingState};
use skirmish_test_utils::fixtures::{
    battle_scenario, fixed, fixed_f, point, spawn_hostile, walled_scenario,
};

// =============================================================================
// Helpers
// =============================================================================

fn spawn_bystander(sim: &mut Simulation, at: Vec2Fixed) -> EntityId {
    sim.spawn_actor(EntitySpawnParams {
        kind: ActorKind::Player,
        team: Team(0),
        position: at,
        locomotion: None,
        ..Default::default()
    })
}

fn actor(id: EntityId, kind: ActorKind, team: u8, position: Vec2Fixed) -> ActorSnapshot {
    ActorSnapshot {
        id,
        kind,
        team: Team(team),
        position,
        radius: fixed_f(0.5),
        defense: Fixed::ZERO,
        alive: true,
        gathering: false,
    }
}

struct FixedRoute(Vec<Vec2Fixed>);

impl NavigationService for FixedRoute {
    fn compute_path(&self, _request: &PathRequest) -> Result<NavPath, NavError> {
        Ok(NavPath {
            corners: self.0.clone(),
            partial: false,
        })
    }
}

// =============================================================================
// Targeting
// =============================================================================

#[test]
fn test_hostile_acquires_ally_on_its_slice() {
    let mut sim = Simulation::new();
    let stats = CombatStats::default().with_aggro_radius(fixed(15));
    let hostile = spawn_hostile(&mut sim, point(100, 100), stats);
    let ally = spawn_bystander(&mut sim, point(110, 100));
    let slices = u64::from(sim.config().targeting.search_slices);

    // Ticks before the hostile's slice leave it alone.
    while sim.get_tick() % slices != hostile % slices {
        let events = sim.tick();
        assert!(!events.searches.contains(&hostile));
    }

    let events = sim.tick();
    assert!(events.searches.contains(&hostile));
    assert!(events
        .target_changes
        .contains(&(hostile, TargetChange::Acquired(ally))));
    assert!(events.path_results.iter().any(|r| r.actor == hostile));

    let entity = sim.get_entity(hostile).expect("hostile exists");
    assert_eq!(entity.aggro_target.and_then(|t| t.target), Some(ally));
    assert_eq!(
        entity.aggro_lock.and_then(|l| l.active_target()),
        Some(ally)
    );
    let goal = entity.movement_goal.expect("hostile has a goal");
    assert_eq!(goal.destination, point(110, 100));
    assert!(entity.lookahead.is_some_and(|l| l.enabled));
}

#[test]
fn test_acquisition_marks_goal_dirty() {
    let config = SimConfig::default();
    let hostile = actor(1, ActorKind::Hostile, 1, point(100, 100));
    let ally = actor(2, ActorKind::Player, 0, point(110, 100));
    let snapshot = Snapshot::from_actors([hostile, ally]);
    let hash = snapshot.targeting_hash(config.targeting.cell_size);
    let ctx = TargetingContext {
        tick: 1,
        time: config.time_at(1),
        config: &config,
        snapshot: &snapshot,
        hash: &hash,
    };

    let state = TargetingState {
        id: 1,
        kind: ActorKind::Hostile,
        team: Team(1),
        position: hostile.position,
        aggro_radius: fixed(15),
        orders: None,
        target: Default::default(),
        lock: AggroLock::new(fixed(3)),
        goal: MovementGoal::at(hostile.position),
    };

    let outcome = resolve(&ctx, state);
    assert!(outcome.searched);
    assert_eq!(outcome.change, Some(TargetChange::Acquired(2)));
    assert_eq!(outcome.state.target.target, Some(2));
    assert_eq!(outcome.state.goal.destination, ally.position);
    assert!(outcome.state.goal.path_dirty);
}

#[test]
fn test_time_slices_search_each_actor_once() {
    let mut sim = Simulation::new();
    let mut hostiles: Vec<EntityId> = (0..12)
        .map(|i| spawn_hostile(&mut sim, point(20 + i * 16, 128), CombatStats::default()))
        .collect();
    let slices = sim.config().targeting.search_slices;

    let mut searched = Vec::new();
    for _ in 0..slices {
        searched.extend(sim.tick().searches);
    }

    searched.sort_unstable();
    hostiles.sort_unstable();
    assert_eq!(searched, hostiles);
}

#[test]
fn test_hysteresis_keeps_oscillating_target() {
    let config = SimConfig::default();
    let radius = fixed(12);
    let near = point(112, 100);
    // Just inside radius × 1.3.
    let far = Vec2Fixed::new(fixed(100) + fixed_f(15.5), fixed(100));

    let hostile_pos = point(100, 100);
    let mut state = TargetingState {
        id: 1,
        kind: ActorKind::Hostile,
        team: Team(1),
        position: hostile_pos,
        aggro_radius: radius,
        orders: None,
        target: Default::default(),
        lock: AggroLock::new(Fixed::ZERO),
        goal: MovementGoal::at(hostile_pos),
    };
    state.target.set(2, near);

    for tick in 0..40u64 {
        let enemy_at = if tick % 2 == 0 { far } else { near };
        let snapshot = Snapshot::from_actors([
            actor(1, ActorKind::Hostile, 1, hostile_pos),
            actor(2, ActorKind::Player, 0, enemy_at),
        ]);
        let hash = snapshot.targeting_hash(config.targeting.cell_size);
        let ctx = TargetingContext {
            tick,
            time: config.time_at(tick),
            config: &config,
            snapshot: &snapshot,
            hash: &hash,
        };
        let outcome = resolve(&ctx, state);
        assert_eq!(outcome.state.target.target, Some(2), "lost target at tick {tick}");
        state = outcome.state;
    }
}

// =============================================================================
// Path planning
// =============================================================================

#[test]
fn test_first_waypoint_skips_near_corners() {
    let start = point(0, 0);
    let corners = [
        Vec2Fixed::new(fixed_f(0.2), fixed_f(0.1)),
        Vec2Fixed::new(fixed_f(0.3), fixed_f(-0.2)),
        point(10, 6),
    ];
    let config = PlannerConfig::default();
    assert_eq!(
        select_first_waypoint(start, &corners, config.skip_distance, config.corner_tolerance),
        2
    );

    let mut goal = MovementGoal::at(start);
    goal.request(point(10, 6));
    let mut buffer = WaypointBuffer::with_capacity(config.waypoint_capacity);
    let mut lookahead = MovementWaypoints::default();
    let status = plan_path(
        &FixedRoute(corners.to_vec()),
        &config,
        Fixed::ZERO,
        start,
        &mut goal,
        &mut buffer,
        &mut lookahead,
    );

    assert_eq!(status, PathStatus::Complete);
    assert!(!goal.path_dirty);
    assert_eq!(goal.waypoint_index, 2);
    assert_eq!(lookahead.current, point(10, 6));
    assert_eq!(lookahead.next, None);
    assert!(lookahead.enabled);
}

#[test]
fn test_walled_route_uses_the_gap() {
    let mut sim = walled_scenario();
    let unit = sim
        .entities()
        .sorted_ids()
        .into_iter()
        .find(|&id| sim.get_entity(id).is_some_and(|e| e.kind == ActorKind::Player))
        .expect("scenario has a unit");

    let events = sim.tick();
    assert!(events
        .path_results
        .iter()
        .any(|r| r.actor == unit && r.status == PathStatus::Complete));

    let entity = sim.get_entity(unit).expect("unit exists");
    let corners = entity.waypoints.as_ref().expect("unit has waypoints").points();
    assert!(corners
        .iter()
        .any(|c| c.y >= fixed(116) && c.y <= fixed(132)));
    let last = corners.last().expect("route is not empty");
    assert!(last.distance(point(60, 60)) < fixed(2));
}

#[test]
fn test_move_order_off_the_map_stays_put() {
    let mut sim = walled_scenario();
    let unit = sim
        .entities()
        .sorted_ids()
        .into_iter()
        .find(|&id| sim.get_entity(id).is_some_and(|e| e.kind == ActorKind::Player))
        .expect("scenario has a unit");
    // Further than the sample radius from any navigable cell.
    sim.issue_command(unit, Command::MoveTo(point(-40, 60)))
        .expect("unit accepts commands");

    let events = sim.tick();
    assert!(events.path_results.iter().any(|r| r.actor == unit
        && matches!(r.status, PathStatus::Failed(_))));
    let entity = sim.get_entity(unit).expect("unit exists");
    assert!(!entity.lookahead.is_some_and(|l| l.enabled));
    assert!(entity.waypoints.as_ref().is_some_and(|w| w.is_empty()));
}

// =============================================================================
// Navigation grid and obstacles
// =============================================================================

#[test]
fn test_grid_round_trip_returns_cell_centers() {
    let grid = NavGrid::new(32, 32, fixed(2));
    for y in 0..32 {
        for x in 0..32 {
            let center = grid.grid_to_world(x, y);
            assert_eq!(grid.world_to_grid(center), Some((x, y)));
        }
    }

    let inside = Vec2Fixed::new(fixed_f(7.3), fixed_f(12.9));
    let (x, y) = grid.world_to_grid(inside).expect("point is on the grid");
    assert_eq!(grid.grid_to_world(x, y), point(7, 13));
}

#[test]
fn test_adjacent_rects_do_not_overlap() {
    let left = Rect::new(point(0, 0), point(4, 4));
    let right = Rect::new(point(4, 0), point(8, 4));
    assert!(!left.overlaps(&right));
    assert!(!right.overlaps(&left));
}

proptest! {
    #[test]
    fn prop_rect_overlap_is_symmetric(
        ax in -50i32..50, ay in -50i32..50, aw in 1i32..20, ah in 1i32..20,
        bx in -50i32..50, by in -50i32..50, bw in 1i32..20, bh in 1i32..20,
    ) {
        let a = Rect::new(point(ax, ay), point(ax + aw, ay + ah));
        let b = Rect::new(point(bx, by), point(bx + bw, by + bh));
        prop_assert_eq!(a.overlaps(&b), b.overlaps(&a));
    }
}

// =============================================================================
// Whole battles
// =============================================================================

#[test]
fn test_battle_is_deterministic() {
    let mut a = battle_scenario(12);
    let mut b = battle_scenario(12);
    for _ in 0..300 {
        let ea = a.tick();
        let eb = b.tick();
        assert_eq!(ea.damage_events, eb.damage_events);
        assert_eq!(ea.deaths, eb.deaths);
    }
    assert_eq!(a.state_hash(), b.state_hash());
}

#[test]
fn test_battle_produces_damage_and_deaths() {
    let mut sim = battle_scenario(6);
    let mut damage = 0;
    let mut deaths = 0;
    for _ in 0..600 {
        let events = sim.tick();
        damage += events.damage_events.len();
        deaths += events.deaths.len();
    }
    assert!(damage > 0);
    assert!(deaths > 0);
    assert!(sim.entities().len() < 12 + 6);
}

#[test]
fn test_melee_attacker_holds_position_while_striking() {
    let mut sim = Simulation::new();
    let stats = CombatStats::new(fixed(5), fixed(1), fixed(1)).with_aggro_radius(fixed(10));
    let hostile = spawn_hostile(&mut sim, point(100, 100), stats);
    let victim = spawn_bystander(&mut sim, Vec2Fixed::new(fixed_f(101.4), fixed(100)));
    let position_of = |sim: &Simulation| {
        sim.get_entity(hostile)
            .and_then(|e| e.position)
            .map(|p| p.value)
            .expect("hostile exists")
    };

    let mut first_strike = None;
    for _ in 0..100 {
        let events = sim.tick();
        if events.damage_events.iter().any(|d| d.attacker == hostile) {
            first_strike = Some(position_of(&sim));
            break;
        }
    }
    let anchor = first_strike.expect("hostile strikes the adjacent victim");

    let mut strikes = 0;
    for _ in 0..60 {
        let events = sim.tick();
        strikes += events
            .damage_events
            .iter()
            .filter(|d| d.attacker == hostile && d.target == victim)
            .count();
        let drift = position_of(&sim).distance(anchor);
        assert!(drift < fixed_f(0.01), "melee attacker moved {drift} while in range");
    }
    assert!(strikes >= 2);
    let entity = sim.get_entity(hostile).expect("hostile exists");
    assert!(entity.lookahead.is_some_and(|l| !l.enabled));
}
