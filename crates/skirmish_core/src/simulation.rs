//! Core simulation loop.
//!
//! The simulation runs at a fixed tick rate and processes all actor logic
//! deterministically. It owns the actor table, the terrain and the path
//! planner's round-robin cursor, and hands them to the
//! [`Pipeline`](crate::systems::Pipeline) once per tick.
//!
//! # Determinism
//!
//! - No floating-point math (uses fixed-point via [`Fixed`])
//! - Seeded RNG only (wander points)
//! - Consistent iteration order (sorted entity IDs)
//! - Same inputs always produce same outputs
//!
//! # Example
//!
//! ```
//! use skirmish_core::simulation::{Simulation, EntitySpawnParams};
//! use skirmish_core::components::Command;
//! use skirmish_core::math::Vec2Fixed;
//!
//! let mut sim = Simulation::new();
//! let unit = sim.spawn_actor(EntitySpawnParams {
//!     position: Vec2Fixed::from_ints(10, 10),
//!     ..Default::default()
//! });
//!
//! sim.issue_command(unit, Command::MoveTo(Vec2Fixed::from_ints(20, 10))).unwrap();
//! sim.tick();
//! ```

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::components::{
    ActorKind, AggroLock, AggroTarget, AttackCooldown, CombatStats, Command, DamageQueue, EntityId,
    Health, Intent, Locomotion, MovementGoal, MovementWaypoints, ObstacleRadius, PatrolState,
    Position, Projectile, Rotation, Team, UnitOrders, Velocity, WaypointBuffer,
};
use crate::config::SimConfig;
use crate::error::{GameError, Result};
use crate::math::{Fixed, Vec2Fixed};
use crate::navigation::{NavPath, NavigationService, PathRequest};
use crate::obstacles::ObstacleQuery;
use crate::planner::{PathPlanner, PathResult};
use crate::systems::{Arrival, DamageEvent, Pipeline};
use crate::targeting::TargetChange;
use crate::terrain::Terrain;

/// Ticks per second for the simulation.
pub const TICK_RATE: u32 = 20;

/// An entity with optional components.
///
/// Actors carry a body (position, radius, health), optionally locomotion
/// and combat records. Cosmetic projectiles carry only a position and a
/// [`Projectile`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Entity {
    /// Unique identifier for this entity.
    pub id: EntityId,
    /// Team membership.
    pub team: Team,
    /// Which targeting procedure runs.
    pub kind: ActorKind,
    /// World position.
    pub position: Option<Position>,
    /// Yaw facing.
    pub rotation: Option<Rotation>,
    /// Velocity committed by the integrator.
    pub velocity: Option<Velocity>,
    /// Collision radius.
    pub radius: Option<ObstacleRadius>,
    /// Health for damageable entities.
    pub health: Option<Health>,
    /// Speed limits.
    pub locomotion: Option<Locomotion>,
    /// Combat statistics.
    pub combat_stats: Option<CombatStats>,
    /// Attack timer.
    pub cooldown: Option<AttackCooldown>,
    /// Current target.
    pub aggro_target: Option<AggroTarget>,
    /// Sticky target lock.
    pub aggro_lock: Option<AggroLock>,
    /// Where the actor is headed.
    pub movement_goal: Option<MovementGoal>,
    /// Planned corners.
    pub waypoints: Option<WaypointBuffer>,
    /// Two-slot steering lookahead.
    pub lookahead: Option<MovementWaypoints>,
    /// Player orders (units only).
    pub orders: Option<UnitOrders>,
    /// Patrol legs for units executing patrol commands.
    pub patrol_state: Option<PatrolState>,
    /// Deferred incoming damage.
    pub damage_queue: Option<DamageQueue>,
    /// Parked at a resource node; exempt from separation.
    pub gathering: bool,
    /// Projectile data for projectile entities.
    pub projectile: Option<Projectile>,
}

impl Entity {
    /// Create a new entity with the given ID and no components.
    #[must_use]
    pub fn new(id: EntityId) -> Self {
        Self {
            id,
            team: Team::default(),
            kind: ActorKind::Player,
            position: None,
            rotation: None,
            velocity: None,
            radius: None,
            health: None,
            locomotion: None,
            combat_stats: None,
            cooldown: None,
            aggro_target: None,
            aggro_lock: None,
            movement_goal: None,
            waypoints: None,
            lookahead: None,
            orders: None,
            patrol_state: None,
            damage_queue: None,
            gathering: false,
            projectile: None,
        }
    }

    /// Health above zero (entities without health never die).
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.health.map_or(true, |health| !health.is_dead())
    }
}

/// Parameters for spawning a new actor.
#[derive(Debug, Clone)]
pub struct EntitySpawnParams {
    /// Targeting procedure.
    pub kind: ActorKind,
    /// Team.
    pub team: Team,
    /// Initial ground-plane position.
    pub position: Vec2Fixed,
    /// Height above the ground plane.
    pub height: Fixed,
    /// Collision radius.
    pub radius: Fixed,
    /// Maximum health (actor starts at full health).
    pub health: Fixed,
    /// Movement capability; `None` spawns a stationary actor.
    pub locomotion: Option<Locomotion>,
    /// Combat capability.
    pub combat_stats: Option<CombatStats>,
    /// Explicit arrival radius.
    pub arrival_radius: Option<Fixed>,
}

impl Default for EntitySpawnParams {
    fn default() -> Self {
        Self {
            kind: ActorKind::Player,
            team: Team(0),
            position: Vec2Fixed::ZERO,
            height: Fixed::ZERO,
            radius: Fixed::from_num(0.5),
            health: Fixed::from_num(100),
            locomotion: Some(Locomotion::new(
                Fixed::from_num(4),
                Fixed::from_num(8),
                Fixed::from_num(8),
            )),
            combat_stats: None,
            arrival_radius: None,
        }
    }
}

/// Storage for all entities in the simulation.
///
/// Uses a `HashMap` for O(1) entity lookup by ID, with deterministic
/// iteration via sorted keys when processing systems.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityStorage {
    /// Map of entity ID to entity data.
    entities: HashMap<EntityId, Entity>,
    /// Next entity ID to assign.
    next_id: EntityId,
}

impl EntityStorage {
    /// Create empty entity storage.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entities: HashMap::new(),
            next_id: 1,
        }
    }

    /// Insert a new entity and return its ID.
    pub fn insert(&mut self, mut entity: Entity) -> EntityId {
        let id = self.next_id;
        self.next_id += 1;
        entity.id = id;
        self.entities.insert(id, entity);
        id
    }

    /// Remove an entity by ID.
    pub fn remove(&mut self, id: EntityId) -> Option<Entity> {
        self.entities.remove(&id)
    }

    /// Get an entity by ID.
    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    /// Get a mutable reference to an entity by ID.
    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    /// Check if an entity exists.
    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    /// Get the number of entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Check if storage is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Get sorted entity IDs for deterministic iteration.
    #[must_use]
    pub fn sorted_ids(&self) -> Vec<EntityId> {
        let mut ids: Vec<_> = self.entities.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Iterate over all entities (not in deterministic order).
    pub fn iter(&self) -> impl Iterator<Item = (&EntityId, &Entity)> {
        self.entities.iter()
    }

    /// Iterate mutably over all entities (not in deterministic order).
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&EntityId, &mut Entity)> {
        self.entities.iter_mut()
    }
}

/// Events generated during a simulation tick.
///
/// Consumed by the replication or presentation layer; the simulation
/// itself never reads them back.
#[derive(Debug, Clone, Default)]
pub struct TickEvents {
    /// Damage queued this tick.
    pub damage_events: Vec<DamageEvent>,
    /// Entities that died this tick.
    pub deaths: Vec<EntityId>,
    /// Actors that reached their destination.
    pub arrivals: Vec<Arrival>,
    /// Path requests served this tick.
    pub path_results: Vec<PathResult>,
    /// Dirty path requests pushed to a later tick.
    pub deferred_paths: usize,
    /// Target acquisitions and losses.
    pub target_changes: Vec<(EntityId, TargetChange)>,
    /// Actors that ran a full enemy search.
    pub searches: Vec<EntityId>,
    /// Cosmetic projectiles spawned this tick.
    pub projectiles: Vec<EntityId>,
}

/// The core actor simulation.
///
/// Each tick runs the stages in a fixed order:
/// spatial index, targeting, path planning, path following, movement
/// integration, arrival detection, attack resolution, then damage
/// reactions and application. See [`Pipeline`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Simulation {
    /// Current simulation tick.
    tick: u64,
    /// Tuning.
    config: SimConfig,
    /// Navigation grid and static obstacles.
    terrain: Terrain,
    /// All entities in the simulation.
    entities: EntityStorage,
    /// Round-robin cursor for deferred path requests.
    planner: PathPlanner,
}

impl Simulation {
    /// Create a new empty simulation with default config and open terrain.
    ///
    /// ```
    /// use skirmish_core::simulation::Simulation;
    ///
    /// let sim = Simulation::new();
    /// assert_eq!(sim.get_tick(), 0);
    /// ```
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(SimConfig::default())
    }

    /// Create a simulation with open terrain covering the config bounds.
    #[must_use]
    pub fn with_config(config: SimConfig) -> Self {
        let terrain = Terrain::open(config.bounds, Fixed::from_num(2));
        Self::with_terrain(config, terrain)
    }

    /// Create a simulation over prepared terrain.
    #[must_use]
    pub fn with_terrain(config: SimConfig, terrain: Terrain) -> Self {
        Self {
            tick: 0,
            config,
            terrain,
            entities: EntityStorage::new(),
            planner: PathPlanner::new(),
        }
    }

    /// Get the current tick number.
    #[must_use]
    pub const fn get_tick(&self) -> u64 {
        self.tick
    }

    /// Simulation time in seconds.
    #[must_use]
    pub fn time(&self) -> Fixed {
        self.config.time_at(self.tick)
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Navigation grid and static obstacles.
    #[must_use]
    pub fn terrain(&self) -> &Terrain {
        &self.terrain
    }

    /// Get a reference to the entity storage.
    #[must_use]
    pub fn entities(&self) -> &EntityStorage {
        &self.entities
    }

    /// Get an entity by ID.
    #[must_use]
    pub fn get_entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(id)
    }

    /// Advance the simulation by one tick using the built-in terrain.
    ///
    /// ```
    /// use skirmish_core::simulation::Simulation;
    ///
    /// let mut sim = Simulation::new();
    /// let events = sim.tick();
    /// assert_eq!(sim.get_tick(), 1);
    /// assert!(events.deaths.is_empty());
    /// ```
    pub fn tick(&mut self) -> TickEvents {
        let pipeline = Pipeline {
            config: &self.config,
            nav: &self.terrain,
            obstacles: &self.terrain,
            tick: self.tick,
            time: self.config.time_at(self.tick),
        };
        let events = pipeline.run(&mut self.entities, &mut self.planner);
        self.finish_tick();
        events
    }

    /// Advance one tick against externally supplied navigation and obstacles.
    pub fn tick_with(
        &mut self,
        nav: &dyn NavigationService,
        obstacles: &dyn ObstacleQuery,
    ) -> TickEvents {
        let pipeline = Pipeline {
            config: &self.config,
            nav,
            obstacles,
            tick: self.tick,
            time: self.config.time_at(self.tick),
        };
        let events = pipeline.run(&mut self.entities, &mut self.planner);
        self.finish_tick();
        events
    }

    fn finish_tick(&mut self) {
        self.tick += 1;

        #[cfg(debug_assertions)]
        {
            let hash = self.state_hash();
            tracing::debug!(tick = self.tick, state_hash = hash, "Simulation state hash");
        }
    }

    /// Spawn an actor and return its ID.
    ///
    /// ```
    /// use skirmish_core::simulation::{Simulation, EntitySpawnParams};
    /// use skirmish_core::components::{ActorKind, CombatStats, Team};
    /// use skirmish_core::math::{Fixed, Vec2Fixed};
    ///
    /// let mut sim = Simulation::new();
    /// let grunt = sim.spawn_actor(EntitySpawnParams {
    ///     kind: ActorKind::Hostile,
    ///     team: Team(1),
    ///     position: Vec2Fixed::from_ints(100, 50),
    ///     combat_stats: Some(CombatStats::default()),
    ///     ..Default::default()
    /// });
    /// assert!(sim.get_entity(grunt).is_some());
    /// ```
    pub fn spawn_actor(&mut self, params: EntitySpawnParams) -> EntityId {
        let mut entity = Entity::new(0); // ID will be assigned by storage
        entity.kind = params.kind;
        entity.team = params.team;
        entity.position = Some(Position {
            value: params.position,
            height: params.height,
        });
        entity.rotation = Some(Rotation::IDENTITY);
        entity.velocity = Some(Velocity::ZERO);
        entity.radius = Some(ObstacleRadius::new(params.radius));
        entity.health = Some(Health::new(params.health));
        entity.damage_queue = Some(DamageQueue::default());

        if let Some(locomotion) = params.locomotion {
            let mut goal = MovementGoal::at(params.position);
            goal.arrival_radius = params.arrival_radius;
            entity.locomotion = Some(locomotion);
            entity.movement_goal = Some(goal);
            entity.waypoints = Some(WaypointBuffer::with_capacity(
                self.config.planner.waypoint_capacity,
            ));
            entity.lookahead = Some(MovementWaypoints {
                current: params.position,
                next: None,
                enabled: false,
            });
        }

        if let Some(stats) = params.combat_stats {
            entity.combat_stats = Some(stats);
            entity.cooldown = Some(AttackCooldown::default());
            entity.aggro_target = Some(AggroTarget::default());
            entity.aggro_lock = Some(AggroLock::new(self.config.targeting.default_lock_duration));
        }

        if params.kind == ActorKind::Player {
            entity.orders = Some(UnitOrders::default());
        }

        self.entities.insert(entity)
    }

    /// Remove an entity from the simulation.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::EntityNotFound`] if the entity doesn't exist.
    pub fn despawn(&mut self, id: EntityId) -> Result<()> {
        if self.entities.remove(id).is_some() {
            Ok(())
        } else {
            Err(GameError::EntityNotFound(id))
        }
    }

    /// Apply a player command to a unit.
    ///
    /// Sets the unit's intent and, for positional commands, its destination
    /// and dirty flag. Takes effect at the start of the next tick.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::EntityNotFound`] if the unit or an attack target
    /// doesn't exist, or [`GameError::MissingComponent`] if the entity is not
    /// a commandable unit.
    pub fn issue_command(&mut self, entity: EntityId, command: Command) -> Result<()> {
        let target_position = match command {
            Command::Attack(target) => Some(
                self.entities
                    .get(target)
                    .and_then(|t| t.position)
                    .ok_or(GameError::EntityNotFound(target))?
                    .value,
            ),
            _ => None,
        };

        let ent = self
            .entities
            .get_mut(entity)
            .ok_or(GameError::EntityNotFound(entity))?;
        let position = ent.position.map_or(Vec2Fixed::ZERO, |p| p.value);
        let orders = ent.orders.as_mut().ok_or(GameError::MissingComponent {
            entity,
            component: "UnitOrders",
        })?;

        let destination = match command {
            Command::MoveTo(dest) => {
                orders.intent = Intent::Move;
                Some(dest)
            }
            Command::AttackMove(dest) => {
                orders.intent = Intent::AttackMove;
                Some(dest)
            }
            Command::Gather(dest) => {
                orders.intent = Intent::Gather;
                Some(dest)
            }
            Command::Build(dest) => {
                orders.intent = Intent::Build;
                Some(dest)
            }
            Command::Patrol(dest) => {
                orders.intent = Intent::Patrol;
                Some(dest)
            }
            Command::Attack(_) => {
                orders.intent = Intent::Attack;
                None
            }
            Command::HoldPosition => {
                orders.intent = Intent::Hold;
                None
            }
            Command::Stop => {
                orders.reset();
                None
            }
        };
        orders.destination = destination;

        ent.gathering = false;
        ent.patrol_state = match command {
            Command::Patrol(dest) => Some(PatrolState {
                origin: position,
                target: dest,
                heading_to_target: true,
            }),
            _ => None,
        };

        if let Some(target) = ent.aggro_target.as_mut() {
            match (command, target_position) {
                (Command::Attack(id), Some(at)) => target.set(id, at),
                _ => target.clear(),
            }
        }
        if let Some(lock) = ent.aggro_lock.as_mut() {
            lock.release();
        }

        match destination.or(target_position) {
            Some(dest) => {
                if let Some(goal) = ent.movement_goal.as_mut() {
                    goal.request(dest);
                    goal.is_wandering = false;
                }
            }
            None => {
                if let Some(goal) = ent.movement_goal.as_mut() {
                    goal.path_dirty = false;
                }
                if let Some(lookahead) = ent.lookahead.as_mut() {
                    lookahead.disable();
                }
                ent.velocity = Some(Velocity::ZERO);
            }
        }

        tracing::debug!(entity, ?command, "command issued");
        Ok(())
    }

    /// Point an actor's movement goal at a destination.
    ///
    /// This is the director-side write for hostiles; it does not touch
    /// orders.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::EntityNotFound`] if the entity doesn't exist, or
    /// [`GameError::MissingComponent`] if it cannot move.
    pub fn set_destination(&mut self, entity: EntityId, destination: Vec2Fixed) -> Result<()> {
        let goal = self
            .entities
            .get_mut(entity)
            .ok_or(GameError::EntityNotFound(entity))?
            .movement_goal
            .as_mut()
            .ok_or(GameError::MissingComponent {
                entity,
                component: "MovementGoal",
            })?;
        goal.request(destination);
        goal.is_wandering = false;
        Ok(())
    }

    /// Route from `start` to `end` on the built-in terrain without touching
    /// any actor.
    ///
    /// Used to preview orders before issuing them.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::Navigation`] when either endpoint cannot be
    /// placed or no route exists.
    pub fn preview_path(&self, start: Vec2Fixed, end: Vec2Fixed) -> Result<NavPath> {
        let request = PathRequest {
            start,
            end,
            sample_radius: self.config.planner.sample_radius,
            max_corners: self.config.planner.waypoint_capacity,
        };
        Ok(self.terrain.compute_path(&request)?)
    }

    /// Calculate a hash of the current simulation state.
    ///
    /// Used for desync detection. Two simulations with identical state will
    /// produce identical hashes.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();

        self.tick.hash(&mut hasher);
        self.planner.hash(&mut hasher);

        // Hash entities in deterministic order
        let ids = self.entities.sorted_ids();
        ids.len().hash(&mut hasher);
        for id in ids {
            if let Some(entity) = self.entities.get(id) {
                entity.hash(&mut hasher);
            }
        }

        hasher.finish()
    }

    /// Serialize the simulation state for replay or network sync.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| GameError::Serialization(e.to_string()))
    }

    /// Deserialize simulation state from bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails.
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        bincode::deserialize(data).map_err(|e| GameError::Serialization(e.to_string()))
    }
}

impl Default for Simulation {
    fn default() -> Self {
        Self::new()
    }
}
