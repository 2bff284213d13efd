//! Per-actor component definitions.
//!
//! Components are pure data with no pipeline behavior. Every mobile actor
//! is composed of these records; the stages in [`crate::targeting`],
//! [`crate::planner`], [`crate::movement`] and [`crate::attack`] each own a
//! specific subset of them for writing.

use serde::{Deserialize, Serialize};

use crate::math::{fixed_serde, option_fixed_serde, Fixed, Vec2Fixed};

/// Unique identifier for entities.
///
/// Also serves as the actor index for time-slicing and seeding.
pub type EntityId = u64;

/// Team membership. Actors on different teams may fight; equal teams never
/// damage each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Team(pub u8);

impl Team {
    /// Check whether two teams are enemies.
    #[must_use]
    pub const fn is_hostile_to(self, other: Team) -> bool {
        self.0 != other.0
    }
}

/// Which targeting procedure drives an actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActorKind {
    /// AI-controlled enemy: seeks the nearest enemy, wanders when idle,
    /// arms an aggro lock on acquisition.
    Hostile,
    /// Player-controlled unit: auto-targets only when its intent allows.
    Player,
}

/// Player-issued command state for units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Intent {
    /// No command; free to auto-target.
    #[default]
    Idle,
    /// Moving to a destination; ignores enemies.
    Move,
    /// Attacking an explicit target.
    Attack,
    /// Moving while engaging enemies along the way.
    AttackMove,
    /// Moving to and working a resource node.
    Gather,
    /// Moving to a construction site.
    Build,
    /// Standing still, engaging what comes into range.
    Hold,
    /// Walking back and forth between two points.
    Patrol,
}

impl Intent {
    /// Whether incoming damage may redirect this unit to its attacker.
    #[must_use]
    pub const fn accepts_damage_override(self) -> bool {
        matches!(self, Self::Idle | Self::AttackMove)
    }

    /// Whether the nearest-enemy search may run for this unit.
    #[must_use]
    pub const fn allows_auto_target(self) -> bool {
        matches!(self, Self::Idle | Self::AttackMove | Self::Hold)
    }

    /// Whether the attack resolver may fire for this unit.
    #[must_use]
    pub const fn allows_attack(self) -> bool {
        matches!(self, Self::Idle | Self::Attack | Self::AttackMove | Self::Hold)
    }

    /// Whether the unit may move to reach its target.
    #[must_use]
    pub const fn allows_chase(self) -> bool {
        !matches!(self, Self::Hold)
    }
}

/// Player orders for a unit: the current intent and where it was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct UnitOrders {
    /// Current command state.
    pub intent: Intent,
    /// Destination of the last positional command, if any.
    pub destination: Option<Vec2Fixed>,
}

impl UnitOrders {
    /// Drop back to idle.
    pub fn reset(&mut self) {
        self.intent = Intent::Idle;
        self.destination = None;
    }
}

/// Position component in world space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    /// Ground-plane position.
    pub value: Vec2Fixed,
    /// Height above the ground plane. Locked while moving.
    #[serde(with = "fixed_serde")]
    pub height: Fixed,
}

impl Position {
    /// Create a new position at ground level.
    #[must_use]
    pub const fn new(value: Vec2Fixed) -> Self {
        Self {
            value,
            height: Fixed::ZERO,
        }
    }

    /// Create a position at the origin.
    pub const ORIGIN: Self = Self::new(Vec2Fixed::ZERO);
}

/// Yaw-only orientation as a unit facing vector on the ground plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rotation {
    /// Unit vector the actor faces.
    pub facing: Vec2Fixed,
}

impl Rotation {
    /// Facing along +X.
    pub const IDENTITY: Self = Self {
        facing: Vec2Fixed::new(Fixed::ONE, Fixed::ZERO),
    };
}

impl Default for Rotation {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Velocity component for moving entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Velocity {
    /// Velocity vector (units per second).
    pub value: Vec2Fixed,
}

impl Velocity {
    /// Create a new velocity.
    #[must_use]
    pub const fn new(value: Vec2Fixed) -> Self {
        Self { value }
    }

    /// Zero velocity (stationary).
    pub const ZERO: Self = Self {
        value: Vec2Fixed::ZERO,
    };
}

/// Collision and interaction radius. Read-only for the whole pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObstacleRadius {
    /// Radius in world units.
    #[serde(with = "fixed_serde")]
    pub value: Fixed,
}

impl ObstacleRadius {
    /// Create a radius.
    #[must_use]
    pub const fn new(value: Fixed) -> Self {
        Self { value }
    }
}

/// Health component for damageable entities.
///
/// Mutated only by damage application; everything else reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Health {
    /// Current health points.
    #[serde(with = "fixed_serde")]
    pub current: Fixed,
    /// Maximum health points.
    #[serde(with = "fixed_serde")]
    pub max: Fixed,
}

impl Health {
    /// Create new health component at full health.
    #[must_use]
    pub const fn new(max: Fixed) -> Self {
        Self { current: max, max }
    }

    /// Check if entity is dead (health <= 0).
    #[must_use]
    pub fn is_dead(&self) -> bool {
        self.current <= Fixed::ZERO
    }

    /// Apply damage, returning actual damage dealt. Health never goes below zero.
    pub fn apply_damage(&mut self, amount: Fixed) -> Fixed {
        let actual = amount.max(Fixed::ZERO).min(self.current.max(Fixed::ZERO));
        self.current -= actual;
        actual
    }

    /// Get health as a percentage (0-100).
    #[must_use]
    pub fn percentage(&self) -> u32 {
        if self.max <= Fixed::ZERO {
            0
        } else {
            (self.current * Fixed::from_num(100) / self.max)
                .max(Fixed::ZERO)
                .to_num::<u32>()
        }
    }
}

/// Locomotion limits and the integrator's current scalar speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locomotion {
    /// Top speed in units per second.
    #[serde(with = "fixed_serde")]
    pub max_speed: Fixed,
    /// Speed gained per second.
    #[serde(with = "fixed_serde")]
    pub acceleration: Fixed,
    /// Speed lost per second.
    #[serde(with = "fixed_serde")]
    pub deceleration: Fixed,
    /// Speed after the last integration step.
    #[serde(with = "fixed_serde")]
    pub current_speed: Fixed,
}

impl Locomotion {
    /// Create locomotion starting at rest.
    #[must_use]
    pub const fn new(max_speed: Fixed, acceleration: Fixed, deceleration: Fixed) -> Self {
        Self {
            max_speed,
            acceleration,
            deceleration,
            current_speed: Fixed::ZERO,
        }
    }
}

/// Current combat target and where it was last seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct AggroTarget {
    /// The entity being targeted.
    pub target: Option<EntityId>,
    /// Target position at the last validity check.
    pub last_known_position: Vec2Fixed,
}

impl AggroTarget {
    /// Set a new target.
    pub fn set(&mut self, target: EntityId, position: Vec2Fixed) {
        self.target = Some(target);
        self.last_known_position = position;
    }

    /// Clear the current target.
    pub fn clear(&mut self) {
        self.target = None;
    }
}

/// Sticky target that suppresses re-targeting for a while.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AggroLock {
    /// Locked target.
    pub locked: Option<EntityId>,
    /// Seconds left on the lock.
    #[serde(with = "fixed_serde")]
    pub remaining: Fixed,
    /// Seconds a fresh lock lasts.
    #[serde(with = "fixed_serde")]
    pub duration: Fixed,
}

impl AggroLock {
    /// Create an unarmed lock with the given duration.
    #[must_use]
    pub const fn new(duration: Fixed) -> Self {
        Self {
            locked: None,
            remaining: Fixed::ZERO,
            duration,
        }
    }

    /// Lock onto a target for the configured duration.
    pub fn arm(&mut self, target: EntityId) {
        self.locked = Some(target);
        self.remaining = self.duration;
    }

    /// Count the lock down; releases it at zero.
    pub fn tick(&mut self, dt: Fixed) {
        if self.remaining > Fixed::ZERO {
            self.remaining = (self.remaining - dt).max(Fixed::ZERO);
        }
        if self.remaining == Fixed::ZERO {
            self.locked = None;
        }
    }

    /// Locked target while time remains.
    #[must_use]
    pub fn active_target(&self) -> Option<EntityId> {
        if self.remaining > Fixed::ZERO {
            self.locked
        } else {
            None
        }
    }

    /// Drop the lock immediately.
    pub fn release(&mut self) {
        self.locked = None;
        self.remaining = Fixed::ZERO;
    }
}

/// Where the actor wants to go and the bookkeeping around getting there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MovementGoal {
    /// Requested destination.
    pub destination: Vec2Fixed,
    /// The planner must (re)compute a path.
    pub path_dirty: bool,
    /// Index into the waypoint buffer of the lookahead's Current.
    pub waypoint_index: usize,
    /// The last path only reached part of the way.
    pub is_partial: bool,
    /// Simulation time of the last path request.
    #[serde(with = "fixed_serde")]
    pub last_path_request_time: Fixed,
    /// Simulation time of the last stuck check.
    #[serde(with = "fixed_serde")]
    pub last_stuck_check_time: Fixed,
    /// Position recorded at the last stuck check.
    pub last_stuck_check_position: Vec2Fixed,
    /// Destination was picked by the wander fallback.
    pub is_wandering: bool,
    /// Explicit arrival radius; `None` uses obstacle radius plus margin.
    #[serde(with = "option_fixed_serde")]
    pub arrival_radius: Option<Fixed>,
}

impl MovementGoal {
    /// Create an idle goal at the given position.
    #[must_use]
    pub const fn at(position: Vec2Fixed) -> Self {
        Self {
            destination: position,
            path_dirty: false,
            waypoint_index: 0,
            is_partial: false,
            last_path_request_time: Fixed::ZERO,
            last_stuck_check_time: Fixed::ZERO,
            last_stuck_check_position: position,
            is_wandering: false,
            arrival_radius: None,
        }
    }

    /// Request a path to a new destination.
    pub fn request(&mut self, destination: Vec2Fixed) {
        self.destination = destination;
        self.path_dirty = true;
    }
}

/// Corner polyline produced by the planner.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct WaypointBuffer {
    points: Vec<Vec2Fixed>,
    capacity: usize,
}

impl WaypointBuffer {
    /// Create an empty buffer with a fixed capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            points: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Replace the contents, truncating to capacity.
    pub fn fill(&mut self, corners: &[Vec2Fixed]) {
        self.points.clear();
        let take = corners.len().min(self.capacity);
        self.points.extend_from_slice(&corners[..take]);
    }

    /// Remove all waypoints.
    pub fn clear(&mut self) {
        self.points.clear();
    }

    /// Waypoint at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<Vec2Fixed> {
        self.points.get(index).copied()
    }

    /// All stored waypoints.
    #[must_use]
    pub fn points(&self) -> &[Vec2Fixed] {
        &self.points
    }

    /// Number of stored waypoints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Maximum number of waypoints.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Two-slot lookahead: the only thing the integrator steers by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct MovementWaypoints {
    /// Waypoint being steered toward.
    pub current: Vec2Fixed,
    /// Following waypoint, if any.
    pub next: Option<Vec2Fixed>,
    /// The actor is actively moving.
    pub enabled: bool,
}

impl MovementWaypoints {
    /// Stop moving.
    pub fn disable(&mut self) {
        self.enabled = false;
        self.next = None;
    }
}

/// Attack delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AttackKind {
    /// Close combat; no projectile.
    #[default]
    Melee,
    /// Instant-hit ranged attack with a cosmetic projectile.
    Ranged,
}

/// Combat stats component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CombatStats {
    /// Base damage per attack.
    #[serde(with = "fixed_serde")]
    pub attack_power: Fixed,
    /// Fraction of incoming damage blocked, nominally 0..=1.
    #[serde(with = "fixed_serde")]
    pub defense: Fixed,
    /// Attack range measured to the target's edge.
    #[serde(with = "fixed_serde")]
    pub range: Fixed,
    /// Attacks per second.
    #[serde(with = "fixed_serde")]
    pub attack_speed: Fixed,
    /// Enemy acquisition radius (chase distance for hostiles).
    #[serde(with = "fixed_serde")]
    pub aggro_radius: Fixed,
    /// Melee or ranged.
    pub kind: AttackKind,
}

impl CombatStats {
    /// Create melee stats.
    #[must_use]
    pub fn new(attack_power: Fixed, range: Fixed, attack_speed: Fixed) -> Self {
        Self {
            attack_power,
            defense: Fixed::ZERO,
            range,
            attack_speed,
            aggro_radius: Fixed::from_num(12),
            kind: AttackKind::Melee,
        }
    }

    /// Builder method to set defense.
    #[must_use]
    pub fn with_defense(mut self, defense: Fixed) -> Self {
        self.defense = defense;
        self
    }

    /// Builder method to set the acquisition radius.
    #[must_use]
    pub fn with_aggro_radius(mut self, radius: Fixed) -> Self {
        self.aggro_radius = radius;
        self
    }

    /// Builder method to set the attack kind.
    #[must_use]
    pub fn with_kind(mut self, kind: AttackKind) -> Self {
        self.kind = kind;
        self
    }

    /// Seconds between attacks; one second when attack speed is not positive.
    #[must_use]
    pub fn attack_interval(&self) -> Fixed {
        if self.attack_speed > Fixed::ZERO {
            Fixed::ONE / self.attack_speed
        } else {
            Fixed::ONE
        }
    }
}

impl Default for CombatStats {
    fn default() -> Self {
        Self::new(Fixed::from_num(10), Fixed::from_num(1), Fixed::ONE)
    }
}

/// Seconds until the next attack may fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct AttackCooldown {
    /// Remaining seconds.
    #[serde(with = "fixed_serde")]
    pub remaining: Fixed,
}

impl AttackCooldown {
    /// Check if ready to attack.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.remaining <= Fixed::ZERO
    }

    /// Count down by `dt`, never below zero.
    pub fn tick(&mut self, dt: Fixed) {
        self.remaining = (self.remaining - dt).max(Fixed::ZERO);
    }
}

/// One pending hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DamageEntry {
    /// Attacker.
    pub source: EntityId,
    /// Damage after defense.
    #[serde(with = "fixed_serde")]
    pub amount: Fixed,
}

/// Deferred damage, appended by attackers and drained once per tick.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct DamageQueue {
    entries: Vec<DamageEntry>,
}

impl DamageQueue {
    /// Append a hit.
    pub fn push(&mut self, entry: DamageEntry) {
        self.entries.push(entry);
    }

    /// Sum of all pending damage.
    #[must_use]
    pub fn total(&self) -> Fixed {
        self.entries
            .iter()
            .fold(Fixed::ZERO, |acc, entry| acc + entry.amount)
    }

    /// Most recent attacker.
    #[must_use]
    pub fn last_attacker(&self) -> Option<EntityId> {
        self.entries.last().map(|entry| entry.source)
    }

    /// Pending entries.
    #[must_use]
    pub fn entries(&self) -> &[DamageEntry] {
        &self.entries
    }

    /// Check if nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove all pending entries.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Component tracking patrol behavior between two points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PatrolState {
    /// Patrol origin (starting point).
    pub origin: Vec2Fixed,
    /// Patrol target (destination point).
    pub target: Vec2Fixed,
    /// Whether the unit is heading toward the target.
    pub heading_to_target: bool,
}

impl PatrolState {
    /// Leg end the unit is currently walking to.
    #[must_use]
    pub fn current_leg_end(&self) -> Vec2Fixed {
        if self.heading_to_target {
            self.target
        } else {
            self.origin
        }
    }
}

/// Visual-only projectile spawned by ranged attacks.
///
/// Damage is resolved at fire time; this only exists so clients can draw a
/// shot. It is never indexed, targeted or collided with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Projectile {
    /// Entity that fired.
    pub source: EntityId,
    /// Entity that was hit.
    pub target: EntityId,
    /// Where the target stood when hit.
    pub target_position: Vec2Fixed,
    /// Ticks until despawn.
    pub remaining_ticks: u32,
}

/// A command from the command-intake boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Command {
    /// Move to a position, ignoring enemies.
    MoveTo(Vec2Fixed),
    /// Move to a position, engaging enemies along the way.
    AttackMove(Vec2Fixed),
    /// Attack a specific entity.
    Attack(EntityId),
    /// Walk to a resource node and gather there.
    Gather(Vec2Fixed),
    /// Walk to a construction site.
    Build(Vec2Fixed),
    /// Hold position and engage what comes into range.
    HoldPosition,
    /// Patrol between current position and target.
    Patrol(Vec2Fixed),
    /// Stop all actions.
    Stop,
}
