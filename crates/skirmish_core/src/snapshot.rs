//! Read-only view of every actor, captured at a fixed point in the tick.
//!
//! Parallel stages read the snapshot instead of the live entity table, so no
//! actor ever observes another actor's half-applied update.

use rustc_hash::FxHashMap;

use crate::components::{ActorKind, EntityId, Team};
use crate::math::{Fixed, Vec2Fixed};
use crate::spatial::SpatialHash;

/// What other actors may know about one actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActorSnapshot {
    /// Actor handle.
    pub id: EntityId,
    /// Targeting procedure.
    pub kind: ActorKind,
    /// Team.
    pub team: Team,
    /// Ground-plane position.
    pub position: Vec2Fixed,
    /// Obstacle radius.
    pub radius: Fixed,
    /// Damage reduction fraction.
    pub defense: Fixed,
    /// Health above zero.
    pub alive: bool,
    /// Parked at a resource node; exempt from separation.
    pub gathering: bool,
}

/// All actors keyed by id.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    actors: FxHashMap<EntityId, ActorSnapshot>,
}

impl Snapshot {
    /// Build from actor records.
    pub fn from_actors<I>(actors: I) -> Self
    where
        I: IntoIterator<Item = ActorSnapshot>,
    {
        Self {
            actors: actors.into_iter().map(|actor| (actor.id, actor)).collect(),
        }
    }

    /// Look up an actor.
    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<&ActorSnapshot> {
        self.actors.get(&id)
    }

    /// Look up an actor that is still alive.
    #[must_use]
    pub fn living(&self, id: EntityId) -> Option<&ActorSnapshot> {
        self.actors.get(&id).filter(|actor| actor.alive)
    }

    /// Number of actors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.actors.len()
    }

    /// Check if there are no actors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }

    /// Hash of every living actor, for enemy searches.
    #[must_use]
    pub fn targeting_hash(&self, cell_size: Fixed) -> SpatialHash {
        let mut hash = SpatialHash::new(cell_size);
        hash.rebuild(
            self.sorted()
                .filter(|actor| actor.alive)
                .map(|actor| (actor.id, actor.team, actor.position, actor.radius)),
        );
        hash
    }

    /// Hash of living actors that take part in separation.
    #[must_use]
    pub fn avoidance_hash(&self, cell_size: Fixed) -> SpatialHash {
        let mut hash = SpatialHash::new(cell_size);
        hash.rebuild(
            self.sorted()
                .filter(|actor| actor.alive && !actor.gathering)
                .map(|actor| (actor.id, actor.team, actor.position, actor.radius)),
        );
        hash
    }

    /// Actors in ascending id order.
    fn sorted(&self) -> impl Iterator<Item = &ActorSnapshot> {
        let mut actors: Vec<&ActorSnapshot> = self.actors.values().collect();
        actors.sort_unstable_by_key(|actor| actor.id);
        actors.into_iter()
    }
}
