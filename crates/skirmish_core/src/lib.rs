//! # Skirmish Core
//!
//! The server-side half of an RTS tick: where actors go and whom they fight.
//!
//! Everything in here is pure simulation. There is no rendering or IO, all
//! math is fixed-point, and the only randomness is a ChaCha RNG seeded from
//! actor id and tick. Two machines fed the same commands produce the same
//! [`simulation::Simulation::state_hash`] on every tick, which is what the
//! headless runner and the determinism tests check.
//!
//! ## Modules
//!
//! - [`spatial`] / [`snapshot`] - per-tick spatial hashes over a frozen actor view
//! - [`targeting`] - time-sliced aggro with hysteresis and locks
//! - [`planner`] - budgeted path requests and the waypoint follower
//! - [`movement`] / [`steering`] - kinematic integrator and arrival
//! - [`attack`] - melee and ranged resolvers, damage formula
//! - [`systems`] - stage order for one tick
//! - [`simulation`] - actor table, commands, hashing and snapshots
//! - [`navigation`] / [`obstacles`] / [`terrain`] - world queries
//! - [`config`] / [`error`] / [`math`] - tuning, errors, fixed-point helpers

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod attack;
pub mod components;
pub mod config;
pub mod error;
pub mod math;
pub mod movement;
pub mod navigation;
pub mod obstacles;
pub mod planner;
pub mod simulation;
pub mod snapshot;
pub mod spatial;
pub mod steering;
pub mod systems;
pub mod targeting;
pub mod terrain;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::components::*;
    pub use crate::config::{SimConfig, WorldBounds};
    pub use crate::error::{GameError, NavError, Result};
    pub use crate::math::{Fixed, Vec2Fixed};
    pub use crate::navigation::{NavGrid, NavigationService};
    pub use crate::obstacles::{ObstacleQuery, Rect};
    pub use crate::simulation::{EntitySpawnParams, Simulation, TickEvents};
    pub use crate::terrain::Terrain;
}
