//! Simulation tuning parameters.
//!
//! Every constant the pipeline depends on lives here so scenarios can
//! override them from RON. Values are written as decimals in data files and
//! converted to [`Fixed`] once at load time.
//!
//! **Note:** This module contains no IO - it only parses strings.
//! File loading is handled by the caller.
//!
//! # Example RON
//!
//! ```ron
//! SimConfig(
//!     tick_rate: 20,
//!     targeting: (search_slices: 4, hysteresis_factor: 1.3),
//!     planner: (max_requests_per_tick: 16),
//! )
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{GameError, Result};
use crate::math::{fixed_decimal, vec2_decimal, Fixed, Vec2Fixed};

/// Axis-aligned playable area. Wander destinations are drawn from here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldBounds {
    /// Minimum corner.
    #[serde(with = "vec2_decimal")]
    pub min: Vec2Fixed,
    /// Maximum corner.
    #[serde(with = "vec2_decimal")]
    pub max: Vec2Fixed,
}

impl WorldBounds {
    /// Create bounds from two corners.
    #[must_use]
    pub fn new(min: Vec2Fixed, max: Vec2Fixed) -> Self {
        Self {
            min: min.min(max),
            max: min.max(max),
        }
    }

    /// Check whether a point lies inside (edges inclusive).
    #[must_use]
    pub fn contains(&self, point: Vec2Fixed) -> bool {
        point.x >= self.min.x && point.x <= self.max.x && point.y >= self.min.y && point.y <= self.max.y
    }
}

impl Default for WorldBounds {
    fn default() -> Self {
        Self::new(Vec2Fixed::ZERO, Vec2Fixed::from_ints(256, 256))
    }
}

/// Targeting and aggro tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetingConfig {
    /// Coarse spatial hash cell size used for enemy searches.
    #[serde(with = "fixed_decimal")]
    pub cell_size: Fixed,
    /// Number of time slices; an actor searches when `id % slices == tick % slices`.
    pub search_slices: u32,
    /// Retention radius multiplier applied to the acquisition radius.
    #[serde(with = "fixed_decimal")]
    pub hysteresis_factor: Fixed,
    /// Squared distance a target must move before the destination is refreshed.
    #[serde(with = "fixed_decimal")]
    pub retarget_threshold_sq: Fixed,
    /// Seconds between wander stuck checks.
    #[serde(with = "fixed_decimal")]
    pub stuck_check_interval: Fixed,
    /// Minimum displacement between stuck checks to count as progress.
    #[serde(with = "fixed_decimal")]
    pub stuck_distance: Fixed,
    /// Minimum seconds between retries of a partial path.
    #[serde(with = "fixed_decimal")]
    pub partial_retry_interval: Fixed,
    /// Aggro lock duration given to spawned actors.
    #[serde(with = "fixed_decimal")]
    pub default_lock_duration: Fixed,
}

impl Default for TargetingConfig {
    fn default() -> Self {
        Self {
            cell_size: Fixed::from_num(16),
            search_slices: 4,
            hysteresis_factor: Fixed::from_num(1.3),
            retarget_threshold_sq: Fixed::ONE,
            stuck_check_interval: Fixed::from_num(3),
            stuck_distance: Fixed::from_num(2),
            partial_retry_interval: Fixed::from_num(2),
            default_lock_duration: Fixed::from_num(3),
        }
    }
}

impl TargetingConfig {
    /// Retention radius for an acquisition radius.
    #[must_use]
    pub fn hysteresis_radius(&self, search_radius: Fixed) -> Fixed {
        search_radius * self.hysteresis_factor
    }

    /// Whether `id` runs its full search on `tick`.
    #[must_use]
    pub fn in_slice(&self, id: u64, tick: u64) -> bool {
        let slices = u64::from(self.search_slices.max(1));
        id % slices == tick % slices
    }
}

/// Steering and locomotion tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SteeringConfig {
    /// Fine spatial hash cell size used for separation queries.
    #[serde(with = "fixed_decimal")]
    pub avoidance_cell_size: Fixed,
    /// Distance to Current at which Next is promoted.
    #[serde(with = "fixed_decimal")]
    pub corner_radius: Fixed,
    /// Added to the obstacle radius when no explicit arrival radius is set.
    #[serde(with = "fixed_decimal")]
    pub arrival_margin: Fixed,
    /// Speed floor while decelerating on the final leg.
    #[serde(with = "fixed_decimal")]
    pub min_speed: Fixed,
    /// Extra search distance beyond the own radius for separation.
    #[serde(with = "fixed_decimal")]
    pub separation_margin: Fixed,
    /// Multiplier from overlap depth to separation velocity.
    #[serde(with = "fixed_decimal")]
    pub separation_strength: Fixed,
    /// Push applied to perfectly stacked actors.
    #[serde(with = "fixed_decimal")]
    pub stack_push: Fixed,
    /// Turn rate in radians per second.
    #[serde(with = "fixed_decimal")]
    pub turn_rate: Fixed,
}

impl Default for SteeringConfig {
    fn default() -> Self {
        Self {
            avoidance_cell_size: Fixed::from_num(4),
            corner_radius: Fixed::from_num(0.5),
            arrival_margin: Fixed::from_num(0.25),
            min_speed: Fixed::from_num(0.5),
            separation_margin: Fixed::ONE,
            separation_strength: Fixed::from_num(2),
            stack_push: Fixed::from_num(0.5),
            turn_rate: Fixed::from_num(6),
        }
    }
}

/// Path planner tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Maximum corners stored per actor.
    pub waypoint_capacity: usize,
    /// Path requests served per tick before the rest are deferred.
    pub max_requests_per_tick: u32,
    /// Optional wall-clock budget per tick in microseconds.
    ///
    /// Off by default: a wall-clock cut-off makes results depend on host speed.
    pub time_budget_micros: Option<u64>,
    /// Radius within which endpoints are snapped onto the navigable surface.
    #[serde(with = "fixed_decimal")]
    pub sample_radius: Fixed,
    /// Corners closer than this to the actor are skipped.
    #[serde(with = "fixed_decimal")]
    pub skip_distance: Fixed,
    /// `1 - dot` above which a corner counts as a real turn.
    #[serde(with = "fixed_decimal")]
    pub corner_tolerance: Fixed,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            waypoint_capacity: 64,
            max_requests_per_tick: 32,
            time_budget_micros: None,
            sample_radius: Fixed::from_num(2),
            skip_distance: Fixed::from_num(0.5),
            corner_tolerance: Fixed::from_num(0.2),
        }
    }
}

/// Combat tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombatConfig {
    /// Ticks a cosmetic projectile lives before despawning.
    pub projectile_lifetime_ticks: u32,
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self {
            projectile_lifetime_ticks: 6,
        }
    }
}

/// Complete simulation configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Simulation ticks per second.
    pub tick_rate: u32,
    /// Playable area.
    pub bounds: WorldBounds,
    /// Targeting settings.
    pub targeting: TargetingConfig,
    /// Steering settings.
    pub steering: SteeringConfig,
    /// Planner settings.
    pub planner: PlannerConfig,
    /// Combat settings.
    pub combat: CombatConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tick_rate: crate::simulation::TICK_RATE,
            bounds: WorldBounds::default(),
            targeting: TargetingConfig::default(),
            steering: SteeringConfig::default(),
            planner: PlannerConfig::default(),
            combat: CombatConfig::default(),
        }
    }
}

impl SimConfig {
    /// Seconds per tick.
    #[must_use]
    pub fn dt(&self) -> Fixed {
        Fixed::ONE / Fixed::from_num(self.tick_rate.max(1))
    }

    /// Simulation time at the given tick, in seconds.
    #[must_use]
    pub fn time_at(&self, tick: u64) -> Fixed {
        Fixed::from_num(tick) / Fixed::from_num(self.tick_rate.max(1))
    }

    /// Parse a configuration from RON. Missing fields take their defaults.
    pub fn from_ron_str(source: &str) -> Result<Self> {
        let config: Self = ron::from_str(source).map_err(|e| GameError::DataParseError {
            path: "<inline>".to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the pipeline divide by zero or never search.
    pub fn validate(&self) -> Result<()> {
        if self.tick_rate == 0 {
            return Err(GameError::InvalidState("tick_rate must be positive".into()));
        }
        if self.targeting.cell_size <= Fixed::ZERO || self.steering.avoidance_cell_size <= Fixed::ZERO
        {
            return Err(GameError::InvalidState(
                "spatial hash cell sizes must be positive".into(),
            ));
        }
        if self.bounds.min.x > self.bounds.max.x || self.bounds.min.y > self.bounds.max.y {
            return Err(GameError::InvalidState(
                "bounds min corner must not exceed max corner".into(),
            ));
        }
        if self.targeting.search_slices == 0 {
            return Err(GameError::InvalidState(
                "search_slices must be at least 1".into(),
            ));
        }
        if self.planner.waypoint_capacity == 0 {
            return Err(GameError::InvalidState(
                "waypoint_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_constants() {
        let config = SimConfig::default();
        assert_eq!(config.tick_rate, 20);
        assert_eq!(config.targeting.search_slices, 4);
        assert_eq!(config.planner.waypoint_capacity, 64);
        assert_eq!(config.dt(), Fixed::ONE / Fixed::from_num(20));
        assert!(config.planner.time_budget_micros.is_none());
    }

    #[test]
    fn test_partial_ron_keeps_defaults() {
        let config = SimConfig::from_ron_str(
            "(tick_rate: 30, targeting: (search_slices: 2), planner: (time_budget_micros: Some(1000)))",
        )
        .unwrap();

        assert_eq!(config.tick_rate, 30);
        assert_eq!(config.targeting.search_slices, 2);
        assert_eq!(config.targeting.hysteresis_factor, Fixed::from_num(1.3));
        assert_eq!(config.planner.time_budget_micros, Some(1000));
        assert_eq!(config.planner.waypoint_capacity, 64);
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(SimConfig::from_ron_str("(tick_rate: 0)").is_err());
        assert!(SimConfig::from_ron_str("(targeting: (search_slices: 0))").is_err());
        assert!(SimConfig::from_ron_str("(tick_rate: \"fast\")").is_err());
    }

    #[test]
    fn test_slice_membership() {
        let targeting = TargetingConfig::default();
        assert!(targeting.in_slice(5, 1));
        assert!(targeting.in_slice(8, 12));
        assert!(!targeting.in_slice(6, 1));
    }

    #[test]
    fn test_time_at() {
        let config = SimConfig::default();
        assert_eq!(config.time_at(40), Fixed::from_num(2));
    }
}
