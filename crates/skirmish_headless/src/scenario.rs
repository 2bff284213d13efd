//! Scenario loading and configuration.
//!
//! Scenarios define the initial simulation state for headless runs: the
//! playable bounds, static obstacles, actor placements with their standing
//! orders, and optional simulation tuning. They are written in RON; all
//! numbers are plain decimals and converted to fixed-point when the
//! simulation is built.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use skirmish_core::components::{ActorKind, AttackKind, CombatStats, Command, Team};
use skirmish_core::config::{SimConfig, WorldBounds};
use skirmish_core::error::GameError;
use skirmish_core::math::{Fixed, Vec2Fixed};
use skirmish_core::obstacles::Rect;
use skirmish_core::simulation::{EntitySpawnParams, Simulation};
use skirmish_core::terrain::Terrain;

/// Error type for scenario operations.
#[derive(Error, Debug)]
pub enum ScenarioError {
    /// File not found.
    #[error("Scenario file not found: {0}")]
    FileNotFound(String),
    /// Failed to read file.
    #[error("Failed to read scenario file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse RON.
    #[error("Failed to parse scenario: {0}")]
    ParseError(#[from] ron::error::SpannedError),
    /// A number does not fit the simulation's fixed-point range.
    #[error("Value out of range for {field}: {value}")]
    OutOfRange {
        /// Which field.
        field: &'static str,
        /// Offending value.
        value: f64,
    },
    /// The simulation rejected the scenario.
    #[error("Invalid scenario: {0}")]
    Invalid(#[from] GameError),
}

/// A 2D point in scenario files.
pub type Point = (f64, f64);

/// A complete scenario configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Playable area as (min corner, max corner).
    pub bounds: (Point, Point),
    /// Navigation grid cell size.
    pub nav_cell_size: f64,
    /// Static obstacles.
    pub obstacles: Vec<Obstacle>,
    /// Actor groups.
    pub actors: Vec<ActorPlacement>,
    /// Simulation tuning; `None` uses the defaults. The scenario bounds
    /// always replace `config.bounds`.
    pub config: Option<SimConfig>,
    /// Ticks to run when the command line does not say otherwise.
    pub ticks: u64,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            name: "Empty".to_string(),
            description: String::new(),
            bounds: ((0.0, 0.0), (256.0, 256.0)),
            nav_cell_size: 2.0,
            obstacles: Vec::new(),
            actors: Vec::new(),
            config: None,
            ticks: 1200,
        }
    }
}

impl Scenario {
    /// Load a scenario from a RON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ScenarioError::FileNotFound(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)?;
        let scenario: Scenario = ron::from_str(&contents)?;
        Ok(scenario)
    }

    /// Load from a RON string (useful for embedded scenarios).
    pub fn from_ron_str(ron: &str) -> Result<Self, ScenarioError> {
        let scenario: Scenario = ron::from_str(ron)?;
        Ok(scenario)
    }

    /// Resolve a command-line scenario argument: a built-in name or a path.
    pub fn resolve(name_or_path: &str) -> Result<Self, ScenarioError> {
        match Self::builtin(name_or_path) {
            Some(scenario) => Ok(scenario),
            None => Self::load(name_or_path),
        }
    }

    /// Built-in scenarios by name.
    #[must_use]
    pub fn builtin(name: &str) -> Option<Self> {
        match name {
            "line_battle" => Some(Self::line_battle(40)),
            "large_battle" => Some(Self::line_battle(300)),
            "walled_crossing" => Some(Self::walled_crossing()),
            _ => None,
        }
    }

    /// Two facing lines: player units against hostiles, a third of them ranged.
    #[must_use]
    pub fn line_battle(pairs: u32) -> Self {
        let per_line = pairs.div_ceil(3);
        let melee = pairs - per_line;
        Self {
            name: format!("Line battle ({pairs} pairs)"),
            description: "Player line attack-moving into a hostile line".to_string(),
            actors: vec![
                ActorPlacement {
                    order: Some(Order::AttackMove((128.0, 180.0))),
                    ..ActorPlacement::new(ActorKind::Player, 0, (20.0, 60.0), pairs)
                },
                ActorPlacement {
                    loadout: Loadout::Ranged,
                    ..ActorPlacement::new(ActorKind::Hostile, 1, (20.0, 110.0), per_line)
                },
                ActorPlacement::new(ActorKind::Hostile, 1, (20.0, 130.0), melee),
            ],
            ticks: 2400,
            ..Self::default()
        }
    }

    /// A wall with a single gap between a squad and its destination.
    #[must_use]
    pub fn walled_crossing() -> Self {
        Self {
            name: "Walled crossing".to_string(),
            description: "Squad routing through a gap while a hostile guards the far side"
                .to_string(),
            obstacles: vec![
                Obstacle::new((100.0, 0.0), (104.0, 120.0)),
                Obstacle::new((100.0, 128.0), (104.0, 256.0)),
            ],
            actors: vec![
                ActorPlacement {
                    order: Some(Order::MoveTo((60.0, 60.0))),
                    ..ActorPlacement::new(ActorKind::Player, 0, (140.0, 60.0), 8)
                },
                ActorPlacement::new(ActorKind::Hostile, 1, (60.0, 140.0), 1),
            ],
            ticks: 1600,
            ..Self::default()
        }
    }

    /// Total actors the scenario spawns.
    #[must_use]
    pub fn actor_count(&self) -> u32 {
        self.actors.iter().map(|group| group.count).sum()
    }

    /// Build a ready-to-tick simulation.
    pub fn build(&self) -> Result<Simulation, ScenarioError> {
        let mut config = self.config.unwrap_or_default();
        config.bounds = WorldBounds::new(
            point(self.bounds.0, "bounds")?,
            point(self.bounds.1, "bounds")?,
        );
        config.validate()?;

        let cell = fixed(self.nav_cell_size, "nav_cell_size")?;
        if cell <= Fixed::ZERO {
            return Err(GameError::InvalidState("nav_cell_size must be positive".into()).into());
        }
        let mut terrain = Terrain::open(config.bounds, cell);
        for obstacle in &self.obstacles {
            terrain.add_obstacle(obstacle.to_rect()?);
        }

        let mut sim = Simulation::with_terrain(config, terrain);
        for group in &self.actors {
            group.spawn(&mut sim)?;
        }

        tracing::debug!(
            scenario = %self.name,
            actors = sim.entities().len(),
            obstacles = self.obstacles.len(),
            "Scenario built"
        );
        Ok(sim)
    }
}

/// An axis-aligned static obstacle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Obstacle {
    /// One corner.
    pub min: Point,
    /// The opposite corner.
    pub max: Point,
}

impl Obstacle {
    /// Create an obstacle from two corners.
    #[must_use]
    pub fn new(min: Point, max: Point) -> Self {
        Self { min, max }
    }

    fn to_rect(&self) -> Result<Rect, ScenarioError> {
        Ok(Rect::new(point(self.min, "obstacle")?, point(self.max, "obstacle")?))
    }
}

/// Combat capability of a placed group.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub enum Loadout {
    /// No attacks; never targets anything.
    Unarmed,
    /// Default melee stats.
    #[default]
    Melee,
    /// Default ranged stats.
    Ranged,
    /// Explicit stats.
    Custom(StatBlock),
}

impl Loadout {
    fn combat_stats(self) -> Result<Option<CombatStats>, ScenarioError> {
        Ok(match self {
            Self::Unarmed => None,
            Self::Melee => Some(CombatStats::default()),
            Self::Ranged => Some(
                CombatStats::new(Fixed::from_num(6), Fixed::from_num(8), Fixed::ONE)
                    .with_kind(AttackKind::Ranged),
            ),
            Self::Custom(block) => Some(block.to_stats()?),
        })
    }
}

/// Hand-written combat stats.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatBlock {
    /// Damage per attack.
    pub attack_power: f64,
    /// Reach measured to the target's edge.
    pub range: f64,
    /// Attacks per second.
    pub attack_speed: f64,
    /// Fraction of incoming damage blocked.
    #[serde(default)]
    pub defense: f64,
    /// Acquisition radius.
    pub aggro_radius: f64,
    /// Fire at range instead of striking in melee.
    #[serde(default)]
    pub ranged: bool,
}

impl StatBlock {
    fn to_stats(self) -> Result<CombatStats, ScenarioError> {
        let kind = if self.ranged {
            AttackKind::Ranged
        } else {
            AttackKind::Melee
        };
        Ok(CombatStats::new(
            fixed(self.attack_power, "attack_power")?,
            fixed(self.range, "range")?,
            fixed(self.attack_speed, "attack_speed")?,
        )
        .with_defense(fixed(self.defense, "defense")?)
        .with_aggro_radius(fixed(self.aggro_radius, "aggro_radius")?)
        .with_kind(kind))
    }
}

/// A standing order given to every unit of a group at spawn.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Order {
    /// Move, ignoring enemies.
    MoveTo(Point),
    /// Move, engaging enemies on the way.
    AttackMove(Point),
    /// Walk back and forth.
    Patrol(Point),
    /// Walk to a resource node and park there.
    Gather(Point),
    /// Walk to a construction site.
    Build(Point),
    /// Stand still and fight what comes into range.
    Hold,
}

impl Order {
    fn command(self) -> Result<Command, ScenarioError> {
        Ok(match self {
            Self::MoveTo(p) => Command::MoveTo(point(p, "order")?),
            Self::AttackMove(p) => Command::AttackMove(point(p, "order")?),
            Self::Patrol(p) => Command::Patrol(point(p, "order")?),
            Self::Gather(p) => Command::Gather(point(p, "order")?),
            Self::Build(p) => Command::Build(point(p, "order")?),
            Self::Hold => Command::HoldPosition,
        })
    }
}

/// A group of identical actors laid out in rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorPlacement {
    /// Targeting procedure.
    pub kind: ActorKind,
    /// Team index.
    pub team: u8,
    /// First actor's position.
    pub position: Point,
    /// Number of actors.
    pub count: u32,
    /// Gap between neighbours.
    #[serde(default = "default_spacing")]
    pub spacing: f64,
    /// Actors per row before starting the next one.
    #[serde(default = "default_per_row")]
    pub per_row: u32,
    /// Collision radius.
    #[serde(default = "default_radius")]
    pub radius: f64,
    /// Maximum health.
    #[serde(default = "default_health")]
    pub health: f64,
    /// Top speed; `None` places stationary actors.
    #[serde(default = "default_speed")]
    pub speed: Option<f64>,
    /// Combat capability.
    #[serde(default)]
    pub loadout: Loadout,
    /// Standing order (player units only).
    #[serde(default)]
    pub order: Option<Order>,
}

fn default_spacing() -> f64 {
    3.0
}

fn default_per_row() -> u32 {
    20
}

fn default_radius() -> f64 {
    0.5
}

fn default_health() -> f64 {
    100.0
}

#[allow(clippy::unnecessary_wraps)]
fn default_speed() -> Option<f64> {
    Some(4.0)
}

impl ActorPlacement {
    /// Create a group with default body, loadout and no order.
    #[must_use]
    pub fn new(kind: ActorKind, team: u8, position: Point, count: u32) -> Self {
        Self {
            kind,
            team,
            position,
            count,
            spacing: default_spacing(),
            per_row: default_per_row(),
            radius: default_radius(),
            health: default_health(),
            speed: default_speed(),
            loadout: Loadout::default(),
            order: None,
        }
    }

    fn spawn(&self, sim: &mut Simulation) -> Result<(), ScenarioError> {
        let base = EntitySpawnParams::default();
        let combat_stats = self.loadout.combat_stats()?;
        let locomotion = match self.speed {
            Some(speed) => base.locomotion.map(|mut locomotion| -> Result<_, ScenarioError> {
                locomotion.max_speed = fixed(speed, "speed")?;
                Ok(locomotion)
            }),
            None => None,
        }
        .transpose()?;
        let command = self.order.map(Order::command).transpose()?;
        let origin = point(self.position, "position")?;
        let spacing = fixed(self.spacing, "spacing")?;
        let per_row = self.per_row.max(1);

        for i in 0..self.count {
            let offset = Vec2Fixed::new(
                spacing * Fixed::from_num(i % per_row),
                spacing * Fixed::from_num(i / per_row),
            );
            let id = sim.spawn_actor(EntitySpawnParams {
                kind: self.kind,
                team: Team(self.team),
                position: origin + offset,
                radius: fixed(self.radius, "radius")?,
                health: fixed(self.health, "health")?,
                locomotion,
                combat_stats,
                ..EntitySpawnParams::default()
            });
            if let Some(command) = command {
                sim.issue_command(id, command)?;
            }
        }
        Ok(())
    }
}

fn fixed(value: f64, field: &'static str) -> Result<Fixed, ScenarioError> {
    Fixed::checked_from_num(value).ok_or(ScenarioError::OutOfRange { field, value })
}

fn point((x, y): Point, field: &'static str) -> Result<Vec2Fixed, ScenarioError> {
    Ok(Vec2Fixed::new(fixed(x, field)?, fixed(y, field)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_scenario_builds_empty() {
        let sim = Scenario::default().build().unwrap();
        assert!(sim.entities().is_empty());
        assert_eq!(sim.get_tick(), 0);
    }

    #[test]
    fn test_builtin_scenarios() {
        for name in ["line_battle", "large_battle", "walled_crossing"] {
            let scenario = Scenario::builtin(name).unwrap();
            let sim = scenario.build().unwrap();
            assert_eq!(sim.entities().len(), scenario.actor_count() as usize);
        }
        assert!(Scenario::builtin("nope").is_none());
    }

    #[test]
    fn test_line_battle_counts() {
        let scenario = Scenario::line_battle(30);
        assert_eq!(scenario.actor_count(), 60);
    }

    #[test]
    fn test_parse_from_ron() {
        let ron = r#"
            Scenario(
                name: "Test",
                bounds: ((0.0, 0.0), (64.0, 64.0)),
                obstacles: [
                    Obstacle(min: (30.0, 0.0), max: (34.0, 40.0)),
                ],
                actors: [
                    ActorPlacement(
                        kind: Player,
                        team: 0,
                        position: (10.0, 10.0),
                        count: 3,
                        order: Some(MoveTo((50.0, 10.0))),
                    ),
                    ActorPlacement(
                        kind: Hostile,
                        team: 1,
                        position: (50.0, 50.0),
                        count: 2,
                        loadout: Custom(StatBlock(
                            attack_power: 12.5,
                            range: 6.0,
                            attack_speed: 0.5,
                            aggro_radius: 15.0,
                            ranged: true,
                        )),
                    ),
                ],
                ticks: 100,
            )
        "#;
        let scenario = Scenario::from_ron_str(ron).unwrap();
        assert_eq!(scenario.name, "Test");
        assert_eq!(scenario.actor_count(), 5);
        assert_eq!(scenario.actors[0].spacing, 3.0);

        let sim = scenario.build().unwrap();
        assert_eq!(sim.entities().len(), 5);
        assert_eq!(sim.config().bounds.max, Vec2Fixed::from_ints(64, 64));
        let hostile = sim
            .entities()
            .iter()
            .map(|(_, e)| e)
            .find(|e| e.kind == ActorKind::Hostile)
            .unwrap();
        let stats = hostile.combat_stats.unwrap();
        assert_eq!(stats.kind, AttackKind::Ranged);
        assert_eq!(stats.attack_power, Fixed::from_num(12.5));
    }

    #[test]
    fn test_config_override_is_applied() {
        let ron = r#"
            Scenario(
                config: Some(SimConfig(
                    targeting: TargetingConfig(search_slices: 8),
                )),
            )
        "#;
        let scenario = Scenario::from_ron_str(ron).unwrap();
        let sim = scenario.build().unwrap();
        assert_eq!(sim.config().targeting.search_slices, 8);
        assert_eq!(sim.config().bounds.max, Vec2Fixed::from_ints(256, 256));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let ron = r#"
            Scenario(
                config: Some(SimConfig(tick_rate: 0)),
            )
        "#;
        let scenario = Scenario::from_ron_str(ron).unwrap();
        assert!(matches!(scenario.build(), Err(ScenarioError::Invalid(_))));
    }

    #[test]
    fn test_orders_on_hostiles_are_rejected() {
        let mut scenario = Scenario::default();
        scenario.actors.push(ActorPlacement {
            order: Some(Order::Hold),
            ..ActorPlacement::new(ActorKind::Hostile, 1, (10.0, 10.0), 1)
        });
        assert!(matches!(scenario.build(), Err(ScenarioError::Invalid(_))));
    }

    #[test]
    fn test_out_of_range_numbers_are_rejected() {
        let mut scenario = Scenario::default();
        scenario.actors.push(ActorPlacement::new(
            ActorKind::Player,
            0,
            (1e12, 10.0),
            1,
        ));
        assert!(matches!(
            scenario.build(),
            Err(ScenarioError::OutOfRange {
                field: "position",
                ..
            })
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "Scenario(name: \"From disk\", actors: [ActorPlacement(kind: Player, team: 0, position: (5.0, 5.0), count: 1)])"
        )
        .unwrap();

        let scenario = Scenario::load(file.path()).unwrap();
        assert_eq!(scenario.name, "From disk");
        assert_eq!(scenario.actor_count(), 1);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.ron");
        assert!(matches!(
            Scenario::load(&missing),
            Err(ScenarioError::FileNotFound(_))
        ));
        assert!(Scenario::resolve(missing.to_str().unwrap()).is_err());
    }

    #[test]
    fn test_bundled_scenario_parses() {
        let scenario =
            Scenario::from_ron_str(include_str!("../scenarios/gate_defense.ron")).unwrap();
        let sim = scenario.build().unwrap();
        assert_eq!(sim.entities().len(), scenario.actor_count() as usize);
    }
}
