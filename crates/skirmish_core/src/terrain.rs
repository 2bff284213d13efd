//! Static world: a navigation grid plus the obstacle rectangles carved into it.

use serde::{Deserialize, Serialize};

use crate::config::WorldBounds;
use crate::error::NavError;
use crate::math::{Fixed, Vec2Fixed};
use crate::navigation::{NavGrid, NavPath, NavigationService, PathRequest};
use crate::obstacles::{ObstacleQuery, RayHit, Rect, StaticObstacles};

/// Navigation and collision for one map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Terrain {
    nav: NavGrid,
    obstacles: StaticObstacles,
}

impl Terrain {
    /// Open terrain covering `bounds` with the given nav cell size.
    #[must_use]
    pub fn open(bounds: WorldBounds, nav_cell_size: Fixed) -> Self {
        let cell = nav_cell_size.max(Fixed::DELTA);
        let extent = bounds.max - bounds.min;
        let cells = |length: Fixed| -> u32 { (length / cell).ceil().saturating_to_num::<u32>().max(1) };
        Self {
            nav: NavGrid::with_origin(bounds.min, cells(extent.x), cells(extent.y), cell),
            obstacles: StaticObstacles::default(),
        }
    }

    /// Add a static obstacle and block every nav cell it overlaps.
    pub fn add_obstacle(&mut self, rect: Rect) {
        let (min_x, min_y) = self.nav.clamped_cell(rect.min);
        let (max_x, max_y) = self.nav.clamped_cell(rect.max);
        for y in min_y..=max_y {
            for x in min_x..=max_x {
                if self.nav.cell_rect(x, y).overlaps(&rect) {
                    self.nav.block(x, y);
                }
            }
        }
        self.obstacles.push(rect);
    }

    /// Navigation grid.
    #[must_use]
    pub fn nav(&self) -> &NavGrid {
        &self.nav
    }

    /// Static obstacle list.
    #[must_use]
    pub fn obstacles(&self) -> &StaticObstacles {
        &self.obstacles
    }
}

impl Default for Terrain {
    fn default() -> Self {
        Self::open(WorldBounds::default(), Fixed::from_num(2))
    }
}

impl NavigationService for Terrain {
    fn compute_path(&self, request: &PathRequest) -> Result<NavPath, NavError> {
        self.nav.compute_path(request)
    }
}

impl ObstacleQuery for Terrain {
    fn ray_cast(&self, origin: Vec2Fixed, direction: Vec2Fixed, max_distance: Fixed) -> Option<RayHit> {
        self.obstacles.ray_cast(origin, direction, max_distance)
    }

    fn overlaps(&self, area: &Rect) -> bool {
        self.obstacles.overlaps(area)
    }
}
