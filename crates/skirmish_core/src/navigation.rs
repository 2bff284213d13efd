//! Navigation queries.
//!
//! The planner only talks to [`NavigationService`]. [`NavGrid`] is the
//! in-tree implementation: a blocked/open bitmap searched with 8-way A*.
//! Endpoints are snapped onto open cells within a sample radius, the cell
//! route is shortened by line of sight, and an unreachable goal yields a
//! partial route to the reachable cell closest to it.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use serde::{Deserialize, Serialize};

use crate::error::NavError;
use crate::math::{fixed_serde, Fixed, Vec2Fixed};
use crate::obstacles::Rect;

/// Column and row of a grid cell.
pub type Cell = (u32, u32);

/// Parameters of one path query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathRequest {
    /// Where the agent stands.
    pub start: Vec2Fixed,
    /// Where it wants to go.
    pub end: Vec2Fixed,
    /// Maximum snapping distance for both endpoints.
    pub sample_radius: Fixed,
    /// Maximum number of corners to return.
    pub max_corners: usize,
}

/// Corner polyline returned by a successful query.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NavPath {
    /// Corners from the snapped start to the snapped (or closest) end.
    pub corners: Vec<Vec2Fixed>,
    /// Only part of the way could be routed.
    pub partial: bool,
}

/// External navigation collaborator used by the path planner.
pub trait NavigationService: Sync {
    /// Compute a corner path, or report why none exists.
    fn compute_path(&self, request: &PathRequest) -> Result<NavPath, NavError>;
}

/// Walkability bitmap over a rectangle of square cells.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavGrid {
    origin: Vec2Fixed,
    width: u32,
    height: u32,
    /// Row-major, `true` where the cell cannot be entered.
    blocked: Vec<bool>,
    #[serde(with = "fixed_serde")]
    cell_size: Fixed,
}

impl NavGrid {
    /// Open grid anchored at the world origin.
    ///
    /// # Panics
    ///
    /// Panics on a zero dimension or a non-positive cell size.
    #[must_use]
    pub fn new(width: u32, height: u32, cell_size: Fixed) -> Self {
        Self::with_origin(Vec2Fixed::ZERO, width, height, cell_size)
    }

    /// Open grid whose minimum corner sits at `origin`.
    ///
    /// # Panics
    ///
    /// Panics on a zero dimension or a non-positive cell size.
    #[must_use]
    pub fn with_origin(origin: Vec2Fixed, width: u32, height: u32, cell_size: Fixed) -> Self {
        assert!(width > 0 && height > 0, "nav grid needs at least one cell");
        assert!(cell_size > Fixed::ZERO, "nav cell size must be positive");
        Self {
            origin,
            width,
            height,
            blocked: vec![false; width as usize * height as usize],
            cell_size,
        }
    }

    /// Columns.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Rows.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Edge length of a cell in world units.
    #[must_use]
    pub const fn cell_size(&self) -> Fixed {
        self.cell_size
    }

    /// World position of the minimum corner.
    #[must_use]
    pub const fn origin(&self) -> Vec2Fixed {
        self.origin
    }

    fn index(&self, (x, y): Cell) -> Option<usize> {
        (x < self.width && y < self.height).then(|| y as usize * self.width as usize + x as usize)
    }

    fn cell_at(&self, index: usize) -> Cell {
        let width = self.width as usize;
        ((index % width) as u32, (index / width) as u32)
    }

    /// Mark a cell impassable. Returns `false` when it is off the grid.
    pub fn block(&mut self, x: u32, y: u32) -> bool {
        match self.index((x, y)) {
            Some(index) => {
                self.blocked[index] = true;
                true
            }
            None => false,
        }
    }

    /// On the grid and not blocked.
    #[must_use]
    pub fn is_walkable(&self, x: u32, y: u32) -> bool {
        self.index((x, y)).is_some_and(|index| !self.blocked[index])
    }

    /// Cell containing `pos`, or `None` off the grid.
    #[must_use]
    pub fn world_to_grid(&self, pos: Vec2Fixed) -> Option<Cell> {
        let local = pos - self.origin;
        let column = (local.x / self.cell_size).floor().to_num::<i64>();
        let row = (local.y / self.cell_size).floor().to_num::<i64>();
        let cell = (u32::try_from(column).ok()?, u32::try_from(row).ok()?);
        self.index(cell).map(|_| cell)
    }

    /// World position of a cell's center.
    #[must_use]
    pub fn grid_to_world(&self, x: u32, y: u32) -> Vec2Fixed {
        let corner = self.cell_rect(x, y).min;
        let half = self.cell_size / Fixed::from_num(2);
        Vec2Fixed::new(corner.x + half, corner.y + half)
    }

    /// World-space square covered by a cell.
    #[must_use]
    pub fn cell_rect(&self, x: u32, y: u32) -> Rect {
        let min = Vec2Fixed::new(
            self.origin.x + Fixed::from_num(x) * self.cell_size,
            self.origin.y + Fixed::from_num(y) * self.cell_size,
        );
        Rect::new(min, min + Vec2Fixed::new(self.cell_size, self.cell_size))
    }

    /// Cell containing `pos`, clamped onto the grid.
    #[must_use]
    pub fn clamped_cell(&self, pos: Vec2Fixed) -> Cell {
        let local = pos - self.origin;
        let clamp = |value: Fixed, cells: u32| -> u32 {
            let index = (value / self.cell_size).floor().saturating_to_num::<i64>();
            index.clamp(0, i64::from(cells) - 1) as u32
        };
        (clamp(local.x, self.width), clamp(local.y, self.height))
    }

    /// Snap a world position onto walkable ground.
    ///
    /// A position on an open cell comes back unchanged. Otherwise this is the
    /// center of the open cell whose square passes closest to `pos`, if that
    /// is within `radius`. Ties go to the lower row, then the lower column.
    #[must_use]
    pub fn sample_position(&self, pos: Vec2Fixed, radius: Fixed) -> Option<Vec2Fixed> {
        if self.world_to_grid(pos).is_some_and(|(x, y)| self.is_walkable(x, y)) {
            return Some(pos);
        }

        let radius = radius.max(Fixed::ZERO);
        let reach = Vec2Fixed::new(radius, radius);
        let (min_x, min_y) = self.clamped_cell(pos - reach);
        let (max_x, max_y) = self.clamped_cell(pos + reach);

        let mut best: Option<(Fixed, Cell)> = None;
        for y in min_y..=max_y {
            for x in min_x..=max_x {
                if !self.is_walkable(x, y) {
                    continue;
                }
                let gap_sq = self.cell_rect(x, y).closest_point(pos).distance_squared(pos);
                if gap_sq <= radius * radius && best.map_or(true, |(best_sq, _)| gap_sq < best_sq) {
                    best = Some((gap_sq, (x, y)));
                }
            }
        }
        best.map(|(_, (x, y))| self.grid_to_world(x, y))
    }

    /// Route between two world positions.
    ///
    /// Both ends are snapped with [`NavGrid::sample_position`], start first.
    /// An unreachable goal gives a route to the explored cell nearest to it,
    /// flagged partial.
    ///
    /// # Errors
    ///
    /// [`NavError::StartNotNavigable`] or [`NavError::EndNotNavigable`] when
    /// an end cannot be snapped, [`NavError::NoRoute`] when the start cell is
    /// sealed in.
    pub fn find_path(&self, start: Vec2Fixed, goal: Vec2Fixed, sample_radius: Fixed) -> Result<NavPath, NavError> {
        let start = self
            .sample_position(start, sample_radius)
            .ok_or(NavError::StartNotNavigable)?;
        let goal = self
            .sample_position(goal, sample_radius)
            .ok_or(NavError::EndNotNavigable)?;
        let from = self.world_to_grid(start).ok_or(NavError::StartNotNavigable)?;
        let to = self.world_to_grid(goal).ok_or(NavError::EndNotNavigable)?;

        if from == to {
            return Ok(NavPath {
                corners: vec![start, goal],
                partial: false,
            });
        }

        let route = self.astar(from, to);
        let reached = route.last().copied().unwrap_or(from);
        let partial = reached != to;
        if partial && reached == from {
            return Err(NavError::NoRoute);
        }

        let mut corners = self.shorten(&route);
        if let Some(first) = corners.first_mut() {
            *first = start;
        }
        if !partial {
            if let Some(last) = corners.last_mut() {
                *last = goal;
            }
        }
        Ok(NavPath { corners, partial })
    }

    /// Open neighbours of `cell`. Diagonals need both flanking cells open.
    fn neighbours(&self, (x, y): Cell) -> impl Iterator<Item = Cell> + '_ {
        STEPS.iter().filter_map(move |&(dx, dy)| {
            let nx = x.checked_add_signed(dx)?;
            let ny = y.checked_add_signed(dy)?;
            let open = self.is_walkable(nx, ny)
                && (dx == 0 || dy == 0 || (self.is_walkable(nx, y) && self.is_walkable(x, ny)));
            open.then_some((nx, ny))
        })
    }

    /// Cell route from `from` towards `to`, ending at `to` or at the closest
    /// explored cell when `to` cannot be reached.
    fn astar(&self, from: Cell, to: Cell) -> Vec<Cell> {
        let cells = self.blocked.len();
        let mut cost = vec![Fixed::MAX; cells];
        let mut parent = vec![usize::MAX; cells];
        let mut closed = vec![false; cells];
        let mut frontier = BinaryHeap::new();

        let Some(origin) = self.index(from) else {
            return Vec::new();
        };
        cost[origin] = Fixed::ZERO;
        // Equal estimates pop in row-major order.
        frontier.push(Reverse((chebyshev(from, to), origin)));

        // (squared cell distance to goal, cost so far, index)
        let mut nearest = (cell_gap_sq(from, to), Fixed::ZERO, origin);

        while let Some(Reverse((_, index))) = frontier.pop() {
            if std::mem::replace(&mut closed[index], true) {
                continue;
            }
            let cell = self.cell_at(index);
            let candidate = (cell_gap_sq(cell, to), cost[index], index);
            if candidate < nearest {
                nearest = candidate;
            }
            if cell == to {
                break;
            }

            for next in self.neighbours(cell) {
                let Some(next_index) = self.index(next) else {
                    continue;
                };
                let through = cost[index] + Fixed::ONE;
                if !closed[next_index] && through < cost[next_index] {
                    cost[next_index] = through;
                    parent[next_index] = index;
                    frontier.push(Reverse((through + chebyshev(next, to), next_index)));
                }
            }
        }

        let mut route = vec![self.cell_at(nearest.2)];
        let mut index = nearest.2;
        while parent[index] != usize::MAX {
            index = parent[index];
            route.push(self.cell_at(index));
        }
        route.reverse();
        route
    }

    /// Cell centers of `route`, keeping only corners that block the view
    /// from the previous kept corner.
    fn shorten(&self, route: &[Cell]) -> Vec<Vec2Fixed> {
        let mut kept: Vec<Cell> = Vec::with_capacity(route.len());
        let mut anchor = 0;
        if let Some(&first) = route.first() {
            kept.push(first);
        }
        while anchor + 1 < route.len() {
            let reach = (anchor + 1..route.len())
                .rev()
                .find(|&i| self.clear_line(route[anchor], route[i]))
                .unwrap_or(anchor + 1);
            kept.push(route[reach]);
            anchor = reach;
        }
        kept.into_iter().map(|(x, y)| self.grid_to_world(x, y)).collect()
    }

    /// Whether a straight walk between two cell centers stays on open cells
    /// without squeezing between diagonal blockers.
    fn clear_line(&self, from: Cell, to: Cell) -> bool {
        let (mut x, mut y) = (i64::from(from.0), i64::from(from.1));
        let (end_x, end_y) = (i64::from(to.0), i64::from(to.1));
        let (run, rise) = ((end_x - x).abs(), (end_y - y).abs());
        let (step_x, step_y) = ((end_x - x).signum(), (end_y - y).signum());
        let open = |x: i64, y: i64| match (u32::try_from(x), u32::try_from(y)) {
            (Ok(x), Ok(y)) => self.is_walkable(x, y),
            _ => false,
        };

        let mut error = run - rise;
        loop {
            if !open(x, y) {
                return false;
            }
            if (x, y) == (end_x, end_y) {
                return true;
            }
            let doubled = 2 * error;
            let moves_x = doubled > -rise;
            let moves_y = doubled < run;
            if moves_x && moves_y && !(open(x + step_x, y) && open(x, y + step_y)) {
                return false;
            }
            if moves_x {
                error -= rise;
                x += step_x;
            }
            if moves_y {
                error += run;
                y += step_y;
            }
        }
    }
}

impl Default for NavGrid {
    /// 128 x 128 cells of 2 m.
    fn default() -> Self {
        Self::new(128, 128, Fixed::from_num(2))
    }
}

impl NavigationService for NavGrid {
    fn compute_path(&self, request: &PathRequest) -> Result<NavPath, NavError> {
        let mut path = self.find_path(request.start, request.end, request.sample_radius)?;
        path.corners.truncate(request.max_corners.max(1));
        Ok(path)
    }
}

const STEPS: [(i32, i32); 8] = [
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
];

/// Admissible for unit-cost 8-way steps.
fn chebyshev(a: Cell, b: Cell) -> Fixed {
    Fixed::from_num(a.0.abs_diff(b.0).max(a.1.abs_diff(b.1)))
}

fn cell_gap_sq(a: Cell, b: Cell) -> u64 {
    let dx = u64::from(a.0.abs_diff(b.0));
    let dy = u64::from(a.1.abs_diff(b.1));
    dx * dx + dy * dy
}
