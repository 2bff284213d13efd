//! Uniform-grid spatial hash for neighbor queries.
//!
//! Rebuilt from scratch every tick and read-only afterwards. Queries return
//! every entry in the cells touched by the search rings; callers must always
//! re-check the true distance.
//!
//! Actors whose radius exceeds half the cell size are registered in every
//! cell their bounding box overlaps. Each entry remembers the first cell of
//! its span so a query can report it exactly once without a scratch set.

use rustc_hash::FxHashMap;

use crate::components::{EntityId, Team};
use crate::math::{Fixed, Vec2Fixed};

/// Integer cell coordinate.
pub type CellKey = (i32, i32);

/// Lightweight record stored in the hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpatialEntry {
    /// Actor handle.
    pub id: EntityId,
    /// Actor team.
    pub team: Team,
    /// Actor position at build time.
    pub position: Vec2Fixed,
    /// Actor radius at build time.
    pub radius: Fixed,
    /// Minimum cell of the registration span.
    first_cell: CellKey,
}

/// Multimap from cell key to the entries registered there.
#[derive(Debug, Clone)]
pub struct SpatialHash {
    cell_size: Fixed,
    cells: FxHashMap<CellKey, Vec<SpatialEntry>>,
    len: usize,
}

impl SpatialHash {
    /// Create an empty hash. `cell_size` must be positive.
    #[must_use]
    pub fn new(cell_size: Fixed) -> Self {
        debug_assert!(cell_size > Fixed::ZERO, "cell size must be positive");
        Self {
            cell_size,
            cells: FxHashMap::default(),
            len: 0,
        }
    }

    /// Cell size in world units.
    #[must_use]
    pub const fn cell_size(&self) -> Fixed {
        self.cell_size
    }

    /// Number of actors inserted (not cell registrations).
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Check if no actors are registered.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Remove every entry.
    pub fn clear(&mut self) {
        self.cells.clear();
        self.len = 0;
    }

    /// Clear and refill from an actor list.
    pub fn rebuild<I>(&mut self, actors: I)
    where
        I: IntoIterator<Item = (EntityId, Team, Vec2Fixed, Fixed)>,
    {
        self.clear();
        for (id, team, position, radius) in actors {
            self.insert(id, team, position, radius);
        }
    }

    /// Quantize a world position to its cell.
    #[must_use]
    pub fn cell_of(&self, position: Vec2Fixed) -> CellKey {
        (
            (position.x / self.cell_size).floor().saturating_to_num::<i32>(),
            (position.y / self.cell_size).floor().saturating_to_num::<i32>(),
        )
    }

    /// Whether an actor of this radius needs multi-cell registration.
    #[must_use]
    pub fn is_large(&self, radius: Fixed) -> bool {
        radius > self.cell_size / Fixed::from_num(2)
    }

    /// Register an actor.
    pub fn insert(&mut self, id: EntityId, team: Team, position: Vec2Fixed, radius: Fixed) {
        self.len += 1;

        if !self.is_large(radius) {
            let cell = self.cell_of(position);
            self.cells.entry(cell).or_default().push(SpatialEntry {
                id,
                team,
                position,
                radius,
                first_cell: cell,
            });
            return;
        }

        let extent = Vec2Fixed::new(radius, radius);
        let (min_x, min_y) = self.cell_of(position - extent);
        let (max_x, max_y) = self.cell_of(position + extent);
        let entry = SpatialEntry {
            id,
            team,
            position,
            radius,
            first_cell: (min_x, min_y),
        };
        for ix in min_x..=max_x {
            for iy in min_y..=max_y {
                self.cells.entry((ix, iy)).or_default().push(entry);
            }
        }
    }

    /// Collect every entry in the `ceil(radius / cell_size)` rings around
    /// `center` into `out`. Each actor appears at most once.
    ///
    /// `out` is cleared first so the caller can reuse its allocation.
    pub fn query_into(&self, center: Vec2Fixed, radius: Fixed, out: &mut Vec<SpatialEntry>) {
        out.clear();
        self.for_each_candidate(center, radius, |entry| out.push(*entry));
    }

    /// Visit every candidate in the rings around `center`, each actor once.
    pub fn for_each_candidate<F>(&self, center: Vec2Fixed, radius: Fixed, mut visit: F)
    where
        F: FnMut(&SpatialEntry),
    {
        let rings = (radius.max(Fixed::ZERO) / self.cell_size)
            .ceil()
            .saturating_to_num::<i32>();
        let (cx, cy) = self.cell_of(center);
        let (qmin_x, qmin_y) = (cx.saturating_sub(rings), cy.saturating_sub(rings));
        let (qmax_x, qmax_y) = (cx.saturating_add(rings), cy.saturating_add(rings));

        for ix in qmin_x..=qmax_x {
            for iy in qmin_y..=qmax_y {
                let Some(bucket) = self.cells.get(&(ix, iy)) else {
                    continue;
                };
                for entry in bucket {
                    // Report a spanning entry only from the first visited cell of its span.
                    let owner = (entry.first_cell.0.max(qmin_x), entry.first_cell.1.max(qmin_y));
                    if owner == (ix, iy) {
                        visit(entry);
                    }
                }
            }
        }
    }

    /// Nearest entry within `radius` that passes `accept`, by true squared
    /// distance. Ties go to the lower id.
    #[must_use]
    pub fn nearest<F>(&self, center: Vec2Fixed, radius: Fixed, mut accept: F) -> Option<SpatialEntry>
    where
        F: FnMut(&SpatialEntry) -> bool,
    {
        let radius_sq = radius * radius;
        let mut best: Option<(Fixed, SpatialEntry)> = None;

        self.for_each_candidate(center, radius, |entry| {
            if !accept(entry) {
                return;
            }
            let dist_sq = center.distance_squared(entry.position);
            if dist_sq > radius_sq {
                return;
            }
            let better = match &best {
                None => true,
                Some((best_sq, best_entry)) => {
                    dist_sq < *best_sq || (dist_sq == *best_sq && entry.id < best_entry.id)
                }
            };
            if better {
                best = Some((dist_sq, *entry));
            }
        });

        best.map(|(_, entry)| entry)
    }
}
