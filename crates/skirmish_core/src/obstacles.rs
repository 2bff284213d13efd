//! Static obstacle geometry and the collision query used by wall sliding.

use serde::{Deserialize, Serialize};

use crate::math::{vec2_decimal, Fixed, Vec2Fixed};

/// Axis-aligned rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    /// Minimum corner.
    #[serde(with = "vec2_decimal")]
    pub min: Vec2Fixed,
    /// Maximum corner.
    #[serde(with = "vec2_decimal")]
    pub max: Vec2Fixed,
}

impl Rect {
    /// Create a rectangle from any two opposite corners.
    #[must_use]
    pub fn new(a: Vec2Fixed, b: Vec2Fixed) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Check if two rectangles share interior area.
    ///
    /// Rectangles that only touch along an edge do not overlap.
    #[must_use]
    pub fn overlaps(&self, other: &Rect) -> bool {
        self.min.x < other.max.x
            && other.min.x < self.max.x
            && self.min.y < other.max.y
            && other.min.y < self.max.y
    }

    /// Check if a point lies strictly inside.
    #[must_use]
    pub fn contains(&self, point: Vec2Fixed) -> bool {
        point.x > self.min.x && point.x < self.max.x && point.y > self.min.y && point.y < self.max.y
    }

    /// Closest point of the rectangle to `point`.
    #[must_use]
    pub fn closest_point(&self, point: Vec2Fixed) -> Vec2Fixed {
        Vec2Fixed::new(
            point.x.clamp(self.min.x, self.max.x),
            point.y.clamp(self.min.y, self.max.y),
        )
    }

    /// Cast a ray from `origin` along unit `direction` and report the first
    /// surface hit within `max_distance`.
    ///
    /// A ray starting inside the rectangle hits at distance zero with the
    /// normal of the nearest face.
    #[must_use]
    pub fn ray_cast(&self, origin: Vec2Fixed, direction: Vec2Fixed, max_distance: Fixed) -> Option<RayHit> {
        if self.contains(origin) {
            return Some(RayHit {
                distance: Fixed::ZERO,
                normal: self.nearest_face_normal(origin),
            });
        }

        let (x_near, x_far, x_normal) = slab(origin.x, direction.x, self.min.x, self.max.x)?;
        let (y_near, y_far, y_normal) = slab(origin.y, direction.y, self.min.y, self.max.y)?;

        let (enter, normal) = if x_near >= y_near {
            (x_near, Vec2Fixed::new(x_normal, Fixed::ZERO))
        } else {
            (y_near, Vec2Fixed::new(Fixed::ZERO, y_normal))
        };
        let exit = x_far.min(y_far);

        if enter > exit || enter < Fixed::ZERO || enter > max_distance {
            return None;
        }

        Some(RayHit {
            distance: enter,
            normal,
        })
    }

    fn nearest_face_normal(&self, point: Vec2Fixed) -> Vec2Fixed {
        let faces = [
            (point.x - self.min.x, Vec2Fixed::new(-Fixed::ONE, Fixed::ZERO)),
            (self.max.x - point.x, Vec2Fixed::new(Fixed::ONE, Fixed::ZERO)),
            (point.y - self.min.y, Vec2Fixed::new(Fixed::ZERO, -Fixed::ONE)),
            (self.max.y - point.y, Vec2Fixed::new(Fixed::ZERO, Fixed::ONE)),
        ];
        let mut best = faces[0];
        for face in &faces[1..] {
            if face.0 < best.0 {
                best = *face;
            }
        }
        best.1
    }
}

/// Entry/exit parameters of a ray against one axis slab, plus the entry
/// face normal component. `None` when the ray runs parallel outside it.
fn slab(origin: Fixed, direction: Fixed, min: Fixed, max: Fixed) -> Option<(Fixed, Fixed, Fixed)> {
    let to_min = min - origin;
    let to_max = max - origin;

    match (to_min.checked_div(direction), to_max.checked_div(direction)) {
        (Some(t_min), Some(t_max)) if direction != Fixed::ZERO => {
            if t_min <= t_max {
                Some((t_min, t_max, -Fixed::ONE))
            } else {
                Some((t_max, t_min, Fixed::ONE))
            }
        }
        _ => {
            if origin < min || origin > max {
                None
            } else {
                Some((Fixed::MIN, Fixed::MAX, Fixed::ZERO))
            }
        }
    }
}

/// Result of a successful ray cast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RayHit {
    /// Distance along the ray.
    pub distance: Fixed,
    /// Outward unit normal of the surface hit.
    pub normal: Vec2Fixed,
}

/// External collision collaborator for static geometry.
pub trait ObstacleQuery: Sync {
    /// First static surface along the ray within `max_distance`.
    fn ray_cast(&self, origin: Vec2Fixed, direction: Vec2Fixed, max_distance: Fixed) -> Option<RayHit>;

    /// Check whether any static geometry overlaps `area`.
    fn overlaps(&self, area: &Rect) -> bool;
}

/// Flat list of static rectangles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticObstacles {
    rects: Vec<Rect>,
}

impl StaticObstacles {
    /// Create from a list of rectangles.
    #[must_use]
    pub fn new(rects: Vec<Rect>) -> Self {
        Self { rects }
    }

    /// Add a rectangle.
    pub fn push(&mut self, rect: Rect) {
        self.rects.push(rect);
    }

    /// All rectangles.
    #[must_use]
    pub fn rects(&self) -> &[Rect] {
        &self.rects
    }

    /// Number of rectangles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rects.len()
    }

    /// Check if there are no obstacles.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }
}

impl ObstacleQuery for StaticObstacles {
    fn ray_cast(&self, origin: Vec2Fixed, direction: Vec2Fixed, max_distance: Fixed) -> Option<RayHit> {
        let mut nearest: Option<RayHit> = None;
        for rect in &self.rects {
            if let Some(hit) = rect.ray_cast(origin, direction, max_distance) {
                if nearest.map_or(true, |best| hit.distance < best.distance) {
                    nearest = Some(hit);
                }
            }
        }
        nearest
    }

    fn overlaps(&self, area: &Rect) -> bool {
        self.rects.iter().any(|rect| rect.overlaps(area))
    }
}

/// No static geometry at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoObstacles;

impl ObstacleQuery for NoObstacles {
    fn ray_cast(&self, _origin: Vec2Fixed, _direction: Vec2Fixed, _max_distance: Fixed) -> Option<RayHit> {
        None
    }

    fn overlaps(&self, _area: &Rect) -> bool {
        false
    }
}
