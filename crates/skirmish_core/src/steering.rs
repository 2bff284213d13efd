//! Pure steering math used by the movement integrator.
//!
//! Everything here is a free function over fixed-point values so it can be
//! property-tested in isolation.

use crate::components::EntityId;
use crate::config::SteeringConfig;
use crate::math::{Fixed, Vec2Fixed};
use crate::obstacles::ObstacleQuery;

/// Distance needed to stop from `max_speed` at constant `deceleration`:
/// `max_speed² / (2 · deceleration)`. Zero when deceleration is not positive.
#[must_use]
pub fn calculate_slowing_distance(max_speed: Fixed, deceleration: Fixed) -> Fixed {
    if deceleration <= Fixed::ZERO {
        return Fixed::ZERO;
    }
    max_speed.saturating_mul(max_speed) / (deceleration * Fixed::from_num(2))
}

/// Desired speed at `distance` from the final waypoint.
///
/// Inside the slowing distance the speed falls off linearly with the
/// remaining distance, floored at `min_speed`; outside it is `max_speed`.
#[must_use]
pub fn calculate_target_speed(
    distance: Fixed,
    max_speed: Fixed,
    slowing_distance: Fixed,
    min_speed: Fixed,
) -> Fixed {
    if slowing_distance <= Fixed::ZERO || distance >= slowing_distance {
        return max_speed;
    }
    let scaled = max_speed * (distance.max(Fixed::ZERO) / slowing_distance);
    scaled.max(min_speed).min(max_speed)
}

/// Move `current` toward `target` by at most `acceleration·dt` (speeding up)
/// or `deceleration·dt` (slowing down). Never overshoots and never returns a
/// negative speed.
#[must_use]
pub fn calculate_new_speed(
    current: Fixed,
    target: Fixed,
    acceleration: Fixed,
    deceleration: Fixed,
    dt: Fixed,
) -> Fixed {
    let speed = if current < target {
        let step = acceleration.max(Fixed::ZERO).saturating_mul(dt);
        current.saturating_add(step).min(target)
    } else {
        let step = deceleration.max(Fixed::ZERO).saturating_mul(dt);
        current.saturating_sub(step).max(target)
    };
    speed.max(Fixed::ZERO)
}

/// A neighbor as seen by the separation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Neighbor {
    /// Neighbor handle.
    pub id: EntityId,
    /// Neighbor position from the tick snapshot.
    pub position: Vec2Fixed,
    /// Neighbor radius.
    pub radius: Fixed,
}

/// Below this separation the two actors count as perfectly stacked.
fn stack_epsilon() -> Fixed {
    Fixed::from_num(0.001)
}

/// Repulsive velocity away from overlapping neighbors.
///
/// Each overlapping neighbor contributes `(combined_radius - distance)` along
/// the line between centers. Perfectly stacked pairs are split along a
/// direction derived from the pair's ids, pointing opposite ways for the two
/// actors.
#[must_use]
pub fn separation<I>(
    id: EntityId,
    position: Vec2Fixed,
    radius: Fixed,
    neighbors: I,
    config: &SteeringConfig,
) -> Vec2Fixed
where
    I: IntoIterator<Item = Neighbor>,
{
    let search = radius + config.separation_margin;
    let search_sq = search * search;
    let mut push = Vec2Fixed::ZERO;

    for other in neighbors {
        if other.id == id {
            continue;
        }
        let offset = position - other.position;
        let dist_sq = offset.length_squared();
        if dist_sq > search_sq {
            continue;
        }

        let combined = radius + other.radius;
        let distance = offset.length();
        if distance >= combined {
            continue;
        }

        if distance < stack_epsilon() {
            push += stack_direction(id, other.id).scale(config.stack_push);
        } else {
            let overlap = combined - distance;
            push += offset.scale(overlap / distance);
        }
    }

    push.scale(config.separation_strength)
}

/// Deterministic unit direction splitting a stacked pair.
fn stack_direction(id: EntityId, other: EntityId) -> Vec2Fixed {
    const DIRECTIONS: [(i32, i32); 8] = [
        (1, 0),
        (1, 1),
        (0, 1),
        (-1, 1),
        (-1, 0),
        (-1, -1),
        (0, -1),
        (1, -1),
    ];
    let low = id.min(other);
    let mixed = low.wrapping_mul(0x9E37_79B9_7F4A_7C15) >> 61;
    let (x, y) = DIRECTIONS[mixed as usize];
    let dir = Vec2Fixed::from_ints(x, y).normalize();
    if id == low {
        dir
    } else {
        -dir
    }
}

/// Remove the part of `velocity` that points into `normal`.
#[must_use]
pub fn slide_along(velocity: Vec2Fixed, normal: Vec2Fixed) -> Vec2Fixed {
    let into = velocity.dot(normal);
    if into >= Fixed::ZERO {
        velocity
    } else {
        velocity - normal.scale(into)
    }
}

/// Cast ahead along `velocity` and slide along any static surface closer
/// than `radius`.
#[must_use]
pub fn wall_slide(
    position: Vec2Fixed,
    velocity: Vec2Fixed,
    radius: Fixed,
    obstacles: &dyn ObstacleQuery,
) -> Vec2Fixed {
    let direction = velocity.normalize();
    if direction.is_zero() {
        return velocity;
    }
    match obstacles.ray_cast(position, direction, radius) {
        Some(hit) if hit.distance < radius => slide_along(velocity, hit.normal),
        _ => velocity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::obstacles::{Rect, StaticObstacles};
    use proptest::prelude::*;

    fn fixed(n: f64) -> Fixed {
        Fixed::from_num(n)
    }

    #[test]
    fn test_slowing_distance() {
        assert_eq!(calculate_slowing_distance(fixed(10.0), fixed(20.0)), fixed(2.5));
        assert_eq!(calculate_slowing_distance(fixed(7.0), Fixed::ZERO), Fixed::ZERO);
        assert_eq!(calculate_slowing_distance(fixed(7.0), fixed(-1.0)), Fixed::ZERO);
    }

    #[test]
    fn test_target_speed_ramps_then_caps() {
        let max = fixed(4.0);
        let slowing = fixed(2.0);
        let min = fixed(0.5);
        assert_eq!(calculate_target_speed(fixed(3.0), max, slowing, min), max);
        assert_eq!(calculate_target_speed(fixed(1.0), max, slowing, min), fixed(2.0));
        assert_eq!(calculate_target_speed(fixed(0.1), max, slowing, min), min);
        assert_eq!(calculate_target_speed(Fixed::ZERO, max, Fixed::ZERO, min), max);
    }

    #[test]
    fn test_new_speed_steps_toward_target() {
        let dt = fixed(0.5);
        assert_eq!(
            calculate_new_speed(fixed(1.0), fixed(5.0), fixed(2.0), fixed(4.0), dt),
            fixed(2.0)
        );
        assert_eq!(
            calculate_new_speed(fixed(5.0), fixed(1.0), fixed(2.0), fixed(4.0), dt),
            fixed(3.0)
        );
        assert_eq!(
            calculate_new_speed(fixed(4.5), fixed(5.0), fixed(2.0), fixed(4.0), dt),
            fixed(5.0)
        );
    }

    #[test]
    fn test_separation_pushes_apart() {
        let config = SteeringConfig::default();
        let neighbor = Neighbor {
            id: 2,
            position: Vec2Fixed::new(fixed(1.0), Fixed::ZERO),
            radius: Fixed::ONE,
        };
        let push = separation(1, Vec2Fixed::ZERO, Fixed::ONE, [neighbor], &config);
        // Overlap of 1 along -x, times strength 2.
        assert_eq!(push, Vec2Fixed::new(fixed(-2.0), Fixed::ZERO));
    }

    #[test]
    fn test_separation_ignores_self_and_distant() {
        let config = SteeringConfig::default();
        let neighbors = [
            Neighbor {
                id: 1,
                position: Vec2Fixed::ZERO,
                radius: Fixed::ONE,
            },
            Neighbor {
                id: 3,
                position: Vec2Fixed::new(fixed(2.5), Fixed::ZERO),
                radius: Fixed::ONE,
            },
        ];
        let push = separation(1, Vec2Fixed::ZERO, Fixed::ONE, neighbors, &config);
        assert_eq!(push, Vec2Fixed::ZERO);
    }

    #[test]
    fn test_stacked_pair_splits_in_opposite_directions() {
        let config = SteeringConfig::default();
        let at = Vec2Fixed::from_ints(5, 5);
        let a = separation(
            4,
            at,
            Fixed::ONE,
            [Neighbor {
                id: 9,
                position: at,
                radius: Fixed::ONE,
            }],
            &config,
        );
        let b = separation(
            9,
            at,
            Fixed::ONE,
            [Neighbor {
                id: 4,
                position: at,
                radius: Fixed::ONE,
            }],
            &config,
        );
        assert!(!a.is_zero());
        let sum = a + b;
        let tolerance = Fixed::from_num(0.0001);
        assert!(sum.x.abs() < tolerance && sum.y.abs() < tolerance);
    }

    #[test]
    fn test_wall_slide_removes_normal_component() {
        let wall = StaticObstacles::new(vec![Rect::new(
            Vec2Fixed::new(fixed(0.5), fixed(-5.0)),
            Vec2Fixed::new(fixed(1.5), fixed(5.0)),
        )]);
        let velocity = Vec2Fixed::new(fixed(2.0), fixed(1.0));
        let slid = wall_slide(Vec2Fixed::ZERO, velocity, Fixed::ONE, &wall);
        assert_eq!(slid, Vec2Fixed::new(Fixed::ZERO, fixed(1.0)));

        // Far from the wall nothing changes.
        let free = wall_slide(Vec2Fixed::new(fixed(-5.0), Fixed::ZERO), velocity, Fixed::ONE, &wall);
        assert_eq!(free, velocity);
    }

    #[test]
    fn test_slide_keeps_velocity_leaving_surface() {
        let normal = Vec2Fixed::new(-Fixed::ONE, Fixed::ZERO);
        let away = Vec2Fixed::new(fixed(-1.0), fixed(1.0));
        assert_eq!(slide_along(away, normal), away);
    }

    fn speed() -> impl Strategy<Value = Fixed> {
        (0i64..(100i64 << 32)).prop_map(Fixed::from_bits)
    }

    proptest! {
        #[test]
        fn prop_new_speed_never_overshoots(
            current in speed(),
            target in speed(),
            accel in speed(),
            decel in speed(),
        ) {
            let dt = Fixed::ONE / Fixed::from_num(20);
            let next = calculate_new_speed(current, target, accel, decel, dt);
            prop_assert!((next - target).abs() <= (current - target).abs());
            prop_assert!(next >= Fixed::ZERO);
        }

        #[test]
        fn prop_target_speed_monotonic(
            a in speed(),
            b in speed(),
            max_speed in speed(),
            slowing in speed(),
        ) {
            let min = Fixed::from_num(0.5).min(max_speed);
            let (near, far) = if a <= b { (a, b) } else { (b, a) };
            let near_speed = calculate_target_speed(near, max_speed, slowing, min);
            let far_speed = calculate_target_speed(far, max_speed, slowing, min);
            prop_assert!(near_speed <= far_speed);
            if far >= slowing {
                prop_assert_eq!(far_speed, max_speed);
            }
        }
    }
}
