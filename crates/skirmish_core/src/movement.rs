//! Kinematic movement integrator and arrival detection.
//!
//! The integrator steers only by the two-slot lookahead. It never asks a
//! physics solver for anything, so the same inputs always reproduce the same
//! trajectory.

use crate::components::{EntityId, Locomotion, MovementGoal, MovementWaypoints};
use crate::config::SteeringConfig;
use crate::math::{rotate_toward, Fixed, Vec2Fixed};
use crate::obstacles::ObstacleQuery;
use crate::spatial::{SpatialEntry, SpatialHash};
use crate::steering::{
    calculate_new_speed, calculate_slowing_distance, calculate_target_speed, separation, wall_slide,
    Neighbor,
};

/// Shared, read-only inputs for one integration pass.
#[derive(Clone, Copy)]
pub struct MovementContext<'a> {
    /// Seconds per tick.
    pub dt: Fixed,
    /// Tuning.
    pub config: &'a SteeringConfig,
    /// Fine hash over actors that take part in separation.
    pub avoidance: &'a SpatialHash,
    /// Static geometry.
    pub obstacles: &'a dyn ObstacleQuery,
}

/// The integrator-owned records of one actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotionState {
    /// Actor handle.
    pub id: EntityId,
    /// Ground-plane position.
    pub position: Vec2Fixed,
    /// Unit facing vector.
    pub facing: Vec2Fixed,
    /// Velocity committed last tick.
    pub velocity: Vec2Fixed,
    /// Obstacle radius.
    pub radius: Fixed,
    /// Speed limits and current speed.
    pub locomotion: Locomotion,
    /// Waypoint lookahead.
    pub lookahead: MovementWaypoints,
    /// Parked at a resource node.
    pub gathering: bool,
}

/// Advance one actor by one tick.
///
/// `scratch` is reused between calls to hold neighbor candidates.
#[must_use]
pub fn integrate(ctx: &MovementContext<'_>, mut state: MotionState, scratch: &mut Vec<SpatialEntry>) -> MotionState {
    let config = ctx.config;
    let mut desired = Vec2Fixed::ZERO;

    if state.lookahead.enabled {
        let lookahead = &mut state.lookahead;
        if let Some(next) = lookahead.next {
            if state.position.distance(lookahead.current) < config.corner_radius {
                lookahead.current = next;
                lookahead.next = None;
            }
        }

        let to_current = lookahead.current - state.position;
        let distance = to_current.length();
        let final_leg = lookahead.next.is_none();
        let loco = &mut state.locomotion;

        let target_speed = if final_leg {
            let slowing = calculate_slowing_distance(loco.max_speed, loco.deceleration);
            calculate_target_speed(distance, loco.max_speed, slowing, config.min_speed.min(loco.max_speed))
        } else {
            loco.max_speed
        };
        loco.current_speed = calculate_new_speed(
            loco.current_speed,
            target_speed,
            loco.acceleration,
            loco.deceleration,
            ctx.dt,
        );

        let mut step_speed = loco.current_speed;
        if final_leg && ctx.dt > Fixed::ZERO {
            // Never step past the final waypoint.
            step_speed = step_speed.min(distance / ctx.dt);
        }
        desired = to_current.normalize().scale(step_speed);
    } else {
        state.locomotion.current_speed = Fixed::ZERO;
    }

    let push = if state.gathering {
        Vec2Fixed::ZERO
    } else {
        ctx.avoidance
            .query_into(state.position, state.radius + config.separation_margin, scratch);
        separation(
            state.id,
            state.position,
            state.radius,
            scratch.iter().map(|entry| Neighbor {
                id: entry.id,
                position: entry.position,
                radius: entry.radius,
            }),
            config,
        )
    };

    let velocity = wall_slide(state.position, desired + push, state.radius, ctx.obstacles);
    state.position += velocity.scale(ctx.dt);
    state.velocity = velocity;

    let heading = if desired.is_zero() { Vec2Fixed::ZERO } else { desired.normalize() };
    if !heading.is_zero() {
        state.facing = rotate_toward(state.facing, heading, config.turn_rate * ctx.dt);
    }

    state
}

/// Radius inside which an actor counts as arrived.
#[must_use]
pub fn arrival_radius(goal: &MovementGoal, obstacle_radius: Fixed, margin: Fixed) -> Fixed {
    goal.arrival_radius.unwrap_or(obstacle_radius + margin)
}

/// Two-stage arrival check on the final leg.
///
/// Arrived when inside `radius`, or inside twice the radius while no longer
/// moving toward the waypoint (separation holding the actor just outside).
#[must_use]
pub fn has_arrived(
    position: Vec2Fixed,
    velocity: Vec2Fixed,
    lookahead: &MovementWaypoints,
    radius: Fixed,
) -> bool {
    if !lookahead.enabled || lookahead.next.is_some() {
        return false;
    }
    let to_target = lookahead.current - position;
    let dist_sq = to_target.length_squared();
    if dist_sq < radius * radius {
        return true;
    }
    let outer = radius * Fixed::from_num(2);
    dist_sq < outer * outer && velocity.dot(to_target) <= Fixed::ZERO
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::Team;
    use crate::obstacles::{NoObstacles, Rect, StaticObstacles};

    fn fixed(n: f64) -> Fixed {
        Fixed::from_num(n)
    }

    fn point(x: f64, y: f64) -> Vec2Fixed {
        Vec2Fixed::new(fixed(x), fixed(y))
    }

    fn mover(target: Vec2Fixed, next: Option<Vec2Fixed>) -> MotionState {
        MotionState {
            id: 1,
            position: Vec2Fixed::ZERO,
            facing: Vec2Fixed::new(Fixed::ONE, Fixed::ZERO),
            velocity: Vec2Fixed::ZERO,
            radius: fixed(0.5),
            locomotion: Locomotion::new(fixed(4.0), fixed(8.0), fixed(8.0)),
            lookahead: MovementWaypoints {
                current: target,
                next,
                enabled: true,
            },
            gathering: false,
        }
    }

    fn run(state: MotionState, ticks: usize, avoidance: &SpatialHash, obstacles: &dyn ObstacleQuery) -> MotionState {
        let config = SteeringConfig::default();
        let ctx = MovementContext {
            dt: fixed(0.05),
            config: &config,
            avoidance,
            obstacles,
        };
        let mut scratch = Vec::new();
        let mut state = state;
        for _ in 0..ticks {
            state = integrate(&ctx, state, &mut scratch);
        }
        state
    }

    #[test]
    fn test_accelerates_toward_waypoint() {
        let empty = SpatialHash::new(fixed(4.0));
        let state = run(mover(point(20.0, 0.0), None), 1, &empty, &NoObstacles);
        // 8 m/s² for 0.05 s.
        let tolerance = fixed(0.001);
        assert!((state.locomotion.current_speed - fixed(0.4)).abs() < tolerance);
        assert!((state.velocity.x - fixed(0.4)).abs() < tolerance);
        assert_eq!(state.velocity.y, Fixed::ZERO);
        assert!((state.position.x - fixed(0.02)).abs() < tolerance);
    }

    #[test]
    fn test_reaches_final_waypoint_without_overshoot() {
        let empty = SpatialHash::new(fixed(4.0));
        let target = point(6.0, 0.0);
        let mut state = mover(target, None);
        let config = SteeringConfig::default();
        let ctx = MovementContext {
            dt: fixed(0.05),
            config: &config,
            avoidance: &empty,
            obstacles: &NoObstacles,
        };
        let mut scratch = Vec::new();
        for _ in 0..200 {
            state = integrate(&ctx, state, &mut scratch);
            assert!(state.position.x <= target.x + fixed(0.001));
            if has_arrived(state.position, state.velocity, &state.lookahead, fixed(0.75)) {
                return;
            }
        }
        panic!("never arrived: {:?}", state.position);
    }

    #[test]
    fn test_corner_switch_promotes_next() {
        let empty = SpatialHash::new(fixed(4.0));
        let mut state = mover(point(0.2, 0.0), Some(point(0.2, 10.0)));
        state = run(state, 1, &empty, &NoObstacles);
        assert_eq!(state.lookahead.current, point(0.2, 10.0));
        assert_eq!(state.lookahead.next, None);
    }

    #[test]
    fn test_keeps_full_speed_while_legs_remain() {
        let empty = SpatialHash::new(fixed(4.0));
        let mut state = mover(point(3.0, 0.0), Some(point(3.0, 3.0)));
        state.locomotion.current_speed = fixed(4.0);
        state = run(state, 1, &empty, &NoObstacles);
        assert_eq!(state.locomotion.current_speed, fixed(4.0));
    }

    #[test]
    fn test_disabled_actor_holds_position() {
        let empty = SpatialHash::new(fixed(4.0));
        let mut state = mover(point(5.0, 0.0), None);
        state.lookahead.enabled = false;
        state.locomotion.current_speed = fixed(3.0);
        state = run(state, 5, &empty, &NoObstacles);
        assert_eq!(state.position, Vec2Fixed::ZERO);
        assert_eq!(state.locomotion.current_speed, Fixed::ZERO);
    }

    #[test]
    fn test_overlapping_idle_actor_is_pushed_unless_gathering() {
        let mut avoidance = SpatialHash::new(fixed(4.0));
        avoidance.insert(1, Team(0), Vec2Fixed::ZERO, fixed(0.5));
        avoidance.insert(2, Team(0), point(0.5, 0.0), fixed(0.5));

        let mut state = mover(Vec2Fixed::ZERO, None);
        state.lookahead.enabled = false;
        let pushed = run(state, 1, &avoidance, &NoObstacles);
        assert!(pushed.position.x < Fixed::ZERO);

        state.gathering = true;
        let parked = run(state, 1, &avoidance, &NoObstacles);
        assert_eq!(parked.position, Vec2Fixed::ZERO);
    }

    #[test]
    fn test_slides_along_wall() {
        let empty = SpatialHash::new(fixed(4.0));
        let wall = StaticObstacles::new(vec![Rect::new(point(0.3, -10.0), point(1.0, 10.0))]);
        let mut state = mover(point(10.0, 10.0), None);
        state.locomotion.current_speed = fixed(4.0);
        state = run(state, 1, &empty, &wall);
        assert_eq!(state.velocity.x, Fixed::ZERO);
        assert!(state.velocity.y > Fixed::ZERO);
    }

    #[test]
    fn test_turns_at_limited_rate() {
        let empty = SpatialHash::new(fixed(4.0));
        let state = run(mover(point(0.0, 20.0), None), 1, &empty, &NoObstacles);
        // 6 rad/s for 0.05 s: about 0.3 rad of turn.
        assert!(state.facing.y > fixed(0.29) && state.facing.y < fixed(0.31));
    }

    #[test]
    fn test_arrival_two_stage() {
        let lookahead = MovementWaypoints {
            current: point(10.0, 0.0),
            next: None,
            enabled: true,
        };
        let radius = fixed(0.75);

        assert!(has_arrived(point(9.5, 0.0), point(1.0, 0.0), &lookahead, radius));
        // Outside primary, inside 2x, still closing in.
        assert!(!has_arrived(point(9.0, 0.0), point(1.0, 0.0), &lookahead, radius));
        // Same spot but pushed away.
        assert!(has_arrived(point(9.0, 0.0), point(-0.1, 0.0), &lookahead, radius));
        // Too far for the secondary check.
        assert!(!has_arrived(point(8.0, 0.0), Vec2Fixed::ZERO, &lookahead, radius));

        let mid_path = MovementWaypoints {
            next: Some(point(20.0, 0.0)),
            ..lookahead
        };
        assert!(!has_arrived(point(10.0, 0.0), Vec2Fixed::ZERO, &mid_path, radius));
    }

    #[test]
    fn test_arrival_radius_prefers_explicit() {
        let mut goal = MovementGoal::at(Vec2Fixed::ZERO);
        assert_eq!(arrival_radius(&goal, fixed(0.5), fixed(0.25)), fixed(0.75));
        goal.arrival_radius = Some(fixed(3.0));
        assert_eq!(arrival_radius(&goal, fixed(0.5), fixed(0.25)), fixed(3.0));
    }
}
