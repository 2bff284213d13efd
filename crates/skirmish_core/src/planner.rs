//! Budgeted path planning and the waypoint-buffer follower.
//!
//! The planner serves dirty movement goals in round-robin order until the
//! per-tick budget runs out; the rest wait for the next tick. Each served
//! request either fills the actor's [`WaypointBuffer`] and arms its
//! [`MovementWaypoints`] lookahead, or clears both ("cannot path").

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::components::{EntityId, MovementGoal, MovementWaypoints, WaypointBuffer};
use crate::config::PlannerConfig;
use crate::error::NavError;
use crate::math::{Fixed, Vec2Fixed};
use crate::navigation::{NavigationService, PathRequest};

/// Outcome of one path request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathStatus {
    /// Route reaches the destination.
    Complete,
    /// Route stops short of the destination.
    Partial,
    /// No route; the actor stands still.
    Failed(NavError),
}

/// A served request, reported in [`crate::simulation::TickEvents`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathResult {
    /// Actor whose goal was served.
    pub actor: EntityId,
    /// What happened.
    pub status: PathStatus,
    /// Corners stored in the buffer.
    pub corners: usize,
}

/// Summary of one planning pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlannerReport {
    /// Requests served this tick, in service order.
    pub served: Vec<PathResult>,
    /// Dirty goals left for the next tick.
    pub deferred: usize,
}

/// Round-robin admission control over dirty goals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathPlanner {
    /// First id to consider on the next pass.
    cursor: EntityId,
}

impl PathPlanner {
    /// Create a planner starting at the lowest id.
    #[must_use]
    pub const fn new() -> Self {
        Self { cursor: 0 }
    }

    /// Serve dirty goals, starting at the cursor and wrapping around.
    ///
    /// `dirty` must be sorted ascending. `serve` runs one request and reports
    /// its result. Serving stops once `max_requests_per_tick` requests ran or
    /// the optional wall-clock budget is spent, but never before the first one.
    pub fn run<F>(&mut self, dirty: &[EntityId], config: &PlannerConfig, mut serve: F) -> PlannerReport
    where
        F: FnMut(EntityId) -> PathResult,
    {
        let mut report = PlannerReport::default();
        if dirty.is_empty() {
            return report;
        }

        let start = dirty.partition_point(|&id| id < self.cursor);
        // The clock is only read when a wall-clock budget is configured.
        let deadline = config
            .time_budget_micros
            .map(|micros| (Instant::now(), Duration::from_micros(micros)));
        let limit = config.max_requests_per_tick as usize;

        let mut served = 0;
        for offset in 0..dirty.len() {
            let id = dirty[(start + offset) % dirty.len()];
            let out_of_time = served > 0
                && deadline.is_some_and(|(started, budget)| started.elapsed() >= budget);
            if served >= limit || out_of_time {
                self.cursor = id;
                report.deferred = dirty.len() - served;
                tracing::debug!(
                    served,
                    deferred = report.deferred,
                    "path budget exhausted"
                );
                return report;
            }
            report.served.push(serve(id));
            served += 1;
            self.cursor = id.wrapping_add(1);
        }

        report
    }
}

/// Serve one dirty goal against the navigation service.
///
/// On success the buffer holds the corners, the lookahead points at the
/// chosen first waypoint and the goal records whether the route was partial.
/// On failure buffer and lookahead are cleared. The dirty flag is cleared in
/// both cases.
pub fn plan_path(
    nav: &dyn NavigationService,
    config: &PlannerConfig,
    time: Fixed,
    position: Vec2Fixed,
    goal: &mut MovementGoal,
    waypoints: &mut WaypointBuffer,
    lookahead: &mut MovementWaypoints,
) -> PathStatus {
    let request = PathRequest {
        start: position,
        end: goal.destination,
        sample_radius: config.sample_radius,
        max_corners: waypoints.capacity(),
    };

    goal.path_dirty = false;
    goal.last_path_request_time = time;

    match nav.compute_path(&request) {
        Ok(path) if !path.corners.is_empty() => {
            waypoints.fill(&path.corners);
            goal.is_partial = path.partial;

            let index = select_first_waypoint(
                position,
                waypoints.points(),
                config.skip_distance,
                config.corner_tolerance,
            );
            goal.waypoint_index = index;
            lookahead.current = waypoints.get(index).unwrap_or(position);
            lookahead.next = waypoints.get(index + 1);
            lookahead.enabled = true;

            if path.partial {
                PathStatus::Partial
            } else {
                PathStatus::Complete
            }
        }
        Ok(_) => {
            cannot_path(goal, waypoints, lookahead);
            PathStatus::Failed(NavError::NoRoute)
        }
        Err(error) => {
            cannot_path(goal, waypoints, lookahead);
            PathStatus::Failed(error)
        }
    }
}

fn cannot_path(goal: &mut MovementGoal, waypoints: &mut WaypointBuffer, lookahead: &mut MovementWaypoints) {
    waypoints.clear();
    lookahead.disable();
    goal.is_partial = false;
    goal.waypoint_index = 0;
}

/// Choose the first corner worth steering toward.
///
/// Corners within `skip_distance` of `position` are skipped. Of the rest, the
/// first whose direction deviates from the straight line to the final corner
/// by more than `tolerance` (measured as `1 - dot`) is chosen; if none does,
/// the final corner is.
#[must_use]
pub fn select_first_waypoint(
    position: Vec2Fixed,
    corners: &[Vec2Fixed],
    skip_distance: Fixed,
    tolerance: Fixed,
) -> usize {
    let Some((&goal, leading)) = corners.split_last() else {
        return 0;
    };
    let to_goal = (goal - position).normalize();
    let skip_sq = skip_distance * skip_distance;

    for (index, &corner) in leading.iter().enumerate() {
        if position.distance_squared(corner) <= skip_sq {
            continue;
        }
        let to_corner = (corner - position).normalize();
        if Fixed::ONE - to_corner.dot(to_goal) > tolerance {
            return index;
        }
    }

    corners.len() - 1
}

/// Keep the lookahead in step with the buffer after the integrator advanced.
///
/// When the buffer entry at the stored index no longer matches the
/// lookahead's Current, the index moves forward to it and Next is refilled
/// from the entry after.
pub fn follow_path(goal: &mut MovementGoal, waypoints: &WaypointBuffer, lookahead: &mut MovementWaypoints) {
    if !lookahead.enabled || waypoints.is_empty() {
        return;
    }
    if waypoints.get(goal.waypoint_index) == Some(lookahead.current) {
        return;
    }

    let mut index = goal.waypoint_index;
    while index + 1 < waypoints.len() && waypoints.get(index) != Some(lookahead.current) {
        index += 1;
    }
    goal.waypoint_index = index;
    lookahead.next = waypoints.get(index + 1);
}
