use bevy::prelude::*;

use crate::game::pathfinding::PlannedPath;

/// Bang-bang steering toward the current waypoint. Consumes at most one
/// waypoint per tick, then steers at the (possibly just-advanced) target.
/// Returns the `(turn, throttle)` pair to latch; an exhausted path yields no
/// movement.
pub fn steer_along_path(
    position: Vec2,
    forward: Vec2,
    path: &mut PlannedPath,
    waypoint_radius: f32,
    alignment_dot: f32,
) -> (i8, i8) {
    if path.exhausted() {
        return (0, 0);
    }
    if position.distance(path.waypoints[path.cursor]) < waypoint_radius {
        path.cursor += 1;
        if path.exhausted() {
            return (0, 0);
        }
    }

    let target = path.waypoints[path.cursor];
    let to_target = (target - position).normalize_or_zero();
    if to_target == Vec2::ZERO {
        return (0, 0);
    }

    if forward.dot(to_target) >= alignment_dot {
        return (0, 1);
    }

    // perp_dot is the z of the 3D cross product; its sign picks the turn
    // direction, with the degenerate 180-degree case resolved toward -1.
    // The hull keeps driving at full throttle while it turns.
    let cross_z = forward.perp_dot(to_target);
    if cross_z >= 0.0 {
        (-1, 1)
    } else {
        (1, 1)
    }
}
