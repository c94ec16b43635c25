use bevy::prelude::*;

use crate::game::simulation::{layers, overlap_circle, raycast_first_hit, Collider, SimPosition};
use crate::game::tank::Role;

/// What an enemy knows about the player: a remembered target entity and
/// whether it was visible on the last line-of-sight check. Acquisition runs
/// on a fixed cadence; visibility is refreshed every tick.
#[derive(Component, Debug, Clone)]
pub struct Perception {
    pub range: f32,
    pub check_interval: f32,
    pub check_timer: f32,
    pub target: Option<Entity>,
    pub target_visible: bool,
}

impl Perception {
    pub fn new(range: f32, check_interval: f32) -> Self {
        Self {
            range,
            check_interval,
            check_timer: 0.0,
            target: None,
            target_visible: false,
        }
    }

    /// Adopting a target never carries visibility over from the previous
    /// one; the next raycast decides.
    pub fn set_target(&mut self, target: Option<Entity>) {
        self.target = target;
        self.target_visible = false;
    }
}

/// Ray mask for vision checks. Crates and obstacles block sight lines the
/// same way they block shells.
const SIGHT_MASK: u32 = layers::TANK | layers::OBSTACLE | layers::CRATE;

pub fn update_perception(
    time: Res<Time>,
    mut enemies: Query<(Entity, &SimPosition, &mut Perception)>,
    roles: Query<&Role>,
    colliders: Query<(Entity, &SimPosition, &Collider)>,
) {
    let snapshot: Vec<(Entity, Vec2, Collider)> = colliders
        .iter()
        .map(|(e, p, c)| (e, p.0, *c))
        .collect();

    for (entity, position, mut perception) in enemies.iter_mut() {
        // Defensive despawn check runs every tick, not just on the cadence
        if let Some(target) = perception.target {
            if roles.get(target).is_err() {
                perception.set_target(None);
            }
        }

        perception.check_timer += time.delta_secs();
        if perception.check_timer >= perception.check_interval {
            perception.check_timer = 0.0;
            match perception.target {
                // A held target is only validated, never swapped
                Some(target) => {
                    let in_range = snapshot
                        .iter()
                        .find(|(e, _, _)| *e == target)
                        .is_some_and(|(_, pos, _)| {
                            position.0.distance(*pos) <= perception.range
                        });
                    if !in_range {
                        perception.set_target(None);
                    }
                }
                None => {
                    let acquired = nearest_player(position.0, &perception, &roles, &snapshot);
                    if acquired.is_some() {
                        perception.set_target(acquired);
                    }
                }
            }
        }

        // Visibility is re-derived every tick, not just on the cadence
        perception.target_visible = match perception.target {
            Some(target) => has_line_of_sight(entity, position.0, target, &snapshot),
            None => false,
        };
    }
}

fn nearest_player(
    origin: Vec2,
    perception: &Perception,
    roles: &Query<&Role>,
    colliders: &[(Entity, Vec2, Collider)],
) -> Option<Entity> {
    overlap_circle(origin, perception.range, layers::TANK, None, colliders)
        .into_iter()
        .filter(|(entity, _)| matches!(roles.get(*entity), Ok(Role::Player)))
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(entity, _)| entity)
}

/// True when the first thing a ray from `origin` toward `target` hits is the
/// target itself. Anything opaque in between breaks the sight line.
fn has_line_of_sight(
    observer: Entity,
    origin: Vec2,
    target: Entity,
    colliders: &[(Entity, Vec2, Collider)],
) -> bool {
    let Some(&(_, target_pos, _)) = colliders.iter().find(|(e, _, _)| *e == target) else {
        return false;
    };
    let offset = target_pos - origin;
    let distance = offset.length();
    if distance < f32::EPSILON {
        return true;
    }
    let dir = offset / distance;
    match raycast_first_hit(origin, dir, distance + 0.1, SIGHT_MASK, Some(observer), colliders) {
        Some(hit) => hit.entity == target,
        None => false,
    }
}
