use bevy::prelude::*;

use crate::game::config::ArenaConfig;

pub struct SimulationPlugin;

/// Per-tick pipeline. Decision systems record commands as messages, the
/// actuation systems fold them into control state, and only then do bodies
/// move. Nothing later in the chain may feed back into the same tick.
#[derive(SystemSet, Debug, Hash, PartialEq, Eq, Clone)]
pub enum SimSet {
    Decision,    // AI perception and command emission
    Actuation,   // Commands -> control state, spawning, reload timers
    Physics,     // Steering application, collisions, projectile hits
    Integration, // Applying velocity to position
}

impl Plugin for SimulationPlugin {
    fn build(&self, app: &mut App) {
        // Default, overridden from ArenaConfig at startup.
        app.insert_resource(Time::<Fixed>::from_hz(50.0));

        app.configure_sets(
            FixedUpdate,
            (
                SimSet::Decision,
                SimSet::Actuation,
                SimSet::Physics,
                SimSet::Integration,
            )
                .chain(),
        );

        app.add_systems(Startup, apply_tick_rate);
        app.add_systems(
            FixedUpdate,
            (
                (
                    resolve_tank_collisions,
                    resolve_obstacle_collisions,
                    constrain_to_map_bounds,
                )
                    .chain()
                    .in_set(SimSet::Physics),
                (cache_previous_state, apply_velocity)
                    .chain()
                    .in_set(SimSet::Integration),
            ),
        );
    }
}

fn apply_tick_rate(config: Res<ArenaConfig>, mut fixed_time: ResMut<Time<Fixed>>) {
    fixed_time.set_timestep_hz(config.tick_rate);
    info!("Simulation tick rate set to {} Hz", config.tick_rate);
}

// ============================================================================
// Components
// ============================================================================

/// Logical position of an entity in the arena. Gameplay is strictly 2D.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct SimPosition(pub Vec2);

/// Previous logical position, kept for interpolation and displacement checks.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct SimPositionPrev(pub Vec2);

/// Logical velocity of an entity.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct SimVelocity(pub Vec2);

/// Body heading in radians (0 = east, counter-clockwise positive).
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct SimHeading(pub f32);

impl SimHeading {
    pub fn forward(&self) -> Vec2 {
        Vec2::from_angle(self.0)
    }
}

/// Collision layers for filtering.
pub mod layers {
    pub const NONE: u32 = 0;
    pub const TANK: u32 = 1 << 0;
    pub const OBSTACLE: u32 = 1 << 1;
    pub const PROJECTILE: u32 = 1 << 2;
    pub const CRATE: u32 = 1 << 3;
    pub const PICKUP: u32 = 1 << 4;
    pub const ALL: u32 = u32::MAX;
}

/// Circular collider used for overlap tests, raycasts and pushes.
#[derive(Component, Debug, Clone, Copy)]
pub struct Collider {
    pub radius: f32,
    pub layer: u32,
    pub mask: u32,
}

impl Default for Collider {
    fn default() -> Self {
        Self {
            radius: 0.5,
            layer: layers::TANK,
            mask: layers::TANK | layers::OBSTACLE,
        }
    }
}

/// Marker for static circular obstacles. Radius lives in the Collider.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct StaticObstacle;

// ============================================================================
// Geometry queries
// ============================================================================

/// Result of a raycast against circle colliders.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub entity: Entity,
    pub distance: f32,
}

/// Cast a ray from `origin` along `dir` (unit length) and return the nearest
/// collider whose layer matches `mask`, ignoring `ignore`. Colliders the ray
/// starts inside of are hit at the exit point so a tank never occludes a
/// target it is already touching.
pub fn raycast_first_hit(
    origin: Vec2,
    dir: Vec2,
    max_dist: f32,
    mask: u32,
    ignore: Option<Entity>,
    colliders: &[(Entity, Vec2, Collider)],
) -> Option<RayHit> {
    let mut best: Option<RayHit> = None;

    for &(entity, center, collider) in colliders {
        if Some(entity) == ignore || collider.layer & mask == 0 {
            continue;
        }

        let oc = center - origin;
        let proj = oc.dot(dir);
        if proj < -collider.radius {
            continue; // entirely behind the ray
        }

        let closest_sq = oc.length_squared() - proj * proj;
        let r_sq = collider.radius * collider.radius;
        if closest_sq > r_sq {
            continue;
        }

        let half_chord = (r_sq - closest_sq).sqrt();
        let mut t = proj - half_chord;
        if t < 0.0 {
            t = proj + half_chord;
        }
        if t < 0.0 || t > max_dist {
            continue;
        }

        if best.map_or(true, |b| t < b.distance) {
            best = Some(RayHit { entity, distance: t });
        }
    }

    best
}

/// All colliders matching `mask` whose circle intersects the query circle,
/// with their center distance. Callers pick the nearest if they need one.
pub fn overlap_circle(
    center: Vec2,
    radius: f32,
    mask: u32,
    ignore: Option<Entity>,
    colliders: &[(Entity, Vec2, Collider)],
) -> Vec<(Entity, f32)> {
    let mut hits = Vec::new();
    for &(entity, pos, collider) in colliders {
        if Some(entity) == ignore || collider.layer & mask == 0 {
            continue;
        }
        let dist = center.distance(pos);
        if dist <= radius + collider.radius {
            hits.push((entity, dist));
        }
    }
    hits
}

/// Wrap an angle to (-PI, PI].
pub fn wrap_angle(angle: f32) -> f32 {
    use std::f32::consts::{PI, TAU};
    let mut a = angle % TAU;
    if a > PI {
        a -= TAU;
    } else if a <= -PI {
        a += TAU;
    }
    a
}

// ============================================================================
// Systems
// ============================================================================

fn cache_previous_state(mut query: Query<(&mut SimPositionPrev, &SimPosition)>) {
    for (mut prev, pos) in query.iter_mut() {
        prev.0 = pos.0;
    }
}

fn apply_velocity(time: Res<Time>, mut query: Query<(&mut SimPosition, &SimVelocity)>) {
    let delta = time.delta_secs();
    for (mut pos, vel) in query.iter_mut() {
        if vel.0.length_squared() > 0.0 {
            pos.0 += vel.0 * delta;
        }
    }
}

// Only steered bodies are wall-clamped; projectiles fly until they expire.
fn constrain_to_map_bounds(
    config: Res<ArenaConfig>,
    mut query: Query<
        (&mut SimPosition, &mut SimVelocity),
        (With<SimHeading>, Without<StaticObstacle>),
    >,
) {
    let half_w = config.map_width / 2.0;
    let half_h = config.map_height / 2.0;

    for (mut pos, mut vel) in query.iter_mut() {
        pos.0.x = pos.0.x.clamp(-half_w, half_w);
        pos.0.y = pos.0.y.clamp(-half_h, half_h);

        // Zero velocity pressing against the wall
        if pos.0.x <= -half_w && vel.0.x < 0.0 {
            vel.0.x = 0.0;
        }
        if pos.0.x >= half_w && vel.0.x > 0.0 {
            vel.0.x = 0.0;
        }
        if pos.0.y <= -half_h && vel.0.y < 0.0 {
            vel.0.y = 0.0;
        }
        if pos.0.y >= half_h && vel.0.y > 0.0 {
            vel.0.y = 0.0;
        }
    }
}

/// Pairwise separation between tank bodies. Overlapping tanks are pushed
/// apart directly in position space; impulses are collected first and
/// applied afterwards so iteration order does not matter.
fn resolve_tank_collisions(
    mut query: Query<(Entity, &mut SimPosition, &Collider), With<SimHeading>>,
) {
    let mut tanks: Vec<(Entity, Vec2, f32)> = query
        .iter()
        .map(|(e, p, c)| (e, p.0, c.radius))
        .collect();
    tanks.sort_by_key(|(e, _, _)| *e); // deterministic pairing

    let mut pushes: Vec<(Entity, Vec2)> = Vec::new();

    for i in 0..tanks.len() {
        for j in (i + 1)..tanks.len() {
            let (e1, p1, r1) = tanks[i];
            let (e2, p2, r2) = tanks[j];
            let min_dist = r1 + r2;
            let delta = p1 - p2;
            let dist_sq = delta.length_squared();
            if dist_sq < min_dist * min_dist && dist_sq > 0.0001 {
                let dist = dist_sq.sqrt();
                let push = (delta / dist) * (min_dist - dist) * 0.5;
                pushes.push((e1, push));
                pushes.push((e2, -push));
            }
        }
    }

    for (entity, push) in pushes {
        if let Ok((_, mut pos, _)) = query.get_mut(entity) {
            pos.0 += push;
        }
    }
}

/// Push tank bodies out of static obstacles so a tank driving into cover
/// stalls instead of tunneling through it.
fn resolve_obstacle_collisions(
    mut tanks: Query<(&mut SimPosition, &Collider), (With<SimHeading>, Without<StaticObstacle>)>,
    obstacles: Query<(&SimPosition, &Collider), With<StaticObstacle>>,
) {
    for (mut t_pos, t_col) in tanks.iter_mut() {
        for (o_pos, o_col) in obstacles.iter() {
            let min_dist = t_col.radius + o_col.radius;
            let delta = t_pos.0 - o_pos.0;
            let dist_sq = delta.length_squared();
            if dist_sq < min_dist * min_dist && dist_sq > 0.0001 {
                let dist = dist_sq.sqrt();
                t_pos.0 += (delta / dist) * (min_dist - dist);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collider(radius: f32, layer: u32) -> Collider {
        Collider {
            radius,
            layer,
            mask: layers::ALL,
        }
    }

    fn entities(n: usize) -> Vec<Entity> {
        let mut world = World::new();
        (0..n).map(|_| world.spawn_empty().id()).collect()
    }

    #[test]
    fn raycast_hits_nearest_collider() {
        let ids = entities(3);
        let colliders = vec![
            (ids[0], Vec2::new(5.0, 0.0), collider(0.5, layers::OBSTACLE)),
            (ids[1], Vec2::new(3.0, 0.0), collider(0.5, layers::TANK)),
        ];

        let hit = raycast_first_hit(Vec2::ZERO, Vec2::X, 10.0, layers::ALL, Some(ids[2]), &colliders)
            .unwrap();
        assert_eq!(hit.entity, ids[1]);
        assert!((hit.distance - 2.5).abs() < 1e-4);
    }

    #[test]
    fn raycast_respects_layer_mask() {
        let ids = entities(3);
        let colliders = vec![
            (ids[0], Vec2::new(3.0, 0.0), collider(0.5, layers::PICKUP)),
            (ids[1], Vec2::new(5.0, 0.0), collider(0.5, layers::TANK)),
        ];

        // Pickups are not physical for line-of-sight purposes
        let hit = raycast_first_hit(
            Vec2::ZERO,
            Vec2::X,
            10.0,
            layers::TANK | layers::OBSTACLE,
            Some(ids[2]),
            &colliders,
        )
        .unwrap();
        assert_eq!(hit.entity, ids[1]);
    }

    #[test]
    fn raycast_ignores_self_and_misses_offset_circles() {
        let ids = entities(2);
        let colliders = vec![
            (ids[0], Vec2::ZERO, collider(0.5, layers::TANK)),
            (ids[1], Vec2::new(4.0, 2.0), collider(0.5, layers::TANK)),
        ];

        let hit = raycast_first_hit(Vec2::ZERO, Vec2::X, 10.0, layers::ALL, Some(ids[0]), &colliders);
        assert!(hit.is_none());
    }

    #[test]
    fn raycast_stops_at_max_distance() {
        let ids = entities(2);
        let colliders = vec![(ids[0], Vec2::new(8.0, 0.0), collider(0.5, layers::TANK))];

        assert!(raycast_first_hit(Vec2::ZERO, Vec2::X, 5.0, layers::ALL, None, &colliders).is_none());
        assert!(raycast_first_hit(Vec2::ZERO, Vec2::X, 8.0, layers::ALL, None, &colliders).is_some());
    }

    #[test]
    fn overlap_circle_returns_entities_in_range() {
        let ids = entities(3);
        let colliders = vec![
            (ids[0], Vec2::new(2.0, 0.0), collider(0.5, layers::TANK)),
            (ids[1], Vec2::new(9.0, 0.0), collider(0.5, layers::TANK)),
        ];

        let hits = overlap_circle(Vec2::ZERO, 5.0, layers::TANK, Some(ids[2]), &colliders);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, ids[0]);
    }

    #[test]
    fn wrap_angle_bounds() {
        use std::f32::consts::{PI, TAU};
        assert!((wrap_angle(TAU + 0.1) - 0.1).abs() < 1e-5);
        assert!((wrap_angle(-TAU - 0.1) + 0.1).abs() < 1e-5);
        assert!(wrap_angle(PI + 0.1) < 0.0);
    }
}
