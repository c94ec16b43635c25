use bevy::prelude::*;
use rustc_hash::FxHashSet;

use crate::game::pickup::SupplyCrate;
use crate::game::simulation::{Collider, SimPosition, SimSet};
use crate::game::tank::Role;

/// A shell in flight. Despawned on first contact or once it has covered its
/// range, whichever comes first.
#[derive(Component, Debug, Clone, Copy)]
pub struct Projectile {
    pub damage: f32,
    pub range: f32,
    pub origin: Vec2,
    pub shooter: Entity,
}

/// Hit points for tanks and destructible obstacles.
#[derive(Component, Debug, Clone, Copy)]
pub struct Health {
    pub current: f32,
    pub max: f32,
    /// Upper bound for max-HP upgrades.
    pub cap: f32,
}

impl Health {
    pub fn new(max: f32, cap: f32) -> Self {
        Self {
            current: max,
            max,
            cap,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.current > 0.0
    }

    pub fn hit(&mut self, damage: f32) {
        self.current -= damage;
    }

    pub fn heal(&mut self, amount: f32) {
        self.current = (self.current + amount).clamp(0.0, self.max);
    }

    /// Raise the HP ceiling (pickup upgrade), clamped to the cap.
    pub fn raise_max(&mut self, amount: f32) {
        self.max = (self.max + amount).min(self.cap);
    }
}

/// A tank reached zero HP this tick.
#[derive(Event, Message, Debug, Clone, Copy)]
pub struct TankDestroyed {
    pub entity: Entity,
    pub role: Role,
}

/// A destructible obstacle was destroyed; the nav grid must be restamped.
#[derive(Event, Message, Debug, Clone, Copy)]
pub struct ObstacleDestroyed {
    pub position: Vec2,
    pub radius: f32,
}

/// A projectile struck an intact supply crate.
#[derive(Event, Message, Debug, Clone, Copy)]
pub struct CrateHit {
    pub entity: Entity,
}

pub struct CombatPlugin;

impl Plugin for CombatPlugin {
    fn build(&self, app: &mut App) {
        app.add_message::<TankDestroyed>();
        app.add_message::<ObstacleDestroyed>();
        app.add_message::<CrateHit>();

        app.add_systems(
            FixedUpdate,
            (expire_projectiles, projectile_impacts, handle_deaths)
                .chain()
                .in_set(SimSet::Physics),
        );
    }
}

/// Remove projectiles that have flown past their range without hitting
/// anything. An expected terminal condition, not an error.
fn expire_projectiles(
    mut commands: Commands,
    projectiles: Query<(Entity, &SimPosition, &Projectile)>,
) {
    for (entity, pos, projectile) in projectiles.iter() {
        if pos.0.distance(projectile.origin) >= projectile.range {
            commands.entity(entity).despawn();
        }
    }
}

/// Resolve projectile contacts. Each projectile hits at most one collider per
/// tick (the nearest overlapping one) and is consumed by the impact.
fn projectile_impacts(
    mut commands: Commands,
    projectiles: Query<(Entity, &SimPosition, &Collider, &Projectile)>,
    colliders: Query<(Entity, &SimPosition, &Collider), Without<Projectile>>,
    mut healths: Query<&mut Health>,
    crates: Query<&SupplyCrate>,
    mut crate_hits: MessageWriter<CrateHit>,
) {
    let mut spent: FxHashSet<Entity> = FxHashSet::default();

    for (proj_entity, proj_pos, proj_col, projectile) in projectiles.iter() {
        if spent.contains(&proj_entity) {
            continue;
        }

        let mut nearest: Option<(Entity, f32)> = None;
        for (other, other_pos, other_col) in colliders.iter() {
            if other == projectile.shooter || other_col.layer & proj_col.mask == 0 {
                continue;
            }
            let dist = proj_pos.0.distance(other_pos.0);
            if dist <= proj_col.radius + other_col.radius
                && nearest.map_or(true, |(_, d)| dist < d)
            {
                nearest = Some((other, dist));
            }
        }

        let Some((hit_entity, _)) = nearest else {
            continue;
        };

        if let Ok(mut health) = healths.get_mut(hit_entity) {
            health.hit(projectile.damage);
        }
        if crates.get(hit_entity).is_ok() {
            crate_hits.write(CrateHit { entity: hit_entity });
        }

        spent.insert(proj_entity);
        commands.entity(proj_entity).despawn();
    }
}

/// Turn zero-HP entities into destruction messages and despawn them. Tanks
/// and destructible obstacles are told apart by their Role component.
fn handle_deaths(
    mut commands: Commands,
    dead: Query<(Entity, &Health, Option<&Role>, &SimPosition, Option<&Collider>)>,
    mut tank_destroyed: MessageWriter<TankDestroyed>,
    mut obstacle_destroyed: MessageWriter<ObstacleDestroyed>,
) {
    for (entity, health, role, pos, collider) in dead.iter() {
        if health.is_alive() {
            continue;
        }

        match role {
            Some(&role) => {
                tank_destroyed.write(TankDestroyed { entity, role });
            }
            None => {
                let radius = collider.map_or(0.0, |c| c.radius);
                obstacle_destroyed.write(ObstacleDestroyed {
                    position: pos.0,
                    radius,
                });
            }
        }
        commands.entity(entity).despawn();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_hit_and_heal_clamp() {
        let mut health = Health::new(100.0, 200.0);
        health.hit(30.0);
        assert_eq!(health.current, 70.0);
        health.heal(1000.0);
        assert_eq!(health.current, 100.0);
        health.hit(150.0);
        assert!(!health.is_alive());
    }

    #[test]
    fn raise_max_respects_cap() {
        let mut health = Health::new(180.0, 200.0);
        health.raise_max(25.0);
        assert_eq!(health.max, 200.0);
        health.raise_max(25.0);
        assert_eq!(health.max, 200.0);
    }
}
