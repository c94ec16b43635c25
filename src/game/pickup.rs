use bevy::prelude::*;
use rand::Rng;

use crate::game::combat::{CrateHit, Health};
use crate::game::config::ArenaConfig;
use crate::game::level::LevelState;
use crate::game::simulation::{layers, Collider, SimPosition, SimSet};
use crate::game::tank::{Role, TankBody, Turret, UpgradeRanks, Weapon};

/// A destructible supply crate. Breaking it may drop a pickup; the crate
/// itself respawns in place after a cooldown. While broken it has no
/// collider, so shells and sight lines pass straight through.
#[derive(Component, Debug, Clone)]
pub struct SupplyCrate {
    pub intact: bool,
    pub respawn_secs: f32,
    pub timer: f32,
}

impl SupplyCrate {
    pub fn new(respawn_secs: f32) -> Self {
        Self {
            intact: true,
            respawn_secs,
            timer: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickupKind {
    MaxHp,
    Repair,
    FireRate,
    MoveSpeed,
    AimSpeed,
    Damage,
}

impl PickupKind {
    pub fn random(rng: &mut impl Rng) -> Self {
        match rng.random_range(0..6) {
            0 => PickupKind::MaxHp,
            1 => PickupKind::Repair,
            2 => PickupKind::FireRate,
            3 => PickupKind::MoveSpeed,
            4 => PickupKind::AimSpeed,
            _ => PickupKind::Damage,
        }
    }
}

/// A dropped upgrade waiting on the ground. Despawns untouched once its
/// lifetime runs out.
#[derive(Component, Debug, Clone)]
pub struct Pickup {
    pub kind: PickupKind,
    pub ttl: f32,
}

pub struct PickupPlugin;

impl Plugin for PickupPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(
            FixedUpdate,
            (break_crates, respawn_crates, collect_pickups, expire_pickups)
                .chain()
                .in_set(SimSet::Integration),
        );
    }
}

pub fn spawn_crate(commands: &mut Commands, config: &ArenaConfig, position: Vec2) -> Entity {
    commands
        .spawn((
            SupplyCrate::new(config.crate_respawn_secs),
            SimPosition(position),
            Collider {
                radius: config.crate_radius,
                layer: layers::CRATE,
                mask: layers::NONE,
            },
        ))
        .id()
}

/// A shell hit breaks the crate and, once the first kill has unlocked
/// supply drops, leaves a random pickup in its place.
fn break_crates(
    mut commands: Commands,
    mut hits: MessageReader<CrateHit>,
    level: Res<LevelState>,
    config: Res<ArenaConfig>,
    mut crates: Query<(&SimPosition, &mut SupplyCrate)>,
) {
    for hit in hits.read() {
        let Ok((position, mut supply_crate)) = crates.get_mut(hit.entity) else {
            continue;
        };
        if !supply_crate.intact {
            continue;
        }
        supply_crate.intact = false;
        supply_crate.timer = supply_crate.respawn_secs;
        commands.entity(hit.entity).remove::<Collider>();

        if level.crates_unlocked {
            let kind = PickupKind::random(&mut rand::rng());
            info!("Crate broken at {:?}, dropped {:?}", position.0, kind);
            commands.spawn((
                Pickup {
                    kind,
                    ttl: config.pickup_ttl,
                },
                SimPosition(position.0),
                Collider {
                    radius: config.pickup_radius,
                    layer: layers::PICKUP,
                    mask: layers::NONE,
                },
            ));
        }
    }
}

fn respawn_crates(
    mut commands: Commands,
    time: Res<Time>,
    config: Res<ArenaConfig>,
    mut crates: Query<(Entity, &mut SupplyCrate)>,
) {
    for (entity, mut supply_crate) in crates.iter_mut() {
        if supply_crate.intact {
            continue;
        }
        supply_crate.timer -= time.delta_secs();
        if supply_crate.timer > 0.0 {
            continue;
        }
        supply_crate.intact = true;
        commands.entity(entity).insert(Collider {
            radius: config.crate_radius,
            layer: layers::CRATE,
            mask: layers::NONE,
        });
    }
}

/// Only the player benefits from pickups. Upgrade kinds are rank-capped;
/// a maxed stat consumes the pickup with no effect.
fn collect_pickups(
    mut commands: Commands,
    config: Res<ArenaConfig>,
    pickups: Query<(Entity, &SimPosition, &Pickup, &Collider)>,
    mut players: Query<
        (
            &SimPosition,
            &Collider,
            &Role,
            &mut Health,
            &mut TankBody,
            &mut Turret,
            &mut Weapon,
            &mut UpgradeRanks,
        ),
        Without<Pickup>,
    >,
) {
    for (pickup_entity, pickup_pos, pickup, pickup_collider) in pickups.iter() {
        for (pos, collider, role, mut health, mut body, mut turret, mut weapon, mut ranks) in
            players.iter_mut()
        {
            if !matches!(role, Role::Player) {
                continue;
            }
            let reach = pickup_collider.radius + collider.radius;
            if pos.0.distance_squared(pickup_pos.0) > reach * reach {
                continue;
            }

            apply_pickup(
                pickup.kind,
                &config,
                &mut health,
                &mut body,
                &mut turret,
                &mut weapon,
                &mut ranks,
            );
            commands.entity(pickup_entity).despawn();
            break;
        }
    }
}

fn apply_pickup(
    kind: PickupKind,
    config: &ArenaConfig,
    health: &mut Health,
    body: &mut TankBody,
    turret: &mut Turret,
    weapon: &mut Weapon,
    ranks: &mut UpgradeRanks,
) {
    let cap = config.upgrade_rank_cap;
    match kind {
        PickupKind::MaxHp => {
            health.raise_max(config.hp_upgrade_amount);
        }
        PickupKind::Repair => {
            health.heal(config.hp_upgrade_amount);
        }
        PickupKind::FireRate => {
            if ranks.reload < cap {
                ranks.reload += 1;
                weapon.reload_secs *= config.reload_upgrade_modifier;
            }
        }
        PickupKind::MoveSpeed => {
            if ranks.move_speed < cap {
                ranks.move_speed += 1;
                body.move_speed *= config.move_upgrade_modifier;
                body.turn_speed *= config.turn_upgrade_modifier;
            }
        }
        PickupKind::AimSpeed => {
            if ranks.aim_speed < cap {
                ranks.aim_speed += 1;
                turret.speed *= config.turret_upgrade_modifier;
            }
        }
        PickupKind::Damage => {
            if ranks.damage < cap {
                ranks.damage += 1;
                weapon.damage *= config.damage_upgrade_modifier;
            }
        }
    }
}

fn expire_pickups(
    mut commands: Commands,
    time: Res<Time>,
    mut pickups: Query<(Entity, &mut Pickup)>,
) {
    for (entity, mut pickup) in pickups.iter_mut() {
        pickup.ttl -= time.delta_secs();
        if pickup.ttl <= 0.0 {
            commands.entity(entity).despawn();
        }
    }
}
