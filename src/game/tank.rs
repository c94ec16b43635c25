use bevy::prelude::*;

use crate::game::combat::{Health, Projectile};
use crate::game::config::ArenaConfig;
use crate::game::simulation::{
    layers, wrap_angle, Collider, SimHeading, SimPosition, SimPositionPrev, SimSet, SimVelocity,
};

/// Whether a tank is driven by a human or by the enemy AI. Set once at spawn
/// so no system ever has to probe for marker components to classify a tank.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Player,
    Enemy,
}

// ============================================================================
// Commands (the actuation sink's inbound contract)
// ============================================================================

/// Body steering for one tank: `turn` in {-1, 0, 1} (-1 = counter-clockwise),
/// `throttle` in {0, 1}. The last command received in a tick wins.
#[derive(Event, Message, Debug, Clone, Copy)]
pub struct BodySteeringCommand {
    pub entity: Entity,
    pub turn: i8,
    pub throttle: i8,
}

/// Point the turret at a world position. Aim is independent of body movement.
#[derive(Event, Message, Debug, Clone, Copy)]
pub struct AimTurretCommand {
    pub entity: Entity,
    pub target: Vec2,
}

/// Request a shot. Ignored while the weapon is reloading.
#[derive(Event, Message, Debug, Clone, Copy)]
pub struct FireCommand {
    pub entity: Entity,
}

// ============================================================================
// Components
// ============================================================================

/// Drive characteristics of a tank hull.
#[derive(Component, Debug, Clone, Copy)]
pub struct TankBody {
    pub move_speed: f32,
    /// Radians per second.
    pub turn_speed: f32,
}

/// Latched steering state, refreshed from commands each tick and applied
/// during the physics step.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct BodyControl {
    pub turn: i8,
    pub throttle: i8,
}

/// Turret on top of the hull, rotating independently of the body.
#[derive(Component, Debug, Clone, Copy)]
pub struct Turret {
    /// Radians per second.
    pub speed: f32,
    /// Absolute turret heading in radians.
    pub heading: f32,
    pub muzzle_offset: f32,
}

impl Turret {
    pub fn forward(&self) -> Vec2 {
        Vec2::from_angle(self.heading)
    }
}

/// Latched aim target, refreshed from commands.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct TurretControl {
    pub aim_at: Option<Vec2>,
}

/// Gun stats plus the live reload countdown.
#[derive(Component, Debug, Clone, Copy)]
pub struct Weapon {
    pub damage: f32,
    pub reload_secs: f32,
    pub cooldown: f32,
    pub projectile_speed: f32,
    pub projectile_range: f32,
}

impl Weapon {
    pub fn ready(&self) -> bool {
        self.cooldown <= 0.0
    }
}

/// Upgrade progression, mutated by pickups. Enemies keep rank 1 forever.
#[derive(Component, Debug, Clone, Copy)]
pub struct UpgradeRanks {
    pub reload: u8,
    pub move_speed: u8,
    pub aim_speed: u8,
    pub damage: u8,
}

impl Default for UpgradeRanks {
    fn default() -> Self {
        Self {
            reload: 1,
            move_speed: 1,
            aim_speed: 1,
            damage: 1,
        }
    }
}

/// Everything a drivable tank needs besides its role-specific parts.
#[derive(Bundle)]
pub struct TankBundle {
    pub role: Role,
    pub position: SimPosition,
    pub position_prev: SimPositionPrev,
    pub velocity: SimVelocity,
    pub heading: SimHeading,
    pub collider: Collider,
    pub body: TankBody,
    pub body_control: BodyControl,
    pub turret: Turret,
    pub turret_control: TurretControl,
    pub weapon: Weapon,
    pub health: Health,
    pub ranks: UpgradeRanks,
}

impl TankBundle {
    pub fn new(role: Role, position: Vec2, heading: f32, config: &ArenaConfig) -> Self {
        let hp = match role {
            Role::Player => config.player_hp,
            Role::Enemy => config.enemy_hp,
        };
        Self {
            role,
            position: SimPosition(position),
            position_prev: SimPositionPrev(position),
            velocity: SimVelocity::default(),
            heading: SimHeading(heading),
            collider: Collider {
                radius: config.tank_radius,
                layer: layers::TANK,
                mask: layers::TANK | layers::OBSTACLE,
            },
            body: TankBody {
                move_speed: config.move_speed,
                turn_speed: config.turn_speed_deg.to_radians(),
            },
            body_control: BodyControl::default(),
            turret: Turret {
                speed: config.turret_speed_deg.to_radians(),
                heading,
                muzzle_offset: config.muzzle_offset,
            },
            turret_control: TurretControl::default(),
            weapon: Weapon {
                damage: config.damage,
                reload_secs: config.reload_secs,
                cooldown: 0.0,
                projectile_speed: config.projectile_speed,
                projectile_range: config.projectile_range,
            },
            health: Health::new(hp, config.hp_cap),
            ranks: UpgradeRanks::default(),
        }
    }
}

// ============================================================================
// Plugin & systems
// ============================================================================

pub struct TankPlugin;

impl Plugin for TankPlugin {
    fn build(&self, app: &mut App) {
        app.add_message::<BodySteeringCommand>();
        app.add_message::<AimTurretCommand>();
        app.add_message::<FireCommand>();

        app.add_systems(
            FixedUpdate,
            (
                (latch_steering_commands, tick_reload, fire_weapons)
                    .chain()
                    .in_set(SimSet::Actuation),
                (drive_tank_bodies, rotate_turrets).in_set(SimSet::Physics),
            ),
        );
    }
}

/// Fold this tick's command messages into per-tank control state.
fn latch_steering_commands(
    mut steering: MessageReader<BodySteeringCommand>,
    mut aim: MessageReader<AimTurretCommand>,
    mut bodies: Query<&mut BodyControl>,
    mut turrets: Query<&mut TurretControl>,
) {
    for cmd in steering.read() {
        if let Ok(mut control) = bodies.get_mut(cmd.entity) {
            control.turn = cmd.turn.clamp(-1, 1);
            control.throttle = cmd.throttle.clamp(0, 1);
        }
    }
    for cmd in aim.read() {
        if let Ok(mut control) = turrets.get_mut(cmd.entity) {
            control.aim_at = Some(cmd.target);
        }
    }
}

fn tick_reload(time: Res<Time>, mut weapons: Query<&mut Weapon>) {
    let delta = time.delta_secs();
    for mut weapon in weapons.iter_mut() {
        if weapon.cooldown > 0.0 {
            weapon.cooldown -= delta;
        }
    }
}

/// Spawn a projectile for every fire command whose weapon is loaded. The
/// shooter is recorded on the projectile so it never hits its own hull.
fn fire_weapons(
    mut commands: Commands,
    config: Res<ArenaConfig>,
    mut fire: MessageReader<FireCommand>,
    mut tanks: Query<(&SimPosition, &Turret, &mut Weapon)>,
) {
    for cmd in fire.read() {
        let Ok((pos, turret, mut weapon)) = tanks.get_mut(cmd.entity) else {
            continue;
        };
        if !weapon.ready() {
            continue;
        }
        weapon.cooldown = weapon.reload_secs;

        let dir = turret.forward();
        let spawn_pos = pos.0 + dir * turret.muzzle_offset;
        commands.spawn((
            Projectile {
                damage: weapon.damage,
                range: weapon.projectile_range,
                origin: spawn_pos,
                shooter: cmd.entity,
            },
            SimPosition(spawn_pos),
            SimPositionPrev(spawn_pos),
            SimVelocity(dir * weapon.projectile_speed),
            Collider {
                radius: config.projectile_radius,
                layer: layers::PROJECTILE,
                mask: layers::TANK | layers::OBSTACLE | layers::CRATE,
            },
        ));
    }
}

/// Convert latched steering into velocity and heading changes. Runs in the
/// physics step, strictly after all decision systems for the tick.
fn drive_tank_bodies(
    time: Res<Time>,
    mut tanks: Query<(&TankBody, &BodyControl, &mut SimHeading, &mut SimVelocity)>,
) {
    let delta = time.delta_secs();
    for (body, control, mut heading, mut velocity) in tanks.iter_mut() {
        // turn = -1 rotates counter-clockwise
        heading.0 = wrap_angle(heading.0 + -(control.turn as f32) * body.turn_speed * delta);
        velocity.0 = heading.forward() * (control.throttle as f32) * body.move_speed;
    }
}

/// Rotate each turret toward its aim point with a clamped angular step.
fn rotate_turrets(
    time: Res<Time>,
    mut turrets: Query<(&SimPosition, &TurretControl, &mut Turret)>,
) {
    let delta = time.delta_secs();
    for (pos, control, mut turret) in turrets.iter_mut() {
        let Some(target) = control.aim_at else {
            continue;
        };
        let to_target = target - pos.0;
        if to_target.length_squared() < 1e-6 {
            continue;
        }

        let desired = to_target.y.atan2(to_target.x);
        let diff = wrap_angle(desired - turret.heading);
        let step = turret.speed * delta;
        if diff.abs() <= step {
            turret.heading = desired;
        } else {
            turret.heading = wrap_angle(turret.heading + step.copysign(diff));
        }
    }
}
