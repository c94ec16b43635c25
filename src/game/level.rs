use bevy::prelude::*;
use rand::Rng;

use crate::game::combat::TankDestroyed;
use crate::game::config::{ArenaConfig, Facing};
use crate::game::enemy::{EnemyAi, NavGoal, PathRecompute, Perception, StuckDetector};
use crate::game::simulation::SimSet;
use crate::game::tank::{Role, TankBundle};

/// Match-wide state. Once `game_over` flips it never flips back; the sim
/// keeps ticking but decisions and spawning stop.
#[derive(Resource, Debug, Clone, Default)]
pub struct LevelState {
    pub game_over: bool,
    pub score: u32,
    pub enemies_alive: u32,
    pub enemies_queued: u32,
    pub crates_unlocked: bool,
}

/// A fixed location that produces enemy tanks. Each queued spawn waits out
/// the delay before the tank appears.
#[derive(Component, Debug, Clone)]
pub struct SpawnPoint {
    pub position: Vec2,
    pub facing: Facing,
    pub queued: u32,
    pub timer: f32,
}

impl SpawnPoint {
    pub fn new(position: Vec2, facing: Facing) -> Self {
        Self {
            position,
            facing,
            queued: 0,
            timer: 0.0,
        }
    }
}

pub struct LevelPlugin;

impl Plugin for LevelPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<LevelState>();
        app.add_systems(
            FixedUpdate,
            (process_destroyed_tanks, tick_spawn_points)
                .chain()
                .in_set(SimSet::Integration),
        );
    }
}

/// Score kills, escalate the wave, and end the match on player death. Each
/// enemy kill queues replacements at random spawn points, capped by the
/// total population limit.
fn process_destroyed_tanks(
    mut destroyed: MessageReader<TankDestroyed>,
    mut level: ResMut<LevelState>,
    config: Res<ArenaConfig>,
    mut spawn_points: Query<&mut SpawnPoint>,
) {
    for msg in destroyed.read() {
        match msg.role {
            Role::Player => {
                if !level.game_over {
                    level.game_over = true;
                    info!("Player destroyed, match over at score {}", level.score);
                }
            }
            Role::Enemy => {
                level.enemies_alive = level.enemies_alive.saturating_sub(1);
                if level.game_over {
                    continue;
                }
                level.score += 1;
                if !level.crates_unlocked {
                    level.crates_unlocked = true;
                }

                let mut points: Vec<Mut<SpawnPoint>> = spawn_points.iter_mut().collect();
                if points.is_empty() {
                    continue;
                }
                let mut rng = rand::rng();
                for _ in 0..config.spawns_per_kill {
                    let population = (level.enemies_alive + level.enemies_queued) as usize;
                    if population >= config.enemy_cap {
                        break;
                    }
                    let index = rng.random_range(0..points.len());
                    let point = &mut points[index];
                    point.queued += 1;
                    if point.queued == 1 {
                        point.timer = config.spawn_delay;
                    }
                    level.enemies_queued += 1;
                }
            }
        }
    }
}

fn tick_spawn_points(
    mut commands: Commands,
    time: Res<Time>,
    config: Res<ArenaConfig>,
    mut level: ResMut<LevelState>,
    mut spawn_points: Query<&mut SpawnPoint>,
    players: Query<(Entity, &Role)>,
) {
    if level.game_over {
        return;
    }
    let Some(player) = players
        .iter()
        .find(|(_, role)| matches!(role, Role::Player))
        .map(|(entity, _)| entity)
    else {
        return;
    };

    for mut point in spawn_points.iter_mut() {
        if point.queued == 0 {
            continue;
        }
        point.timer -= time.delta_secs();
        if point.timer > 0.0 {
            continue;
        }
        point.queued -= 1;
        point.timer = config.spawn_delay;
        level.enemies_queued = level.enemies_queued.saturating_sub(1);
        level.enemies_alive += 1;
        spawn_enemy(&mut commands, &config, point.position, point.facing, player);
    }
}

pub fn spawn_enemy(
    commands: &mut Commands,
    config: &ArenaConfig,
    position: Vec2,
    facing: Facing,
    player: Entity,
) -> Entity {
    let heading = facing.angle();
    commands
        .spawn((
            TankBundle::new(Role::Enemy, position, heading, config),
            EnemyAi,
            NavGoal(player),
            Perception::new(config.perception_range, config.perception_interval),
            StuckDetector::new(config.stuck_timeout, position, heading),
            PathRecompute::new(config.path_interval),
        ))
        .id()
}
