pub mod combat;
pub mod config;
pub mod enemy;
pub mod level;
pub mod pathfinding;
pub mod pickup;
pub mod simulation;
pub mod tank;

use bevy::prelude::*;

use crate::game::combat::{CombatPlugin, Health};
use crate::game::config::{ArenaConfig, ConfigPlugin};
use crate::game::enemy::EnemyAiPlugin;
use crate::game::level::{LevelPlugin, LevelState, SpawnPoint};
use crate::game::pathfinding::PathfindingPlugin;
use crate::game::pickup::{spawn_crate, PickupPlugin};
use crate::game::simulation::{layers, Collider, SimPosition, SimulationPlugin, StaticObstacle};
use crate::game::tank::{Role, TankBundle, TankPlugin};

pub struct GamePlugin;

impl Plugin for GamePlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins((
            ConfigPlugin,
            SimulationPlugin,
            TankPlugin,
            CombatPlugin,
            PathfindingPlugin,
            EnemyAiPlugin,
            LevelPlugin,
            PickupPlugin,
        ));
        app.add_systems(Startup, setup_arena);
    }
}

/// Populate the arena from config: the player tank, obstacles, supply
/// crates, and spawn points with one enemy queued at each.
pub fn setup_arena(
    mut commands: Commands,
    config: Res<ArenaConfig>,
    mut level: ResMut<LevelState>,
) {
    commands.spawn(TankBundle::new(
        Role::Player,
        config.player_start,
        0.0,
        &config,
    ));

    for obstacle in &config.obstacles {
        let mut entity = commands.spawn((
            StaticObstacle,
            SimPosition(obstacle.position),
            Collider {
                radius: obstacle.radius,
                layer: layers::OBSTACLE,
                mask: layers::NONE,
            },
        ));
        if obstacle.destructible {
            entity.insert(Health::new(config.enemy_hp, config.hp_cap));
        }
    }

    for position in &config.crates {
        spawn_crate(&mut commands, &config, *position);
    }

    for spec in &config.spawn_points {
        let mut point = SpawnPoint::new(spec.position, spec.facing);
        point.queued = 1;
        point.timer = config.spawn_delay;
        level.enemies_queued += 1;
        commands.spawn(point);
    }

    info!(
        "Arena ready: {} obstacles, {} crates, {} spawn points",
        config.obstacles.len(),
        config.crates.len(),
        config.spawn_points.len()
    );
}
