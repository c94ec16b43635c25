use bevy::prelude::*;
use serde::{Deserialize, Serialize};

/// Static configuration loaded once at startup. Everything that tunes the
/// simulation lives here so that gameplay code never hard-codes a balance
/// value. Changing these mid-game is not supported.
#[derive(Resource, Deserialize, Serialize, Clone, Debug)]
pub struct ArenaConfig {
    // Simulation
    pub tick_rate: f64,
    pub map_width: f32,
    pub map_height: f32,

    // Tank body & turret
    pub tank_radius: f32,
    pub move_speed: f32,
    pub turn_speed_deg: f32,
    pub turret_speed_deg: f32,
    pub reload_secs: f32,
    pub muzzle_offset: f32,

    // Health & damage
    pub player_hp: f32,
    pub enemy_hp: f32,
    pub hp_cap: f32,
    pub damage: f32,
    pub projectile_speed: f32,
    pub projectile_range: f32,
    pub projectile_radius: f32,

    // Enemy AI
    pub perception_range: f32,
    pub perception_interval: f32,
    pub path_interval: f32,
    pub waypoint_radius: f32,
    pub alignment_dot: f32,
    pub stuck_timeout: f32,
    pub stuck_displacement: f32,
    pub stuck_exit_deg: f32,

    // Spawning & waves
    pub enemy_cap: usize,
    pub spawn_delay: f32,
    pub spawns_per_kill: usize,

    // Crates & pickups
    pub crate_respawn_secs: f32,
    pub crate_radius: f32,
    pub pickup_ttl: f32,
    pub pickup_radius: f32,

    // Upgrades
    pub upgrade_rank_cap: u8,
    pub hp_upgrade_amount: f32,
    pub reload_upgrade_modifier: f32,
    pub move_upgrade_modifier: f32,
    pub turn_upgrade_modifier: f32,
    pub turret_upgrade_modifier: f32,
    pub damage_upgrade_modifier: f32,

    // Pathfinding grid
    pub nav_cell_size: f32,

    // Arena layout
    pub player_start: Vec2,
    pub obstacles: Vec<ObstacleSpec>,
    pub spawn_points: Vec<SpawnSpec>,
    pub crates: Vec<Vec2>,
}

/// A circular obstacle in the arena layout. Destructible obstacles carry
/// health and are removed from the nav grid when destroyed.
#[derive(Deserialize, Serialize, Clone, Copy, Debug)]
pub struct ObstacleSpec {
    pub position: Vec2,
    pub radius: f32,
    pub destructible: bool,
}

/// Compass direction a freshly spawned tank faces.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Facing {
    North,
    South,
    East,
    West,
}

impl Facing {
    /// Heading angle in radians (x east, y north).
    pub fn angle(self) -> f32 {
        match self {
            Facing::East => 0.0,
            Facing::North => std::f32::consts::FRAC_PI_2,
            Facing::West => std::f32::consts::PI,
            Facing::South => -std::f32::consts::FRAC_PI_2,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug)]
pub struct SpawnSpec {
    pub position: Vec2,
    pub facing: Facing,
}

pub struct ConfigPlugin;

impl Plugin for ConfigPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(PreStartup, load_config);
    }
}

/// Load the arena configuration synchronously at startup. This must complete
/// before any system that reads `ArenaConfig`.
fn load_config(mut commands: Commands) {
    let path = "assets/arena_config.ron";

    match std::fs::read_to_string(path) {
        Ok(contents) => match ron::from_str::<ArenaConfig>(&contents) {
            Ok(config) => {
                info!("Loaded arena config from {}", path);
                commands.insert_resource(config);
            }
            Err(e) => {
                error!("Failed to parse arena config: {}", e);
                error!("Using default ArenaConfig");
                commands.insert_resource(ArenaConfig::default());
            }
        },
        Err(e) => {
            error!("Failed to read {}: {}", path, e);
            error!("Using default ArenaConfig");
            commands.insert_resource(ArenaConfig::default());
        }
    }
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            tick_rate: 50.0,
            map_width: 40.0,
            map_height: 40.0,
            tank_radius: 0.45,
            move_speed: 3.0,
            turn_speed_deg: 120.0,
            turret_speed_deg: 180.0,
            reload_secs: 1.5,
            muzzle_offset: 0.6,
            player_hp: 100.0,
            enemy_hp: 40.0,
            hp_cap: 200.0,
            damage: 10.0,
            projectile_speed: 10.0,
            projectile_range: 6.0,
            projectile_radius: 0.1,
            perception_range: 5.0,
            perception_interval: 0.1,
            path_interval: 0.5,
            waypoint_radius: 0.5,
            alignment_dot: 0.98,
            stuck_timeout: 2.0,
            stuck_displacement: 0.25,
            stuck_exit_deg: 30.0,
            enemy_cap: 10,
            spawn_delay: 2.0,
            spawns_per_kill: 2,
            crate_respawn_secs: 15.0,
            crate_radius: 0.5,
            pickup_ttl: 10.0,
            pickup_radius: 0.4,
            upgrade_rank_cap: 5,
            hp_upgrade_amount: 25.0,
            reload_upgrade_modifier: 0.87,
            move_upgrade_modifier: 1.1,
            turn_upgrade_modifier: 1.1,
            turret_upgrade_modifier: 1.1,
            damage_upgrade_modifier: 1.2,
            nav_cell_size: 0.5,
            player_start: Vec2::ZERO,
            obstacles: vec![
                ObstacleSpec { position: Vec2::new(5.0, 5.0), radius: 1.5, destructible: false },
                ObstacleSpec { position: Vec2::new(-6.0, 4.0), radius: 1.2, destructible: false },
                ObstacleSpec { position: Vec2::new(4.0, -6.0), radius: 1.0, destructible: true },
                ObstacleSpec { position: Vec2::new(-5.0, -5.0), radius: 1.5, destructible: false },
            ],
            spawn_points: vec![
                SpawnSpec { position: Vec2::new(-16.0, 16.0), facing: Facing::South },
                SpawnSpec { position: Vec2::new(16.0, 16.0), facing: Facing::South },
                SpawnSpec { position: Vec2::new(-16.0, -16.0), facing: Facing::North },
                SpawnSpec { position: Vec2::new(16.0, -16.0), facing: Facing::North },
            ],
            crates: vec![Vec2::new(0.0, 8.0), Vec2::new(0.0, -8.0)],
        }
    }
}
