pub mod navigator;
pub mod perception;
pub mod stuck;

use bevy::prelude::*;

use crate::game::config::ArenaConfig;
use crate::game::level::LevelState;
use crate::game::pathfinding::{PathRequest, PendingPath, PlannedPath};
use crate::game::simulation::{SimHeading, SimPosition, SimSet};
use crate::game::tank::{AimTurretCommand, BodySteeringCommand, FireCommand};

pub use perception::Perception;
pub use stuck::StuckDetector;

/// Marker for tanks driven by the built-in AI.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct EnemyAi;

/// The entity this agent navigates toward when it cannot see its target.
#[derive(Component, Debug, Clone, Copy)]
pub struct NavGoal(pub Entity);

/// Per-agent cadence for route recomputation, independent of the perception
/// cadence so the path service is not hammered every tick.
#[derive(Component, Debug, Clone)]
pub struct PathRecompute {
    pub interval: f32,
    pub timer: f32,
}

impl PathRecompute {
    pub fn new(interval: f32) -> Self {
        Self {
            interval,
            timer: 0.0,
        }
    }
}

pub struct EnemyAiPlugin;

impl Plugin for EnemyAiPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(
            FixedUpdate,
            (
                perception::update_perception,
                update_stuck_detectors,
                request_paths,
                enemy_decision_tick,
            )
                .chain()
                .in_set(SimSet::Decision),
        );
    }
}

/// The detector only watches ticks where route-following should be moving
/// the tank. An agent halted to engage a visible target (or frozen by game
/// over) is standing still on purpose, so its timer pauses.
fn update_stuck_detectors(
    time: Res<Time>,
    config: Res<ArenaConfig>,
    level: Res<LevelState>,
    mut detectors: Query<
        (&SimPosition, &SimHeading, &Perception, &mut StuckDetector),
        With<EnemyAi>,
    >,
) {
    if level.game_over {
        return;
    }
    let exit_angle = config.stuck_exit_deg.to_radians();
    for (position, heading, perception, mut detector) in detectors.iter_mut() {
        if perception.target_visible {
            continue;
        }
        detector.tick(
            position.0,
            heading.0,
            time.delta_secs(),
            config.stuck_displacement,
            exit_angle,
        );
    }
}

/// Issue a route request for each agent whose recompute timer has elapsed,
/// at most one in flight per agent. Requests stop when the match is over.
fn request_paths(
    mut commands: Commands,
    time: Res<Time>,
    level: Res<LevelState>,
    mut requests: MessageWriter<PathRequest>,
    mut agents: Query<
        (Entity, &SimPosition, &NavGoal, &mut PathRecompute, Has<PendingPath>),
        With<EnemyAi>,
    >,
    positions: Query<&SimPosition>,
) {
    if level.game_over {
        return;
    }

    for (entity, position, goal, mut recompute, pending) in agents.iter_mut() {
        recompute.timer += time.delta_secs();
        if recompute.timer < recompute.interval || pending {
            continue;
        }
        let Ok(goal_position) = positions.get(goal.0) else {
            continue;
        };
        recompute.timer = 0.0;
        commands.entity(entity).insert(PendingPath);
        requests.write(PathRequest {
            entity,
            start: position.0,
            goal: goal_position.0,
        });
    }
}

/// One decision per agent per tick. Game over silences everything except a
/// final stop command; a visible target means halt and shoot; otherwise the
/// agent either grinds through stuck recovery or follows its route.
fn enemy_decision_tick(
    config: Res<ArenaConfig>,
    level: Res<LevelState>,
    mut agents: Query<
        (
            Entity,
            &SimPosition,
            &SimHeading,
            &Perception,
            &StuckDetector,
            Option<&mut PlannedPath>,
            Has<NavGoal>,
        ),
        With<EnemyAi>,
    >,
    positions: Query<&SimPosition>,
    mut steering: MessageWriter<BodySteeringCommand>,
    mut aim: MessageWriter<AimTurretCommand>,
    mut fire: MessageWriter<FireCommand>,
) {
    for (entity, position, heading, perception, detector, path, has_goal) in agents.iter_mut() {
        if level.game_over {
            steering.write(BodySteeringCommand {
                entity,
                turn: 0,
                throttle: 0,
            });
            continue;
        }

        if let Some(target) = perception.target {
            if let Ok(target_position) = positions.get(target) {
                aim.write(AimTurretCommand {
                    entity,
                    target: target_position.0,
                });
            }
        }

        if perception.target_visible {
            steering.write(BodySteeringCommand {
                entity,
                turn: 0,
                throttle: 0,
            });
            fire.write(FireCommand { entity });
            continue;
        }

        let (turn, throttle) = if detector.is_stuck {
            // Rotate in place until the detector sees enough heading change
            (-1, 0)
        } else {
            // Navigation needs both a route and a goal to follow it toward
            match path {
                Some(mut path) if has_goal => navigator::steer_along_path(
                    position.0,
                    heading.forward(),
                    &mut path,
                    config.waypoint_radius,
                    config.alignment_dot,
                ),
                _ => (0, 0),
            }
        };

        steering.write(BodySteeringCommand {
            entity,
            turn,
            throttle,
        });
    }
}
