use std::time::Duration;

use bevy::prelude::*;

use ironveil::game::combat::{CombatPlugin, Projectile};
use ironveil::game::config::ArenaConfig;
use ironveil::game::enemy::{
    EnemyAi, EnemyAiPlugin, NavGoal, PathRecompute, Perception, StuckDetector,
};
use ironveil::game::level::{LevelPlugin, LevelState};
use ironveil::game::pathfinding::{NavGrid, PathfindingPlugin, PendingPath, PlannedPath, BLOCKED};
use ironveil::game::simulation::{SimHeading, SimPosition, SimulationPlugin};
use ironveil::game::tank::{BodyControl, Role, TankBundle, TankPlugin};

const TICK: f64 = 1.0 / 50.0;

fn test_app(config: ArenaConfig) -> App {
    let mut app = App::new();
    app.add_plugins(MinimalPlugins);
    app.insert_resource(config);
    app.add_plugins((
        SimulationPlugin,
        TankPlugin,
        CombatPlugin,
        PathfindingPlugin,
        EnemyAiPlugin,
        LevelPlugin,
    ));
    // Runs Startup (tick rate, nav grid) without advancing the sim
    app.update();
    app
}

/// Advance exactly one fixed tick. The schedule is run directly, so the
/// generic clock has to be stepped by hand to give systems a real delta.
fn tick(app: &mut App) {
    app.world_mut()
        .resource_mut::<Time>()
        .advance_by(Duration::from_secs_f64(TICK));
    app.world_mut().run_schedule(FixedUpdate);
}

fn run_ticks(app: &mut App, n: usize) {
    for _ in 0..n {
        tick(app);
    }
}

fn spawn_player(app: &mut App, config: &ArenaConfig, position: Vec2) -> Entity {
    app.world_mut()
        .spawn(TankBundle::new(Role::Player, position, 0.0, config))
        .id()
}

fn spawn_enemy(
    app: &mut App,
    config: &ArenaConfig,
    position: Vec2,
    heading: f32,
    player: Entity,
) -> Entity {
    app.world_mut()
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

fn projectile_count(app: &mut App) -> usize {
    app.world_mut()
        .query::<&Projectile>()
        .iter(app.world())
        .count()
}

#[test]
fn visible_target_means_halt_and_fire() {
    let config = ArenaConfig::default();
    let mut app = test_app(config.clone());

    let player = spawn_player(&mut app, &config, Vec2::new(3.0, 0.0));
    let enemy = spawn_enemy(&mut app, &config, Vec2::ZERO, 0.0, player);

    // Enough ticks for the acquisition cadence and the first shot
    run_ticks(&mut app, 10);

    let perception = app.world().get::<Perception>(enemy).unwrap();
    assert_eq!(perception.target, Some(player));
    assert!(perception.target_visible);

    let control = app.world().get::<BodyControl>(enemy).unwrap();
    assert_eq!((control.turn, control.throttle), (0, 0));

    assert!(projectile_count(&mut app) > 0, "enemy never fired");
}

#[test]
fn engaging_a_visible_target_never_trips_stuck() {
    let config = ArenaConfig::default();
    let mut app = test_app(config.clone());

    let player = spawn_player(&mut app, &config, Vec2::new(3.0, 0.0));
    let enemy = spawn_enemy(&mut app, &config, Vec2::ZERO, 0.0, player);

    // Well past the 2 s stuck timeout while deliberately parked to shoot
    run_ticks(&mut app, 150);

    let perception = app.world().get::<Perception>(enemy).unwrap();
    assert!(perception.target_visible);
    let control = app.world().get::<BodyControl>(enemy).unwrap();
    assert_eq!((control.turn, control.throttle), (0, 0));

    let detector = app.world().get::<StuckDetector>(enemy).unwrap();
    assert!(!detector.is_stuck, "halting to fire is not being stuck");
    // Only the handful of ticks before acquisition may have accumulated
    assert!(
        detector.timer < 0.5,
        "the timer must pause while engaging, got {}",
        detector.timer
    );
}

#[test]
fn shots_eventually_wound_the_player() {
    let config = ArenaConfig::default();
    let mut app = test_app(config.clone());

    let player = spawn_player(&mut app, &config, Vec2::new(3.0, 0.0));
    spawn_enemy(&mut app, &config, Vec2::ZERO, 0.0, player);

    // Acquire, fire, and let the shell cover ~2.4 units at 10 u/s
    run_ticks(&mut app, 50);

    let health = app
        .world()
        .get::<ironveil::game::combat::Health>(player)
        .unwrap();
    assert!(
        health.current < health.max,
        "player took no damage: {}/{}",
        health.current,
        health.max
    );
}

#[test]
fn occluded_target_is_chased_along_a_path() {
    let mut config = ArenaConfig::default();
    config.obstacles = vec![ironveil::game::config::ObstacleSpec {
        position: Vec2::new(2.5, 0.0),
        radius: 1.0,
        destructible: false,
    }];
    let mut app = test_app(config.clone());

    // Wall collider so the sight ray actually hits something
    app.world_mut().spawn((
        ironveil::game::simulation::StaticObstacle,
        SimPosition(Vec2::new(2.5, 0.0)),
        ironveil::game::simulation::Collider {
            radius: 1.0,
            layer: ironveil::game::simulation::layers::OBSTACLE,
            mask: ironveil::game::simulation::layers::NONE,
        },
    ));

    let player = spawn_player(&mut app, &config, Vec2::new(4.9, 0.0));
    let enemy = spawn_enemy(&mut app, &config, Vec2::ZERO, 0.0, player);

    // Past the path-recompute cadence plus a tick for the answer
    run_ticks(&mut app, 40);

    let perception = app.world().get::<Perception>(enemy).unwrap();
    assert_eq!(perception.target, Some(player), "player is in range");
    assert!(!perception.target_visible, "wall must block the sight line");
    assert_eq!(projectile_count(&mut app), 0, "must not fire blind");

    assert!(
        app.world().get::<PlannedPath>(enemy).is_some(),
        "no route was planned"
    );

    // Following the detour produces actual displacement
    run_ticks(&mut app, 100);
    let pos = app.world().get::<SimPosition>(enemy).unwrap().0;
    assert!(pos.distance(Vec2::ZERO) > 0.5, "enemy never moved: {pos:?}");
}

#[test]
fn wall_grinding_trips_stuck_recovery() {
    let config = ArenaConfig::default();
    let mut app = test_app(config.clone());

    // Player far outside perception range
    let player = spawn_player(&mut app, &config, Vec2::new(-15.0, 0.0));

    // Enemy pressed against the east map bound with a waypoint beyond it.
    // No PathRecompute, so the doomed route is never replaced.
    let start = Vec2::new(19.5, 0.0);
    let enemy = app
        .world_mut()
        .spawn((
            TankBundle::new(Role::Enemy, start, 0.0, &config),
            EnemyAi,
            NavGoal(player),
            Perception::new(config.perception_range, config.perception_interval),
            StuckDetector::new(config.stuck_timeout, start, 0.0),
            PlannedPath {
                waypoints: [Vec2::new(25.0, 0.0)].into_iter().collect(),
                cursor: 0,
            },
        ))
        .id();

    // The timeout is 2 s; poll because recovery starts the moment it trips
    let mut tripped_at = None;
    for i in 1..=130 {
        tick(&mut app);
        if app.world().get::<StuckDetector>(enemy).unwrap().is_stuck {
            tripped_at = Some(i);
            break;
        }
    }
    let tripped_at = tripped_at.expect("detector never tripped");
    assert!(tripped_at >= 100, "tripped after only {tripped_at} ticks");
    let baseline = app
        .world()
        .get::<StuckDetector>(enemy)
        .unwrap()
        .last_heading;

    // Recovery spins in place at 120 deg/s, so 30 degrees takes ~13 ticks
    let mut ticks_to_exit = 0;
    for _ in 0..40 {
        tick(&mut app);
        ticks_to_exit += 1;
        if !app.world().get::<StuckDetector>(enemy).unwrap().is_stuck {
            break;
        }
    }
    let detector = app.world().get::<StuckDetector>(enemy).unwrap();
    assert!(!detector.is_stuck, "recovery never completed");
    assert!(ticks_to_exit >= 5, "exited suspiciously fast");

    // On exit the baseline heading is re-captured at the recovered heading
    let turned = (detector.last_heading - baseline).abs();
    assert!(
        turned >= 30.0_f32.to_radians() - 1e-3,
        "only turned {turned} rad"
    );
    let heading = app.world().get::<SimHeading>(enemy).unwrap().0;
    assert!(heading.abs() > 0.1, "hull never actually rotated");
}

#[test]
fn failed_path_search_keeps_the_old_route() {
    let config = ArenaConfig::default();
    let mut app = test_app(config.clone());

    // Player out of perception range, and standing on cells we block below
    let player = spawn_player(&mut app, &config, Vec2::new(10.0, 10.0));
    let enemy = spawn_enemy(&mut app, &config, Vec2::ZERO, 0.0, player);

    {
        let mut grid = app.world_mut().resource_mut::<NavGrid>();
        grid.stamp_circle(Vec2::new(10.0, 10.0), 1.5, BLOCKED);
    }

    let stale_route = PlannedPath {
        waypoints: [Vec2::new(-8.0, 0.0)].into_iter().collect(),
        cursor: 0,
    };
    app.world_mut()
        .entity_mut(enemy)
        .insert(stale_route.clone());

    // Request fires at 0.5 s and is answered the following tick
    run_ticks(&mut app, 40);

    assert!(
        app.world().get::<PendingPath>(enemy).is_none(),
        "completion must clear the in-flight marker even on failure"
    );
    let path = app.world().get::<PlannedPath>(enemy).unwrap();
    assert_eq!(
        path.waypoints.as_slice(),
        stale_route.waypoints.as_slice(),
        "failed search must not clobber the old route"
    );
}

#[test]
fn game_over_silences_the_arbiter() {
    let config = ArenaConfig::default();
    let mut app = test_app(config.clone());

    let player = spawn_player(&mut app, &config, Vec2::new(3.0, 0.0));
    let enemy = spawn_enemy(&mut app, &config, Vec2::ZERO, 0.0, player);

    app.world_mut().resource_mut::<LevelState>().game_over = true;

    run_ticks(&mut app, 30);

    assert_eq!(projectile_count(&mut app), 0, "fired after game over");
    let control = app.world().get::<BodyControl>(enemy).unwrap();
    assert_eq!((control.turn, control.throttle), (0, 0));
    let velocity = app
        .world()
        .get::<ironveil::game::simulation::SimVelocity>(enemy)
        .unwrap();
    assert_eq!(velocity.0, Vec2::ZERO);
}

#[test]
fn despawned_requester_completion_is_a_no_op() {
    let config = ArenaConfig::default();
    let mut app = test_app(config.clone());

    let player = spawn_player(&mut app, &config, Vec2::new(10.0, 10.0));
    let enemy = spawn_enemy(&mut app, &config, Vec2::ZERO, 0.0, player);

    // Let the request go out, then kill the agent before the answer lands
    run_ticks(&mut app, 25);
    assert!(app.world().get::<PendingPath>(enemy).is_some());
    app.world_mut().entity_mut(enemy).despawn();

    // Must not panic or spawn anything for the dead entity
    run_ticks(&mut app, 5);
    assert!(app.world().get_entity(enemy).is_err());
}
