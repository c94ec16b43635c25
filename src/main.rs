use std::fs;
use std::path::PathBuf;

use bevy::app::AppExit;
use bevy::prelude::*;

use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ironveil::game::level::LevelState;
use ironveil::game::GamePlugin;

fn setup_file_logging() -> String {
    let log_dir = PathBuf::from("logs");
    if !log_dir.exists() {
        if let Err(err) = fs::create_dir_all(&log_dir) {
            eprintln!("Failed to create logs directory: {err}");
        }
    }

    cleanup_old_logs(&log_dir, 25);

    let now = chrono::Local::now();
    let log_filename = format!("ironveil_{}.log", now.format("%Y%m%d_%H%M%S"));
    let log_file_path = log_dir.join(&log_filename);
    let log_path_str = log_file_path.to_string_lossy().to_string();

    // One file per run, no rotation mid-session
    let file_appender = RollingFileAppender::new(Rotation::NEVER, &log_dir, &log_filename);

    let file_layer = fmt::layer().with_writer(file_appender).with_ansi(false);
    let stdout_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(false);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("bevy_ecs=info,ironveil=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();

    log_path_str
}

fn cleanup_old_logs(log_dir: &PathBuf, keep_count: usize) {
    if let Ok(entries) = fs::read_dir(log_dir) {
        let mut log_files: Vec<_> = entries
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(|s| s.starts_with("ironveil") && s.ends_with(".log"))
                    .unwrap_or(false)
            })
            .collect();

        log_files.sort_by_key(|e| e.metadata().ok().and_then(|m| m.modified().ok()));

        if log_files.len() > keep_count {
            for file in log_files.iter().take(log_files.len() - keep_count) {
                let _ = fs::remove_file(file.path());
            }
        }
    }
}

/// How long the runner keeps ticking after the match ends, so shells still
/// in flight get to land before the process exits.
const EXIT_GRACE_SECS: f32 = 1.0;

/// Headless runner: once the player is destroyed, let the sim settle for a
/// moment and quit.
fn exit_when_over(
    time: Res<Time>,
    level: Res<LevelState>,
    mut grace: Local<f32>,
    mut exit: MessageWriter<AppExit>,
) {
    if !level.game_over {
        return;
    }
    *grace += time.delta_secs();
    if *grace >= EXIT_GRACE_SECS {
        exit.write(AppExit::Success);
    }
}

fn main() {
    let log_file = setup_file_logging();
    println!("Ironveil arena - logging to {log_file}");

    App::new()
        .add_plugins(MinimalPlugins)
        .add_plugins(GamePlugin)
        .add_systems(Update, exit_when_over)
        .run();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn exit_waits_out_the_grace_period() {
        let mut app = App::new();
        app.init_resource::<Time>();
        app.init_resource::<LevelState>();
        app.add_message::<AppExit>();
        app.add_systems(Update, exit_when_over);

        app.world_mut().resource_mut::<LevelState>().game_over = true;

        let step = Duration::from_secs_f64(0.25);
        for _ in 0..3 {
            app.world_mut().resource_mut::<Time>().advance_by(step);
            app.world_mut().run_schedule(Update);
        }
        assert!(
            app.world().resource::<Messages<AppExit>>().is_empty(),
            "quit before the grace period elapsed"
        );

        app.world_mut().resource_mut::<Time>().advance_by(step);
        app.world_mut().run_schedule(Update);
        assert!(!app.world().resource::<Messages<AppExit>>().is_empty());
    }
}
