//! tracing subscriber setup: stderr plus a daily-rolling log file

use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_FILE_BASENAME: &str = "sim-recorder.log";
const LOG_DIR_ENV: &str = "SIM_RECORDER_LOG_PATH";
const LOG_RETENTION_DAYS: u64 = 7;

/// Subsystem for macOS unified logging (os_log)
#[cfg(target_os = "macos")]
const OSLOG_SUBSYSTEM: &str = "dev.sim-recorder.recorder";

/// Get the log directory path
pub fn get_log_dir() -> Result<PathBuf> {
    resolve_log_dir()
}

/// Install the global subscriber. Keep the guard alive until exit so
/// buffered file output is flushed.
pub fn init_logging() -> Result<WorkerGuard> {
    let log_dir = resolve_log_dir()?;
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory: {:?}", log_dir))?;

    prune_old_logs(
        &log_dir,
        Duration::from_secs(60 * 60 * 24 * LOG_RETENTION_DAYS),
    );

    let file_appender = tracing_appender::rolling::daily(&log_dir, LOG_FILE_BASENAME);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false);

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    #[cfg(target_os = "macos")]
    {
        // Logs also appear in Console.app under the subsystem
        let oslog_layer = tracing_oslog::OsLogger::new(OSLOG_SUBSYSTEM, "default");

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .with(oslog_layer)
            .try_init()
            .context("Failed to install tracing subscriber")?;
    }

    #[cfg(not(target_os = "macos"))]
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .try_init()
            .context("Failed to install tracing subscriber")?;
    }

    Ok(guard)
}

fn resolve_log_dir() -> Result<PathBuf> {
    if let Ok(override_path) = std::env::var(LOG_DIR_ENV) {
        return Ok(PathBuf::from(override_path));
    }

    let proj_dirs = ProjectDirs::from("dev", "sim-recorder", "recorder")
        .context("Failed to determine project directories for log path")?;

    #[cfg(target_os = "linux")]
    {
        let base = proj_dirs
            .state_dir()
            .unwrap_or_else(|| proj_dirs.data_local_dir());
        Ok(base.join("logs"))
    }

    #[cfg(not(target_os = "linux"))]
    {
        Ok(proj_dirs.data_local_dir().join("logs"))
    }
}

fn prune_old_logs(log_dir: &Path, max_age: Duration) {
    let Ok(entries) = std::fs::read_dir(log_dir) else {
        return;
    };

    let Some(cutoff) = SystemTime::now().checked_sub(max_age) else {
        return;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };

        if !file_name.starts_with(LOG_FILE_BASENAME) {
            continue;
        }

        let Ok(modified) = entry.metadata().and_then(|m| m.modified()) else {
            continue;
        };

        if modified < cutoff {
            let _ = std::fs::remove_file(&path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prune_keeps_recent_and_foreign_files() {
        let tmp = tempfile::tempdir().unwrap();
        let recent = tmp.path().join(format!("{}.2024-03-05", LOG_FILE_BASENAME));
        let foreign = tmp.path().join("other.log");
        std::fs::write(&recent, b"recent").unwrap();
        std::fs::write(&foreign, b"other").unwrap();

        prune_old_logs(tmp.path(), Duration::from_secs(3600));
        assert!(recent.exists());
        assert!(foreign.exists());

        // Zero max age: every matching file is older than the cutoff
        std::thread::sleep(Duration::from_millis(20));
        prune_old_logs(tmp.path(), Duration::ZERO);
        assert!(!recent.exists());
        assert!(foreign.exists());
    }
}
