use crate::config::LoggingConfig;
use crate::error::TnsError;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Once;
use std::time::Duration;
use tokio::time;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

static INIT: Once = Once::new();
const LOG_ROTATION_INTERVAL: Duration = Duration::from_secs(86400); // 24 hours

fn filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Installs console and rolling JSON file output. Only the first call has
/// any effect.
pub fn init(config: &LoggingConfig) -> Result<(), TnsError> {
    let mut result = Ok(());
    INIT.call_once(|| result = install(config));
    result
}

fn install(config: &LoggingConfig) -> Result<(), TnsError> {
    fs::create_dir_all(&config.dir)
        .map_err(|e| TnsError::Config(format!("Failed to create log directory {}: {}", config.dir.display(), e)))?;

    let file_appender = tracing_appender::rolling::RollingFileAppender::builder()
        .rotation(tracing_appender::rolling::Rotation::DAILY)
        .filename_prefix("tns")
        .filename_suffix("log")
        .build(&config.dir)
        .map_err(|e| TnsError::Config(format!("Failed to create file appender: {}", e)))?;

    let subscriber = tracing_subscriber::registry()
        .with(
            fmt::Layer::new()
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(true)
                .with_filter(filter(&config.level)),
        )
        .with(
            fmt::Layer::new()
                .json()
                .with_writer(file_appender)
                .with_file(true)
                .with_line_number(true)
                .with_thread_ids(true)
                .with_target(true)
                .with_ansi(false)
                .with_filter(filter(&config.level)),
        );

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| TnsError::system(format!("Failed to set tracing subscriber: {}", e)))?;

    if let Ok(handle) = tokio::runtime::Handle::try_current() {
        let log_dir = config.dir.clone();
        let keep = config.files_to_keep;
        handle.spawn(async move {
            let mut interval = time::interval(LOG_ROTATION_INTERVAL);
            loop {
                interval.tick().await;
                cleanup_old_logs(&log_dir, keep);
            }
        });
    }
    Ok(())
}

/// Removes all but the `keep` newest `.log` files. Returns how many were removed.
pub fn cleanup_old_logs(log_dir: &Path, keep: usize) -> usize {
    let Ok(entries) = fs::read_dir(log_dir) else {
        return 0;
    };
    let mut log_files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().map(|ext| ext == "log").unwrap_or(false))
        .collect();

    // newest first
    log_files.sort_by_key(|path| {
        std::cmp::Reverse(
            fs::metadata(path)
                .and_then(|m| m.modified())
                .unwrap_or(std::time::SystemTime::UNIX_EPOCH),
        )
    });

    log_files
        .iter()
        .skip(keep)
        .filter(|path| fs::remove_file(path).is_ok())
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_cleanup_keeps_newest_logs() {
        let dir = tempdir().unwrap();
        for i in 0..5 {
            let path = dir.path().join(format!("tns.2026-01-0{}.log", i + 1));
            fs::write(&path, "{}").unwrap();
            let mtime = std::time::SystemTime::UNIX_EPOCH + Duration::from_secs(1_000 * (i + 1));
            fs::File::options().write(true).open(&path).unwrap().set_modified(mtime).unwrap();
        }
        fs::write(dir.path().join("notes.txt"), "keep me").unwrap();

        assert_eq!(cleanup_old_logs(dir.path(), 3), 2);
        assert!(!dir.path().join("tns.2026-01-01.log").exists());
        assert!(!dir.path().join("tns.2026-01-02.log").exists());
        assert!(dir.path().join("tns.2026-01-05.log").exists());
        assert!(dir.path().join("notes.txt").exists());
    }

    #[test]
    fn test_cleanup_missing_dir() {
        assert_eq!(cleanup_old_logs(Path::new("/nonexistent/tns-logs"), 3), 0);
    }
}
