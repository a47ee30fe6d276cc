//! Structured logging setup with tracing

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_FILE_PREFIX: &str = "nestfs.log";

#[derive(Debug, Clone)]
pub struct LogOptions {
    /// Directory for the daily JSON log (`None` disables file output)
    pub dir: Option<PathBuf>,
    /// Filter used when `RUST_LOG` is unset
    pub default_filter: String,
    /// Human-readable output on stderr
    pub console: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            dir: Some(super::log_dir()),
            default_filter: "info".to_string(),
            console: cfg!(debug_assertions),
        }
    }
}

/// Flushes the file writer on drop
#[must_use = "dropping the guard stops file logging"]
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

/// Initialize the logging system
pub fn init_logging(options: LogOptions) -> anyhow::Result<LogGuard> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&options.default_filter));

    let (file_layer, guard) = match &options.dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = RollingFileAppender::new(Rotation::DAILY, dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().json().with_writer(writer)), Some(guard))
        }
        None => (None, None),
    };

    // stdout carries command output, so the console layer writes to stderr
    let console_layer = options.console.then(|| {
        let layer = fmt::layer().with_writer(std::io::stderr);
        #[cfg(debug_assertions)]
        let layer = layer.pretty();
        layer
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    tracing::debug!(dir = ?options.dir, "logging initialized");
    Ok(LogGuard { _file: guard })
}

/// Remove `.log` files in `dir` older than `days`; returns how many were deleted
pub fn cleanup_old_logs(dir: &Path, days: u32) -> anyhow::Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }

    let threshold = SystemTime::now() - Duration::from_secs(days as u64 * 24 * 60 * 60);
    let mut deleted = 0;

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();

        // Rolling files are named `nestfs.log.YYYY-MM-DD`
        if !(name.ends_with(".log") || name.starts_with(LOG_FILE_PREFIX)) {
            continue;
        }

        let modified = entry.metadata().and_then(|m| m.modified());
        if matches!(modified, Ok(m) if m < threshold) && std::fs::remove_file(&path).is_ok() {
            deleted += 1;
            tracing::debug!(path = %path.display(), "deleted old log");
        }
    }

    tracing::info!(deleted, "cleaned up old log files");
    Ok(deleted)
}
