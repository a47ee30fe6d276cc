//! nestfs logging & observability
//!
//! Structured logging, crash reports and (debug builds) deadlock detection.

mod logging;
mod panic_hook;

pub use logging::{cleanup_old_logs, init_logging, LogGuard, LogOptions};
pub use panic_hook::init_panic_hook;

use directories::ProjectDirs;
use std::path::PathBuf;

/// Default log directory under the platform data dir
pub fn log_dir() -> PathBuf {
    ProjectDirs::from("dev", "nestfs", "nestfs")
        .map(|dirs| dirs.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("./logs"))
}

/// Initialize all observability features.
///
/// Keep the returned guard alive until exit so buffered file output is flushed.
pub fn init(options: LogOptions) -> anyhow::Result<LogGuard> {
    let guard = init_logging(options)?;
    init_panic_hook();

    #[cfg(debug_assertions)]
    init_deadlock_detector();

    Ok(guard)
}

// Mount table and archive readers use parking_lot locks
#[cfg(debug_assertions)]
fn init_deadlock_detector() {
    use std::thread;
    use std::time::Duration;

    let spawned = thread::Builder::new()
        .name("deadlock-detector".into())
        .spawn(|| loop {
            thread::sleep(Duration::from_secs(10));
            let deadlocks = parking_lot::deadlock::check_deadlock();
            if deadlocks.is_empty() {
                continue;
            }

            tracing::error!(count = deadlocks.len(), "deadlock detected");
            for (i, threads) in deadlocks.iter().enumerate() {
                for t in threads {
                    tracing::error!(deadlock = i, thread_id = ?t.thread_id(), "{:#?}", t.backtrace());
                }
            }
        });

    if let Err(e) = spawned {
        tracing::warn!("failed to start deadlock detector: {}", e);
    }
}
