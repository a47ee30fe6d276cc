//! Panic hook for crash reporting

use backtrace::Backtrace;
use chrono::Local;
use std::panic::PanicHookInfo;

/// Initialize the panic hook for crash reporting
pub fn init_panic_hook() {
    std::panic::set_hook(Box::new(panic_handler));
    tracing::debug!("panic hook initialized");
}

fn panic_handler(info: &PanicHookInfo) {
    let thread = std::thread::current();
    let report = crash_report(
        thread.name().unwrap_or("<unnamed>"),
        &info.location().map(|l| l.to_string()).unwrap_or_default(),
        &payload_text(info),
        &format!("{:?}", Backtrace::new()),
    );

    eprintln!("{}", report);
    tracing::error!("{}", report);

    let dump_path = std::env::temp_dir().join(format!(
        "nestfs_crash_{}.txt",
        Local::now().format("%Y%m%d_%H%M%S")
    ));
    if let Err(e) = std::fs::write(&dump_path, &report) {
        eprintln!("Failed to write crash dump: {}", e);
    } else {
        eprintln!("Crash report written to {}", dump_path.display());
    }
}

fn payload_text(info: &PanicHookInfo) -> String {
    let payload = info.payload();
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "<unknown>".to_string())
}

fn crash_report(thread: &str, location: &str, payload: &str, backtrace: &str) -> String {
    format!(
        "=== nestfs PANIC ===\n\
         Timestamp: {}\n\
         Thread: {}\n\
         Location: {}\n\
         Payload: {}\n\n\
         Stack Trace:\n{}",
        Local::now().to_rfc3339(),
        thread,
        location,
        payload,
        backtrace
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crash_report_layout() {
        let report = crash_report("worker-1", "src/lib.rs:10:5", "boom", "frames");
        assert!(report.starts_with("=== nestfs PANIC ==="));
        assert!(report.contains("Thread: worker-1"));
        assert!(report.contains("Location: src/lib.rs:10:5"));
        assert!(report.contains("Payload: boom"));
        assert!(report.ends_with("frames"));
    }
}
