//! nestfs - read-only virtual filesystem over nested archives
//!
//! Probe entry point: resolves the configured sources and runs one command.

mod cli;

use anyhow::Result;
use clap::Parser;
use nest_log::LogOptions;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    // Initialize logging and panic hook first
    let _log_guard = nest_log::init(LogOptions {
        console: cli.verbose || cfg!(debug_assertions),
        ..Default::default()
    })?;

    if let Err(e) = nest_log::cleanup_old_logs(&nest_log::log_dir(), 7) {
        tracing::warn!("failed to clean up old logs: {}", e);
    }

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "nestfs starting");
    cli::run(cli)
}
