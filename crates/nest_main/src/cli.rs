//! `nestfs` command line: probe a source without the HTTP layer

use clap::{Parser, Subcommand};
use nest_core::{Catalog, ServeConfig, SourceConfig};
use nest_fs::{Entry, Stager};
use std::io::Write;
use std::path::PathBuf;
use std::time::UNIX_EPOCH;

#[derive(Parser, Debug)]
#[command(name = "nestfs")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to the platform config dir)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Serve a single locator at `/` instead of the configured sources
    #[arg(long, short)]
    pub source: Option<String>,

    /// Override `general.mount_suffix`
    #[arg(long)]
    pub suffix: Option<String>,

    /// Log to stderr
    #[arg(long, short)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List a directory (archives show an extra `<name><suffix>` entry)
    Ls {
        #[arg(default_value = "/")]
        path: String,
        /// One JSON array instead of columns
        #[arg(long)]
        json: bool,
    },
    /// Write a file's bytes to stdout
    Cat { path: String },
    /// Print one entry as JSON
    Stat { path: String },
    /// List served prefixes
    Sources,
}

impl Cli {
    /// Effective configuration after command-line overrides
    pub fn resolve_config(&self) -> anyhow::Result<ServeConfig> {
        let mut config = match &self.config {
            Some(path) => ServeConfig::load_from(path)?,
            None => ServeConfig::load()?,
        };

        if let Some(suffix) = &self.suffix {
            config.general.mount_suffix = suffix.clone();
        }
        if let Some(locator) = &self.source {
            config.sources = vec![SourceConfig {
                prefix: "/".into(),
                locator: locator.clone(),
            }];
        }
        if config.sources.is_empty() {
            anyhow::bail!("no sources configured; pass --source or add [[sources]] to the config");
        }

        config.validate()?;
        Ok(config)
    }
}

pub fn run(cli: Cli) -> anyhow::Result<()> {
    let config = cli.resolve_config()?;
    let stager = Stager::new(config.staging_options());
    let mut catalog = Catalog::from_config(&config, &stager)?;

    let result = execute(&catalog, &cli.command, &mut std::io::stdout().lock());
    catalog.close_all()?;
    result
}

fn execute(catalog: &Catalog, command: &Command, out: &mut impl Write) -> anyhow::Result<()> {
    match command {
        Command::Ls { path, json } => {
            let entries = catalog.read_dir(path)?;
            if *json {
                serde_json::to_writer_pretty(&mut *out, &entries)?;
                writeln!(out)?;
            } else {
                for entry in &entries {
                    writeln!(out, "{}", format_entry(entry))?;
                }
            }
        }
        Command::Cat { path } => {
            out.write_all(&catalog.read_file(path)?)?;
        }
        Command::Stat { path } => {
            serde_json::to_writer_pretty(&mut *out, &catalog.stat(path)?)?;
            writeln!(out)?;
        }
        Command::Sources => {
            for prefix in catalog.prefixes() {
                writeln!(out, "{}", prefix)?;
            }
        }
    }
    out.flush()?;
    Ok(())
}

/// `ls -l` style line: type, size, mtime, name (`@` marks archive mounts)
fn format_entry(entry: &Entry) -> String {
    let kind = match (entry.is_dir, entry.is_synthetic()) {
        (true, true) => '@',
        (true, false) => 'd',
        _ => '-',
    };
    let modified = entry
        .modified
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .and_then(|d| chrono::DateTime::from_timestamp(d.as_secs() as i64, 0))
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".repeat(16));
    format!("{} {:>12} {} {}", kind, entry.size, modified, entry.name)
}
