//! `partdb`: administrative CLI for the parts database.
//!
//! Every command prints its result as pretty JSON on stdout. Logs go to
//! stderr and are filtered with `RUST_LOG` (default `info`).
//!
//! # Usage
//!
//! ```text
//! partdb migrate
//! partdb backup --compress
//! partdb bulk update prices.csv --fields authorized_price --dry-run
//! partdb --config ~/.config/partdb/partdb.toml stats
//! ```

mod commands;
mod settings;

use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use partdb_core::part::PartField;
use settings::Settings;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// ─── CLI args ────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "partdb", version, about = "Administer the parts database")]
struct Cli {
  /// Path to a TOML settings file.
  #[arg(short, long, value_name = "FILE", default_value = "partdb.toml")]
  config: PathBuf,

  /// Database file; overrides the settings file.
  #[arg(long, value_name = "PATH")]
  database: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Bring the schema to the latest (or a given) version.
  Migrate {
    #[arg(long, value_name = "VERSION")]
    to:        Option<String>,
    /// Skip the pre-migration backup.
    #[arg(long)]
    no_backup: bool,
  },
  /// Report missing schema objects and integrity problems.
  Verify,
  /// Print counts and file size.
  Stats,
  /// Snapshot the database.
  Backup {
    #[arg(short, long, value_name = "PATH")]
    output:   Option<PathBuf>,
    #[arg(long)]
    compress: bool,
    /// Leave the discovery log out of the snapshot.
    #[arg(long)]
    no_logs:  bool,
  },
  /// Replace a database file with a snapshot.
  Restore {
    backup:    PathBuf,
    /// Defaults to the configured database.
    #[arg(long, value_name = "PATH")]
    target:    Option<PathBuf>,
    #[arg(long)]
    no_verify: bool,
    /// Overwrite an existing target.
    #[arg(long)]
    force:     bool,
  },
  /// CSV-driven batch operations.
  #[command(subcommand)]
  Bulk(BulkCommand),
  /// Read and change stored settings.
  #[command(subcommand)]
  Config(ConfigCommand),
  /// Housekeeping: optional backup and log purge, then integrity check and vacuum.
  Maintain {
    #[arg(long)]
    purge_logs: bool,
    #[arg(long)]
    backup:     bool,
  },
}

/// Flags shared by the bulk subcommands.
#[derive(clap::Args, Debug, Clone)]
struct BulkArgs {
  csv:        PathBuf,
  /// Only touch parts in this category.
  #[arg(long)]
  category:   Option<String>,
  #[arg(long, value_name = "N")]
  batch_size: Option<usize>,
  #[arg(long)]
  dry_run:    bool,
}

#[derive(Subcommand, Debug)]
enum BulkCommand {
  Update {
    #[command(flatten)]
    args:   BulkArgs,
    /// Comma-separated columns allowed to change.
    #[arg(long, value_delimiter = ',')]
    fields: Option<Vec<PartField>>,
  },
  Delete {
    #[command(flatten)]
    args:  BulkArgs,
    /// Remove rows instead of marking them inactive.
    #[arg(long)]
    hard:  bool,
    #[arg(long)]
    force: bool,
  },
  Activate {
    #[command(flatten)]
    args: BulkArgs,
  },
  Import {
    #[command(flatten)]
    args:            BulkArgs,
    #[arg(long)]
    update_existing: bool,
  },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
  List {
    #[arg(long)]
    category: Option<String>,
  },
  Get {
    key: String,
  },
  Set {
    key:   String,
    value: String,
  },
  /// Restore a key to its default.
  Reset {
    key: String,
  },
}

// ─── Entry point ─────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let mut settings = Settings::load(&cli.config)?;
  if let Some(database) = cli.database {
    settings.database_path = settings::expand_tilde(&database);
  }

  let output = commands::run(cli.command, &settings)?;
  println!(
    "{}",
    serde_json::to_string_pretty(&output.body).context("failed to render output")?
  );

  if !output.success {
    anyhow::bail!("{} failed", output.name);
  }
  Ok(())
}
