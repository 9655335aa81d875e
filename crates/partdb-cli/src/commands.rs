//! Command handlers. Each returns the JSON body to print and whether the
//! operation succeeded.

use anyhow::Context as _;
use partdb_bulk::{
  BulkEngine, DEFAULT_BATCH_SIZE, DeleteOptions, ImportOptions, RunOptions, UpdateOptions,
};
use partdb_core::{
  config::{ConfigType, ConfigValue, Configuration, NewConfiguration},
  store::{DeleteMode, PartStore},
};
use partdb_store_sqlite::{
  BackupManager, BackupOptions, MigrationManager, RestoreOptions, SqliteStore,
};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::{BulkArgs, BulkCommand, Command, ConfigCommand, settings::Settings};

pub struct Output {
  pub name:    &'static str,
  pub success: bool,
  pub body:    Value,
}

impl Output {
  fn new(name: &'static str, success: bool, body: impl Serialize) -> anyhow::Result<Self> {
    Ok(Self { name, success, body: serde_json::to_value(body)? })
  }
}

pub fn run(command: Command, settings: &Settings) -> anyhow::Result<Output> {
  match command {
    Command::Migrate { to, no_backup } => migrate(settings, to.as_deref(), no_backup),
    Command::Verify => verify(settings),
    Command::Stats => {
      let store = open(settings)?;
      Output::new("stats", true, store.stats()?)
    }
    Command::Backup { output, compress, no_logs } => {
      let store = open(settings)?;
      let path = output
        .unwrap_or_else(|| BackupManager::default_backup_path(&settings.backup_dir, compress));
      let outcome = BackupManager::new(&store)
        .create_backup(&path, BackupOptions { compress, include_logs: !no_logs });
      Output::new("backup", outcome.success, outcome)
    }
    Command::Restore { backup, target, no_verify, force } => {
      // Connecting creates the file, so a missing database is left alone.
      let store = if settings.database_path.exists() {
        SqliteStore::connect(&settings.database_path)
          .with_context(|| format!("failed to open {}", settings.database_path.display()))?
      } else {
        SqliteStore::connect_in_memory()?
      };
      let target = target.unwrap_or_else(|| settings.database_path.clone());
      let outcome = BackupManager::new(&store).restore_backup(
        &backup,
        Some(&target),
        RestoreOptions { verify: !no_verify, force },
      );
      Output::new("restore", outcome.success, outcome)
    }
    Command::Bulk(cmd) => bulk(settings, cmd),
    Command::Config(cmd) => config(settings, cmd),
    Command::Maintain { purge_logs, backup } => maintain(settings, purge_logs, backup),
  }
}

fn open(settings: &Settings) -> anyhow::Result<SqliteStore> {
  SqliteStore::open(&settings.database_path)
    .with_context(|| format!("failed to open store at {}", settings.database_path.display()))
}

fn stored_value(store: &SqliteStore, key: &str) -> Option<ConfigValue> {
  store.get_config(key).ok()?.typed_value()
}

// ─── Schema ──────────────────────────────────────────────────────────────────

fn migrate(settings: &Settings, to: Option<&str>, no_backup: bool) -> anyhow::Result<Output> {
  let existed = settings.database_path.exists();
  let store = SqliteStore::connect(&settings.database_path)
    .with_context(|| format!("failed to open {}", settings.database_path.display()))?;

  let wants_backup = !no_backup
    && existed
    && !matches!(stored_value(&store, "backup_before_migration"), Some(ConfigValue::Boolean(false)));

  // A failed pre-migration backup is reported, not fatal.
  let backup = wants_backup.then(|| {
    let path = BackupManager::default_backup_path(&settings.backup_dir, true);
    let outcome = BackupManager::new(&store)
      .create_backup(&path, BackupOptions { compress: true, include_logs: true });
    if !outcome.success {
      warn!(error = ?outcome.error, "pre-migration backup failed; continuing");
    }
    outcome
  });

  let manager = MigrationManager::new(&store);
  let migration = match to {
    Some(v) => manager.migrate_to_version(v),
    None => manager.migrate_to_latest(),
  };
  Output::new("migrate", migration.success, json!({ "backup": backup, "migration": migration }))
}

fn verify(settings: &Settings) -> anyhow::Result<Output> {
  let store = SqliteStore::connect(&settings.database_path)
    .with_context(|| format!("failed to open {}", settings.database_path.display()))?;
  let schema = MigrationManager::new(&store).verify_schema();
  let integrity = store.integrity_check()?;
  let ok = schema.is_valid() && integrity.is_empty();
  Output::new("verify", ok, json!({ "schema": schema, "integrity_problems": integrity }))
}

// ─── Bulk ────────────────────────────────────────────────────────────────────

fn run_options(store: &SqliteStore, settings: &Settings, args: &BulkArgs) -> RunOptions {
  let stored = match stored_value(store, "bulk_batch_size") {
    Some(ConfigValue::Number(n)) if n >= 1.0 => Some(n as usize),
    _ => None,
  };
  RunOptions {
    filter_category: args.category.clone(),
    batch_size:      args
      .batch_size
      .or(settings.batch_size)
      .or(stored)
      .unwrap_or(DEFAULT_BATCH_SIZE),
    dry_run:         args.dry_run,
  }
}

fn bulk(settings: &Settings, cmd: BulkCommand) -> anyhow::Result<Output> {
  let store = open(settings)?;
  let engine = BulkEngine::new(&store);

  let report = match cmd {
    BulkCommand::Update { args, fields } => {
      let run = run_options(&store, settings, &args);
      engine.bulk_update(&args.csv, &UpdateOptions { fields, run })
    }
    BulkCommand::Delete { args, hard, force } => {
      let run = run_options(&store, settings, &args);
      let mode = if hard { DeleteMode::Hard } else { DeleteMode::Soft };
      engine.bulk_delete(&args.csv, &DeleteOptions { mode, force, run })
    }
    BulkCommand::Activate { args } => {
      let run = run_options(&store, settings, &args);
      engine.bulk_activate(&args.csv, &run)
    }
    BulkCommand::Import { args, update_existing } => {
      let run = run_options(&store, settings, &args);
      engine.bulk_import(&args.csv, &ImportOptions { update_existing, run })
    }
  };
  Output::new("bulk", report.success, report)
}

// ─── Config ──────────────────────────────────────────────────────────────────

fn config(settings: &Settings, cmd: ConfigCommand) -> anyhow::Result<Output> {
  let store = open(settings)?;
  match cmd {
    ConfigCommand::List { category } => {
      Output::new("config list", true, store.list_config(category.as_deref())?)
    }
    ConfigCommand::Get { key } => {
      let entry = store.get_config(&key)?;
      Output::new("config get", true, describe(&entry))
    }
    ConfigCommand::Set { key, value } => {
      let mut entry = match store.get_config(&key) {
        Ok(entry) => entry,
        Err(e) if e.is_not_found() => {
          Configuration::new(NewConfiguration::new(&key, "", ConfigType::String))?
        }
        Err(e) => return Err(e.into()),
      };
      entry.set_raw_value(&value)?;
      let saved = store.set_config(&entry)?;
      info!(key = %key, value = saved.value(), "configuration updated");
      Output::new("config set", true, describe(&saved))
    }
    ConfigCommand::Reset { key } => {
      let entry = store.reset_config(&key)?;
      Output::new("config reset", true, describe(&entry))
    }
  }
}

fn describe(entry: &Configuration) -> Value {
  json!({
    "key": entry.key(),
    "value": entry.value(),
    "typed_value": entry.typed_value(),
    "data_type": entry.data_type(),
    "category": entry.category(),
    "description": entry.description(),
    "updated_at": entry.updated_at(),
  })
}

// ─── Maintenance ─────────────────────────────────────────────────────────────

fn maintain(settings: &Settings, purge_logs: bool, backup: bool) -> anyhow::Result<Output> {
  let store = open(settings)?;

  let backup = if backup {
    let path = BackupManager::default_backup_path(&settings.backup_dir, true);
    let outcome = BackupManager::new(&store).create_backup(&path, BackupOptions {
      compress:     true,
      include_logs: true,
    });
    let pruned = if outcome.success {
      BackupManager::prune_backups(&settings.backup_dir, settings.backup_retention)?
    } else {
      vec![]
    };
    Some(json!({ "outcome": outcome, "pruned": pruned }))
  } else {
    None
  };

  let purged = if purge_logs {
    let days = settings.log_retention_days.or(match stored_value(&store, "log_retention_days") {
      Some(ConfigValue::Number(n)) if n >= 0.0 => Some(n as u32),
      _ => None,
    });
    let days = days.unwrap_or(365);
    Some(json!({ "retention_days": days, "removed": store.purge_discoveries_older_than(days)? }))
  } else {
    None
  };

  let integrity = store.integrity_check()?;
  if integrity.is_empty() {
    store.vacuum()?;
  } else {
    warn!(problems = integrity.len(), "integrity check failed; skipping vacuum");
  }

  let ok = integrity.is_empty()
    && backup.as_ref().is_none_or(|b| b["outcome"]["success"] == true);
  Output::new(
    "maintain",
    ok,
    json!({
      "backup": backup,
      "purge": purged,
      "integrity_problems": integrity,
      "stats": store.stats()?,
    }),
  )
}
