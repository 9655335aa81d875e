//! Runtime settings for the `partdb` binary.
//!
//! Loaded from an optional TOML file, then overridden by `PARTDB_*`
//! environment variables (e.g. `PARTDB_DATABASE_PATH`).

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
  #[serde(default = "default_database_path")]
  pub database_path:      PathBuf,
  #[serde(default = "default_backup_dir")]
  pub backup_dir:         PathBuf,
  /// Overrides the stored `bulk_batch_size` setting.
  #[serde(default)]
  pub batch_size:         Option<usize>,
  /// Overrides the stored `log_retention_days` setting.
  #[serde(default)]
  pub log_retention_days: Option<u32>,
  /// How many backups `maintain --backup` keeps.
  #[serde(default = "default_backup_retention")]
  pub backup_retention:   usize,
}

fn default_database_path() -> PathBuf { PathBuf::from("partdb.db") }

fn default_backup_dir() -> PathBuf { PathBuf::from("backups") }

fn default_backup_retention() -> usize { 10 }

impl Settings {
  pub fn load(file: &Path) -> anyhow::Result<Self> {
    let raw = config::Config::builder()
      .add_source(config::File::from(file.to_path_buf()).required(false))
      .add_source(config::Environment::with_prefix("PARTDB"))
      .build()
      .with_context(|| format!("failed to read settings from {}", file.display()))?;

    let mut settings: Settings =
      raw.try_deserialize().context("failed to deserialise settings")?;
    settings.database_path = expand_tilde(&settings.database_path);
    settings.backup_dir = expand_tilde(&settings.backup_dir);
    Ok(settings)
  }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn missing_file_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let settings = Settings::load(&dir.path().join("absent.toml")).unwrap();
    assert_eq!(settings.backup_dir, PathBuf::from("backups"));
    assert_eq!(settings.backup_retention, 10);
  }

  #[test]
  fn file_values_are_read() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("partdb.toml");
    std::fs::write(&file, "database_path = \"/srv/parts.db\"\nbatch_size = 7\n").unwrap();
    let settings = Settings::load(&file).unwrap();
    assert_eq!(settings.database_path, PathBuf::from("/srv/parts.db"));
    assert_eq!(settings.batch_size, Some(7));
  }

  #[test]
  fn tilde_is_expanded() {
    let expanded = expand_tilde(Path::new("~/parts.db"));
    if std::env::var("HOME").is_ok() {
      assert!(!expanded.starts_with("~"));
    }
    assert_eq!(expand_tilde(Path::new("/abs/x.db")), PathBuf::from("/abs/x.db"));
  }
}
