//! File-level snapshots of a [`SqliteStore`].
//!
//! Backups are taken with SQLite's online backup API, so they are consistent
//! even while the store is in WAL mode. Restores stage the snapshot next to
//! the target and rename it into place; the old target survives any failure
//! before that rename.
//!
//! Both directions report failures in their outcome struct instead of
//! returning `Err`, so a caller running "back up, then migrate" can decide
//! what to do with a failed step.

use std::{
  fs::{self, File},
  io::{self, BufReader, BufWriter, Read},
  path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use flate2::{Compression, read::GzDecoder, write::GzEncoder};
use rusqlite::{Connection, DatabaseName, OpenFlags};
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::{
  Error, Result, SqliteStore,
  store::{shm_path, wal_path},
};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const SQLITE_MAGIC: &[u8; 16] = b"SQLite format 3\0";
const BACKUP_PREFIX: &str = "partdb_backup_";

// ─── Options & outcomes ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackupOptions {
  /// Gzip the snapshot.
  pub compress:     bool,
  /// Keep the discovery log in the snapshot.
  pub include_logs: bool,
}

impl Default for BackupOptions {
  fn default() -> Self { Self { compress: false, include_logs: true } }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestoreOptions {
  /// Check that the snapshot is a readable database before installing it.
  pub verify: bool,
  /// Allow overwriting an existing target file.
  pub force:  bool,
}

impl Default for RestoreOptions {
  fn default() -> Self { Self { verify: true, force: false } }
}

/// Why a backup or restore failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupErrorKind {
  /// The backup file does not exist.
  NotFound,
  /// The snapshot is not a valid database.
  Corrupted,
  /// The target exists and `force` was not set.
  TargetExists,
  Io,
  Database,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackupOutcome {
  pub success:      bool,
  pub path:         PathBuf,
  pub size_bytes:   u64,
  pub timestamp:    DateTime<Utc>,
  pub compressed:   bool,
  pub include_logs: bool,
  pub error:        Option<String>,
  pub error_kind:   Option<BackupErrorKind>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RestoreOutcome {
  pub success:     bool,
  pub backup_path: PathBuf,
  pub target_path: PathBuf,
  pub size_bytes:  u64,
  pub timestamp:   DateTime<Utc>,
  pub compressed:  bool,
  pub verified:    bool,
  pub forced:      bool,
  pub error:       Option<String>,
  pub error_kind:  Option<BackupErrorKind>,
}

/// What a restore attempt learned before it finished or failed.
#[derive(Default)]
struct RestoreProgress {
  compressed: bool,
  verified:   bool,
}

struct Failure {
  kind:    BackupErrorKind,
  message: String,
}

impl Failure {
  fn new(kind: BackupErrorKind, message: impl Into<String>) -> Self {
    Self { kind, message: message.into() }
  }
}

impl From<io::Error> for Failure {
  fn from(e: io::Error) -> Self { Self::new(BackupErrorKind::Io, e.to_string()) }
}

impl From<rusqlite::Error> for Failure {
  fn from(e: rusqlite::Error) -> Self { Self::new(BackupErrorKind::Database, e.to_string()) }
}

impl From<tempfile::PersistError> for Failure {
  fn from(e: tempfile::PersistError) -> Self { e.error.into() }
}

impl From<Error> for Failure {
  fn from(e: Error) -> Self {
    let kind = match e {
      Error::Io(_) => BackupErrorKind::Io,
      _ => BackupErrorKind::Database,
    };
    Self::new(kind, e.to_string())
  }
}

// ─── Manager ─────────────────────────────────────────────────────────────────

/// Creates and restores snapshots of a [`SqliteStore`].
pub struct BackupManager<'a> {
  store: &'a SqliteStore,
}

impl<'a> BackupManager<'a> {
  pub fn new(store: &'a SqliteStore) -> Self { Self { store } }

  /// Snapshot the live store to `destination`.
  ///
  /// A compressed snapshot's path gains a `.gz` suffix if it lacks one; the
  /// resolved path is reported in the outcome.
  pub fn create_backup(&self, destination: &Path, options: BackupOptions) -> BackupOutcome {
    let path = if options.compress { with_gz_suffix(destination) } else { destination.to_owned() };

    let result = self.write_backup(&path, options);
    let (size_bytes, error) = match result {
      Ok(size) => {
        info!(path = %path.display(), size, compressed = options.compress, "backup created");
        (size, None)
      }
      Err(f) => {
        warn!(path = %path.display(), error = %f.message, "backup failed");
        (0, Some(f))
      }
    };

    BackupOutcome {
      success: error.is_none(),
      path,
      size_bytes,
      timestamp: Utc::now(),
      compressed: options.compress,
      include_logs: options.include_logs,
      error_kind: error.as_ref().map(|f| f.kind),
      error: error.map(|f| f.message),
    }
  }

  fn write_backup(&self, path: &Path, options: BackupOptions) -> Result<u64, Failure> {
    let dir = parent_dir(path);
    fs::create_dir_all(dir)?;

    let scratch = NamedTempFile::new_in(dir)?;
    self.store.with_connection(|conn| {
      conn.backup(DatabaseName::Main, scratch.path(), None)?;
      Ok(())
    })?;

    {
      let copy = Connection::open(scratch.path())?;
      // The copy inherits WAL mode from the live file; a standalone snapshot
      // must not depend on sidecar files.
      copy.pragma_update_and_check(None, "journal_mode", "DELETE", |r| r.get::<_, String>(0))?;
      if !options.include_logs {
        copy.execute("DELETE FROM discovery_log", [])?;
        copy.execute_batch("VACUUM")?;
      }
      copy.close().map_err(|(_, e)| e)?;
    }

    if options.compress {
      let out = NamedTempFile::new_in(dir)?;
      {
        let mut encoder =
          GzEncoder::new(BufWriter::new(out.as_file()), Compression::default());
        io::copy(&mut BufReader::new(File::open(scratch.path())?), &mut encoder)?;
        encoder.finish()?.into_inner().map_err(|e| e.into_error())?;
      }
      out.persist(path)?;
    } else {
      scratch.persist(path)?;
    }

    Ok(fs::metadata(path)?.len())
  }

  /// Install the snapshot at `backup` over `target`, defaulting to the
  /// store's own file. The store's connection is released first when the
  /// target is its file; it reopens on next use.
  pub fn restore_backup(
    &self,
    backup: &Path,
    target: Option<&Path>,
    options: RestoreOptions,
  ) -> RestoreOutcome {
    let target_path = target
      .map(Path::to_path_buf)
      .or_else(|| self.store.path().map(Path::to_path_buf))
      .unwrap_or_default();

    let mut progress = RestoreProgress::default();
    let result = self.install(backup, &target_path, options, &mut progress);
    let (size_bytes, error) = match result {
      Ok(size) => {
        info!(
          backup = %backup.display(),
          target = %target_path.display(),
          verified = options.verify,
          "backup restored"
        );
        (size, None)
      }
      Err(f) => {
        warn!(backup = %backup.display(), error = %f.message, "restore failed");
        (0, Some(f))
      }
    };

    RestoreOutcome {
      success: error.is_none(),
      backup_path: backup.to_owned(),
      target_path,
      size_bytes,
      timestamp: Utc::now(),
      compressed: progress.compressed,
      verified: progress.verified,
      forced: options.force,
      error_kind: error.as_ref().map(|f| f.kind),
      error: error.map(|f| f.message),
    }
  }

  fn install(
    &self,
    backup: &Path,
    target: &Path,
    options: RestoreOptions,
    progress: &mut RestoreProgress,
  ) -> Result<u64, Failure> {
    if !backup.is_file() {
      return Err(Failure::new(
        BackupErrorKind::NotFound,
        format!("backup not found: {}", backup.display()),
      ));
    }
    if target.as_os_str().is_empty() {
      return Err(Failure::new(BackupErrorKind::Io, "no restore target for an in-memory store"));
    }
    if target.exists() && !options.force {
      return Err(Failure::new(
        BackupErrorKind::TargetExists,
        format!("target exists (use force to overwrite): {}", target.display()),
      ));
    }

    progress.compressed = is_gzip(backup)?;

    let dir = parent_dir(target);
    fs::create_dir_all(dir)?;
    let staged = NamedTempFile::new_in(dir)?;
    {
      let mut out = BufWriter::new(staged.as_file());
      let mut input = BufReader::new(File::open(backup)?);
      if progress.compressed {
        io::copy(&mut GzDecoder::new(input), &mut out).map_err(|e| {
          Failure::new(BackupErrorKind::Corrupted, format!("cannot decompress backup: {e}"))
        })?;
      } else {
        io::copy(&mut input, &mut out)?;
      }
      out.into_inner().map_err(|e| e.into_error())?;
    }

    if options.verify {
      verify_snapshot(staged.path())?;
      progress.verified = true;
      debug!(backup = %backup.display(), "backup verified");
    }

    if self.targets_live_store(target) {
      self.store.release()?;
    }
    for sidecar in [wal_path(target), shm_path(target)] {
      match fs::remove_file(&sidecar) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e.into()),
        _ => {}
      }
    }
    staged.persist(target)?;

    Ok(fs::metadata(target)?.len())
  }

  fn targets_live_store(&self, target: &Path) -> bool {
    let Some(live) = self.store.path() else {
      return false;
    };
    match (fs::canonicalize(live), fs::canonicalize(target)) {
      (Ok(a), Ok(b)) => a == b,
      _ => live == target,
    }
  }

  // ── Backup directory helpers ──────────────────────────────────────────

  /// A timestamped backup file name inside `dir`.
  pub fn default_backup_path(dir: &Path, compress: bool) -> PathBuf {
    let name = format!("{BACKUP_PREFIX}{}.db", Utc::now().format("%Y%m%d_%H%M%S_%3f"));
    let path = dir.join(name);
    if compress { with_gz_suffix(&path) } else { path }
  }

  /// Backup files in `dir`, newest first.
  pub fn list_backups(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
      return Ok(vec![]);
    }
    let mut found = vec![];
    for entry in fs::read_dir(dir)? {
      let entry = entry?;
      let name = entry.file_name();
      if entry.file_type()?.is_file() && name.to_string_lossy().starts_with(BACKUP_PREFIX) {
        found.push((entry.metadata()?.modified()?, entry.path()));
      }
    }
    // Names embed the timestamp, so they break ties between equal mtimes.
    found.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));
    Ok(found.into_iter().map(|(_, p)| p).collect())
  }

  /// Delete all but the newest `keep` backups in `dir`; returns the removed paths.
  pub fn prune_backups(dir: &Path, keep: usize) -> Result<Vec<PathBuf>> {
    let stale: Vec<PathBuf> = Self::list_backups(dir)?.into_iter().skip(keep).collect();
    for path in &stale {
      fs::remove_file(path)?;
      debug!(path = %path.display(), "pruned backup");
    }
    Ok(stale)
  }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn parent_dir(path: &Path) -> &Path {
  match path.parent() {
    Some(p) if !p.as_os_str().is_empty() => p,
    _ => Path::new("."),
  }
}

fn with_gz_suffix(path: &Path) -> PathBuf {
  if path.extension().is_some_and(|e| e.eq_ignore_ascii_case("gz")) {
    return path.to_owned();
  }
  let mut s = path.as_os_str().to_owned();
  s.push(".gz");
  PathBuf::from(s)
}

fn read_prefix(path: &Path, buf: &mut [u8]) -> io::Result<usize> {
  let mut file = File::open(path)?;
  let mut filled = 0;
  while filled < buf.len() {
    match file.read(&mut buf[filled..])? {
      0 => break,
      n => filled += n,
    }
  }
  Ok(filled)
}

fn is_gzip(path: &Path) -> io::Result<bool> {
  let mut magic = [0u8; 2];
  Ok(read_prefix(path, &mut magic)? == 2 && magic == GZIP_MAGIC)
}

fn has_sqlite_header(path: &Path) -> io::Result<bool> {
  let mut header = [0u8; 16];
  Ok(read_prefix(path, &mut header)? == 16 && &header == SQLITE_MAGIC)
}

/// Confirm `path` holds a readable SQLite database.
fn verify_snapshot(path: &Path) -> Result<(), Failure> {
  let corrupted = |msg: String| Failure::new(BackupErrorKind::Corrupted, msg);

  // An empty file opens as an empty database, so the header is checked
  // regardless of what the catalog probe says.
  if !has_sqlite_header(path)? {
    return Err(corrupted("not a SQLite database (bad file header)".into()));
  }

  let probe = || -> rusqlite::Result<String> {
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
    conn.query_row("SELECT COUNT(*) FROM sqlite_master", [], |r| r.get::<_, i64>(0))?;
    conn.query_row("PRAGMA quick_check", [], |r| r.get(0))
  };
  match probe() {
    Ok(status) if status == "ok" => Ok(()),
    Ok(status) => Err(corrupted(format!("integrity check failed: {status}"))),
    Err(e) => Err(corrupted(format!("database is corrupted: {e}"))),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn gz_suffix_added_once() {
    assert_eq!(with_gz_suffix(Path::new("a/b.db")), PathBuf::from("a/b.db.gz"));
    assert_eq!(with_gz_suffix(Path::new("a/b.db.gz")), PathBuf::from("a/b.db.gz"));
  }

  #[test]
  fn default_names_are_prefixed() {
    let p = BackupManager::default_backup_path(Path::new("/tmp/x"), true);
    let name = p.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with(BACKUP_PREFIX));
    assert!(name.ends_with(".db.gz"));
  }

  #[test]
  fn garbage_is_not_a_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("junk.db");
    fs::write(&path, b"definitely not sqlite").unwrap();
    let err = verify_snapshot(&path).unwrap_err();
    assert_eq!(err.kind, BackupErrorKind::Corrupted);

    let empty = dir.path().join("empty.db");
    fs::write(&empty, b"").unwrap();
    assert!(verify_snapshot(&empty).is_err());
    assert!(!is_gzip(&empty).unwrap());
  }
}
