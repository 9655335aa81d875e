//! [`SqliteStore`], the SQLite implementation of [`PartStore`].

use std::{
  fs,
  path::{Path, PathBuf},
  sync::{Arc, Mutex},
  time::Duration,
};

use chrono::{TimeDelta, Utc};
use partdb_core::{
  config::Configuration,
  defaults,
  discovery::{DiscoveryLogEntry, NewDiscovery},
  key::{KEY_SEPARATOR, normalize_component},
  part::Part,
  store::{DeleteMode, DiscoveryFilter, PartFilter, PartStore, StoreStats},
};
use rusqlite::{Connection, OptionalExtension as _, TransactionBehavior};
use tracing::{debug, info};

use crate::{
  Error, Result,
  encode::{
    CONFIG_COLUMNS, DISCOVERY_COLUMNS, PART_COLUMNS, RawConfig, RawDiscovery, RawPart,
    encode_decimal, encode_dt,
  },
  migration::{MigrationManager, read_version},
  schema::VERSION_KEY,
};

/// How long a writer waits on a locked database before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
enum Location {
  File(PathBuf),
  Memory,
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A parts store backed by a single SQLite file.
///
/// Clones share one connection.
#[derive(Clone)]
pub struct SqliteStore {
  location: Location,
  conn:     Arc<Mutex<Option<Connection>>>,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and migrate it to the latest schema.
  pub fn open(path: impl AsRef<Path>) -> Result<Self> {
    let store = Self::connect(path)?;
    store.init_schema()?;
    Ok(store)
  }

  /// Open an in-memory store at the latest schema.
  pub fn open_in_memory() -> Result<Self> {
    let store = Self::connect_in_memory()?;
    store.init_schema()?;
    Ok(store)
  }

  /// Open `path` without touching its schema.
  pub fn connect(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref().to_path_buf();
    let conn = open_connection(&path)?;
    Ok(Self {
      location: Location::File(path),
      conn:     Arc::new(Mutex::new(Some(conn))),
    })
  }

  /// An empty in-memory database without any schema.
  pub fn connect_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(Self {
      location: Location::Memory,
      conn:     Arc::new(Mutex::new(Some(conn))),
    })
  }

  fn init_schema(&self) -> Result<()> {
    let outcome = MigrationManager::new(self).migrate_to_latest();
    if outcome.success {
      Ok(())
    } else {
      Err(Error::Migration(outcome.error.unwrap_or_else(|| "unknown error".into())))
    }
  }

  /// Path of the backing file; `None` for in-memory stores.
  pub fn path(&self) -> Option<&Path> {
    match &self.location {
      Location::File(p) => Some(p),
      Location::Memory => None,
    }
  }

  // ── Scoped access ─────────────────────────────────────────────────────

  /// Run `f` against the live connection, reopening it if it was released.
  pub fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
    let mut slot = self.conn.lock().map_err(|_| Error::Poisoned)?;
    let conn = self.ensure_open(&mut slot)?;
    f(conn)
  }

  /// Run `f` inside an immediate transaction. The transaction commits only
  /// if `f` returns `Ok`; any error rolls it back.
  pub fn with_transaction<T>(
    &self,
    f: impl FnOnce(&rusqlite::Transaction<'_>) -> Result<T>,
  ) -> Result<T> {
    let mut slot = self.conn.lock().map_err(|_| Error::Poisoned)?;
    let conn = self.ensure_open(&mut slot)?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let out = f(&tx)?;
    tx.commit()?;
    Ok(out)
  }

  fn ensure_open<'a>(&self, slot: &'a mut Option<Connection>) -> Result<&'a mut Connection> {
    if slot.is_none() {
      let Location::File(path) = &self.location else {
        return Err(Error::Closed);
      };
      debug!(path = %path.display(), "reopening store connection");
      *slot = Some(open_connection(path)?);
    }
    slot.as_mut().ok_or(Error::Closed)
  }

  /// Checkpoint the write-ahead log and close the live connection so the
  /// file can be replaced. The next call reopens it. No-op in memory.
  pub fn release(&self) -> Result<()> {
    if matches!(self.location, Location::Memory) {
      return Ok(());
    }
    let mut slot = self.conn.lock().map_err(|_| Error::Poisoned)?;
    if let Some(conn) = slot.take() {
      conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))?;
      conn.close().map_err(|(_, e)| Error::Database(e))?;
      debug!("store connection released");
    }
    Ok(())
  }

  // ── Maintenance ───────────────────────────────────────────────────────

  /// Run `PRAGMA integrity_check`; returns the problems found (empty if ok).
  pub fn integrity_check(&self) -> Result<Vec<String>> {
    self.with_connection(|conn| {
      let mut stmt = conn.prepare("PRAGMA integrity_check")?;
      let rows = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
      Ok(rows.into_iter().filter(|r| r != "ok").collect())
    })
  }

  /// Rebuild the database file, reclaiming free pages.
  pub fn vacuum(&self) -> Result<()> {
    self.with_connection(|conn| {
      conn.execute_batch("VACUUM")?;
      Ok(())
    })?;
    info!("database vacuumed");
    Ok(())
  }

  fn file_size(&self) -> Result<Option<u64>> {
    let Some(path) = self.path() else {
      return Ok(None);
    };
    let mut size = fs::metadata(path)?.len();
    let wal = wal_path(path);
    if let Ok(meta) = fs::metadata(wal) {
      size += meta.len();
    }
    Ok(Some(size))
  }
}

fn open_connection(path: &Path) -> Result<Connection> {
  let conn = Connection::open(path)?;
  conn.busy_timeout(BUSY_TIMEOUT)?;
  conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
  conn.pragma_update(None, "foreign_keys", "ON")?;
  Ok(conn)
}

/// Sidecar write-ahead log path for a database file.
pub(crate) fn wal_path(path: &Path) -> PathBuf { sidecar(path, "-wal") }

/// Sidecar shared-memory index path for a database file.
pub(crate) fn shm_path(path: &Path) -> PathBuf { sidecar(path, "-shm") }

fn sidecar(path: &Path, suffix: &str) -> PathBuf {
  let mut s = path.as_os_str().to_owned();
  s.push(suffix);
  PathBuf::from(s)
}

fn part_not_found(key: &str) -> Error {
  Error::NotFound { entity: "part", key: key.to_owned() }
}

fn query_parts(
  conn: &Connection,
  sql: &str,
  params: impl rusqlite::Params,
) -> Result<Vec<Part>> {
  let mut stmt = conn.prepare(sql)?;
  let raws = stmt
    .query_map(params, RawPart::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawPart::into_part).collect()
}

fn count(conn: &Connection, sql: &str) -> Result<u64> {
  let n: i64 = conn.query_row(sql, [], |r| r.get(0))?;
  Ok(u64::try_from(n).unwrap_or_default())
}

// ─── PartStore impl ──────────────────────────────────────────────────────────

impl PartStore for SqliteStore {
  type Error = Error;

  // ── Parts ─────────────────────────────────────────────────────────────

  fn create_part(&self, part: Part) -> Result<Part> {
    let id = self.with_transaction(|tx| {
      let exists = tx
        .query_row(
          "SELECT 1 FROM parts WHERE composite_key = ?1",
          rusqlite::params![part.composite_key()],
          |_| Ok(()),
        )
        .optional()?
        .is_some();
      if exists {
        return Err(Error::AlreadyExists {
          entity: "part",
          key:    part.composite_key().to_owned(),
        });
      }

      tx.execute(
        "INSERT INTO parts (
           composite_key, part_number, authorized_price, description, item_type,
           category, source, first_seen_invoice, created_at, updated_at,
           is_active, notes
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        rusqlite::params![
          part.composite_key(),
          part.part_number(),
          encode_decimal(part.authorized_price()),
          part.description(),
          part.item_type(),
          part.category(),
          part.source().as_str(),
          part.first_seen_invoice(),
          encode_dt(part.created_at()),
          encode_dt(part.updated_at()),
          part.is_active(),
          part.notes(),
        ],
      )?;
      Ok(tx.last_insert_rowid())
    })?;

    debug!(key = part.composite_key(), id, "part created");
    Ok(part.with_id(id))
  }

  fn get_part(&self, composite_key: &str) -> Result<Part> {
    self.find_part(composite_key)?.ok_or_else(|| part_not_found(composite_key))
  }

  fn find_part(&self, composite_key: &str) -> Result<Option<Part>> {
    let raw = self.with_connection(|conn| {
      Ok(
        conn
          .query_row(
            &format!("SELECT {PART_COLUMNS} FROM parts WHERE composite_key = ?1"),
            rusqlite::params![composite_key],
            RawPart::from_row,
          )
          .optional()?,
      )
    })?;

    raw.map(RawPart::into_part).transpose()
  }

  fn find_parts_by_number(&self, part_number: &str) -> Result<Vec<Part>> {
    let wanted = normalize_component(part_number);
    if wanted.is_empty() {
      return Ok(vec![]);
    }

    // The composite key ends with the normalised part number. SQLite's
    // UPPER is ASCII-only, so matching happens on the key suffix and the
    // candidates are confirmed here.
    let suffix = format!("{KEY_SEPARATOR}{wanted}");
    let suffix_len = suffix.chars().count() as i64;
    let candidates = self.with_connection(|conn| {
      query_parts(
        conn,
        &format!(
          "SELECT {PART_COLUMNS} FROM parts
           WHERE part_number IS NOT NULL AND substr(composite_key, -?2) = ?1
           ORDER BY id"
        ),
        rusqlite::params![suffix, suffix_len],
      )
    })?;

    Ok(
      candidates
        .into_iter()
        .filter(|p| p.part_number().map(normalize_component).as_deref() == Some(wanted.as_str()))
        .collect(),
    )
  }

  fn update_part(&self, part: &Part) -> Result<Part> {
    let id = part.id().ok_or_else(|| part_not_found(part.composite_key()))?;

    self.with_transaction(|tx| {
      let clash = tx
        .query_row(
          "SELECT 1 FROM parts WHERE composite_key = ?1 AND id != ?2",
          rusqlite::params![part.composite_key(), id],
          |_| Ok(()),
        )
        .optional()?
        .is_some();
      if clash {
        return Err(Error::AlreadyExists {
          entity: "part",
          key:    part.composite_key().to_owned(),
        });
      }

      let changed = tx.execute(
        "UPDATE parts SET
           composite_key = ?1, part_number = ?2, authorized_price = ?3,
           description = ?4, item_type = ?5, category = ?6, source = ?7,
           first_seen_invoice = ?8, updated_at = ?9, is_active = ?10, notes = ?11
         WHERE id = ?12",
        rusqlite::params![
          part.composite_key(),
          part.part_number(),
          encode_decimal(part.authorized_price()),
          part.description(),
          part.item_type(),
          part.category(),
          part.source().as_str(),
          part.first_seen_invoice(),
          encode_dt(part.updated_at()),
          part.is_active(),
          part.notes(),
          id,
        ],
      )?;
      if changed == 0 {
        return Err(part_not_found(part.composite_key()));
      }
      Ok(())
    })?;

    Ok(part.clone())
  }

  fn delete_part(&self, composite_key: &str, mode: DeleteMode) -> Result<()> {
    let now = encode_dt(Utc::now());
    let changed = self.with_transaction(|tx| {
      let n = match mode {
        DeleteMode::Soft => tx.execute(
          "UPDATE parts SET is_active = 0, updated_at = ?2 WHERE composite_key = ?1",
          rusqlite::params![composite_key, now],
        )?,
        DeleteMode::Hard => tx.execute(
          "DELETE FROM parts WHERE composite_key = ?1",
          rusqlite::params![composite_key],
        )?,
      };
      Ok(n)
    })?;

    if changed == 0 {
      return Err(part_not_found(composite_key));
    }
    debug!(key = composite_key, ?mode, "part deleted");
    Ok(())
  }

  fn list_parts(&self, filter: &PartFilter) -> Result<Vec<Part>> {
    let mut conds: Vec<String> = vec![];
    let mut params: Vec<String> = vec![];

    if filter.active_only {
      conds.push("is_active = 1".into());
    }
    if let Some(category) = &filter.category {
      params.push(category.clone());
      conds.push(format!("category = ?{}", params.len()));
    }
    if let Some(source) = filter.source {
      params.push(source.as_str().to_owned());
      conds.push(format!("source = ?{}", params.len()));
    }

    let where_clause = if conds.is_empty() {
      String::new()
    } else {
      format!("WHERE {}", conds.join(" AND "))
    };
    let limit_clause = filter.limit.map(|n| format!("LIMIT {n}")).unwrap_or_default();
    let sql = format!(
      "SELECT {PART_COLUMNS} FROM parts {where_clause} ORDER BY composite_key {limit_clause}"
    );

    self.with_connection(|conn| query_parts(conn, &sql, rusqlite::params_from_iter(params.iter())))
  }

  // ── Configuration ─────────────────────────────────────────────────────

  fn get_config(&self, key: &str) -> Result<Configuration> {
    let raw = self.with_connection(|conn| {
      Ok(
        conn
          .query_row(
            &format!("SELECT {CONFIG_COLUMNS} FROM config WHERE key = ?1"),
            rusqlite::params![key],
            RawConfig::from_row,
          )
          .optional()?,
      )
    })?;

    raw
      .ok_or_else(|| Error::NotFound { entity: "config", key: key.to_owned() })?
      .into_config()
  }

  fn set_config(&self, config: &Configuration) -> Result<Configuration> {
    self.with_transaction(|tx| {
      tx.execute(
        "INSERT INTO config (key, value, data_type, description, category, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(key) DO UPDATE SET
           value       = excluded.value,
           data_type   = excluded.data_type,
           description = excluded.description,
           category    = excluded.category,
           updated_at  = excluded.updated_at",
        rusqlite::params![
          config.key(),
          config.value(),
          config.data_type().as_str(),
          config.description(),
          config.category(),
          encode_dt(config.created_at()),
          encode_dt(config.updated_at()),
        ],
      )?;
      Ok(())
    })?;
    self.get_config(config.key())
  }

  fn list_config(&self, category: Option<&str>) -> Result<Vec<Configuration>> {
    let raws = self.with_connection(|conn| {
      let rows = if let Some(c) = category {
        let mut stmt = conn.prepare(&format!(
          "SELECT {CONFIG_COLUMNS} FROM config WHERE category = ?1 ORDER BY key"
        ))?;
        stmt
          .query_map(rusqlite::params![c], RawConfig::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?
      } else {
        let mut stmt =
          conn.prepare(&format!("SELECT {CONFIG_COLUMNS} FROM config ORDER BY key"))?;
        stmt
          .query_map([], RawConfig::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?
      };
      Ok(rows)
    })?;

    raws.into_iter().map(RawConfig::into_config).collect()
  }

  fn reset_config(&self, key: &str) -> Result<Configuration> {
    let default = defaults::get(key)
      .ok_or_else(|| Error::NotFound { entity: "config default", key: key.to_owned() })?;
    let config = default.to_configuration()?;
    info!(key, value = default.value, "configuration reset to default");
    self.set_config(&config)
  }

  // ── Discovery log ─────────────────────────────────────────────────────

  fn append_discovery(&self, input: NewDiscovery) -> Result<DiscoveryLogEntry> {
    let entry = DiscoveryLogEntry::new(input)?;

    let id = self.with_transaction(|tx| {
      tx.execute(
        "INSERT INTO discovery_log (
           part_number, invoice_number, invoice_date, discovered_price,
           authorized_price, action_taken, user_decision, discovery_date,
           processing_session_id, notes
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        rusqlite::params![
          entry.part_number(),
          entry.invoice_number(),
          entry.invoice_date(),
          entry.discovered_price().map(encode_decimal),
          entry.authorized_price().map(encode_decimal),
          entry.action_taken().as_str(),
          entry.user_decision(),
          encode_dt(entry.discovery_date()),
          entry.processing_session_id(),
          entry.notes(),
        ],
      )?;
      Ok(tx.last_insert_rowid())
    })?;

    Ok(entry.with_id(id))
  }

  fn list_discoveries(&self, filter: &DiscoveryFilter) -> Result<Vec<DiscoveryLogEntry>> {
    let mut conds: Vec<String> = vec![];
    let mut params: Vec<String> = vec![];

    for (column, value) in [
      ("part_number", &filter.part_number),
      ("processing_session_id", &filter.session_id),
      ("invoice_number", &filter.invoice_number),
    ] {
      if let Some(v) = value {
        params.push(v.clone());
        conds.push(format!("{column} = ?{}", params.len()));
      }
    }

    let where_clause = if conds.is_empty() {
      String::new()
    } else {
      format!("WHERE {}", conds.join(" AND "))
    };
    let limit_clause = filter.limit.map(|n| format!("LIMIT {n}")).unwrap_or_default();
    let sql = format!(
      "SELECT {DISCOVERY_COLUMNS} FROM discovery_log {where_clause}
       ORDER BY discovery_date DESC, id DESC {limit_clause}"
    );

    let raws = self.with_connection(|conn| {
      let mut stmt = conn.prepare(&sql)?;
      let rows = stmt
        .query_map(rusqlite::params_from_iter(params.iter()), RawDiscovery::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
      Ok(rows)
    })?;

    raws.into_iter().map(RawDiscovery::into_entry).collect()
  }

  fn purge_discoveries_older_than(&self, days: u32) -> Result<u64> {
    // A window reaching past the earliest representable date keeps everything.
    let Some(cutoff) = TimeDelta::try_days(i64::from(days))
      .and_then(|window| Utc::now().checked_sub_signed(window))
    else {
      debug!(days, "retention window exceeds the calendar; nothing to purge");
      return Ok(0);
    };
    let cutoff = encode_dt(cutoff);
    let removed = self.with_transaction(|tx| {
      Ok(tx.execute(
        "DELETE FROM discovery_log WHERE discovery_date < ?1",
        rusqlite::params![cutoff],
      )?)
    })?;
    info!(days, removed, "purged old discovery log entries");
    Ok(removed as u64)
  }

  // ── Introspection ─────────────────────────────────────────────────────

  fn stats(&self) -> Result<StoreStats> {
    let (total_parts, active_parts, config_entries, discovery_entries, schema_version) =
      self.with_connection(|conn| {
        Ok((
          count(conn, "SELECT COUNT(*) FROM parts")?,
          count(conn, "SELECT COUNT(*) FROM parts WHERE is_active = 1")?,
          count(conn, &format!("SELECT COUNT(*) FROM config WHERE key != '{VERSION_KEY}'"))?,
          count(conn, "SELECT COUNT(*) FROM discovery_log")?,
          read_version(conn),
        ))
      })?;

    Ok(StoreStats {
      total_parts,
      active_parts,
      config_entries,
      discovery_entries,
      file_size_bytes: self.file_size()?,
      schema_version,
    })
  }
}
