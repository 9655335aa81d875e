//! Schema migrations and verification.
//!
//! Every schema version is applied as one complete, idempotent DDL script in
//! a single transaction together with its version marker. A failed script
//! leaves the store exactly as it was.

use chrono::Utc;
use partdb_core::defaults;
use rusqlite::Connection;
use serde::Serialize;
use tracing::{info, warn};

use crate::{
  Result, SqliteStore,
  encode::encode_dt,
  schema::{
    REQUIRED_INDEXES, REQUIRED_TABLES, REQUIRED_TRIGGERS, REQUIRED_VIEWS, SchemaVersion,
    UNVERSIONED, VERSION_KEY, VERSIONS,
  },
};

// ─── Outcomes ────────────────────────────────────────────────────────────────

/// Result of a migration attempt. Failures are reported here, never raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationOutcome {
  pub success:      bool,
  pub from_version: String,
  pub to_version:   String,
  /// False when the store was already at the target version.
  pub applied:      bool,
  pub error:        Option<String>,
}

impl MigrationOutcome {
  fn failed(from: &str, to: &str, error: impl Into<String>) -> Self {
    Self {
      success:      false,
      from_version: from.to_owned(),
      to_version:   to.to_owned(),
      applied:      false,
      error:        Some(error.into()),
    }
  }
}

/// A schema object that is missing or out of date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum SchemaIssue {
  MissingTable { name: String },
  MissingIndex { name: String },
  MissingView { name: String },
  MissingTrigger { name: String },
  MissingVersionMarker,
  VersionMismatch { found: String, expected: String },
}

/// Findings from [`MigrationManager::verify_schema`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaReport {
  pub expected_version: String,
  pub found_version:    String,
  pub issues:           Vec<SchemaIssue>,
}

impl SchemaReport {
  pub fn is_valid(&self) -> bool { self.issues.is_empty() }
}

// ─── Manager ─────────────────────────────────────────────────────────────────

/// Applies and verifies schema versions on a [`SqliteStore`].
pub struct MigrationManager<'a> {
  store: &'a SqliteStore,
}

impl<'a> MigrationManager<'a> {
  pub fn new(store: &'a SqliteStore) -> Self { Self { store } }

  /// The persisted version marker, or `"0.0"` if it cannot be read.
  pub fn current_version(&self) -> String {
    self
      .store
      .with_connection(|conn| Ok(read_version(conn)))
      .unwrap_or_else(|_| UNVERSIONED.to_owned())
  }

  /// The highest known schema version.
  pub fn latest_version() -> &'static str {
    VERSIONS
      .iter()
      .max_by_key(|v| parse_version(v.version))
      .map_or(UNVERSIONED, |v| v.version)
  }

  pub fn migrate_to_latest(&self) -> MigrationOutcome {
    self.migrate_to_version(Self::latest_version())
  }

  /// Bring the store to `target`. Downgrades and unknown versions fail.
  pub fn migrate_to_version(&self, target: &str) -> MigrationOutcome {
    let from = self.current_version();

    let Some(schema) = VERSIONS.iter().find(|v| v.version == target) else {
      warn!(target, "unknown schema version requested");
      return MigrationOutcome::failed(&from, target, format!("unknown schema version {target}"));
    };

    if from == target {
      info!(version = target, "schema already up to date");
      return MigrationOutcome {
        success:      true,
        from_version: from,
        to_version:   target.to_owned(),
        applied:      false,
        error:        None,
      };
    }

    if parse_version(&from) > parse_version(target) {
      return MigrationOutcome::failed(
        &from,
        target,
        format!("cannot downgrade schema from {from} to {target}"),
      );
    }

    info!(from = %from, to = target, "applying schema migration");
    match self.apply(schema) {
      Ok(()) => {
        info!(version = target, "schema migration complete");
        MigrationOutcome {
          success:      true,
          from_version: from,
          to_version:   target.to_owned(),
          applied:      true,
          error:        None,
        }
      }
      Err(e) => {
        warn!(from = %from, to = target, error = %e, "schema migration failed");
        MigrationOutcome::failed(&from, target, e.to_string())
      }
    }
  }

  fn apply(&self, schema: &SchemaVersion) -> Result<()> {
    let now = encode_dt(Utc::now());
    self.store.with_transaction(|tx| {
      tx.execute_batch(schema.ddl)?;

      for default in defaults::all() {
        tx.execute(
          "INSERT OR IGNORE INTO config
             (key, value, data_type, description, category, created_at, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
          rusqlite::params![
            default.key,
            default.value,
            default.data_type.as_str(),
            default.description,
            default.category,
            now,
          ],
        )?;
      }

      tx.execute(
        "INSERT INTO config (key, value, data_type, description, category, created_at, updated_at)
         VALUES (?1, ?2, 'string', 'Applied schema version', 'system', ?3, ?3)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        rusqlite::params![VERSION_KEY, schema.version, now],
      )?;
      Ok(())
    })
  }

  /// Check every required schema object. Never fails; unreadable catalogs
  /// show up as missing objects.
  pub fn verify_schema(&self) -> SchemaReport {
    let expected = Self::latest_version().to_owned();

    let probe = self.store.with_connection(|conn| {
      let mut issues = vec![];
      let groups: [(&str, &[&str], fn(String) -> SchemaIssue); 4] = [
        ("table", REQUIRED_TABLES, |name| SchemaIssue::MissingTable { name }),
        ("index", REQUIRED_INDEXES, |name| SchemaIssue::MissingIndex { name }),
        ("view", REQUIRED_VIEWS, |name| SchemaIssue::MissingView { name }),
        ("trigger", REQUIRED_TRIGGERS, |name| SchemaIssue::MissingTrigger { name }),
      ];
      for (kind, names, issue) in groups {
        for name in names {
          if !object_exists(conn, kind, name)? {
            issues.push(issue((*name).to_owned()));
          }
        }
      }
      Ok((issues, read_marker(conn)))
    });

    let (mut issues, marker) = match probe {
      Ok(found) => found,
      Err(e) => {
        warn!(error = %e, "schema catalog unreadable");
        let all = REQUIRED_TABLES
          .iter()
          .map(|n| SchemaIssue::MissingTable { name: (*n).to_owned() })
          .collect();
        (all, None)
      }
    };

    let found = match marker {
      None => {
        issues.push(SchemaIssue::MissingVersionMarker);
        UNVERSIONED.to_owned()
      }
      Some(v) => {
        if v != expected {
          issues.push(SchemaIssue::VersionMismatch { found: v.clone(), expected: expected.clone() });
        }
        v
      }
    };

    SchemaReport { expected_version: expected, found_version: found, issues }
  }
}

fn object_exists(conn: &Connection, kind: &str, name: &str) -> Result<bool> {
  let n: i64 = conn.query_row(
    "SELECT COUNT(*) FROM sqlite_master WHERE type = ?1 AND name = ?2",
    rusqlite::params![kind, name],
    |r| r.get(0),
  )?;
  Ok(n > 0)
}

fn read_marker(conn: &Connection) -> Option<String> {
  conn
    .query_row("SELECT value FROM config WHERE key = ?1", rusqlite::params![VERSION_KEY], |r| {
      r.get::<_, String>(0)
    })
    .ok()
    .filter(|v| !v.trim().is_empty())
}

/// Read the version marker on an already-held connection.
pub(crate) fn read_version(conn: &Connection) -> String {
  read_marker(conn).unwrap_or_else(|| UNVERSIONED.to_owned())
}

/// Parse `major.minor`; anything unparsable sorts as `0.0`.
pub fn parse_version(v: &str) -> (u32, u32) {
  let mut parts = v.trim().splitn(2, '.');
  let major = parts.next().and_then(|p| p.parse().ok());
  let minor = parts.next().map_or(Some(0), |p| p.parse().ok());
  match (major, minor) {
    (Some(major), Some(minor)) => (major, minor),
    _ => (0, 0),
  }
}
