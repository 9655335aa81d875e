//! Error type for `partdb-store-sqlite`.

use rusqlite::ErrorCode;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("validation error: {0}")]
  Validation(#[from] partdb_core::ValidationError),

  #[error("{entity} not found: {key}")]
  NotFound { entity: &'static str, key: String },

  #[error("{entity} already exists: {key}")]
  AlreadyExists { entity: &'static str, key: String },

  #[error("database error: {0}")]
  Database(#[from] rusqlite::Error),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("decimal parse error: {0}")]
  Decimal(#[from] rust_decimal::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("migration failed: {0}")]
  Migration(String),

  /// The store's connection has been released and cannot be reopened.
  #[error("store connection is closed")]
  Closed,

  #[error("store connection lock poisoned")]
  Poisoned,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Coarse classification of a storage failure, so callers can decide whether
/// to retry (lock contention) or abort (corruption, missing schema).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageErrorKind {
  Locked,
  MissingSchema,
  DiskFull,
  PermissionDenied,
  Corrupted,
  NotFound,
  Constraint,
  Invalid,
  Other,
}

impl Error {
  pub fn kind(&self) -> StorageErrorKind {
    match self {
      Self::Validation(_) | Self::Decimal(_) | Self::DateParse(_) => {
        StorageErrorKind::Invalid
      }
      Self::NotFound { .. } => StorageErrorKind::NotFound,
      Self::AlreadyExists { .. } => StorageErrorKind::Constraint,
      Self::Database(e) => classify_sqlite(e),
      Self::Io(e) => classify_io(e),
      Self::Migration(_) | Self::Closed | Self::Poisoned => StorageErrorKind::Other,
    }
  }

  /// Only lock contention is worth retrying.
  pub fn is_retryable(&self) -> bool { self.kind() == StorageErrorKind::Locked }

  pub fn is_not_found(&self) -> bool { matches!(self, Self::NotFound { .. }) }
}

fn classify_sqlite(e: &rusqlite::Error) -> StorageErrorKind {
  if matches!(e, rusqlite::Error::QueryReturnedNoRows) {
    return StorageErrorKind::NotFound;
  }
  match e.sqlite_error_code() {
    Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => StorageErrorKind::Locked,
    Some(ErrorCode::DatabaseCorrupt | ErrorCode::NotADatabase) => {
      StorageErrorKind::Corrupted
    }
    Some(ErrorCode::DiskFull) => StorageErrorKind::DiskFull,
    Some(ErrorCode::PermissionDenied | ErrorCode::ReadOnly | ErrorCode::CannotOpen) => {
      StorageErrorKind::PermissionDenied
    }
    Some(ErrorCode::ConstraintViolation) => StorageErrorKind::Constraint,
    _ => {
      let msg = e.to_string();
      if msg.contains("no such table") || msg.contains("no such column") {
        StorageErrorKind::MissingSchema
      } else {
        StorageErrorKind::Other
      }
    }
  }
}

fn classify_io(e: &std::io::Error) -> StorageErrorKind {
  match e.kind() {
    std::io::ErrorKind::NotFound => StorageErrorKind::NotFound,
    std::io::ErrorKind::PermissionDenied => StorageErrorKind::PermissionDenied,
    std::io::ErrorKind::StorageFull => StorageErrorKind::DiskFull,
    _ => StorageErrorKind::Other,
  }
}
