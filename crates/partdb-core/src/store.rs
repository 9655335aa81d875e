//! The `PartStore` trait and supporting query types.
//!
//! Implemented by storage backends (e.g. `partdb-store-sqlite`). The bulk
//! engine and the CLI depend on this abstraction rather than on a concrete
//! backend. All calls are synchronous and blocking.

use serde::Serialize;

use crate::{
  config::Configuration,
  discovery::{DiscoveryLogEntry, NewDiscovery},
  part::{Part, PartSource},
};

// ─── Query types ─────────────────────────────────────────────────────────────

/// Parameters for [`PartStore::list_parts`].
#[derive(Debug, Clone, Default)]
pub struct PartFilter {
  pub active_only: bool,
  pub category:    Option<String>,
  pub source:      Option<PartSource>,
  pub limit:       Option<usize>,
}

/// Parameters for [`PartStore::list_discoveries`].
#[derive(Debug, Clone, Default)]
pub struct DiscoveryFilter {
  pub part_number:    Option<String>,
  pub session_id:     Option<String>,
  pub invoice_number: Option<String>,
  pub limit:          Option<usize>,
}

/// Whether a delete keeps the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeleteMode {
  /// Mark the part inactive.
  #[default]
  Soft,
  /// Remove the row permanently.
  Hard,
}

/// Point-in-time counts describing a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreStats {
  pub total_parts:       u64,
  pub active_parts:      u64,
  /// Settings only; the schema version marker is not counted.
  pub config_entries:    u64,
  pub discovery_entries: u64,
  /// `None` for in-memory stores.
  pub file_size_bytes:   Option<u64>,
  pub schema_version:    String,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a parts store backend.
///
/// Every write runs in its own transaction; a failed write leaves no partial
/// row behind. Lookups that name a missing entity fail with the backend's
/// not-found error.
pub trait PartStore {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Parts ─────────────────────────────────────────────────────────────

  /// Persist a new part and return it with its storage id attached.
  fn create_part(&self, part: Part) -> Result<Part, Self::Error>;

  /// Fetch a part (active or not) by composite key.
  fn get_part(&self, composite_key: &str) -> Result<Part, Self::Error>;

  /// Like [`get_part`](Self::get_part), but a missing key is `Ok(None)`.
  fn find_part(&self, composite_key: &str) -> Result<Option<Part>, Self::Error>;

  /// All parts whose part number equals `part_number` once both are
  /// normalised the way composite key components are.
  fn find_parts_by_number(&self, part_number: &str) -> Result<Vec<Part>, Self::Error>;

  /// Overwrite the stored row for `part` (matched by storage id).
  fn update_part(&self, part: &Part) -> Result<Part, Self::Error>;

  fn delete_part(&self, composite_key: &str, mode: DeleteMode) -> Result<(), Self::Error>;

  fn list_parts(&self, filter: &PartFilter) -> Result<Vec<Part>, Self::Error>;

  // ── Configuration ─────────────────────────────────────────────────────

  fn get_config(&self, key: &str) -> Result<Configuration, Self::Error>;

  /// Insert or replace a configuration entry.
  fn set_config(&self, config: &Configuration) -> Result<Configuration, Self::Error>;

  fn list_config(&self, category: Option<&str>) -> Result<Vec<Configuration>, Self::Error>;

  /// Restore `key` to its registered default.
  fn reset_config(&self, key: &str) -> Result<Configuration, Self::Error>;

  // ── Discovery log ─────────────────────────────────────────────────────

  fn append_discovery(&self, entry: NewDiscovery) -> Result<DiscoveryLogEntry, Self::Error>;

  fn list_discoveries(
    &self,
    filter: &DiscoveryFilter,
  ) -> Result<Vec<DiscoveryLogEntry>, Self::Error>;

  /// Delete entries older than `days`; returns how many were removed.
  fn purge_discoveries_older_than(&self, days: u32) -> Result<u64, Self::Error>;

  // ── Introspection ─────────────────────────────────────────────────────

  fn stats(&self) -> Result<StoreStats, Self::Error>;
}
