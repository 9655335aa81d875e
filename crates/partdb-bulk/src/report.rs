//! The uniform result of every bulk operation.

use std::fmt;

use partdb_core::{part::FieldChange, store::DeleteMode};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::warn;

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BulkOperation {
  Update,
  Delete,
  Activate,
  Import,
}

impl fmt::Display for BulkOperation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Self::Update => "update",
      Self::Delete => "delete",
      Self::Activate => "activate",
      Self::Import => "import",
    })
  }
}

/// A row that could not be applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowError {
  pub line:        u64,
  pub part_number: Option<String>,
  pub message:     String,
}

/// A change a dry run would have made.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PreviewEntry {
  Update {
    line:          u64,
    composite_key: String,
    part_number:   Option<String>,
    changes:       Vec<FieldChange>,
  },
  Delete {
    line:          u64,
    composite_key: String,
    part_number:   Option<String>,
    mode:          DeleteMode,
  },
  Activate {
    line:          u64,
    composite_key: String,
    part_number:   Option<String>,
  },
  Create {
    line:             u64,
    composite_key:    String,
    part_number:      Option<String>,
    authorized_price: Decimal,
  },
}

/// Outcome of a bulk run.
///
/// `success` is false only for file-level failures, in which case `error`
/// says why and no row was touched. Row-level problems are tallied instead.
#[derive(Debug, Clone, Serialize)]
pub struct BulkReport {
  pub success:            bool,
  pub operation:          BulkOperation,
  /// Parts updated, deleted, activated or imported (or that would be, in a
  /// dry run).
  pub affected_count:     usize,
  /// Already-active parts (activate), already-inactive parts (soft delete),
  /// rows with nothing to change, and skipped duplicates (import).
  pub unchanged_count:    usize,
  pub not_found_count:    usize,
  pub filtered_out_count: usize,
  pub error_count:        usize,
  pub errors:             Vec<RowError>,
  pub batches_processed:  usize,
  pub dry_run:            bool,
  pub preview:            Vec<PreviewEntry>,
  /// Processing session tag written to the discovery log (import only).
  #[serde(skip_serializing_if = "Option::is_none")]
  pub session_id:         Option<String>,
  pub error:              Option<String>,
}

impl BulkReport {
  pub(crate) fn new(operation: BulkOperation, dry_run: bool) -> Self {
    Self {
      success: true,
      operation,
      affected_count: 0,
      unchanged_count: 0,
      not_found_count: 0,
      filtered_out_count: 0,
      error_count: 0,
      errors: vec![],
      batches_processed: 0,
      dry_run,
      preview: vec![],
      session_id: None,
      error: None,
    }
  }

  pub(crate) fn fail(mut self, error: Error) -> Self {
    warn!(operation = %self.operation, error = %error, "bulk operation aborted");
    self.success = false;
    self.error = Some(error.to_string());
    self
  }

  pub(crate) fn row_error(&mut self, line: u64, part_number: Option<&str>, message: impl Into<String>) {
    let message = message.into();
    warn!(operation = %self.operation, line, part_number, error = %message, "bulk row failed");
    self.push_error(RowError { line, part_number: part_number.map(str::to_owned), message });
  }

  pub(crate) fn push_error(&mut self, error: RowError) {
    self.error_count += 1;
    self.errors.push(error);
  }

  /// Rows that reached a terminal state, whatever it was.
  pub fn rows_accounted(&self) -> usize {
    self.affected_count
      + self.unchanged_count
      + self.not_found_count
      + self.filtered_out_count
      + self.error_count
  }
}
