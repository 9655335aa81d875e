//! CSV-driven batch operations over a [`PartStore`].
//!
//! Every operation follows the same pipeline:
//!
//! ```text
//! read_table()            file-level checks; the only way to fail a run
//!   └─ chunks(batch_size)
//!        └─ per row       normalise → look up → filter → apply or preview
//! ```
//!
//! Each row is persisted by its own store call, so a failing row never
//! undoes the rows before it.

use std::{collections::HashMap, path::Path};

use partdb_core::{
  discovery::{DiscoveryAction, NewDiscovery},
  part::{NewPart, Part, PartField, PartPatch, PartSource},
  store::{DeleteMode, PartStore},
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
  error::Error,
  input::{CsvRow, CsvTable, parse_price, read_table},
  report::{BulkOperation, BulkReport, PreviewEntry},
};

pub const DEFAULT_BATCH_SIZE: usize = 50;

// ─── Options ─────────────────────────────────────────────────────────────────

/// Settings shared by every operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
  /// Only touch parts whose category equals this (after trimming).
  pub filter_category: Option<String>,
  /// Rows per batch; 0 is treated as 1.
  pub batch_size:      usize,
  /// Preview instead of persisting.
  pub dry_run:         bool,
}

impl Default for RunOptions {
  fn default() -> Self {
    Self { filter_category: None, batch_size: DEFAULT_BATCH_SIZE, dry_run: false }
  }
}

#[derive(Debug, Clone, Default)]
pub struct UpdateOptions {
  /// Columns allowed to change; `None` allows every recognised column.
  pub fields: Option<Vec<PartField>>,
  pub run:    RunOptions,
}

#[derive(Debug, Clone, Default)]
pub struct DeleteOptions {
  pub mode:  DeleteMode,
  /// Required for a hard delete that is not a dry run.
  pub force: bool,
  pub run:   RunOptions,
}

#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
  /// Update parts whose composite key already exists instead of skipping them.
  pub update_existing: bool,
  pub run:             RunOptions,
}

// ─── Engine ──────────────────────────────────────────────────────────────────

/// Applies CSV files to a store.
pub struct BulkEngine<'a, S> {
  store: &'a S,
}

impl<'a, S: PartStore> BulkEngine<'a, S> {
  pub fn new(store: &'a S) -> Self { Self { store } }

  /// Update the listed fields of each part named in `path`.
  pub fn bulk_update(&self, path: &Path, options: &UpdateOptions) -> BulkReport {
    let report = BulkReport::new(BulkOperation::Update, options.run.dry_run);
    let table = match read_table(path) {
      Ok(t) => t,
      Err(e) => return report.fail(e),
    };

    let mut columns = table.fields.clone();
    if let Some(allowed) = &options.fields {
      columns.retain(|f| allowed.contains(f));
    }
    if columns.is_empty() {
      let expected = options.fields.as_deref().unwrap_or(&PartField::ALL);
      let names: Vec<&str> = expected.iter().map(|f| f.column()).collect();
      return report.fail(Error::NoMutableColumns(names.join(", ")));
    }

    self.run(table, &options.run, report, |report, row| {
      self.update_row(report, row, &columns, &options.run);
    })
  }

  /// Soft- or hard-delete each part named in `path`.
  pub fn bulk_delete(&self, path: &Path, options: &DeleteOptions) -> BulkReport {
    let report = BulkReport::new(BulkOperation::Delete, options.run.dry_run);
    if options.mode == DeleteMode::Hard && !options.force && !options.run.dry_run {
      return report.fail(Error::ForceRequired);
    }
    let table = match read_table(path) {
      Ok(t) => t,
      Err(e) => return report.fail(e),
    };

    self.run(table, &options.run, report, |report, row| {
      self.delete_row(report, row, options.mode, &options.run);
    })
  }

  /// Reactivate each part named in `path`.
  pub fn bulk_activate(&self, path: &Path, options: &RunOptions) -> BulkReport {
    let report = BulkReport::new(BulkOperation::Activate, options.dry_run);
    let table = match read_table(path) {
      Ok(t) => t,
      Err(e) => return report.fail(e),
    };

    self.run(table, options, report, |report, row| {
      self.activate_row(report, row, options);
    })
  }

  /// Create parts from `path`, keyed by composite key. Every persisted row
  /// is recorded in the discovery log under one session id.
  pub fn bulk_import(&self, path: &Path, options: &ImportOptions) -> BulkReport {
    let mut report = BulkReport::new(BulkOperation::Import, options.run.dry_run);
    let table = match read_table(path) {
      Ok(t) => t,
      Err(e) => return report.fail(e),
    };
    if !table.fields.contains(&PartField::AuthorizedPrice) {
      return report.fail(Error::MissingColumn("authorized_price"));
    }

    let session_id = Uuid::new_v4().to_string();
    report.session_id = Some(session_id.clone());
    let source_name = path
      .file_name()
      .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());

    let mut seen: HashMap<String, u64> = HashMap::new();
    let ctx = ImportContext { options, session_id: &session_id, source_name: &source_name };
    self.run(table, &options.run, report, |report, row| {
      self.import_row(report, row, &ctx, &mut seen);
    })
  }

  // ── Pipeline ──────────────────────────────────────────────────────────

  fn run(
    &self,
    table: CsvTable,
    options: &RunOptions,
    mut report: BulkReport,
    mut each: impl FnMut(&mut BulkReport, &CsvRow),
  ) -> BulkReport {
    for err in table.unreadable {
      warn!(line = err.line, error = %err.message, "unreadable CSV record");
      report.push_error(err);
    }

    let size = options.batch_size.max(1);
    for (idx, batch) in table.rows.chunks(size).enumerate() {
      for row in batch {
        each(&mut report, row);
      }
      report.batches_processed += 1;
      info!(
        operation = %report.operation,
        batch = idx + 1,
        rows = batch.len(),
        affected = report.affected_count,
        errors = report.error_count,
        "bulk batch processed"
      );
    }

    info!(
      operation = %report.operation,
      dry_run = report.dry_run,
      affected = report.affected_count,
      unchanged = report.unchanged_count,
      not_found = report.not_found_count,
      filtered_out = report.filtered_out_count,
      errors = report.error_count,
      "bulk operation finished"
    );
    report
  }

  /// Resolve the part a row names, counting misses and filtered rows.
  /// Rows without a part number are skipped silently.
  fn target(&self, report: &mut BulkReport, row: &CsvRow, options: &RunOptions) -> Option<Part> {
    let number = row.part_number.as_deref()?;

    let mut found = match self.store.find_parts_by_number(number) {
      Ok(found) => found,
      Err(e) => {
        report.row_error(row.line, Some(number), e.to_string());
        return None;
      }
    };
    let part = match found.len() {
      0 => {
        report.not_found_count += 1;
        debug!(line = row.line, part_number = number, "part not found");
        return None;
      }
      1 => found.remove(0),
      n => {
        report.row_error(
          row.line,
          Some(number),
          format!("part number {number} is ambiguous ({n} parts match)"),
        );
        return None;
      }
    };

    if let Some(wanted) = &options.filter_category
      && part.category().map(str::trim) != Some(wanted.trim())
    {
      report.filtered_out_count += 1;
      return None;
    }
    Some(part)
  }

  // ── Operations ────────────────────────────────────────────────────────

  fn update_row(
    &self,
    report: &mut BulkReport,
    row: &CsvRow,
    columns: &[PartField],
    options: &RunOptions,
  ) {
    let Some(part) = self.target(report, row, options) else {
      return;
    };
    let number = row.part_number.as_deref();
    let patch = match row_patch(row, columns) {
      Ok(p) => p,
      Err(msg) => return report.row_error(row.line, number, msg),
    };

    let changes = patch.changes(&part);
    if changes.is_empty() {
      report.unchanged_count += 1;
      return;
    }
    let updated = match part.apply(&patch) {
      Ok(p) => p,
      Err(e) => return report.row_error(row.line, number, e.reason()),
    };

    if options.dry_run {
      report.affected_count += 1;
      report.preview.push(PreviewEntry::Update {
        line: row.line,
        composite_key: part.composite_key().to_owned(),
        part_number: part.part_number().map(str::to_owned),
        changes,
      });
      return;
    }

    match self.store.update_part(&updated) {
      Ok(_) => report.affected_count += 1,
      Err(e) => report.row_error(row.line, number, e.to_string()),
    }
  }

  fn delete_row(&self, report: &mut BulkReport, row: &CsvRow, mode: DeleteMode, options: &RunOptions) {
    let Some(part) = self.target(report, row, options) else {
      return;
    };
    if mode == DeleteMode::Soft && !part.is_active() {
      report.unchanged_count += 1;
      return;
    }

    if options.dry_run {
      report.affected_count += 1;
      report.preview.push(PreviewEntry::Delete {
        line: row.line,
        composite_key: part.composite_key().to_owned(),
        part_number: part.part_number().map(str::to_owned),
        mode,
      });
      return;
    }

    match self.store.delete_part(part.composite_key(), mode) {
      Ok(()) => report.affected_count += 1,
      Err(e) => report.row_error(row.line, row.part_number.as_deref(), e.to_string()),
    }
  }

  fn activate_row(&self, report: &mut BulkReport, row: &CsvRow, options: &RunOptions) {
    let Some(part) = self.target(report, row, options) else {
      return;
    };
    if part.is_active() {
      report.unchanged_count += 1;
      return;
    }

    if options.dry_run {
      report.affected_count += 1;
      report.preview.push(PreviewEntry::Activate {
        line: row.line,
        composite_key: part.composite_key().to_owned(),
        part_number: part.part_number().map(str::to_owned),
      });
      return;
    }

    match self.store.update_part(&part.with_active(true)) {
      Ok(_) => report.affected_count += 1,
      Err(e) => report.row_error(row.line, row.part_number.as_deref(), e.to_string()),
    }
  }

  fn import_row(
    &self,
    report: &mut BulkReport,
    row: &CsvRow,
    ctx: &ImportContext<'_>,
    seen: &mut HashMap<String, u64>,
  ) {
    let number = row.part_number.as_deref();
    if number.is_none()
      && row.cell(PartField::Description).is_none()
      && row.cell(PartField::ItemType).is_none()
    {
      return;
    }

    let Some(raw_price) = row.cell(PartField::AuthorizedPrice) else {
      return report.row_error(row.line, number, "authorized price is required");
    };
    let price = match parse_price(raw_price) {
      Ok(p) => p,
      Err(msg) => return report.row_error(row.line, number, msg),
    };

    let mut input = NewPart::new(price);
    input.part_number = row.part_number.clone();
    input.description = row.cell(PartField::Description).map(str::to_owned);
    input.item_type = row.cell(PartField::ItemType).map(str::to_owned);
    input.category = row.cell(PartField::Category).map(str::to_owned);
    input.notes = row.cell(PartField::Notes).map(str::to_owned);
    input.source = PartSource::Imported;
    let part = match Part::new(input) {
      Ok(p) => p,
      Err(e) => return report.row_error(row.line, number, e.reason()),
    };

    let key = part.composite_key().to_owned();
    if let Some(first) = seen.get(&key) {
      debug!(line = row.line, first_line = first, key = %key, "duplicate row in import file");
      report.unchanged_count += 1;
      return;
    }

    let existing = match self.store.find_part(&key) {
      Ok(existing) => existing,
      Err(e) => return report.row_error(row.line, number, e.to_string()),
    };

    // A key is only settled once a row for it goes through; a later
    // duplicate of a failed row gets its own attempt.
    let errors_before = report.error_count;
    match existing {
      None => self.import_new(report, row, part, ctx),
      Some(_) if !ctx.options.update_existing => report.unchanged_count += 1,
      Some(current) => {
        // Identity columns already match; only the payload can change.
        let patch = PartPatch {
          authorized_price: Some(price),
          category: part.category().map(str::to_owned),
          notes: part.notes().map(str::to_owned),
          ..Default::default()
        };
        self.import_existing(report, row, current, &patch, ctx);
      }
    }
    if report.error_count == errors_before {
      seen.insert(key, row.line);
    }
  }

  fn import_new(&self, report: &mut BulkReport, row: &CsvRow, part: Part, ctx: &ImportContext<'_>) {
    if ctx.options.run.dry_run {
      report.affected_count += 1;
      report.preview.push(PreviewEntry::Create {
        line:             row.line,
        composite_key:    part.composite_key().to_owned(),
        part_number:      part.part_number().map(str::to_owned),
        authorized_price: part.authorized_price(),
      });
      return;
    }

    match self.store.create_part(part) {
      Ok(created) => {
        report.affected_count += 1;
        self.log_import(&created, DiscoveryAction::Added, ctx);
      }
      Err(e) => report.row_error(row.line, row.part_number.as_deref(), e.to_string()),
    }
  }

  fn import_existing(
    &self,
    report: &mut BulkReport,
    row: &CsvRow,
    current: Part,
    patch: &PartPatch,
    ctx: &ImportContext<'_>,
  ) {
    let changes = patch.changes(&current);
    if changes.is_empty() {
      report.unchanged_count += 1;
      return;
    }
    let updated = match current.apply(patch) {
      Ok(p) => p,
      Err(e) => return report.row_error(row.line, row.part_number.as_deref(), e.reason()),
    };

    if ctx.options.run.dry_run {
      report.affected_count += 1;
      report.preview.push(PreviewEntry::Update {
        line: row.line,
        composite_key: current.composite_key().to_owned(),
        part_number: current.part_number().map(str::to_owned),
        changes,
      });
      return;
    }

    match self.store.update_part(&updated) {
      Ok(saved) => {
        report.affected_count += 1;
        self.log_import(&saved, DiscoveryAction::Updated, ctx);
      }
      Err(e) => report.row_error(row.line, row.part_number.as_deref(), e.to_string()),
    }
  }

  fn log_import(&self, part: &Part, action: DiscoveryAction, ctx: &ImportContext<'_>) {
    let mut entry = NewDiscovery::new(part.label(), action);
    entry.authorized_price = Some(part.authorized_price());
    entry.processing_session_id = Some(ctx.session_id.to_owned());
    entry.notes = Some(format!("bulk import from {}", ctx.source_name));
    if let Err(e) = self.store.append_discovery(entry) {
      warn!(key = part.composite_key(), error = %e, "failed to record import in discovery log");
    }
  }
}

struct ImportContext<'o> {
  options:     &'o ImportOptions,
  session_id:  &'o str,
  source_name: &'o str,
}

/// Build the patch a row describes, limited to `columns`.
fn row_patch(row: &CsvRow, columns: &[PartField]) -> Result<PartPatch, String> {
  let mut patch = PartPatch::default();
  for field in columns {
    let Some(value) = row.cell(*field) else {
      continue;
    };
    match field {
      PartField::AuthorizedPrice => patch.authorized_price = Some(parse_price(value)?),
      PartField::Description => patch.description = Some(value.to_owned()),
      PartField::Category => patch.category = Some(value.to_owned()),
      PartField::ItemType => patch.item_type = Some(value.to_owned()),
      PartField::Notes => patch.notes = Some(value.to_owned()),
    }
  }
  Ok(patch)
}
