//! Engine tests against an in-memory `SqliteStore` and temp-file CSVs.

use std::{
  cell::Cell,
  fs, io,
  path::PathBuf,
  str::FromStr,
  sync::atomic::{AtomicUsize, Ordering},
};

use partdb_core::{
  config::Configuration,
  discovery::{DiscoveryLogEntry, NewDiscovery},
  part::{NewPart, Part, PartField, PartSource},
  store::{DeleteMode, DiscoveryFilter, PartFilter, PartStore, StoreStats},
};
use partdb_store_sqlite::{Error, SqliteStore};
use rust_decimal::Decimal;
use tempfile::TempDir;

use crate::{
  BulkEngine, BulkOperation, DeleteOptions, ImportOptions, PreviewEntry, RunOptions,
  UpdateOptions,
};

fn price(s: &str) -> Decimal { Decimal::from_str(s).unwrap() }

/// A store holding GP-1 (hardware), GP-2 (hardware) and GP-3 (labor).
fn seeded() -> SqliteStore {
  let s = SqliteStore::open_in_memory().unwrap();
  for (number, category, cost) in
    [("GP-1", "hardware", "1.00"), ("GP-2", "hardware", "2.00"), ("GP-3", "labor", "3.00")]
  {
    s.create_part(
      Part::new(NewPart::new(price(cost)).part_number(number).category(category)).unwrap(),
    )
    .unwrap();
  }
  s
}

fn csv(dir: &TempDir, body: &str) -> PathBuf {
  static NEXT: AtomicUsize = AtomicUsize::new(0);
  let path = dir.path().join(format!("input-{}.csv", NEXT.fetch_add(1, Ordering::Relaxed)));
  fs::write(&path, body).unwrap();
  path
}

fn get(s: &SqliteStore, number: &str) -> Part { s.get_part(&format!("||{number}")).unwrap() }

// ─── File-level failures ─────────────────────────────────────────────────────

#[test]
fn missing_file_fails_the_run() {
  let s = seeded();
  let report = BulkEngine::new(&s)
    .bulk_update(PathBuf::from("/nonexistent/x.csv").as_path(), &UpdateOptions::default());
  assert!(!report.success);
  assert!(report.error.unwrap().contains("not found"));
}

#[test]
fn missing_part_number_header_fails_before_any_row() {
  let s = seeded();
  let dir = tempfile::tempdir().unwrap();
  let path = csv(&dir, "sku,price\nGP-1,9.99\n");
  let report = BulkEngine::new(&s).bulk_update(&path, &UpdateOptions::default());
  assert!(!report.success);
  assert_eq!(report.batches_processed, 0);
  assert_eq!(get(&s, "GP-1").authorized_price(), price("1.00"));
}

#[test]
fn update_without_mutable_columns_is_rejected() {
  let s = seeded();
  let dir = tempfile::tempdir().unwrap();
  let path = csv(&dir, "part_number,colour\nGP-1,red\n");
  let report = BulkEngine::new(&s).bulk_update(&path, &UpdateOptions::default());
  assert!(!report.success);

  let path = csv(&dir, "part_number,notes\nGP-1,hello\n");
  let options = UpdateOptions { fields: Some(vec![PartField::AuthorizedPrice]), ..Default::default() };
  let report = BulkEngine::new(&s).bulk_update(&path, &options);
  assert!(!report.success);
}

#[test]
fn header_only_file_has_no_valid_rows() {
  let s = seeded();
  let dir = tempfile::tempdir().unwrap();
  let path = csv(&dir, "part_number,price\n");
  let report = BulkEngine::new(&s).bulk_activate(&path, &RunOptions::default());
  assert!(!report.success);
  assert_eq!(report.error.as_deref(), Some("no valid rows could be parsed"));
}

// ─── Update ──────────────────────────────────────────────────────────────────

#[test]
fn update_isolates_missing_rows() {
  let s = seeded();
  let dir = tempfile::tempdir().unwrap();
  let path = csv(&dir, "part_number,price\nGP-1,10.00\ngp-2,$20.50\nGP-404,1.00\n");

  let report = BulkEngine::new(&s).bulk_update(&path, &UpdateOptions::default());
  assert!(report.success);
  assert_eq!(report.operation, BulkOperation::Update);
  assert_eq!(report.affected_count, 2);
  assert_eq!(report.not_found_count, 1);
  assert_eq!(report.error_count, 0);
  assert_eq!(get(&s, "GP-1").authorized_price(), price("10"));
  assert_eq!(get(&s, "GP-2").authorized_price(), price("20.5"));
}

#[test]
fn update_finds_part_numbers_with_odd_spacing_and_accents() {
  let s = SqliteStore::open_in_memory().unwrap();
  for number in ["AB  12", "écrou-1"] {
    s.create_part(Part::new(NewPart::new(price("1")).part_number(number)).unwrap()).unwrap();
  }
  let dir = tempfile::tempdir().unwrap();
  let path = csv(&dir, "part_number,price
AB  12,5.00
écrou-1,6.00
");

  let report = BulkEngine::new(&s).bulk_update(&path, &UpdateOptions::default());
  assert_eq!(report.not_found_count, 0);
  assert_eq!(report.affected_count, 2);
  assert_eq!(s.get_part("||AB 12").unwrap().authorized_price(), price("5"));
  assert_eq!(s.get_part("||ÉCROU-1").unwrap().authorized_price(), price("6"));
}

#[test]
fn bad_rows_are_reported_not_fatal() {
  let s = seeded();
  let dir = tempfile::tempdir().unwrap();
  let path = csv(&dir, "Part_Number,PRICE,Notes\nGP-1,abc,x\nGP-2,-1,y\nGP-3,3.50,z\n");

  let report = BulkEngine::new(&s).bulk_update(&path, &UpdateOptions::default());
  assert!(report.success);
  assert_eq!(report.error_count, 2);
  assert_eq!(report.errors[0].line, 2);
  assert_eq!(report.errors[0].part_number.as_deref(), Some("GP-1"));
  assert_eq!(report.errors[1].line, 3);
  assert_eq!(report.affected_count, 1);
  assert_eq!(get(&s, "GP-3").notes(), Some("z"));
  assert_eq!(get(&s, "GP-1").notes(), None);
}

#[test]
fn update_touches_only_allowed_fields() {
  let s = seeded();
  let dir = tempfile::tempdir().unwrap();
  let path = csv(&dir, "part_number,price,category,notes\nGP-1,5.00,misc,note\n");
  let options = UpdateOptions { fields: Some(vec![PartField::Notes]), ..Default::default() };

  let report = BulkEngine::new(&s).bulk_update(&path, &options);
  assert_eq!(report.affected_count, 1);
  let part = get(&s, "GP-1");
  assert_eq!(part.notes(), Some("note"));
  assert_eq!(part.authorized_price(), price("1.00"));
  assert_eq!(part.category(), Some("hardware"));
}

#[test]
fn blank_cells_leave_fields_alone() {
  let s = seeded();
  let dir = tempfile::tempdir().unwrap();
  let path = csv(&dir, "part_number,price,notes\nGP-1,,kept\n,9.00,orphan\nGP-2,2.00,\n");

  let report = BulkEngine::new(&s).bulk_update(&path, &UpdateOptions::default());
  assert!(report.success);
  assert_eq!(report.affected_count, 1);
  // GP-2 already costs 2.00; the blank-key row is skipped silently.
  assert_eq!(report.unchanged_count, 1);
  assert_eq!(report.rows_accounted(), 2);
  assert_eq!(get(&s, "GP-1").authorized_price(), price("1.00"));
  assert_eq!(get(&s, "GP-1").notes(), Some("kept"));
}

#[test]
fn dry_run_changes_nothing() {
  let s = seeded();
  let dir = tempfile::tempdir().unwrap();
  let path = csv(&dir, "part_number,price,category\nGP-1,9.00,misc\nGP-2,2.00,hardware\nGP-9,1\n");
  let options = UpdateOptions {
    run: RunOptions { dry_run: true, ..Default::default() },
    ..Default::default()
  };

  let report = BulkEngine::new(&s).bulk_update(&path, &options);
  assert!(report.dry_run);
  assert_eq!(report.affected_count, 1);
  assert_eq!(report.preview.len(), 1);
  let PreviewEntry::Update { composite_key, changes, .. } = &report.preview[0] else {
    panic!("expected an update preview");
  };
  assert_eq!(composite_key, "||GP-1");
  assert_eq!(changes.len(), 2);
  assert_eq!(changes[0].old.as_deref(), Some("1.00"));
  assert_eq!(changes[0].new.as_deref(), Some("9.00"));

  let part = get(&s, "GP-1");
  assert_eq!(part.authorized_price(), price("1.00"));
  assert_eq!(part.category(), Some("hardware"));
}

#[test]
fn category_filter_excludes_other_parts() {
  let s = seeded();
  let dir = tempfile::tempdir().unwrap();
  let path = csv(&dir, "part_number,notes\nGP-1,a\nGP-2,b\nGP-3,c\n");
  let options = UpdateOptions {
    run: RunOptions { filter_category: Some(" labor ".into()), ..Default::default() },
    ..Default::default()
  };

  let report = BulkEngine::new(&s).bulk_update(&path, &options);
  assert_eq!(report.affected_count, 1);
  assert_eq!(report.filtered_out_count, 2);
  assert_eq!(get(&s, "GP-1").notes(), None);
  assert_eq!(get(&s, "GP-2").notes(), None);
  assert_eq!(get(&s, "GP-3").notes(), Some("c"));
}

#[test]
fn filtered_rows_are_not_parsed() {
  let s = seeded();
  let dir = tempfile::tempdir().unwrap();
  let path = csv(&dir, "part_number,price
GP-1,abc
GP-3,4.00
");
  let options = UpdateOptions {
    run: RunOptions { filter_category: Some("labor".into()), ..Default::default() },
    ..Default::default()
  };

  let report = BulkEngine::new(&s).bulk_update(&path, &options);
  assert_eq!(report.filtered_out_count, 1);
  assert_eq!(report.error_count, 0);
  assert_eq!(report.affected_count, 1);
  assert_eq!(get(&s, "GP-1").authorized_price(), price("1.00"));
}

#[test]
fn ambiguous_part_numbers_are_row_errors() {
  let s = seeded();
  s.create_part(
    Part::new(NewPart::new(price("4")).part_number("gp-1").description("variant")).unwrap(),
  )
  .unwrap();
  let dir = tempfile::tempdir().unwrap();
  let path = csv(&dir, "part_number,notes\nGP-1,x\n");

  let report = BulkEngine::new(&s).bulk_update(&path, &UpdateOptions::default());
  assert!(report.success);
  assert_eq!(report.error_count, 1);
  assert!(report.errors[0].message.contains("ambiguous"));
}

#[test]
fn batch_size_only_changes_batch_count() {
  let body = "part_number,notes\nGP-1,a\nGP-2,b\nGP-3,c\nGP-7,d\nGP-8,e\n";
  let dir = tempfile::tempdir().unwrap();
  let path = csv(&dir, body);

  let mut outcomes = vec![];
  for batch_size in [0, 2, 50] {
    let s = seeded();
    let options = UpdateOptions {
      run: RunOptions { batch_size, ..Default::default() },
      ..Default::default()
    };
    let report = BulkEngine::new(&s).bulk_update(&path, &options);
    outcomes.push((report.batches_processed, report.affected_count, report.not_found_count));
  }
  assert_eq!(outcomes, vec![(5, 3, 2), (3, 3, 2), (1, 3, 2)]);
}

// ─── Delete ──────────────────────────────────────────────────────────────────

#[test]
fn soft_delete_counts_already_inactive() {
  let s = seeded();
  s.delete_part("||GP-2", DeleteMode::Soft).unwrap();
  let dir = tempfile::tempdir().unwrap();
  let path = csv(&dir, "part_number\nGP-1\nGP-2\nGP-404\n");

  let report = BulkEngine::new(&s).bulk_delete(&path, &DeleteOptions::default());
  assert!(report.success);
  assert_eq!(report.affected_count, 1);
  assert_eq!(report.unchanged_count, 1);
  assert_eq!(report.not_found_count, 1);
  assert!(!get(&s, "GP-1").is_active());
}

#[test]
fn hard_delete_requires_force() {
  let s = seeded();
  let dir = tempfile::tempdir().unwrap();
  let path = csv(&dir, "part_number\nGP-1\n");

  let options = DeleteOptions { mode: DeleteMode::Hard, ..Default::default() };
  let report = BulkEngine::new(&s).bulk_delete(&path, &options);
  assert!(!report.success);
  assert!(s.find_part("||GP-1").unwrap().is_some());

  let options = DeleteOptions { mode: DeleteMode::Hard, force: true, ..Default::default() };
  let report = BulkEngine::new(&s).bulk_delete(&path, &options);
  assert_eq!(report.affected_count, 1);
  assert!(s.find_part("||GP-1").unwrap().is_none());
}

#[test]
fn delete_dry_run_previews() {
  let s = seeded();
  let dir = tempfile::tempdir().unwrap();
  let path = csv(&dir, "part_number\nGP-1\nGP-3\n");
  let options = DeleteOptions {
    mode: DeleteMode::Hard,
    run: RunOptions { dry_run: true, filter_category: Some("hardware".into()), ..Default::default() },
    ..Default::default()
  };

  let report = BulkEngine::new(&s).bulk_delete(&path, &options);
  assert!(report.success);
  assert_eq!(report.affected_count, 1);
  assert_eq!(report.filtered_out_count, 1);
  assert!(matches!(
    &report.preview[..],
    [PreviewEntry::Delete { mode: DeleteMode::Hard, .. }]
  ));
  assert!(get(&s, "GP-1").is_active());
}

// ─── Activate ────────────────────────────────────────────────────────────────

#[test]
fn activate_separates_already_active() {
  let s = seeded();
  s.delete_part("||GP-1", DeleteMode::Soft).unwrap();
  let dir = tempfile::tempdir().unwrap();
  let path = csv(&dir, "part_number\nGP-1\nGP-2\n");

  let preview = BulkEngine::new(&s)
    .bulk_activate(&path, &RunOptions { dry_run: true, ..Default::default() });
  assert_eq!(preview.affected_count, 1);
  assert_eq!(preview.unchanged_count, 1);
  assert!(!get(&s, "GP-1").is_active());

  let report = BulkEngine::new(&s).bulk_activate(&path, &RunOptions::default());
  assert_eq!(report.operation, BulkOperation::Activate);
  assert_eq!(report.affected_count, 1);
  assert_eq!(report.unchanged_count, 1);
  assert!(get(&s, "GP-1").is_active());
}

// ─── Import ──────────────────────────────────────────────────────────────────

#[test]
fn import_creates_parts_and_logs_them() {
  let s = SqliteStore::open_in_memory().unwrap();
  let dir = tempfile::tempdir().unwrap();
  let path = csv(
    &dir,
    "part_number,authorized_price,description,item_type,category\n\
     gp-1,1.50,bolt,,hardware\n\
     ,950,monthly rent,RENT,\n\
     ,,,,\n\
     gp-2,oops,nut,,\n",
  );

  let report = BulkEngine::new(&s).bulk_import(&path, &ImportOptions::default());
  assert!(report.success);
  assert_eq!(report.affected_count, 2);
  assert_eq!(report.error_count, 1);
  let session = report.session_id.clone().unwrap();

  let bolt = s.get_part("|BOLT|GP-1").unwrap();
  assert_eq!(bolt.source(), PartSource::Imported);
  assert_eq!(bolt.category(), Some("hardware"));
  assert!(s.get_part("RENT|MONTHLY RENT|").is_ok());

  let log = s
    .list_discoveries(&DiscoveryFilter { session_id: Some(session), ..Default::default() })
    .unwrap();
  assert_eq!(log.len(), 2);
}

#[test]
fn reimport_skips_or_updates_existing() {
  let s = SqliteStore::open_in_memory().unwrap();
  let dir = tempfile::tempdir().unwrap();
  let first = csv(&dir, "part_number,price\nGP-1,1.00\nGP-1,1.00\n");
  let report = BulkEngine::new(&s).bulk_import(&first, &ImportOptions::default());
  assert_eq!(report.affected_count, 1);
  assert_eq!(report.unchanged_count, 1);

  let second = csv(&dir, "part_number,price\nGP-1,2.00\n");
  let report = BulkEngine::new(&s).bulk_import(&second, &ImportOptions::default());
  assert_eq!(report.unchanged_count, 1);
  assert_eq!(get(&s, "GP-1").authorized_price(), price("1.00"));

  let options = ImportOptions { update_existing: true, ..Default::default() };
  let preview = BulkEngine::new(&s).bulk_import(
    &second,
    &ImportOptions { run: RunOptions { dry_run: true, ..Default::default() }, ..options.clone() },
  );
  assert!(matches!(&preview.preview[..], [PreviewEntry::Update { .. }]));
  assert_eq!(get(&s, "GP-1").authorized_price(), price("1.00"));

  let report = BulkEngine::new(&s).bulk_import(&second, &options);
  assert_eq!(report.affected_count, 1);
  assert_eq!(get(&s, "GP-1").authorized_price(), price("2.00"));
}

/// Fails the first `create_part` call, then behaves like the wrapped store.
struct FlakyStore {
  inner:  SqliteStore,
  failed: Cell<bool>,
}

impl PartStore for FlakyStore {
  type Error = Error;

  fn create_part(&self, part: Part) -> Result<Part, Error> {
    if !self.failed.replace(true) {
      return Err(Error::Io(io::Error::other("disk hiccup")));
    }
    self.inner.create_part(part)
  }

  fn get_part(&self, key: &str) -> Result<Part, Error> { self.inner.get_part(key) }

  fn find_part(&self, key: &str) -> Result<Option<Part>, Error> { self.inner.find_part(key) }

  fn find_parts_by_number(&self, number: &str) -> Result<Vec<Part>, Error> {
    self.inner.find_parts_by_number(number)
  }

  fn update_part(&self, part: &Part) -> Result<Part, Error> { self.inner.update_part(part) }

  fn delete_part(&self, key: &str, mode: DeleteMode) -> Result<(), Error> {
    self.inner.delete_part(key, mode)
  }

  fn list_parts(&self, filter: &PartFilter) -> Result<Vec<Part>, Error> {
    self.inner.list_parts(filter)
  }

  fn get_config(&self, key: &str) -> Result<Configuration, Error> { self.inner.get_config(key) }

  fn set_config(&self, config: &Configuration) -> Result<Configuration, Error> {
    self.inner.set_config(config)
  }

  fn list_config(&self, category: Option<&str>) -> Result<Vec<Configuration>, Error> {
    self.inner.list_config(category)
  }

  fn reset_config(&self, key: &str) -> Result<Configuration, Error> {
    self.inner.reset_config(key)
  }

  fn append_discovery(&self, entry: NewDiscovery) -> Result<DiscoveryLogEntry, Error> {
    self.inner.append_discovery(entry)
  }

  fn list_discoveries(&self, filter: &DiscoveryFilter) -> Result<Vec<DiscoveryLogEntry>, Error> {
    self.inner.list_discoveries(filter)
  }

  fn purge_discoveries_older_than(&self, days: u32) -> Result<u64, Error> {
    self.inner.purge_discoveries_older_than(days)
  }

  fn stats(&self) -> Result<StoreStats, Error> { self.inner.stats() }
}

#[test]
fn duplicate_of_a_failed_import_row_is_retried() {
  let s = FlakyStore { inner: SqliteStore::open_in_memory().unwrap(), failed: Cell::new(false) };
  let dir = tempfile::tempdir().unwrap();
  let path = csv(&dir, "part_number,price
GP-1,1.00
GP-1,1.00
GP-1,1.00
");

  let report = BulkEngine::new(&s).bulk_import(&path, &ImportOptions::default());
  assert_eq!(report.error_count, 1);
  assert_eq!(report.errors[0].line, 2);
  assert_eq!(report.affected_count, 1);
  assert_eq!(report.unchanged_count, 1);
  assert_eq!(get(&s.inner, "GP-1").authorized_price(), price("1.00"));
}

#[test]
fn import_requires_price_column() {
  let s = SqliteStore::open_in_memory().unwrap();
  let dir = tempfile::tempdir().unwrap();
  let path = csv(&dir, "part_number,description\nGP-1,bolt\n");
  let report = BulkEngine::new(&s).bulk_import(&path, &ImportOptions::default());
  assert!(!report.success);
  assert!(report.error.unwrap().contains("authorized_price"));
}

#[test]
fn import_dry_run_previews_creations() {
  let s = SqliteStore::open_in_memory().unwrap();
  let dir = tempfile::tempdir().unwrap();
  let path = csv(&dir, "part_number,price\nGP-1,1.00\nGP-2,2.00\n");
  let options = ImportOptions {
    run: RunOptions { dry_run: true, ..Default::default() },
    ..Default::default()
  };

  let report = BulkEngine::new(&s).bulk_import(&path, &options);
  assert_eq!(report.affected_count, 2);
  assert_eq!(report.preview.len(), 2);
  assert!(s.find_part("||GP-1").unwrap().is_none());
  assert!(s.list_discoveries(&DiscoveryFilter::default()).unwrap().is_empty());
}

#[test]
fn report_serializes_for_callers() {
  let s = seeded();
  let dir = tempfile::tempdir().unwrap();
  let path = csv(&dir, "part_number\nGP-404\n");
  let report = BulkEngine::new(&s).bulk_activate(&path, &RunOptions::default());
  let json = serde_json::to_value(&report).unwrap();
  assert_eq!(json["operation"], "activate");
  assert_eq!(json["not_found_count"], 1);
  assert!(json.get("session_id").is_none());
}
