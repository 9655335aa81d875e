//! CSV ingestion and row-value normalisation.

use std::{collections::HashMap, path::Path, str::FromStr};

use csv::{ReaderBuilder, Trim};
use partdb_core::{
  key::normalize_component,
  part::{PartField, validate_price},
};
use rust_decimal::Decimal;

use crate::{
  error::{Error, Result},
  report::RowError,
};

pub(crate) const PART_NUMBER_COLUMN: &str = "part_number";

/// One data row, with blank cells already dropped.
#[derive(Debug, Clone)]
pub(crate) struct CsvRow {
  /// 1-based line in the source file.
  pub line:        u64,
  /// Canonical (upper-cased, whitespace-collapsed) part number.
  pub part_number: Option<String>,
  pub cells:       HashMap<PartField, String>,
}

impl CsvRow {
  pub fn cell(&self, field: PartField) -> Option<&str> {
    self.cells.get(&field).map(String::as_str)
  }
}

/// A parsed CSV file.
#[derive(Debug)]
pub(crate) struct CsvTable {
  /// Recognised field columns, in header order.
  pub fields:     Vec<PartField>,
  pub rows:       Vec<CsvRow>,
  /// Records the reader could not decode.
  pub unreadable: Vec<RowError>,
}

/// Read `path`, requiring a `part_number` header.
///
/// Header names match case-insensitively; the first occurrence of a repeated
/// column wins. Fails when no record at all could be decoded.
pub(crate) fn read_table(path: &Path) -> Result<CsvTable> {
  if !path.is_file() {
    return Err(Error::FileNotFound(path.to_owned()));
  }

  let mut reader = ReaderBuilder::new()
    .has_headers(true)
    .trim(Trim::All)
    .flexible(true)
    .from_path(path)?;

  let headers = reader.headers()?.clone();
  let mut part_number_idx = None;
  let mut columns: Vec<(PartField, usize)> = vec![];
  for (idx, header) in headers.iter().enumerate() {
    let name = header.trim_start_matches('\u{feff}').trim().to_ascii_lowercase();
    if name == PART_NUMBER_COLUMN {
      part_number_idx.get_or_insert(idx);
    } else if let Some(field) = PartField::from_column(&name)
      && !columns.iter().any(|(f, _)| *f == field)
    {
      columns.push((field, idx));
    }
  }
  let part_number_idx = part_number_idx.ok_or(Error::MissingColumn(PART_NUMBER_COLUMN))?;

  let mut rows = vec![];
  let mut unreadable = vec![];
  for (n, record) in reader.records().enumerate() {
    // Header is line 1.
    let fallback_line = n as u64 + 2;
    match record {
      Ok(record) => {
        let line = record.position().map_or(fallback_line, |p| p.line());
        let cells = columns
          .iter()
          .filter_map(|(field, idx)| {
            let value = record.get(*idx)?.trim();
            (!value.is_empty()).then(|| (*field, value.to_owned()))
          })
          .collect();
        rows.push(CsvRow {
          line,
          part_number: record.get(part_number_idx).and_then(normalize_part_number),
          cells,
        });
      }
      Err(e) => unreadable.push(RowError {
        line:        e.position().map_or(fallback_line, |p| p.line()),
        part_number: None,
        message:     e.to_string(),
      }),
    }
  }

  if rows.is_empty() {
    return Err(Error::NoValidRows);
  }

  Ok(CsvTable { fields: columns.into_iter().map(|(f, _)| f).collect(), rows, unreadable })
}

/// Canonical part number, or `None` when blank.
pub fn normalize_part_number(raw: &str) -> Option<String> {
  let normalized = normalize_component(raw);
  (!normalized.is_empty()).then_some(normalized)
}

/// Parse a price cell, tolerating currency symbols and thousands separators.
pub fn parse_price(raw: &str) -> Result<Decimal, String> {
  let cleaned: String = raw
    .chars()
    .filter(|c| !matches!(c, '$' | '€' | '£' | '¥' | ',') && !c.is_whitespace())
    .collect();
  if cleaned.is_empty() {
    return Err(format!("invalid price {raw:?}"));
  }
  let price = Decimal::from_str(&cleaned).map_err(|_| format!("invalid price {raw:?}"))?;
  validate_price(price).map_err(|e| e.reason().to_owned())?;
  Ok(price)
}
