//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings (microseconds, `Z`
//! suffix) so that string order matches chronological order. Decimals are
//! stored as their exact text form. Rows are decoded back through the
//! validating constructors in `partdb-core`.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use partdb_core::{
  config::{ConfigType, Configuration, NewConfiguration},
  discovery::{DiscoveryAction, DiscoveryLogEntry, NewDiscovery},
  part::{NewPart, Part, PartSource},
};
use rust_decimal::Decimal;

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

// ─── Decimal ─────────────────────────────────────────────────────────────────

pub fn encode_decimal(d: Decimal) -> String { d.to_string() }

pub fn decode_decimal(s: &str) -> Result<Decimal> { Ok(Decimal::from_str(s.trim())?) }

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column list matching [`RawPart::from_row`].
pub const PART_COLUMNS: &str = "id, part_number, authorized_price, description, item_type, \
   category, source, first_seen_invoice, created_at, updated_at, is_active, notes";

/// Raw values read directly from a `parts` row.
pub struct RawPart {
  pub id:                 i64,
  pub part_number:        Option<String>,
  pub authorized_price:   String,
  pub description:        Option<String>,
  pub item_type:          Option<String>,
  pub category:           Option<String>,
  pub source:             String,
  pub first_seen_invoice: Option<String>,
  pub created_at:         String,
  pub updated_at:         String,
  pub is_active:          bool,
  pub notes:              Option<String>,
}

impl RawPart {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:                 row.get(0)?,
      part_number:        row.get(1)?,
      authorized_price:   row.get(2)?,
      description:        row.get(3)?,
      item_type:          row.get(4)?,
      category:           row.get(5)?,
      source:             row.get(6)?,
      first_seen_invoice: row.get(7)?,
      created_at:         row.get(8)?,
      updated_at:         row.get(9)?,
      is_active:          row.get(10)?,
      notes:              row.get(11)?,
    })
  }

  pub fn into_part(self) -> Result<Part> {
    let input = NewPart {
      part_number:        self.part_number,
      authorized_price:   decode_decimal(&self.authorized_price)?,
      description:        self.description,
      item_type:          self.item_type,
      category:           self.category,
      source:             PartSource::from_str(&self.source)?,
      first_seen_invoice: self.first_seen_invoice,
      is_active:          self.is_active,
      notes:              self.notes,
      created_at:         Some(decode_dt(&self.created_at)?),
      updated_at:         Some(decode_dt(&self.updated_at)?),
    };
    Ok(Part::new(input)?.with_id(self.id))
  }
}

/// Column list matching [`RawConfig::from_row`].
pub const CONFIG_COLUMNS: &str =
  "key, value, data_type, description, category, created_at, updated_at";

/// Raw values read directly from a `config` row.
pub struct RawConfig {
  pub key:         String,
  pub value:       String,
  pub data_type:   String,
  pub description: Option<String>,
  pub category:    String,
  pub created_at:  String,
  pub updated_at:  String,
}

impl RawConfig {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      key:         row.get(0)?,
      value:       row.get(1)?,
      data_type:   row.get(2)?,
      description: row.get(3)?,
      category:    row.get(4)?,
      created_at:  row.get(5)?,
      updated_at:  row.get(6)?,
    })
  }

  pub fn into_config(self) -> Result<Configuration> {
    let mut input = NewConfiguration::new(
      self.key,
      self.value,
      ConfigType::from_str(&self.data_type)?,
    );
    input.description = self.description;
    input.category = Some(self.category);
    input.created_at = Some(decode_dt(&self.created_at)?);
    input.updated_at = Some(decode_dt(&self.updated_at)?);
    Ok(Configuration::new(input)?)
  }
}

/// Column list matching [`RawDiscovery::from_row`].
pub const DISCOVERY_COLUMNS: &str = "id, part_number, invoice_number, invoice_date, \
   discovered_price, authorized_price, action_taken, user_decision, discovery_date, \
   processing_session_id, notes";

/// Raw values read directly from a `discovery_log` row.
pub struct RawDiscovery {
  pub id:                    i64,
  pub part_number:           String,
  pub invoice_number:        Option<String>,
  pub invoice_date:          Option<String>,
  pub discovered_price:      Option<String>,
  pub authorized_price:      Option<String>,
  pub action_taken:          String,
  pub user_decision:         Option<String>,
  pub discovery_date:        String,
  pub processing_session_id: Option<String>,
  pub notes:                 Option<String>,
}

impl RawDiscovery {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:                    row.get(0)?,
      part_number:           row.get(1)?,
      invoice_number:        row.get(2)?,
      invoice_date:          row.get(3)?,
      discovered_price:      row.get(4)?,
      authorized_price:      row.get(5)?,
      action_taken:          row.get(6)?,
      user_decision:         row.get(7)?,
      discovery_date:        row.get(8)?,
      processing_session_id: row.get(9)?,
      notes:                 row.get(10)?,
    })
  }

  pub fn into_entry(self) -> Result<DiscoveryLogEntry> {
    let input = NewDiscovery {
      part_number:           self.part_number,
      invoice_number:        self.invoice_number,
      invoice_date:          self.invoice_date,
      discovered_price:      self.discovered_price.as_deref().map(decode_decimal).transpose()?,
      authorized_price:      self.authorized_price.as_deref().map(decode_decimal).transpose()?,
      action_taken:          DiscoveryAction::from_str(&self.action_taken)?,
      user_decision:         self.user_decision,
      discovery_date:        Some(decode_dt(&self.discovery_date)?),
      processing_session_id: self.processing_session_id,
      notes:                 self.notes,
    };
    Ok(DiscoveryLogEntry::new(input)?.with_id(self.id))
  }
}
