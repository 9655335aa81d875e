//! Discovery log: the append-only audit trail of parts seen during invoice
//! processing and bulk imports.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Result, ValidationError, key::clean_text};

/// What happened when a part was encountered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryAction {
  Discovered,
  Added,
  Updated,
  Skipped,
  PriceMismatch,
}

impl DiscoveryAction {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Discovered => "discovered",
      Self::Added => "added",
      Self::Updated => "updated",
      Self::Skipped => "skipped",
      Self::PriceMismatch => "price_mismatch",
    }
  }
}

impl fmt::Display for DiscoveryAction {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for DiscoveryAction {
  type Err = ValidationError;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "discovered" => Ok(Self::Discovered),
      "added" => Ok(Self::Added),
      "updated" => Ok(Self::Updated),
      "skipped" => Ok(Self::Skipped),
      "price_mismatch" => Ok(Self::PriceMismatch),
      other => Err(ValidationError::new(format!("invalid action taken: {other:?}"))),
    }
  }
}

/// Unvalidated input to [`DiscoveryLogEntry::new`].
#[derive(Debug, Clone)]
pub struct NewDiscovery {
  pub part_number:           String,
  pub invoice_number:        Option<String>,
  pub invoice_date:          Option<String>,
  pub discovered_price:      Option<Decimal>,
  pub authorized_price:      Option<Decimal>,
  pub action_taken:          DiscoveryAction,
  pub user_decision:         Option<String>,
  /// Defaults to now when absent.
  pub discovery_date:        Option<DateTime<Utc>>,
  pub processing_session_id: Option<String>,
  pub notes:                 Option<String>,
}

impl NewDiscovery {
  pub fn new(part_number: impl Into<String>, action_taken: DiscoveryAction) -> Self {
    Self {
      part_number: part_number.into(),
      invoice_number: None,
      invoice_date: None,
      discovered_price: None,
      authorized_price: None,
      action_taken,
      user_decision: None,
      discovery_date: None,
      processing_session_id: None,
      notes: None,
    }
  }
}

/// An immutable, validated audit record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscoveryLogEntry {
  id:                    Option<i64>,
  part_number:           String,
  invoice_number:        Option<String>,
  invoice_date:          Option<String>,
  discovered_price:      Option<Decimal>,
  authorized_price:      Option<Decimal>,
  action_taken:          DiscoveryAction,
  user_decision:         Option<String>,
  discovery_date:        DateTime<Utc>,
  processing_session_id: Option<String>,
  notes:                 Option<String>,
}

impl DiscoveryLogEntry {
  pub fn new(input: NewDiscovery) -> Result<Self> {
    let part_number = input.part_number.trim().to_owned();
    if part_number.is_empty() {
      return Err(ValidationError::new("discovery part number cannot be empty"));
    }

    for (label, price) in [
      ("discovered", input.discovered_price),
      ("authorized", input.authorized_price),
    ] {
      if let Some(p) = price
        && p <= Decimal::ZERO
      {
        return Err(ValidationError::new(format!("{label} price must be positive")));
      }
    }

    Ok(Self {
      id: None,
      part_number,
      invoice_number: clean_text(input.invoice_number),
      invoice_date: clean_text(input.invoice_date),
      discovered_price: input.discovered_price,
      authorized_price: input.authorized_price,
      action_taken: input.action_taken,
      user_decision: clean_text(input.user_decision),
      discovery_date: input.discovery_date.unwrap_or_else(Utc::now),
      processing_session_id: clean_text(input.processing_session_id),
      notes: clean_text(input.notes),
    })
  }

  /// Attach the storage-assigned id.
  pub fn with_id(mut self, id: i64) -> Self {
    self.id = Some(id);
    self
  }

  pub fn id(&self) -> Option<i64> { self.id }

  pub fn part_number(&self) -> &str { &self.part_number }

  pub fn invoice_number(&self) -> Option<&str> { self.invoice_number.as_deref() }

  pub fn invoice_date(&self) -> Option<&str> { self.invoice_date.as_deref() }

  pub fn discovered_price(&self) -> Option<Decimal> { self.discovered_price }

  pub fn authorized_price(&self) -> Option<Decimal> { self.authorized_price }

  pub fn action_taken(&self) -> DiscoveryAction { self.action_taken }

  pub fn user_decision(&self) -> Option<&str> { self.user_decision.as_deref() }

  pub fn discovery_date(&self) -> DateTime<Utc> { self.discovery_date }

  pub fn processing_session_id(&self) -> Option<&str> {
    self.processing_session_id.as_deref()
  }

  pub fn notes(&self) -> Option<&str> { self.notes.as_deref() }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn requires_part_number() {
    let err =
      DiscoveryLogEntry::new(NewDiscovery::new(" ", DiscoveryAction::Added)).unwrap_err();
    assert!(err.reason().contains("part number"));
  }

  #[test]
  fn rejects_non_positive_prices() {
    let mut input = NewDiscovery::new("GP0171", DiscoveryAction::PriceMismatch);
    input.discovered_price = Some(Decimal::ZERO);
    let err = DiscoveryLogEntry::new(input).unwrap_err();
    assert_eq!(err.reason(), "discovered price must be positive");
  }

  #[test]
  fn action_names() {
    assert_eq!(
      "price_mismatch".parse::<DiscoveryAction>().unwrap(),
      DiscoveryAction::PriceMismatch
    );
    assert!("deleted".parse::<DiscoveryAction>().is_err());
    assert_eq!(DiscoveryAction::Skipped.to_string(), "skipped");
  }
}
