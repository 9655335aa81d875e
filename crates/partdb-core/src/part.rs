//! Parts, the authorised reference items.
//!
//! A [`Part`] can only be obtained through [`Part::new`] (or by deriving a
//! new value from an existing part), so every instance in the program has
//! passed validation and carries its composite key.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
  Result, ValidationError,
  key::{clean_text, composite_key},
};

/// Maximum number of fractional digits accepted in an authorised price.
pub const MAX_PRICE_SCALE: u32 = 4;

// ─── Source ──────────────────────────────────────────────────────────────────

/// How a part entered the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartSource {
  #[default]
  Manual,
  /// Found on an invoice and accepted during processing.
  Discovered,
  Imported,
}

impl PartSource {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Manual => "manual",
      Self::Discovered => "discovered",
      Self::Imported => "imported",
    }
  }
}

impl FromStr for PartSource {
  type Err = ValidationError;

  fn from_str(s: &str) -> Result<Self> {
    match s.trim().to_ascii_lowercase().as_str() {
      "manual" => Ok(Self::Manual),
      "discovered" => Ok(Self::Discovered),
      "imported" => Ok(Self::Imported),
      other => Err(ValidationError::new(format!(
        "source must be one of manual, discovered, imported (got {other:?})"
      ))),
    }
  }
}

// ─── Fields ──────────────────────────────────────────────────────────────────

/// The mutable fields of a part, as named in CSV headers and previews.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartField {
  AuthorizedPrice,
  Description,
  Category,
  ItemType,
  Notes,
}

impl PartField {
  pub const ALL: [PartField; 5] = [
    Self::AuthorizedPrice,
    Self::Description,
    Self::Category,
    Self::ItemType,
    Self::Notes,
  ];

  pub fn column(self) -> &'static str {
    match self {
      Self::AuthorizedPrice => "authorized_price",
      Self::Description => "description",
      Self::Category => "category",
      Self::ItemType => "item_type",
      Self::Notes => "notes",
    }
  }

  /// Resolve a (case-insensitive) column name, accepting `price` as an alias.
  pub fn from_column(name: &str) -> Option<Self> {
    match name.trim().to_ascii_lowercase().as_str() {
      "authorized_price" | "price" => Some(Self::AuthorizedPrice),
      "description" => Some(Self::Description),
      "category" => Some(Self::Category),
      "item_type" => Some(Self::ItemType),
      "notes" => Some(Self::Notes),
      _ => None,
    }
  }
}

impl fmt::Display for PartField {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.column())
  }
}

impl FromStr for PartField {
  type Err = ValidationError;

  fn from_str(s: &str) -> Result<Self> {
    Self::from_column(s)
      .ok_or_else(|| ValidationError::new(format!("unknown part field: {s:?}")))
  }
}

// ─── NewPart ─────────────────────────────────────────────────────────────────

/// Unvalidated input to [`Part::new`].
#[derive(Debug, Clone)]
pub struct NewPart {
  pub part_number:        Option<String>,
  pub authorized_price:   Decimal,
  pub description:        Option<String>,
  pub item_type:          Option<String>,
  pub category:           Option<String>,
  pub source:             PartSource,
  pub first_seen_invoice: Option<String>,
  pub is_active:          bool,
  pub notes:              Option<String>,
  /// Defaults to now when absent.
  pub created_at:         Option<DateTime<Utc>>,
  /// Defaults to `created_at` when absent.
  pub updated_at:         Option<DateTime<Utc>>,
}

impl NewPart {
  /// An active, manually-entered part with only a price set.
  pub fn new(authorized_price: Decimal) -> Self {
    Self {
      part_number: None,
      authorized_price,
      description: None,
      item_type: None,
      category: None,
      source: PartSource::default(),
      first_seen_invoice: None,
      is_active: true,
      notes: None,
      created_at: None,
      updated_at: None,
    }
  }

  pub fn part_number(mut self, value: impl Into<String>) -> Self {
    self.part_number = Some(value.into());
    self
  }

  pub fn description(mut self, value: impl Into<String>) -> Self {
    self.description = Some(value.into());
    self
  }

  pub fn item_type(mut self, value: impl Into<String>) -> Self {
    self.item_type = Some(value.into());
    self
  }

  pub fn category(mut self, value: impl Into<String>) -> Self {
    self.category = Some(value.into());
    self
  }
}

// ─── Part ────────────────────────────────────────────────────────────────────

/// A validated part. Fields are read through accessors; changes produce a
/// new, re-validated value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Part {
  id:                 Option<i64>,
  part_number:        Option<String>,
  authorized_price:   Decimal,
  description:        Option<String>,
  item_type:          Option<String>,
  category:           Option<String>,
  source:             PartSource,
  first_seen_invoice: Option<String>,
  created_at:         DateTime<Utc>,
  updated_at:         DateTime<Utc>,
  is_active:          bool,
  notes:              Option<String>,
  composite_key:      String,
}

/// Reject non-positive prices and prices with more than four decimals.
pub fn validate_price(price: Decimal) -> Result<()> {
  if price <= Decimal::ZERO {
    return Err(ValidationError::new("authorized price must be positive"));
  }
  if price.scale() > MAX_PRICE_SCALE {
    return Err(ValidationError::new(format!(
      "authorized price cannot have more than {MAX_PRICE_SCALE} decimal places (got {price})"
    )));
  }
  Ok(())
}

impl Part {
  pub fn new(input: NewPart) -> Result<Self> {
    let part_number = clean_text(input.part_number);
    let description = clean_text(input.description);
    let item_type = clean_text(input.item_type);

    if part_number.is_none() && description.is_none() && item_type.is_none() {
      return Err(ValidationError::new(
        "at least one of part number, description, or item type is required",
      ));
    }

    validate_price(input.authorized_price)?;

    let composite_key = composite_key(
      item_type.as_deref(),
      description.as_deref(),
      part_number.as_deref(),
    )?;

    let created_at = input.created_at.unwrap_or_else(Utc::now);
    let updated_at = input.updated_at.unwrap_or(created_at);

    Ok(Self {
      id: None,
      part_number,
      authorized_price: input.authorized_price,
      description,
      item_type,
      category: clean_text(input.category),
      source: input.source,
      first_seen_invoice: clean_text(input.first_seen_invoice),
      created_at,
      updated_at,
      is_active: input.is_active,
      notes: clean_text(input.notes),
      composite_key,
    })
  }

  /// Attach the storage-assigned row id.
  pub fn with_id(mut self, id: i64) -> Self {
    self.id = Some(id);
    self
  }

  /// Flip the active flag, stamping `updated_at`.
  pub fn with_active(mut self, active: bool) -> Self {
    self.is_active = active;
    self.updated_at = Utc::now();
    self
  }

  /// Apply `patch` and re-validate, keeping id and creation time.
  pub fn apply(&self, patch: &PartPatch) -> Result<Self> {
    let mut draft = self.to_new_part();
    if let Some(price) = patch.authorized_price {
      draft.authorized_price = price;
    }
    if let Some(v) = &patch.description {
      draft.description = Some(v.clone());
    }
    if let Some(v) = &patch.category {
      draft.category = Some(v.clone());
    }
    if let Some(v) = &patch.item_type {
      draft.item_type = Some(v.clone());
    }
    if let Some(v) = &patch.notes {
      draft.notes = Some(v.clone());
    }
    draft.updated_at = Some(Utc::now());

    let mut part = Self::new(draft)?;
    part.id = self.id;
    Ok(part)
  }

  /// The unvalidated form of this part.
  pub fn to_new_part(&self) -> NewPart {
    NewPart {
      part_number:        self.part_number.clone(),
      authorized_price:   self.authorized_price,
      description:        self.description.clone(),
      item_type:          self.item_type.clone(),
      category:           self.category.clone(),
      source:             self.source,
      first_seen_invoice: self.first_seen_invoice.clone(),
      is_active:          self.is_active,
      notes:              self.notes.clone(),
      created_at:         Some(self.created_at),
      updated_at:         Some(self.updated_at),
    }
  }

  /// The current value of a mutable field, rendered as text.
  pub fn field_text(&self, field: PartField) -> Option<String> {
    match field {
      PartField::AuthorizedPrice => Some(self.authorized_price.to_string()),
      PartField::Description => self.description.clone(),
      PartField::Category => self.category.clone(),
      PartField::ItemType => self.item_type.clone(),
      PartField::Notes => self.notes.clone(),
    }
  }

  pub fn id(&self) -> Option<i64> { self.id }

  pub fn part_number(&self) -> Option<&str> { self.part_number.as_deref() }

  pub fn authorized_price(&self) -> Decimal { self.authorized_price }

  pub fn description(&self) -> Option<&str> { self.description.as_deref() }

  pub fn item_type(&self) -> Option<&str> { self.item_type.as_deref() }

  pub fn category(&self) -> Option<&str> { self.category.as_deref() }

  pub fn source(&self) -> PartSource { self.source }

  pub fn first_seen_invoice(&self) -> Option<&str> {
    self.first_seen_invoice.as_deref()
  }

  pub fn created_at(&self) -> DateTime<Utc> { self.created_at }

  pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }

  pub fn is_active(&self) -> bool { self.is_active }

  pub fn notes(&self) -> Option<&str> { self.notes.as_deref() }

  pub fn composite_key(&self) -> &str { &self.composite_key }

  /// Best human-facing label: part number, else description, else key.
  pub fn label(&self) -> &str {
    self
      .part_number
      .as_deref()
      .or(self.description.as_deref())
      .unwrap_or(self.composite_key.as_str())
  }
}

// ─── Patch ───────────────────────────────────────────────────────────────────

/// A partial update. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartPatch {
  pub authorized_price: Option<Decimal>,
  pub description:      Option<String>,
  pub category:         Option<String>,
  pub item_type:        Option<String>,
  pub notes:            Option<String>,
}

/// One field's before/after values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldChange {
  pub field: PartField,
  pub old:   Option<String>,
  pub new:   Option<String>,
}

impl PartPatch {
  pub fn is_empty(&self) -> bool { self.fields().is_empty() }

  /// Fields this patch sets.
  pub fn fields(&self) -> Vec<PartField> {
    PartField::ALL
      .into_iter()
      .filter(|f| self.value_text(*f).is_some())
      .collect()
  }

  /// Drop every field not in `allowed`.
  pub fn restrict_to(&mut self, allowed: &[PartField]) {
    for field in PartField::ALL {
      if allowed.contains(&field) {
        continue;
      }
      match field {
        PartField::AuthorizedPrice => self.authorized_price = None,
        PartField::Description => self.description = None,
        PartField::Category => self.category = None,
        PartField::ItemType => self.item_type = None,
        PartField::Notes => self.notes = None,
      }
    }
  }

  fn value_text(&self, field: PartField) -> Option<String> {
    match field {
      PartField::AuthorizedPrice => self.authorized_price.map(|p| p.to_string()),
      PartField::Description => self.description.clone(),
      PartField::Category => self.category.clone(),
      PartField::ItemType => self.item_type.clone(),
      PartField::Notes => self.notes.clone(),
    }
  }

  /// The fields whose value would actually change on `part`.
  pub fn changes(&self, part: &Part) -> Vec<FieldChange> {
    PartField::ALL
      .into_iter()
      .filter_map(|field| {
        let new = self.value_text(field)?;
        let old = part.field_text(field);
        let unchanged = match field {
          PartField::AuthorizedPrice => {
            self.authorized_price == Some(part.authorized_price())
          }
          _ => old.as_deref() == Some(new.as_str()),
        };
        (!unchanged).then_some(FieldChange { field, old, new: Some(new) })
      })
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use std::str::FromStr;

  use proptest::prelude::*;

  use super::*;

  fn price(s: &str) -> Decimal { Decimal::from_str(s).unwrap() }

  #[test]
  fn construction_derives_key() {
    let part = Part::new(
      NewPart::new(price("1.25"))
        .part_number(" gp0171 ")
        .description("Hex  Bolt")
        .item_type("hardware"),
    )
    .unwrap();

    assert_eq!(part.part_number(), Some("gp0171"));
    assert_eq!(part.composite_key(), "HARDWARE|HEX BOLT|GP0171");
    assert!(part.is_active());
    assert_eq!(part.source(), PartSource::Manual);
  }

  #[test]
  fn key_matches_static_derivation() {
    let part =
      Part::new(NewPart::new(price("10")).description("Rent").item_type("RENT"))
        .unwrap();
    let key = composite_key(Some("rent "), Some(" RENT"), None).unwrap();
    assert_eq!(part.composite_key(), key);
  }

  #[test]
  fn requires_some_identity() {
    let err = Part::new(NewPart::new(price("1")).category("x")).unwrap_err();
    assert!(err.reason().contains("at least one"));

    let err = Part::new(NewPart::new(price("1")).part_number("   ")).unwrap_err();
    assert!(err.reason().contains("at least one"));
  }

  #[test]
  fn rejects_non_positive_price() {
    for bad in ["0", "-1.00", "0.0000"] {
      let err =
        Part::new(NewPart::new(price(bad)).part_number("A")).unwrap_err();
      assert_eq!(err.reason(), "authorized price must be positive");
    }
  }

  #[test]
  fn price_scale_boundary() {
    assert!(Part::new(NewPart::new(price("0.0001")).part_number("A")).is_ok());
    assert!(Part::new(NewPart::new(price("12.3456")).part_number("A")).is_ok());
    assert!(Part::new(NewPart::new(price("12.34567")).part_number("A")).is_err());
  }

  #[test]
  fn apply_patch_revalidates_and_rekeys() {
    let part = Part::new(
      NewPart::new(price("2.00")).part_number("A1").description("Widget"),
    )
    .unwrap()
    .with_id(7);

    let patch = PartPatch {
      description: Some("Gadget".into()),
      ..Default::default()
    };
    let updated = part.apply(&patch).unwrap();
    assert_eq!(updated.id(), Some(7));
    assert_eq!(updated.composite_key(), "|GADGET|A1");
    assert_eq!(updated.created_at(), part.created_at());

    let bad = PartPatch {
      authorized_price: Some(price("-5")),
      ..Default::default()
    };
    assert!(part.apply(&bad).is_err());
  }

  #[test]
  fn patch_changes_skip_equal_values() {
    let part = Part::new(
      NewPart::new(price("2.50")).part_number("A1").category("Bolts"),
    )
    .unwrap();

    let patch = PartPatch {
      authorized_price: Some(price("2.5")),
      category: Some("Nuts".into()),
      ..Default::default()
    };
    let changes = patch.changes(&part);
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].field, PartField::Category);
    assert_eq!(changes[0].old.as_deref(), Some("Bolts"));
    assert_eq!(changes[0].new.as_deref(), Some("Nuts"));
  }

  #[test]
  fn restrict_patch_fields() {
    let mut patch = PartPatch {
      authorized_price: Some(price("1")),
      notes: Some("n".into()),
      ..Default::default()
    };
    patch.restrict_to(&[PartField::Notes]);
    assert_eq!(patch.fields(), vec![PartField::Notes]);
  }

  #[test]
  fn field_names_and_aliases() {
    assert_eq!(PartField::from_column("Price"), Some(PartField::AuthorizedPrice));
    assert_eq!(PartField::from_column(" item_type "), Some(PartField::ItemType));
    assert_eq!(PartField::from_column("part_number"), None);
    assert!("colour".parse::<PartField>().is_err());
  }

  #[test]
  fn source_parsing() {
    assert_eq!("Discovered".parse::<PartSource>().unwrap(), PartSource::Discovered);
    assert!("scraped".parse::<PartSource>().is_err());
  }

  proptest! {
    #[test]
    fn any_positive_price_within_scale_is_accepted(
      mantissa in 1i64..1_000_000_000,
      scale in 0u32..=MAX_PRICE_SCALE,
    ) {
      let p = Decimal::new(mantissa, scale);
      prop_assert!(Part::new(NewPart::new(p).part_number("X")).is_ok());
    }

    #[test]
    fn over_precision_is_rejected(mantissa in 1i64..1_000_000_000, extra in 1u32..6) {
      let p = Decimal::new(mantissa, MAX_PRICE_SCALE + extra);
      prop_assert!(Part::new(NewPart::new(p).part_number("X")).is_err());
    }

    #[test]
    fn non_positive_is_rejected(mantissa in -1_000_000i64..=0, scale in 0u32..=4) {
      let p = Decimal::new(mantissa, scale);
      prop_assert!(Part::new(NewPart::new(p).part_number("X")).is_err());
    }
  }
}
