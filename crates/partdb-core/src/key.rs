//! Identity derivation for parts.
//!
//! A part's composite key is `ITEM_TYPE|DESCRIPTION|PART_NUMBER`, each
//! component upper-cased with surrounding whitespace trimmed and internal
//! runs of whitespace collapsed to a single space. The same derivation is
//! used by [`crate::part::Part`] and by callers that only hold raw row
//! values (bulk import, conflict detection).

use crate::{Result, ValidationError};

/// Separator between the three key components.
pub const KEY_SEPARATOR: char = '|';

/// Upper-case `raw`, trim it, and collapse internal whitespace runs.
pub fn normalize_component(raw: &str) -> String {
  raw.split_whitespace().collect::<Vec<_>>().join(" ").to_uppercase()
}

/// Derive the composite key from raw components.
///
/// Fails only when every component is absent or blank.
pub fn composite_key(
  item_type:   Option<&str>,
  description: Option<&str>,
  part_number: Option<&str>,
) -> Result<String> {
  let parts = [item_type, description, part_number]
    .map(|c| c.map(normalize_component).unwrap_or_default());

  if parts.iter().all(String::is_empty) {
    return Err(ValidationError::new("composite key cannot be empty"));
  }

  Ok(parts.join(&KEY_SEPARATOR.to_string()))
}

/// Trim a free-text field, collapsing an empty result to `None`.
pub fn clean_text(raw: Option<String>) -> Option<String> {
  raw.and_then(|s| {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_owned())
  })
}

#[cfg(test)]
mod tests {
  use proptest::prelude::*;

  use super::*;

  #[test]
  fn normalizes_case_and_whitespace() {
    assert_eq!(normalize_component("Bolt "), "BOLT");
    assert_eq!(normalize_component("BOLT"), "BOLT");
    assert_eq!(normalize_component("bolt"), "BOLT");
    assert_eq!(normalize_component("  hex   head\tbolt "), "HEX HEAD BOLT");
  }

  #[test]
  fn key_for_part_without_number() {
    let key = composite_key(Some("rent"), Some("Monthly  Rent"), None).unwrap();
    assert_eq!(key, "RENT|MONTHLY RENT|");
  }

  #[test]
  fn key_with_only_part_number() {
    let key = composite_key(None, None, Some(" gp0171 ")).unwrap();
    assert_eq!(key, "||GP0171");
  }

  #[test]
  fn empty_components_are_rejected() {
    let err = composite_key(None, Some("   "), Some("")).unwrap_err();
    assert_eq!(err.reason(), "composite key cannot be empty");
  }

  #[test]
  fn punctuation_is_not_folded() {
    let a = composite_key(None, None, Some("GP-0171")).unwrap();
    let b = composite_key(None, None, Some("GP0171")).unwrap();
    assert_ne!(a, b);
  }

  #[test]
  fn clean_text_collapses_blank() {
    assert_eq!(clean_text(Some("  ".into())), None);
    assert_eq!(clean_text(Some(" x ".into())), Some("x".into()));
    assert_eq!(clean_text(None), None);
  }

  proptest! {
    #[test]
    fn derivation_is_deterministic(
      it in "[a-zA-Z ]{0,12}",
      desc in "[a-zA-Z0-9 ]{1,20}",
      pn in "[a-zA-Z0-9]{1,8}",
    ) {
      let first  = composite_key(Some(&it), Some(&desc), Some(&pn)).unwrap();
      let second = composite_key(Some(&it), Some(&desc), Some(&pn)).unwrap();
      prop_assert_eq!(first, second);
    }

    #[test]
    fn derivation_ignores_case_and_padding(
      desc in "[a-zA-Z0-9]{1,10}( [a-zA-Z0-9]{1,10}){0,3}",
      pad in " {0,3}",
    ) {
      let plain  = composite_key(None, Some(&desc), None).unwrap();
      let padded = format!("{pad}{}{pad}", desc.to_lowercase().replace(' ', "   "));
      let noisy  = composite_key(None, Some(&padded), None).unwrap();
      prop_assert_eq!(plain, noisy);
    }
  }
}
