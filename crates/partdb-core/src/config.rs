//! Typed key/value configuration entries.
//!
//! Values are persisted as plain strings; the [`ConfigType`] tag decides how
//! they decode. [`decode`] and [`encode`] are the only places that interpret
//! the tag.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Result, ValidationError};

/// Category assigned to entries created without one.
pub const DEFAULT_CATEGORY: &str = "general";

// ─── Type tag ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigType {
  String,
  Number,
  Boolean,
  Json,
}

impl ConfigType {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::String => "string",
      Self::Number => "number",
      Self::Boolean => "boolean",
      Self::Json => "json",
    }
  }
}

impl fmt::Display for ConfigType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for ConfigType {
  type Err = ValidationError;

  fn from_str(s: &str) -> Result<Self> {
    match s.trim().to_ascii_lowercase().as_str() {
      "string" => Ok(Self::String),
      "number" => Ok(Self::Number),
      "boolean" => Ok(Self::Boolean),
      "json" => Ok(Self::Json),
      other => Err(ValidationError::new(format!(
        "data type must be one of string, number, boolean, json (got {other:?})"
      ))),
    }
  }
}

// ─── Typed value ─────────────────────────────────────────────────────────────

/// A decoded configuration value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ConfigValue {
  String(String),
  Number(f64),
  Boolean(bool),
  Json(serde_json::Value),
}

impl From<&str> for ConfigValue {
  fn from(s: &str) -> Self { Self::String(s.to_owned()) }
}

impl From<String> for ConfigValue {
  fn from(s: String) -> Self { Self::String(s) }
}

impl From<f64> for ConfigValue {
  fn from(n: f64) -> Self { Self::Number(n) }
}

impl From<bool> for ConfigValue {
  fn from(b: bool) -> Self { Self::Boolean(b) }
}

impl From<serde_json::Value> for ConfigValue {
  fn from(v: serde_json::Value) -> Self { Self::Json(v) }
}

/// Parse the boolean spellings accepted in configuration values.
pub fn parse_bool(raw: &str) -> Option<bool> {
  match raw.trim().to_ascii_lowercase().as_str() {
    "true" | "1" | "yes" | "on" => Some(true),
    "false" | "0" | "no" | "off" => Some(false),
    _ => None,
  }
}

/// Decode a raw stored value under `data_type`.
pub fn decode(data_type: ConfigType, raw: &str) -> Result<ConfigValue> {
  match data_type {
    ConfigType::String => Ok(ConfigValue::String(raw.to_owned())),
    ConfigType::Number => raw
      .trim()
      .parse::<f64>()
      .map(ConfigValue::Number)
      .map_err(|_| ValidationError::new(format!("{raw:?} is not a valid number"))),
    ConfigType::Boolean => parse_bool(raw)
      .map(ConfigValue::Boolean)
      .ok_or_else(|| ValidationError::new(format!("{raw:?} is not a valid boolean"))),
    ConfigType::Json => serde_json::from_str(raw)
      .map(ConfigValue::Json)
      .map_err(|e| ValidationError::new(format!("invalid JSON value: {e}"))),
  }
}

/// Encode `value` into the canonical stored string for `data_type`.
///
/// Values of another variant are coerced where the conversion is lossless
/// (e.g. the string `"yes"` for a boolean entry stores `"true"`).
pub fn encode(data_type: ConfigType, value: ConfigValue) -> Result<String> {
  match (data_type, value) {
    (ConfigType::String, ConfigValue::String(s)) => Ok(s),
    (ConfigType::String, ConfigValue::Number(n)) => Ok(n.to_string()),
    (ConfigType::String, ConfigValue::Boolean(b)) => Ok(b.to_string()),
    (ConfigType::String, ConfigValue::Json(v)) => Ok(v.to_string()),

    (ConfigType::Number, ConfigValue::Number(n)) if n.is_finite() => Ok(n.to_string()),
    (ConfigType::Number, ConfigValue::String(s)) => {
      match decode(ConfigType::Number, &s)? {
        ConfigValue::Number(n) => encode(ConfigType::Number, ConfigValue::Number(n)),
        _ => Err(ValidationError::new(format!("{s:?} is not a valid number"))),
      }
    }
    (ConfigType::Number, other) => Err(ValidationError::new(format!(
      "cannot store {other:?} in a number entry"
    ))),

    (ConfigType::Boolean, ConfigValue::Boolean(b)) => Ok(b.to_string()),
    (ConfigType::Boolean, ConfigValue::String(s)) => parse_bool(&s)
      .map(|b| b.to_string())
      .ok_or_else(|| ValidationError::new(format!("{s:?} is not a valid boolean"))),
    (ConfigType::Boolean, ConfigValue::Number(n)) => Ok((n != 0.0).to_string()),
    (ConfigType::Boolean, ConfigValue::Json(serde_json::Value::Bool(b))) => {
      Ok(b.to_string())
    }
    (ConfigType::Boolean, other) => Err(ValidationError::new(format!(
      "cannot store {other:?} in a boolean entry"
    ))),

    (ConfigType::Json, ConfigValue::Json(v)) => Ok(v.to_string()),
    (ConfigType::Json, ConfigValue::String(s)) => {
      decode(ConfigType::Json, &s)?;
      Ok(s)
    }
    (ConfigType::Json, ConfigValue::Number(n)) => Ok(serde_json::json!(n).to_string()),
    (ConfigType::Json, ConfigValue::Boolean(b)) => Ok(b.to_string()),
  }
}

// ─── Configuration ───────────────────────────────────────────────────────────

/// Unvalidated input to [`Configuration::new`].
#[derive(Debug, Clone)]
pub struct NewConfiguration {
  pub key:         String,
  pub value:       String,
  pub data_type:   ConfigType,
  pub description: Option<String>,
  pub category:    Option<String>,
  pub created_at:  Option<DateTime<Utc>>,
  pub updated_at:  Option<DateTime<Utc>>,
}

impl NewConfiguration {
  pub fn new(key: impl Into<String>, value: impl Into<String>, data_type: ConfigType) -> Self {
    Self {
      key: key.into(),
      value: value.into(),
      data_type,
      description: None,
      category: None,
      created_at: None,
      updated_at: None,
    }
  }
}

/// A validated configuration entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Configuration {
  key:         String,
  value:       String,
  data_type:   ConfigType,
  description: Option<String>,
  category:    String,
  created_at:  DateTime<Utc>,
  updated_at:  DateTime<Utc>,
}

impl Configuration {
  pub fn new(input: NewConfiguration) -> Result<Self> {
    let key = input.key.trim().to_owned();
    if key.is_empty() {
      return Err(ValidationError::new("configuration key cannot be empty"));
    }

    if !input.value.is_empty() {
      decode(input.data_type, &input.value).map_err(|e| {
        ValidationError::new(format!("invalid value for {key}: {}", e.reason()))
      })?;
    }

    let created_at = input.created_at.unwrap_or_else(Utc::now);
    let category = input
      .category
      .map(|c| c.trim().to_owned())
      .filter(|c| !c.is_empty())
      .unwrap_or_else(|| DEFAULT_CATEGORY.to_owned());

    Ok(Self {
      key,
      value: input.value,
      data_type: input.data_type,
      description: input.description,
      category,
      created_at,
      updated_at: input.updated_at.unwrap_or(created_at),
    })
  }

  /// The decoded value; `None` for an empty non-string entry.
  pub fn typed_value(&self) -> Option<ConfigValue> {
    if self.value.is_empty() && self.data_type != ConfigType::String {
      return None;
    }
    decode(self.data_type, &self.value).ok()
  }

  /// Replace the value from a typed input, normalising it to canonical form.
  pub fn set_typed_value(&mut self, value: impl Into<ConfigValue>) -> Result<()> {
    self.value = encode(self.data_type, value.into())?;
    self.updated_at = Utc::now();
    Ok(())
  }

  /// Replace the value from its raw string form.
  pub fn set_raw_value(&mut self, raw: &str) -> Result<()> {
    if raw.is_empty() {
      self.value = String::new();
    } else {
      self.value = encode(self.data_type, ConfigValue::String(raw.to_owned()))?;
    }
    self.updated_at = Utc::now();
    Ok(())
  }

  pub fn key(&self) -> &str { &self.key }

  pub fn value(&self) -> &str { &self.value }

  pub fn data_type(&self) -> ConfigType { self.data_type }

  pub fn description(&self) -> Option<&str> { self.description.as_deref() }

  pub fn category(&self) -> &str { &self.category }

  pub fn created_at(&self) -> DateTime<Utc> { self.created_at }

  pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn entry(value: &str, data_type: ConfigType) -> Result<Configuration> {
    Configuration::new(NewConfiguration::new("k", value, data_type))
  }

  #[test]
  fn boolean_spellings() {
    for t in ["true", "TRUE", "1", "yes", "On"] {
      assert_eq!(parse_bool(t), Some(true), "{t}");
    }
    for f in ["false", "0", "No", "OFF"] {
      assert_eq!(parse_bool(f), Some(false), "{f}");
    }
    assert_eq!(parse_bool("maybe"), None);
  }

  #[test]
  fn invalid_values_rejected() {
    assert!(entry("abc", ConfigType::Number).is_err());
    assert!(entry("perhaps", ConfigType::Boolean).is_err());
    assert!(entry("{not json", ConfigType::Json).is_err());
    assert!(entry("anything", ConfigType::String).is_ok());
  }

  #[test]
  fn empty_value_is_allowed() {
    let cfg = entry("", ConfigType::Number).unwrap();
    assert_eq!(cfg.typed_value(), None);
  }

  #[test]
  fn empty_key_rejected() {
    let err =
      Configuration::new(NewConfiguration::new("  ", "x", ConfigType::String))
        .unwrap_err();
    assert!(err.reason().contains("key"));
  }

  #[test]
  fn typed_round_trip() {
    let cfg = entry("0.25", ConfigType::Number).unwrap();
    assert_eq!(cfg.typed_value(), Some(ConfigValue::Number(0.25)));

    let cfg = entry("[1,2]", ConfigType::Json).unwrap();
    assert_eq!(cfg.typed_value(), Some(ConfigValue::Json(serde_json::json!([1, 2]))));

    let cfg = entry("yes", ConfigType::Boolean).unwrap();
    assert_eq!(cfg.typed_value(), Some(ConfigValue::Boolean(true)));
  }

  #[test]
  fn booleans_normalize_on_set() {
    let mut cfg = entry("true", ConfigType::Boolean).unwrap();
    cfg.set_typed_value("off").unwrap();
    assert_eq!(cfg.value(), "false");
    cfg.set_typed_value(true).unwrap();
    assert_eq!(cfg.value(), "true");
    cfg.set_raw_value("1").unwrap();
    assert_eq!(cfg.value(), "true");
    assert!(cfg.set_typed_value("sometimes").is_err());
    assert_eq!(cfg.value(), "true");
  }

  #[test]
  fn numbers_reject_non_numeric_input() {
    let mut cfg = entry("1", ConfigType::Number).unwrap();
    assert!(cfg.set_typed_value(true).is_err());
    cfg.set_typed_value(" 42 ").unwrap();
    assert_eq!(cfg.value(), "42");
  }

  #[test]
  fn category_defaults() {
    let cfg = entry("x", ConfigType::String).unwrap();
    assert_eq!(cfg.category(), DEFAULT_CATEGORY);
  }
}
