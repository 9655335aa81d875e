//! The registry of default configuration entries.
//!
//! Built once on first access and never mutated. Seeding at bootstrap and
//! per-key resets both read from here.

use std::{collections::BTreeMap, sync::LazyLock};

use crate::{
  Result,
  config::{ConfigType, Configuration, NewConfiguration},
};

/// A default configuration entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigDefault {
  pub key:         &'static str,
  pub value:       &'static str,
  pub data_type:   ConfigType,
  pub description: &'static str,
  pub category:    &'static str,
}

impl ConfigDefault {
  pub fn to_configuration(&self) -> Result<Configuration> {
    let mut input = NewConfiguration::new(self.key, self.value, self.data_type);
    input.description = Some(self.description.to_owned());
    input.category = Some(self.category.to_owned());
    Configuration::new(input)
  }
}

static DEFAULTS: LazyLock<BTreeMap<&'static str, ConfigDefault>> = LazyLock::new(|| {
  [
    ConfigDefault {
      key:         "validation_mode",
      value:       "parts_based",
      data_type:   ConfigType::String,
      description: "How invoice lines are validated against the parts list",
      category:    "validation",
    },
    ConfigDefault {
      key:         "default_output_format",
      value:       "csv",
      data_type:   ConfigType::String,
      description: "Default format for generated reports",
      category:    "reporting",
    },
    ConfigDefault {
      key:         "interactive_discovery",
      value:       "true",
      data_type:   ConfigType::Boolean,
      description: "Prompt for a decision when an unknown part is discovered",
      category:    "discovery",
    },
    ConfigDefault {
      key:         "auto_add_discovered_parts",
      value:       "false",
      data_type:   ConfigType::Boolean,
      description: "Add discovered parts without prompting",
      category:    "discovery",
    },
    ConfigDefault {
      key:         "price_tolerance",
      value:       "0.001",
      data_type:   ConfigType::Number,
      description: "Allowed absolute difference before a price mismatch is reported",
      category:    "validation",
    },
    ConfigDefault {
      key:         "bulk_batch_size",
      value:       "50",
      data_type:   ConfigType::Number,
      description: "Rows processed per batch in bulk operations",
      category:    "bulk",
    },
    ConfigDefault {
      key:         "log_retention_days",
      value:       "365",
      data_type:   ConfigType::Number,
      description: "Discovery log entries older than this are purged by maintenance",
      category:    "maintenance",
    },
    ConfigDefault {
      key:         "backup_before_migration",
      value:       "true",
      data_type:   ConfigType::Boolean,
      description: "Take a backup before applying a schema migration",
      category:    "maintenance",
    },
    ConfigDefault {
      key:         "export_columns",
      value:       r#"["part_number","authorized_price","description","category"]"#,
      data_type:   ConfigType::Json,
      description: "Columns written when exporting parts",
      category:    "reporting",
    },
  ]
  .into_iter()
  .map(|d| (d.key, d))
  .collect()
});

/// Every registered default, ordered by key.
pub fn all() -> impl Iterator<Item = &'static ConfigDefault> { DEFAULTS.values() }

/// The default for `key`, if one is registered.
pub fn get(key: &str) -> Option<&'static ConfigDefault> { DEFAULTS.get(key) }
