//! Error type for `partdb-core`.

use thiserror::Error;

/// An entity failed validation. Always carries a human-readable reason.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct ValidationError {
  reason: String,
}

impl ValidationError {
  pub fn new(reason: impl Into<String>) -> Self {
    Self { reason: reason.into() }
  }

  pub fn reason(&self) -> &str { &self.reason }
}

pub type Result<T, E = ValidationError> = std::result::Result<T, E>;
