//! File-level failures of a bulk run. Row-level problems never surface here;
//! they are collected into the report.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("file not found: {}", .0.display())]
  FileNotFound(PathBuf),

  #[error("CSV error: {0}")]
  Csv(#[from] csv::Error),

  #[error("missing required column: {0}")]
  MissingColumn(&'static str),

  #[error("no updatable columns in CSV (expected one of: {0})")]
  NoMutableColumns(String),

  #[error("no valid rows could be parsed")]
  NoValidRows,

  #[error("hard delete requires force")]
  ForceRequired,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
