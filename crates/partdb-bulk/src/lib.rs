//! Bulk Mutation Engine for the parts database.
//!
//! Applies CSV files of part rows to any [`partdb_core::store::PartStore`]:
//! update, delete, activate and import, in batches, with an optional
//! category filter and a dry-run preview. Only file-level problems fail a
//! run; every row-level problem is tallied in the returned [`BulkReport`].

mod engine;
mod input;
mod report;

pub mod error;

pub use engine::{
  BulkEngine, DEFAULT_BATCH_SIZE, DeleteOptions, ImportOptions, RunOptions, UpdateOptions,
};
pub use error::{Error, Result};
pub use input::{normalize_part_number, parse_price};
pub use report::{BulkOperation, BulkReport, PreviewEntry, RowError};

#[cfg(test)]
mod tests;
