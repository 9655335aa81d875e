//! SQLite backend for the parts database.
//!
//! Provides the storage manager ([`SqliteStore`]), schema migrations
//! ([`MigrationManager`]) and file-level snapshots ([`BackupManager`]).
//! All access is synchronous; a single connection is shared behind a mutex.

mod encode;
mod schema;
mod store;

pub mod backup;
pub mod error;
pub mod migration;

pub use backup::{BackupManager, BackupOptions, BackupOutcome, RestoreOptions, RestoreOutcome};
pub use error::{Error, Result, StorageErrorKind};
pub use migration::{MigrationManager, MigrationOutcome, SchemaIssue, SchemaReport};
pub use store::SqliteStore;
