//! Normalized, content-addressed index of file tree scans.
//!
//! Each scan records one row per file, referencing interned directory names,
//! file names and content digests. Diff queries then compare any two scans
//! by id.
//!
//! # Architecture
//! - [`Database`] connects to one of the two [`StorageBackend`]s (embedded
//!   SQLite or PostgreSQL) through the `sqlx` "any" driver, applies the
//!   schema and renders every query for that backend once.
//! - [`PathInterner`] and [`ContentHashStore`] turn strings into stable ids.
//! - [`ScanStore`] tracks roots and the scan lifecycle.
//! - [`FileRecordStore`] appends snapshot rows and answers the incremental
//!   hashing question.
//! - [`DiffEngine`] compares scans: new, deleted, changed, renamed and
//!   duplicate files.

mod backend;
mod db;
mod diff;
pub mod error;
mod files;
mod intern;
mod models;
mod queries;
mod scans;
#[cfg(test)]
mod testing;

pub use crate::backend::{BackendHandle, PostgresBackend, SqliteBackend, StorageBackend, TablePrefix};
pub use crate::db::{Batch, Database};
pub use crate::diff::{DiffEngine, DuplicateGroup, Rename, Report};
pub use crate::files::FileRecordStore;
pub use crate::intern::{ContentHashStore, PathInterner};
pub use crate::models::{FileRecord, NewFileRecord, PathName, Scan, split_path};
pub use crate::scans::ScanStore;
pub use sqlx::AnyConnection;
