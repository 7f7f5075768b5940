//! Store Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A store error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("database error")]
    Database,
    #[display("could not apply database schema")]
    Schema,
    /// Bad connection settings or table prefix; nothing was written.
    #[display("invalid store configuration: {_0}")]
    Configuration(#[error(not(source))] String),
    /// A value read from (or about to be written to) the database is out of range.
    #[display("invalid store data: {_0}")]
    InvalidData(#[error(not(source))] &'static str),
    /// The scan does not exist or has already been completed.
    #[display("scan {_0} is not open")]
    ScanNotOpen(#[error(not(source))] i64),
    #[display("scan {_0} does not exist")]
    ScanNotFound(#[error(not(source))] i64),
    #[display("root not registered: {_0}")]
    RootNotFound(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Database)
    }
}
