//! Ingest Error Types
//!
//! Failures that concern a single object (vanished, unreadable) never show
//! up here; they are reported as skip events and the run carries on. What
//! remains either prevents a run from starting or aborts it.

use derive_more::{Display, Error};

/// An ingest error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for ingest operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Raised before a scan is started: unknown or unreachable root, bad
    /// location, unusable database. Nothing was written.
    #[display("cannot start ingest: {_0}")]
    Configuration(#[error(not(source))] String),
    /// The index could not be written mid-run. Records since the last commit
    /// are lost and the scan stays incomplete.
    #[display("index store error")]
    Store,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store)
    }
}
