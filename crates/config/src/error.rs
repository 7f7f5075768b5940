//! Config Error Types

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A configuration error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for configuration operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Config file given explicitly but not there.
    #[display("configuration file not found: {}", _0.display())]
    Missing(#[error(not(source))] PathBuf),
    /// Config file extension isn't one of toml, yaml/yml or json.
    #[display("unsupported configuration format: {}", _0.display())]
    Format(#[error(not(source))] PathBuf),
    /// Sources could not be merged or deserialized.
    #[display("could not load configuration")]
    Load,
    /// A field is present but unusable; names the field (`ingest.commit_every`).
    #[display("invalid configuration value: {_0}")]
    Invalid(#[error(not(source))] String),
    /// The configured database could not be opened.
    #[display("could not open database")]
    Database,
    #[display("could not build scan report")]
    Report,
}

impl ErrorKind {
    pub(crate) fn invalid(field: &str) -> Self {
        Self::Invalid(field.to_string())
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Database | Self::Report)
    }
}
