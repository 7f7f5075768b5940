//! Enumerates the objects below a scan root.
//!
//! A root is either a local directory (optionally looking inside zip
//! archives) or an S3-compatible bucket prefix. Both are walked through the
//! same [`Source`] trait, which yields [`ObjectInfo`]s and computes content
//! digests on demand.

pub mod digest;
pub mod error;
mod location;
mod models;
mod path;
mod source;

pub use crate::location::Location;
pub use crate::models::{ObjectInfo, Origin};
pub use crate::path::validate_key;
#[cfg(feature = "mock")]
pub use crate::source::MockSource;
pub use crate::source::{ArchiveOptions, LocalSource, Source, SourceHandle, SourceOptions, WalkStream, Walked, open};
#[cfg(feature = "s3")]
pub use crate::source::{S3Credentials, S3Source};
