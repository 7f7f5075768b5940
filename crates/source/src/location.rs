//! Root locations.

use crate::error::{ErrorKind, Result};
use crate::path::validate_key;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::str::FromStr;

const S3_SCHEME: &str = "s3://";

/// Where a scan root lives, parsed from its registered location string.
///
/// - `s3://bucket` or `s3://bucket/prefix` is an object store listing.
/// - Anything else must be an absolute local directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Location {
    Local(PathBuf),
    S3 { bucket: String, prefix: Option<String> },
}
impl Location {
    pub fn parse(location: &str) -> Result<Self> {
        if let Some(rest) = location.strip_prefix(S3_SCHEME) {
            let (bucket, prefix) = match rest.split_once('/') {
                Some((bucket, prefix)) => (bucket, prefix),
                None => (rest, ""),
            };
            if bucket.is_empty() {
                exn::bail!(ErrorKind::InvalidLocation(location.to_string()));
            }
            let prefix = match prefix.trim_matches('/') {
                "" => None,
                prefix => Some(validate_key(prefix)?),
            };
            return Ok(Self::S3 {
                bucket: bucket.to_string(),
                prefix,
            });
        }
        let path = PathBuf::from(location);
        if !path.is_absolute() {
            exn::bail!(ErrorKind::InvalidLocation(location.to_string()));
        }
        Ok(Self::Local(path))
    }
}
impl FromStr for Location {
    type Err = crate::error::Error;
    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
impl Display for Location {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local(path) => write!(f, "{}", path.display()),
            Self::S3 { bucket, prefix: None } => write!(f, "{S3_SCHEME}{bucket}"),
            Self::S3 { bucket, prefix: Some(prefix) } => write!(f, "{S3_SCHEME}{bucket}/{prefix}"),
        }
    }
}
