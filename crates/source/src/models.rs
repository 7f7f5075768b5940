//! Source models.

use std::path::PathBuf;
use time::OffsetDateTime;

/// Where an object's bytes can be read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    /// A regular file on the local filesystem.
    File(PathBuf),
    /// A member of a zip archive, addressed by its index in the central
    /// directory.
    ArchiveMember { archive: PathBuf, index: usize },
    /// An object in a remote store. Its content is never downloaded.
    Remote,
}

/// Object metadata yielded by a source walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    /// Full location, used as the indexed path (`/srv/a.txt`,
    /// `/srv/b.zip/c.txt`, `s3://bucket/key`).
    pub location: String,
    /// Size in bytes
    pub size: u64,
    /// Last modified timestamp
    pub modified: OffsetDateTime,
    pub origin: Origin,
    /// Content digest supplied by the listing itself (remote entity tags);
    /// local objects have to be hashed.
    pub digest: Option<String>,
}
impl ObjectInfo {
    /// Create a new ObjectInfo from a listing operation (no digest yet).
    pub fn new(location: impl Into<String>, size: u64, modified: OffsetDateTime, origin: Origin) -> Self {
        Self {
            location: location.into(),
            size,
            modified,
            origin,
            digest: None,
        }
    }

    pub fn with_digest(mut self, digest: impl Into<String>) -> Self {
        self.digest = Some(digest.into());
        self
    }

    /// Modification time in whole unix seconds, as it is indexed.
    pub fn mtime(&self) -> i64 {
        self.modified.unix_timestamp()
    }

    /// Final component of the location.
    pub fn file_name(&self) -> &str {
        self.location.rsplit_once('/').map_or(self.location.as_str(), |(_, name)| name)
    }

    /// Lowercased extension including the dot (`.txt`), if any.
    pub fn extension(&self) -> Option<String> {
        let name = self.file_name();
        match name.rfind('.') {
            Some(0) | None => None,
            Some(dot) => Some(name[dot..].to_ascii_lowercase()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use time::macros::datetime;

    fn object(location: &str) -> ObjectInfo {
        ObjectInfo::new(location, 0, datetime!(2020-01-01 00:00:00.75 UTC), Origin::Remote)
    }

    #[rstest]
    #[case("/srv/a.TXT", "a.TXT", Some(".txt"))]
    #[case("/srv/archive.zip/inner/b.tar.gz", "b.tar.gz", Some(".gz"))]
    #[case("/srv/.bashrc", ".bashrc", None)]
    #[case("/srv/Makefile", "Makefile", None)]
    #[case("bare.txt", "bare.txt", Some(".txt"))]
    fn test_names(#[case] location: &str, #[case] name: &str, #[case] extension: Option<&str>) {
        let object = object(location);
        assert_eq!(object.file_name(), name);
        assert_eq!(object.extension().as_deref(), extension);
    }

    #[test]
    fn test_mtime_truncates_to_seconds() {
        assert_eq!(object("/a").mtime(), 1_577_836_800);
    }
}
