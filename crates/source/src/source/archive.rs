//! Zip archive expansion.
//!
//! Archives are indexed twice: once as an opaque file, and once per member as
//! `{archive location}/{member name}`. Member content is only read when the
//! member has to be hashed, through a single cached open archive since walks
//! visit an archive's members back to back.

use crate::digest::hash_reader;
use crate::error::{ErrorKind, Result};
use crate::models::{ObjectInfo, Origin};
use exn::ResultExt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time};
use zip::ZipArchive;

const ZIP_SIGNATURE: &[u8; 4] = b"PK\x03\x04";

/// Which archives a walk should look inside.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveOptions {
    pub expand: bool,
    /// Archives with these extensions stay opaque (`.jar` files are zip
    /// archives nobody wants to see the class files of).
    pub skip_extensions: Vec<String>,
}
impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            expand: true,
            skip_extensions: vec![".jar".to_string()],
        }
    }
}
impl ArchiveOptions {
    pub fn disabled() -> Self {
        Self {
            expand: false,
            skip_extensions: Vec::new(),
        }
    }

    /// Whether the object is a candidate for expansion. Whether it really is
    /// an archive is only known once its header has been read.
    pub(crate) fn wants(&self, object: &ObjectInfo) -> bool {
        if !self.expand {
            return false;
        }
        let Some(extension) = object.extension() else {
            return true;
        };
        !self
            .skip_extensions
            .iter()
            .any(|skip| skip.trim_start_matches('.').eq_ignore_ascii_case(extension.trim_start_matches('.')))
    }
}

fn has_zip_signature(path: &Path) -> std::io::Result<bool> {
    let mut header = [0u8; 4];
    let mut file = File::open(path)?;
    match file.read_exact(&mut header) {
        Ok(()) => Ok(&header == ZIP_SIGNATURE),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Zip timestamps carry no zone; they are read as UTC.
fn zip_time(stamp: zip::DateTime) -> Option<OffsetDateTime> {
    let month = Month::try_from(stamp.month()).ok()?;
    let date = Date::from_calendar_date(i32::from(stamp.year()), month, stamp.day()).ok()?;
    let time = Time::from_hms(stamp.hour(), stamp.minute(), stamp.second()).ok()?;
    Some(PrimitiveDateTime::new(date, time).assume_utc())
}

fn open(path: &Path) -> Result<ZipArchive<BufReader<File>>> {
    let file = File::open(path).map_err(|e| ErrorKind::io(e, path))?;
    ZipArchive::new(BufReader::new(file))
        .or_raise(|| ErrorKind::Archive(format!("cannot open archive {}", path.display())))
}

/// Members of the archive at `path` (a regular file indexed as `location`).
///
/// Returns an empty list for files that aren't zip archives at all, and an
/// error for files that look like one but can't be read; either way the file
/// itself has already been indexed as an opaque object. Blocking.
pub(crate) fn list_members(path: &Path, location: &str, fallback: OffsetDateTime) -> Result<Vec<ObjectInfo>> {
    if !has_zip_signature(path).map_err(|e| ErrorKind::io(e, path))? {
        return Ok(Vec::new());
    }
    let mut archive = open(path)?;
    let mut members = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        // Raw access reads the central directory entry only, so encrypted
        // members are listed too (and fail later, when hashed).
        let member = match archive.by_index_raw(index) {
            Ok(member) => member,
            Err(e) => {
                tracing::debug!(archive = %path.display(), index, error = %e, "unreadable archive entry");
                continue;
            },
        };
        if member.is_dir() {
            continue;
        }
        let name = member.name().trim_start_matches('/');
        if name.is_empty() {
            continue;
        }
        let modified = member.last_modified().and_then(zip_time).unwrap_or(fallback);
        members.push(ObjectInfo::new(
            format!("{location}/{name}"),
            member.size(),
            modified,
            Origin::ArchiveMember {
                archive: path.to_path_buf(),
                index,
            },
        ));
    }
    Ok(members)
}

/// The most recently read archive, kept open between member digests.
#[derive(Default)]
pub(crate) struct ArchiveCache {
    open: Mutex<Option<(PathBuf, ZipArchive<BufReader<File>>)>>,
}
impl ArchiveCache {
    /// BLAKE3 digest of one member's uncompressed content. Blocking.
    pub(crate) fn digest_member(&self, path: &Path, index: usize) -> Result<String> {
        let mut guard = self
            .open
            .lock()
            .map_err(|_| ErrorKind::Archive("archive cache poisoned".to_string()))?;
        let archive = match guard.take() {
            Some((cached, archive)) if cached == path => archive,
            _ => open(path)?,
        };
        let (_, archive) = guard.insert((path.to_path_buf(), archive));
        let member = archive
            .by_index(index)
            .or_raise(|| ErrorKind::Archive(format!("cannot read member {index} of {}", path.display())))?;
        let digest = hash_reader(member)
            .or_raise(|| ErrorKind::Archive(format!("cannot decompress member {index} of {}", path.display())))?;
        Ok(digest)
    }
}
impl std::fmt::Debug for ArchiveCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveCache").finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;
    use time::macros::datetime;
    use zip::write::SimpleFileOptions;

    /// Write a stored (uncompressed) zip archive with fixed member timestamps.
    pub(crate) fn write_zip(path: &Path, members: &[(&str, &[u8])]) {
        let stamp = zip::DateTime::from_date_and_time(2021, 3, 4, 5, 6, 8).unwrap();
        let options = SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored)
            .last_modified_time(stamp);
        let mut writer = zip::ZipWriter::new(File::create(path).unwrap());
        for (name, data) in members {
            if name.ends_with('/') {
                writer.add_directory(*name, options).unwrap();
            } else {
                writer.start_file(*name, options).unwrap();
                writer.write_all(data).unwrap();
            }
        }
        writer.finish().unwrap();
    }

    fn object(location: &str) -> ObjectInfo {
        ObjectInfo::new(location, 0, OffsetDateTime::UNIX_EPOCH, Origin::Remote)
    }

    #[rstest]
    #[case::zip("/a/b.zip", true)]
    #[case::no_extension("/a/b", true)]
    #[case::jar("/a/b.jar", false)]
    #[case::upper_jar("/a/B.JAR", false)]
    fn test_wants(#[case] location: &str, #[case] expected: bool) {
        assert_eq!(ArchiveOptions::default().wants(&object(location)), expected);
        assert!(!ArchiveOptions::disabled().wants(&object(location)));
    }

    #[test]
    fn test_skip_extension_without_dot() {
        let options = ArchiveOptions {
            expand: true,
            skip_extensions: vec!["war".to_string()],
        };
        assert!(!options.wants(&object("/x.war")));
        assert!(options.wants(&object("/x.jar")));
    }

    #[test]
    fn test_list_members() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bundle.zip");
        write_zip(&path, &[("docs/", b""), ("docs/a.txt", b"alpha"), ("b.txt", b"bravo!")]);
        let fallback = datetime!(2000-01-01 00:00 UTC);
        let members = list_members(&path, "/srv/bundle.zip", fallback).unwrap();

        let locations: Vec<_> = members.iter().map(|m| m.location.as_str()).collect();
        assert_eq!(locations, ["/srv/bundle.zip/docs/a.txt", "/srv/bundle.zip/b.txt"]);
        assert_eq!(members[0].size, 5);
        assert_eq!(members[1].size, 6);
        assert_eq!(members[0].modified, datetime!(2021-03-04 05:06:08 UTC));
        assert!(matches!(members[0].origin, Origin::ArchiveMember { index: 1, .. }));
    }

    #[test]
    fn test_not_a_zip_has_no_members() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.zip");
        std::fs::write(&path, b"just text").unwrap();
        assert!(list_members(&path, "/plain.zip", OffsetDateTime::UNIX_EPOCH).unwrap().is_empty());
        let empty = dir.path().join("empty");
        std::fs::write(&empty, b"").unwrap();
        assert!(list_members(&empty, "/empty", OffsetDateTime::UNIX_EPOCH).unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_zip_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.zip");
        std::fs::write(&path, b"PK\x03\x04 and then nothing useful").unwrap();
        let err = list_members(&path, "/broken.zip", OffsetDateTime::UNIX_EPOCH).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Archive(_)));
    }

    #[test]
    fn test_digest_member() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("one.zip");
        let second = dir.path().join("two.zip");
        write_zip(&first, &[("a.txt", b"alpha"), ("b.txt", b"bravo")]);
        write_zip(&second, &[("c.txt", b"charlie")]);

        let cache = ArchiveCache::default();
        assert_eq!(cache.digest_member(&first, 0).unwrap(), blake3::hash(b"alpha").to_hex().to_string());
        assert_eq!(cache.digest_member(&first, 1).unwrap(), blake3::hash(b"bravo").to_hex().to_string());
        assert_eq!(cache.digest_member(&second, 0).unwrap(), blake3::hash(b"charlie").to_hex().to_string());
        assert!(cache.digest_member(&second, 5).is_err());
    }
}
