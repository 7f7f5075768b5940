//! In-memory source for testing.

use super::{Source, WalkStream, Walked};
use crate::error::{ErrorKind, Result};
use crate::models::{ObjectInfo, Origin};
use crate::path::validate_key;
use async_stream::stream;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use time::OffsetDateTime;
use time::macros::datetime;
use tokio::sync::RwLock;

/// Modification time given to objects added without one.
pub const DEFAULT_MODIFIED: OffsetDateTime = datetime!(2024-01-01 00:00 UTC);

#[derive(Debug, Clone)]
struct MockObject {
    data: Vec<u8>,
    modified: OffsetDateTime,
    /// Listing yields an error instead of this object.
    unreadable: bool,
}

/// In-memory source for testing.
///
/// Objects live in a sorted map behind a [`RwLock`], keyed by their path
/// relative to the root, so tests can change the tree between two scans.
/// Walks group objects by parent directory, in key order.
///
/// # Examples
///
/// ```
/// use fchange_source::{MockSource, Source};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let source = MockSource::with_files("/mock", [
///     ("DIR1/a.txt", "12345"),
///     ("DIR2/b.txt", "23456"),
/// ]);
/// assert_eq!(source.list().await?.len(), 2);
///
/// source.remove("DIR1/a.txt").await;
/// assert_eq!(source.list().await?.len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct MockSource {
    root: String,
    objects: RwLock<BTreeMap<String, MockObject>>,
    /// Behave like an object store that lists digests.
    supplies_digests: bool,
    offline: AtomicBool,
}
impl MockSource {
    /// Create a mock source pre-populated with files.
    ///
    /// Panics if any path fails validation (e.g. path traversal). If test
    /// setup is wrong, then test should not pass.
    pub fn with_files(
        root: impl Into<String>,
        files: impl IntoIterator<Item = (impl AsRef<str>, impl Into<Vec<u8>>)>,
    ) -> Self {
        let root = root.into();
        let mut objects = BTreeMap::new();
        for (name, data) in files {
            let key = Self::key(name.as_ref());
            let object = MockObject {
                data: data.into(),
                modified: DEFAULT_MODIFIED,
                unreadable: false,
            };
            objects.insert(key, object);
        }
        Self {
            root: root.trim_end_matches('/').to_string(),
            objects: RwLock::new(objects),
            supplies_digests: false,
            offline: AtomicBool::new(false),
        }
    }

    pub fn new(root: impl Into<String>) -> Self {
        let files: [(&str, &str); 0] = [];
        Self::with_files(root, files)
    }

    /// List objects with their BLAKE3 digest already attached.
    pub fn supplying_digests(mut self) -> Self {
        self.supplies_digests = true;
        self
    }

    fn key(name: &str) -> String {
        match validate_key(name) {
            Ok(key) => key,
            // The panic here is DELIBERATE. MockSource is intended to be
            // used in tests; panics are expected. There is no error result.
            Err(_) => panic!("MockSource: invalid path {name}"),
        }
    }

    fn location(&self, key: &str) -> String {
        format!("{}/{key}", self.root)
    }

    fn object_info(&self, key: &str, object: &MockObject) -> ObjectInfo {
        let info = ObjectInfo::new(self.location(key), object.data.len() as u64, object.modified, Origin::Remote);
        match self.supplies_digests {
            true => info.with_digest(blake3::hash(&object.data).to_hex().to_string()),
            false => info,
        }
    }

    /// Add or replace an object, keeping the default modification time.
    pub async fn write(&self, name: &str, data: impl Into<Vec<u8>>) {
        self.write_at(name, data, DEFAULT_MODIFIED).await;
    }

    pub async fn write_at(&self, name: &str, data: impl Into<Vec<u8>>, modified: OffsetDateTime) {
        let object = MockObject {
            data: data.into(),
            modified,
            unreadable: false,
        };
        self.objects.write().await.insert(Self::key(name), object);
    }

    /// Change the modification time without touching the content.
    pub async fn touch(&self, name: &str, modified: OffsetDateTime) {
        let key = Self::key(name);
        match self.objects.write().await.get_mut(&key) {
            Some(object) => object.modified = modified,
            None => panic!("MockSource::touch: no object {name}"),
        }
    }

    pub async fn remove(&self, name: &str) {
        self.objects.write().await.remove(&Self::key(name));
    }

    /// Make the walk yield an error in place of this object.
    pub async fn make_unreadable(&self, name: &str) {
        let key = Self::key(name);
        match self.objects.write().await.get_mut(&key) {
            Some(object) => object.unreadable = true,
            None => panic!("MockSource::make_unreadable: no object {name}"),
        }
    }

    /// Make [`check()`](Source::check) fail as if the root had disappeared.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Relaxed);
    }
}

#[async_trait]
impl Source for MockSource {
    fn root(&self) -> &str {
        &self.root
    }

    async fn check(&self) -> Result<()> {
        if self.offline.load(Ordering::Relaxed) {
            exn::bail!(ErrorKind::NotFound(PathBuf::from(&self.root)));
        }
        Ok(())
    }

    fn walk(&self) -> WalkStream<'_> {
        Box::pin(stream! {
            // Snapshot under the read lock, then drop it before yielding to
            // avoid holding the lock across yield points.
            let snapshot: Vec<(String, MockObject)> = {
                let guard = self.objects.read().await;
                guard.iter().map(|(key, object)| (key.clone(), object.clone())).collect()
            };
            let mut current: Option<String> = None;
            for (key, object) in snapshot {
                let parent = match key.rsplit_once('/') {
                    Some((parent, _)) => self.location(parent),
                    None => self.root.clone(),
                };
                if let Some(previous) = current.take_if(|previous| *previous != parent) {
                    yield Ok(Walked::Directory(previous));
                }
                current = Some(parent);
                if object.unreadable {
                    yield Err(exn::Exn::from(ErrorKind::PermissionDenied(PathBuf::from(self.location(&key)))));
                    continue;
                }
                yield Ok(Walked::Object(self.object_info(&key, &object)));
            }
            if let Some(last) = current {
                yield Ok(Walked::Directory(last));
            }
        })
    }

    async fn digest(&self, object: &ObjectInfo) -> Result<String> {
        if let Some(digest) = &object.digest {
            return Ok(digest.clone());
        }
        let key = object
            .location
            .strip_prefix(&self.root)
            .and_then(|key| key.strip_prefix('/'))
            .unwrap_or(&object.location);
        let guard = self.objects.read().await;
        match guard.get(key) {
            Some(stored) => Ok(blake3::hash(&stored.data).to_hex().to_string()),
            None => exn::bail!(ErrorKind::NotFound(PathBuf::from(&object.location))),
        }
    }
}
