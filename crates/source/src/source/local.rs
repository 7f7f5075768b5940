//! Local filesystem source.
//!
//! Walks a directory tree with `tokio::fs`, depth first, yielding every
//! regular file and (optionally) the members of every zip archive it finds.
//! Symbolic links and special files are never followed or indexed.

use super::archive::{self, ArchiveCache, ArchiveOptions};
use super::{Source, WalkStream, Walked};
use crate::digest::hash_reader;
use crate::error::{ErrorKind, Result};
use crate::models::{ObjectInfo, Origin};
use async_stream::stream;
use async_trait::async_trait;
use exn::{OptionExt, ResultExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::fs::{self, DirEntry};

enum WalkEntry {
    File(ObjectInfo),
    Descend(PathBuf),
    Skip,
}

async fn blocking<T: Send + 'static>(task: impl FnOnce() -> Result<T> + Send + 'static) -> Result<T> {
    tokio::task::spawn_blocking(task)
        .await
        .or_raise(|| ErrorKind::BackendError("blocking task panicked".to_string()))?
}

fn location(path: &Path) -> Result<String> {
    path.to_str()
        .map(ToString::to_string)
        .ok_or_raise(|| ErrorKind::InvalidPath(path.to_path_buf()))
}

/// Local filesystem source.
///
/// Objects are located by their absolute path, and the root location is the
/// root directory exactly as given (`/srv/data`).
///
/// # Examples
///
/// ```no_run
/// use fchange_source::{ArchiveOptions, LocalSource};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let source = LocalSource::new("/srv/data")?.with_archives(ArchiveOptions::disabled());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct LocalSource {
    root: String,
    path: PathBuf,
    archives: ArchiveOptions,
    cache: Arc<ArchiveCache>,
}
impl LocalSource {
    /// Create a source for the directory at `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not absolute or not valid UTF-8. The
    /// directory itself isn't touched until [`check()`](Source::check).
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let path = root.as_ref().to_path_buf();
        if !path.is_absolute() {
            exn::bail!(ErrorKind::InvalidPath(path));
        }
        let root = location(&path)?;
        Ok(Self {
            root,
            path,
            archives: ArchiveOptions::default(),
            cache: Arc::new(ArchiveCache::default()),
        })
    }

    pub fn with_archives(mut self, archives: ArchiveOptions) -> Self {
        self.archives = archives;
        self
    }

    async fn process_entry(&self, entry: DirEntry) -> Result<WalkEntry> {
        let path = entry.path();
        // Doesn't follow symlinks.
        let file_type = entry.file_type().await.map_err(|e| ErrorKind::io(e, &path))?;
        if file_type.is_dir() {
            return Ok(WalkEntry::Descend(path));
        }
        if !file_type.is_file() {
            tracing::trace!(path = %path.display(), "skipping symlink or special file");
            return Ok(WalkEntry::Skip);
        }
        let metadata = entry.metadata().await.map_err(|e| ErrorKind::io(e, &path))?;
        let modified: OffsetDateTime = metadata.modified().map_err(|e| ErrorKind::io(e, &path))?.into();
        Ok(WalkEntry::File(ObjectInfo::new(
            location(&path)?,
            metadata.len(),
            modified,
            Origin::File(path),
        )))
    }

    /// Members of `object`, or nothing when it isn't an archive worth opening.
    async fn members(&self, object: &ObjectInfo) -> Vec<ObjectInfo> {
        let Origin::File(path) = &object.origin else {
            return Vec::new();
        };
        if !self.archives.wants(object) {
            return Vec::new();
        }
        let path = path.clone();
        let location = object.location.clone();
        let modified = object.modified;
        match blocking(move || archive::list_members(&path, &location, modified)).await {
            Ok(members) => members,
            Err(e) => {
                tracing::debug!(archive = %object.location, error = %*e, "cannot expand archive, indexing it as a plain file");
                Vec::new()
            },
        }
    }
}

#[async_trait]
impl Source for LocalSource {
    fn root(&self) -> &str {
        &self.root
    }

    async fn check(&self) -> Result<()> {
        let metadata = fs::metadata(&self.path).await.map_err(|e| ErrorKind::io(e, &self.path))?;
        if !metadata.is_dir() {
            exn::bail!(ErrorKind::NotADirectory(self.path.clone()));
        }
        Ok(())
    }

    fn walk(&self) -> WalkStream<'_> {
        let mut stack = vec![self.path.clone()];

        Box::pin(stream! {
            'dirs: while let Some(current) = stack.pop() {
                let mut entries = match fs::read_dir(&current).await {
                    Ok(entries) => entries,
                    // Removed since its parent was read.
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue 'dirs,
                    Err(err) => {
                        yield Err(exn::Exn::from(ErrorKind::io(err, &current)));
                        continue 'dirs;
                    },
                };

                'entries: loop {
                    let entry = match entries.next_entry().await {
                        Ok(Some(entry)) => entry,
                        Ok(None) => break 'entries,
                        Err(e) => {
                            yield Err(exn::Exn::from(ErrorKind::io(e, &current)));
                            // A failing directory handle won't recover.
                            break 'entries;
                        },
                    };
                    match self.process_entry(entry).await {
                        Ok(WalkEntry::File(object)) => {
                            let members = self.members(&object).await;
                            yield Ok(Walked::Object(object));
                            for member in members {
                                yield Ok(Walked::Object(member));
                            }
                        },
                        Ok(WalkEntry::Descend(dir)) => stack.push(dir),
                        Ok(WalkEntry::Skip) => {},
                        Err(e) => yield Err(e),
                    }
                }
                match location(&current) {
                    Ok(dir) => yield Ok(Walked::Directory(dir)),
                    Err(e) => yield Err(e),
                }
            }
        })
    }

    async fn digest(&self, object: &ObjectInfo) -> Result<String> {
        if let Some(digest) = &object.digest {
            return Ok(digest.clone());
        }
        match &object.origin {
            Origin::File(path) => {
                let path = path.clone();
                blocking(move || {
                    let file = std::fs::File::open(&path).map_err(|e| ErrorKind::io(e, &path))?;
                    Ok(hash_reader(file).map_err(|e| ErrorKind::io(e, &path))?)
                })
                .await
            },
            Origin::ArchiveMember { archive, index } => {
                let cache = Arc::clone(&self.cache);
                let (archive, index) = (archive.clone(), *index);
                blocking(move || cache.digest_member(&archive, index)).await
            },
            Origin::Remote => {
                exn::bail!(ErrorKind::BackendError(format!("no local content for {}", object.location)))
            },
        }
    }
}
