use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use fchange_source::{ObjectInfo, Source};
use fchange_store::{Batch, ContentHashStore, FileRecordStore, NewFileRecord, PathInterner};

/// How the content digest of a recorded object was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Effort {
    /// The content was read and hashed.
    Hashed,
    /// An earlier scan recorded this path with the same modification time
    /// and size; its hash was reused without reading anything.
    Cached,
    /// The listing came with a digest (remote entity tag).
    Supplied,
}

/// What happened to one object.
pub(crate) enum Outcome {
    Recorded(Effort),
    /// The object went away or became unreadable between listing and
    /// hashing.
    Unreadable(fchange_source::error::Error),
}

/// Everything needed to write records for one scan.
pub(crate) struct Recorder<'a> {
    pub(crate) paths: &'a PathInterner,
    pub(crate) hashes: &'a ContentHashStore,
    pub(crate) files: &'a FileRecordStore,
    pub(crate) scanid: i64,
}
impl Recorder<'_> {
    /// Intern, hash (only if needed) and append one object.
    ///
    /// Only store failures are errors; a digest that can't be computed is
    /// an [`Outcome::Unreadable`]. Names and digests are interned through
    /// [`Batch::interning`], the record itself is appended to the batch.
    pub(crate) async fn record(
        &self,
        batch: &mut Batch,
        source: &dyn Source,
        rootid: i64,
        object: &ObjectInfo,
    ) -> Result<Outcome> {
        let interning = batch.interning().await.or_raise(|| ErrorKind::Store)?;
        let pathid = self.paths.resolve_path(interning, &object.location).await.or_raise(|| ErrorKind::Store)?;
        let mtime = object.mtime();
        let (hashid, effort) = if let Some(digest) = &object.digest {
            let hashid = self.intern_hash(batch, digest).await?;
            (hashid, Effort::Supplied)
        } else if let Some(hashid) = self
            .files
            .cached_hash_if_unchanged(batch.conn().or_raise(|| ErrorKind::Store)?, pathid, mtime, object.size)
            .await
            .or_raise(|| ErrorKind::Store)?
        {
            tracing::trace!(location = %object.location, "unchanged since last scan");
            (hashid, Effort::Cached)
        } else {
            let digest = match source.digest(object).await {
                Ok(digest) => digest,
                Err(e) => return Ok(Outcome::Unreadable(e)),
            };
            let hashid = self.intern_hash(batch, &digest).await?;
            (hashid, Effort::Hashed)
        };
        let record = NewFileRecord {
            pathid,
            rootid,
            mtime,
            size: object.size,
            hashid,
            scanid: self.scanid,
        };
        let conn = batch.conn().or_raise(|| ErrorKind::Store)?;
        self.files.append(conn, &record).await.or_raise(|| ErrorKind::Store)?;
        Ok(Outcome::Recorded(effort))
    }

    async fn intern_hash(&self, batch: &mut Batch, digest: &str) -> Result<i64> {
        let interning = batch.interning().await.or_raise(|| ErrorKind::Store)?;
        self.hashes.resolve_hash(interning, digest).await.or_raise(|| ErrorKind::Store)
    }
}
