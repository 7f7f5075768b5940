use crate::error::{Error, ErrorKind};
use crate::models::path::join_path;
use exn::ResultExt;
use serde::Serialize;

/// One snapshot row: the state of one path in one scan.
///
/// Records are never updated after insertion. Read queries always join the
/// interned directory and file names so callers never need a second lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    pub fileid: i64,
    pub pathid: i64,
    pub rootid: i64,
    pub dirnameid: i64,
    pub dirname: String,
    pub filenameid: i64,
    pub filename: String,
    /// Unix seconds.
    pub mtime: i64,
    pub size: u64,
    pub hashid: i64,
    pub scanid: i64,
}
impl FileRecord {
    /// Full location of the file as it was ingested.
    pub fn path(&self) -> String {
        join_path(&self.dirname, &self.filename)
    }
}

/// Everything needed to append a [`FileRecord`]; ids come from the interners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewFileRecord {
    pub pathid: i64,
    pub rootid: i64,
    pub mtime: i64,
    pub size: u64,
    pub hashid: i64,
    pub scanid: i64,
}

#[derive(sqlx::FromRow)]
pub(crate) struct FileRow {
    fileid: i64,
    pathid: i64,
    rootid: i64,
    dirnameid: i64,
    dirname: String,
    filenameid: i64,
    filename: String,
    mtime: i64,
    size: i64,
    hashid: i64,
    scanid: i64,
}
impl TryFrom<FileRow> for FileRecord {
    type Error = Error;
    fn try_from(row: FileRow) -> Result<Self, Self::Error> {
        Ok(Self {
            fileid: row.fileid,
            pathid: row.pathid,
            rootid: row.rootid,
            dirnameid: row.dirnameid,
            dirname: row.dirname,
            filenameid: row.filenameid,
            filename: row.filename,
            mtime: row.mtime,
            size: u64::try_from(row.size).or_raise(|| ErrorKind::InvalidData("file size"))?,
            hashid: row.hashid,
            scanid: row.scanid,
        })
    }
}
