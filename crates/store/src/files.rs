//! Append-only per-scan file snapshots.

use crate::Database;
use crate::error::{ErrorKind, Result};
use crate::models::{FileRecord, FileRow, NewFileRecord};
use crate::queries::Statement;
use exn::ResultExt;
use sqlx::{Any, AnyConnection};
use std::collections::HashMap;

fn sql_size(size: u64) -> Result<i64> {
    i64::try_from(size).or_raise(|| ErrorKind::InvalidData("file size"))
}

/// Store of [`FileRecord`]s.
///
/// Writes go through a caller-supplied connection so that an ingest run can
/// batch them into its own transaction; reads use the pool.
#[derive(Debug, Clone)]
pub struct FileRecordStore {
    db: Database,
}
impl From<&Database> for FileRecordStore {
    fn from(db: &Database) -> Self {
        Self { db: db.clone() }
    }
}
impl FileRecordStore {
    /// Hash id recorded for this exact `(pathid, mtime, size)` triple in any
    /// earlier scan.
    ///
    /// Matching modification time and size is taken as proof that the content
    /// did not change. A file rewritten with identical size and a restored
    /// mtime will not be re-hashed.
    pub async fn cached_hash_if_unchanged(
        &self,
        conn: &mut AnyConnection,
        pathid: i64,
        mtime: i64,
        size: u64,
    ) -> Result<Option<i64>> {
        sqlx::query_scalar(self.db.sql(Statement::CachedHash))
            .bind(pathid)
            .bind(mtime)
            .bind(sql_size(size)?)
            .fetch_optional(conn)
            .await
            .or_raise(|| ErrorKind::Database)
    }

    /// Append a snapshot row and return its file id.
    pub async fn append(&self, conn: &mut AnyConnection, record: &NewFileRecord) -> Result<i64> {
        let fileid: i64 = sqlx::query_scalar(self.db.sql(Statement::AppendFile))
            .bind(record.pathid)
            .bind(record.rootid)
            .bind(record.mtime)
            .bind(sql_size(record.size)?)
            .bind(record.hashid)
            .bind(record.scanid)
            .fetch_one(conn)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(fileid)
    }

    /// Every record of a scan, ordered by location.
    pub async fn all_files(&self, scanid: i64) -> Result<Vec<FileRecord>> {
        self.records(Statement::AllFiles, &[scanid]).await
    }

    pub async fn count_files(&self, scanid: i64) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(self.db.sql(Statement::CountFiles))
            .bind(scanid)
            .fetch_one(self.db.pool())
            .await
            .or_raise(|| ErrorKind::Database)?;
        u64::try_from(count).or_raise(|| ErrorKind::InvalidData("file count"))
    }

    /// Every record, across all scans, whose content has the given digest.
    pub async fn files_with_hash(&self, digest: &str) -> Result<Vec<FileRecord>> {
        let rows: Vec<FileRow> = sqlx::query_as(self.db.sql(Statement::FilesWithHash))
            .bind(digest)
            .fetch_all(self.db.pool())
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(FileRecord::try_from).collect()
    }

    /// Run one of the record-returning queries with integer binds, in order.
    pub(crate) async fn records(&self, statement: Statement, binds: &[i64]) -> Result<Vec<FileRecord>> {
        let mut query = sqlx::query_as::<Any, FileRow>(self.db.sql(statement));
        for &bind in binds {
            query = query.bind(bind);
        }
        let rows = query.fetch_all(self.db.pool()).await.or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(FileRecord::try_from).collect()
    }

    /// Content that occurs exactly once in a scan, mapped to where it occurs.
    pub(crate) async fn singletons(&self, scanid: i64) -> Result<HashMap<i64, i64>> {
        let rows: Vec<(i64, i64)> = sqlx::query_as(self.db.sql(Statement::Singletons))
            .bind(scanid)
            .fetch_all(self.db.pool())
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(rows.into_iter().collect())
    }
}
