//! Interning of directory names, file names, paths and content digests.
//!
//! Every interned value maps to exactly one id and back. Values are created
//! lazily the first time they are seen and are never modified or deleted, so
//! ids are safe to hold on to for the lifetime of the database.
//!
//! Resolution is "insert if absent, then select". A concurrent writer that
//! wins the race simply makes our insert a no-op, and the select returns the
//! winner's row; there is no error path for it. Long-running writers should
//! intern on [`Batch::interning`](crate::Batch::interning) so that the insert
//! is committed right away and never held by an open transaction.

use crate::Database;
use crate::error::{ErrorKind, Result};
use crate::models::{PathName, split_path};
use crate::queries::Statement;
use exn::ResultExt;
use sqlx::AnyConnection;

async fn intern(
    db: &Database,
    conn: &mut AnyConnection,
    insert: Statement,
    select: Statement,
    value: &str,
) -> Result<i64> {
    sqlx::query(db.sql(insert))
        .bind(value)
        .execute(&mut *conn)
        .await
        .or_raise(|| ErrorKind::Database)?;
    let id: i64 = sqlx::query_scalar(db.sql(select))
        .bind(value)
        .fetch_one(&mut *conn)
        .await
        .or_raise(|| ErrorKind::Database)?;
    Ok(id)
}

/// Resolves directory names, file names and full paths to stable ids.
#[derive(Debug, Clone)]
pub struct PathInterner {
    db: Database,
}
impl From<&Database> for PathInterner {
    fn from(db: &Database) -> Self {
        Self { db: db.clone() }
    }
}
impl PathInterner {
    pub async fn resolve_dirname(&self, conn: &mut AnyConnection, dirname: &str) -> Result<i64> {
        intern(&self.db, conn, Statement::InsertDirname, Statement::SelectDirname, dirname).await
    }

    pub async fn resolve_filename(&self, conn: &mut AnyConnection, filename: &str) -> Result<i64> {
        intern(&self.db, conn, Statement::InsertFilename, Statement::SelectFilename, filename).await
    }

    /// Resolve a full location (`/srv/data/a.txt`, `/srv/b.zip/c.txt`,
    /// `s3://bucket/key`) to its path id, interning both components.
    pub async fn resolve_path(&self, conn: &mut AnyConnection, path: &str) -> Result<i64> {
        let (dirname, filename) = split_path(path);
        let dirnameid = self.resolve_dirname(conn, dirname).await?;
        let filenameid = self.resolve_filename(conn, filename).await?;
        sqlx::query(self.db.sql(Statement::InsertPath))
            .bind(dirnameid)
            .bind(filenameid)
            .execute(&mut *conn)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let pathid: i64 = sqlx::query_scalar(self.db.sql(Statement::SelectPath))
            .bind(dirnameid)
            .bind(filenameid)
            .fetch_one(&mut *conn)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(pathid)
    }

    /// Reverse lookup of a path id.
    pub async fn lookup(&self, pathid: i64) -> Result<Option<PathName>> {
        sqlx::query_as(self.db.sql(Statement::LookupPath))
            .bind(pathid)
            .fetch_optional(self.db.pool())
            .await
            .or_raise(|| ErrorKind::Database)
    }
}

/// Resolves content digests to stable ids.
#[derive(Debug, Clone)]
pub struct ContentHashStore {
    db: Database,
}
impl From<&Database> for ContentHashStore {
    fn from(db: &Database) -> Self {
        Self { db: db.clone() }
    }
}
impl ContentHashStore {
    pub async fn resolve_hash(&self, conn: &mut AnyConnection, digest: &str) -> Result<i64> {
        intern(&self.db, conn, Statement::InsertHash, Statement::SelectHash, digest).await
    }

    /// Id of an already known digest, without interning it.
    pub async fn find(&self, digest: &str) -> Result<Option<i64>> {
        sqlx::query_scalar(self.db.sql(Statement::SelectHash))
            .bind(digest)
            .fetch_optional(self.db.pool())
            .await
            .or_raise(|| ErrorKind::Database)
    }

    pub async fn lookup(&self, hashid: i64) -> Result<Option<String>> {
        sqlx::query_scalar(self.db.sql(Statement::LookupHash))
            .bind(hashid)
            .fetch_optional(self.db.pool())
            .await
            .or_raise(|| ErrorKind::Database)
    }
}
