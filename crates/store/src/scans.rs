//! Scan lifecycle and scan roots.

use crate::Database;
use crate::error::{ErrorKind, Result};
use crate::models::{Scan, ScanRow, duration_millis, format_time};
use crate::queries::Statement;
use exn::ResultExt;
use sqlx::AnyConnection;
use std::collections::BTreeSet;
use std::time::Duration;
use time::OffsetDateTime;

/// Registry of scan roots and of the scans taken over them.
///
/// Roots are never deleted; disabling one only stops it from being picked up
/// by future scans, and every record already taken of it stays queryable.
#[derive(Debug, Clone)]
pub struct ScanStore {
    db: Database,
}
impl From<&Database> for ScanStore {
    fn from(db: &Database) -> Self {
        Self { db: db.clone() }
    }
}
impl ScanStore {
    // =========================================================================
    // Roots
    // =========================================================================

    /// Register a root. Registering a known root changes nothing, not even
    /// its enabled flag.
    pub async fn add_root(&self, location: &str) -> Result<()> {
        sqlx::query(self.db.sql(Statement::AddRoot))
            .bind(location)
            .execute(self.db.pool())
            .await
            .or_raise(|| ErrorKind::Database)?;
        tracing::debug!(root = location, "root registered");
        Ok(())
    }

    pub async fn disable_root(&self, location: &str) -> Result<()> {
        let result = sqlx::query(self.db.sql(Statement::DisableRoot))
            .bind(location)
            .execute(self.db.pool())
            .await
            .or_raise(|| ErrorKind::Database)?;
        if result.rows_affected() == 0 {
            tracing::warn!(root = location, "cannot disable unknown root");
        }
        Ok(())
    }

    pub async fn enabled_roots(&self) -> Result<BTreeSet<String>> {
        let roots: Vec<String> = sqlx::query_scalar(self.db.sql(Statement::EnabledRoots))
            .fetch_all(self.db.pool())
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(roots.into_iter().collect())
    }

    /// Id of a registered root, whether or not it is enabled.
    pub async fn root_id(&self, conn: &mut AnyConnection, location: &str) -> Result<Option<i64>> {
        sqlx::query_scalar(self.db.sql(Statement::RootId))
            .bind(location)
            .fetch_optional(conn)
            .await
            .or_raise(|| ErrorKind::Database)
    }

    // =========================================================================
    // Scans
    // =========================================================================

    /// Start a new scan. Its duration stays unset until [`complete_scan`](Self::complete_scan).
    pub async fn begin_scan(&self, conn: &mut AnyConnection, time: OffsetDateTime) -> Result<i64> {
        let scanid: i64 = sqlx::query_scalar(self.db.sql(Statement::InsertScan))
            .bind(format_time(time)?)
            .fetch_one(conn)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(scanid)
    }

    /// Record the duration of a scan. A scan can only be completed once.
    pub async fn complete_scan(&self, conn: &mut AnyConnection, scanid: i64, duration: Duration) -> Result<()> {
        let result = sqlx::query(self.db.sql(Statement::CompleteScan))
            .bind(duration_millis(duration)?)
            .bind(scanid)
            .execute(conn)
            .await
            .or_raise(|| ErrorKind::Database)?;
        if result.rows_affected() == 0 {
            exn::bail!(ErrorKind::ScanNotOpen(scanid));
        }
        Ok(())
    }

    /// The most recently *started* scan, which may still be incomplete.
    pub async fn last_scan(&self) -> Result<Option<i64>> {
        self.max_scanid(Statement::LastScan).await
    }

    /// The most recently started scan that also completed.
    pub async fn last_complete_scan(&self) -> Result<Option<i64>> {
        self.max_scanid(Statement::LastCompleteScan).await
    }

    async fn max_scanid(&self, statement: Statement) -> Result<Option<i64>> {
        let scanid: Option<i64> = sqlx::query_scalar(self.db.sql(statement))
            .fetch_one(self.db.pool())
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(scanid)
    }

    pub async fn get_scan(&self, scanid: i64) -> Result<Option<Scan>> {
        let row: Option<ScanRow> = sqlx::query_as(self.db.sql(Statement::GetScan))
            .bind(scanid)
            .fetch_optional(self.db.pool())
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(Scan::try_from).transpose()
    }

    pub async fn list_scans(&self) -> Result<Vec<Scan>> {
        let rows: Vec<ScanRow> = sqlx::query_as(self.db.sql(Statement::ListScans))
            .fetch_all(self.db.pool())
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(Scan::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[tokio::test]
    async fn test_root_lifecycle() {
        let db = Database::connect_in_memory().await.unwrap();
        let scans = ScanStore::from(&db);
        scans.add_root("/srv/a").await.unwrap();
        scans.add_root("/srv/b").await.unwrap();
        scans.add_root("/srv/a").await.unwrap();
        assert_eq!(scans.enabled_roots().await.unwrap(), BTreeSet::from(["/srv/a".into(), "/srv/b".into()]));
        scans.disable_root("/srv/a").await.unwrap();
        assert_eq!(scans.enabled_roots().await.unwrap(), BTreeSet::from(["/srv/b".into()]));
        // Disabled roots keep their id.
        let mut conn = db.pool().acquire().await.unwrap();
        assert!(scans.root_id(&mut conn, "/srv/a").await.unwrap().is_some());
        assert!(scans.root_id(&mut conn, "/srv/c").await.unwrap().is_none());
        drop(conn);
        // Disabling is permanent; adding the root again doesn't undo it.
        scans.add_root("/srv/a").await.unwrap();
        assert_eq!(scans.enabled_roots().await.unwrap(), BTreeSet::from(["/srv/b".into()]));
        db.close().await;
    }

    #[tokio::test]
    async fn test_disable_unknown_root_is_harmless() {
        let db = Database::connect_in_memory().await.unwrap();
        ScanStore::from(&db).disable_root("/nowhere").await.unwrap();
        db.close().await;
    }

    #[tokio::test]
    async fn test_scan_lifecycle() {
        let db = Database::connect_in_memory().await.unwrap();
        let scans = ScanStore::from(&db);
        assert_eq!(scans.last_scan().await.unwrap(), None);
        let mut conn = db.pool().acquire().await.unwrap();
        let first = scans.begin_scan(&mut conn, datetime!(2024-01-01 00:00 UTC)).await.unwrap();
        scans.complete_scan(&mut conn, first, Duration::from_millis(2500)).await.unwrap();
        let second = scans.begin_scan(&mut conn, datetime!(2024-01-02 00:00 UTC)).await.unwrap();
        drop(conn);

        // The incomplete scan is still the most recently started one.
        assert_eq!(scans.last_scan().await.unwrap(), Some(second));
        assert_eq!(scans.last_complete_scan().await.unwrap(), Some(first));

        let listed = scans.list_scans().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].duration, Some(Duration::from_millis(2500)));
        assert!(!listed[1].is_complete());
        assert_eq!(scans.get_scan(second).await.unwrap().unwrap().time, datetime!(2024-01-02 00:00 UTC));
        assert!(scans.get_scan(second + 1).await.unwrap().is_none());
        db.close().await;
    }

    #[tokio::test]
    async fn test_complete_scan_only_once() {
        let db = Database::connect_in_memory().await.unwrap();
        let scans = ScanStore::from(&db);
        let mut conn = db.pool().acquire().await.unwrap();
        let scanid = scans.begin_scan(&mut conn, OffsetDateTime::now_utc()).await.unwrap();
        scans.complete_scan(&mut conn, scanid, Duration::from_secs(1)).await.unwrap();
        let err = scans.complete_scan(&mut conn, scanid, Duration::from_secs(2)).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::ScanNotOpen(id) if *id == scanid));
        let err = scans.complete_scan(&mut conn, 999, Duration::from_secs(2)).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::ScanNotOpen(999)));
        drop(conn);
        db.close().await;
    }
}
