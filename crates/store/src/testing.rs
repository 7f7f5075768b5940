//! Builds small indexes by hand for the query tests.

use crate::{ContentHashStore, Database, FileRecordStore, NewFileRecord, PathInterner, ScanStore};
use std::time::Duration;
use time::macros::datetime;

pub(crate) const ROOT: &str = "/r";

pub(crate) struct TestFile {
    path: &'static str,
    digest: &'static str,
    mtime: i64,
}

/// A file whose size is the length of its (fake) digest, so equal content
/// always means equal size.
pub(crate) fn file(path: &'static str, digest: &'static str, mtime: i64) -> TestFile {
    TestFile { path, digest, mtime }
}

pub(crate) struct Fixture {
    pub(crate) db: Database,
}
impl Fixture {
    pub(crate) async fn new() -> Self {
        let db = Database::connect_in_memory().await.unwrap();
        ScanStore::from(&db).add_root(ROOT).await.unwrap();
        Self { db }
    }

    /// Record one complete scan containing exactly `files`.
    pub(crate) async fn scan(&self, files: &[TestFile]) -> i64 {
        let scans = ScanStore::from(&self.db);
        let paths = PathInterner::from(&self.db);
        let hashes = ContentHashStore::from(&self.db);
        let records = FileRecordStore::from(&self.db);
        // Scan times must be unique.
        let taken = scans.list_scans().await.unwrap().len() as i64;
        let time = datetime!(2024-01-01 00:00 UTC) + time::Duration::minutes(taken);

        let mut batch = self.db.begin().await.unwrap();
        let conn = batch.conn().unwrap();
        let scanid = scans.begin_scan(conn, time).await.unwrap();
        let rootid = scans.root_id(conn, ROOT).await.unwrap().unwrap();
        for file in files {
            let record = NewFileRecord {
                pathid: paths.resolve_path(conn, file.path).await.unwrap(),
                rootid,
                mtime: file.mtime,
                size: file.digest.len() as u64,
                hashid: hashes.resolve_hash(conn, file.digest).await.unwrap(),
                scanid,
            };
            records.append(conn, &record).await.unwrap();
        }
        scans.complete_scan(conn, scanid, Duration::from_millis(1)).await.unwrap();
        batch.commit().await.unwrap();
        scanid
    }
}
