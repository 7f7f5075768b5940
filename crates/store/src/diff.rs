//! Differences between two scans.
//!
//! Every query here is a pure read scoped to explicit scan ids. Results are
//! only meaningful for completed scans; nothing stops a caller from diffing
//! a scan that is still being written, but the answer will be partial.

use crate::Database;
use crate::error::{ErrorKind, Result};
use crate::files::FileRecordStore;
use crate::intern::PathInterner;
use crate::models::{FileRecord, PathName, Scan};
use crate::queries::Statement;
use crate::scans::ScanStore;
use exn::OptionExt;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Files in one scan that share both content and size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateGroup {
    pub hashid: i64,
    pub size: u64,
    pub files: Vec<FileRecord>,
}
impl DuplicateGroup {
    /// Bytes that could be reclaimed by keeping only one copy.
    pub fn wasted_bytes(&self) -> u64 {
        self.size.saturating_mul(self.files.len().saturating_sub(1) as u64)
    }
}

/// Unchanged content that moved to a different path between two scans.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rename {
    pub hashid: i64,
    pub from: PathName,
    pub to: PathName,
}
impl Rename {
    pub fn source_path(&self) -> String {
        self.from.full_path()
    }

    pub fn dest_path(&self) -> String {
        self.to.full_path()
    }
}

/// Everything that changed between two scans, ready to be rendered.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub from: Scan,
    pub to: Scan,
    pub new_files: Vec<FileRecord>,
    pub deleted_files: Vec<FileRecord>,
    pub changed_files: Vec<FileRecord>,
    pub renamed_files: Vec<Rename>,
    /// Duplicates within the later scan.
    pub duplicate_files: Vec<DuplicateGroup>,
}
impl Report {
    pub fn wasted_bytes(&self) -> u64 {
        self.duplicate_files.iter().map(DuplicateGroup::wasted_bytes).sum()
    }
}

/// Rows arrive ordered by size then hash, so each group is contiguous.
fn group_duplicates(rows: Vec<FileRecord>) -> Vec<DuplicateGroup> {
    let mut groups: Vec<DuplicateGroup> = Vec::new();
    for record in rows {
        match groups.last_mut() {
            Some(group) if group.hashid == record.hashid && group.size == record.size => group.files.push(record),
            _ => groups.push(DuplicateGroup {
                hashid: record.hashid,
                size: record.size,
                files: vec![record],
            }),
        }
    }
    groups
}

/// Singleton matching: `(hashid, from pathid, to pathid)` for content that is
/// unique within both scans but sits at a different path in the later one.
///
/// Content with a copy anywhere else in either scan is never considered, so
/// duplicated files can't be mistaken for renames.
fn match_singletons(from: &HashMap<i64, i64>, to: &HashMap<i64, i64>) -> Vec<(i64, i64, i64)> {
    let pairs: HashSet<(i64, i64)> = from.iter().map(|(&hashid, &pathid)| (hashid, pathid)).collect();
    let mut renames: Vec<_> = to
        .iter()
        .filter_map(|(&hashid, &to_path)| {
            let &from_path = from.get(&hashid)?;
            (from_path != to_path && !pairs.contains(&(hashid, to_path))).then_some((hashid, from_path, to_path))
        })
        .collect();
    renames.sort_unstable();
    renames
}

/// Read-only comparisons between scans.
#[derive(Debug, Clone)]
pub struct DiffEngine {
    files: FileRecordStore,
    paths: PathInterner,
    scans: ScanStore,
}
impl From<&Database> for DiffEngine {
    fn from(db: &Database) -> Self {
        Self {
            files: FileRecordStore::from(db),
            paths: PathInterner::from(db),
            scans: ScanStore::from(db),
        }
    }
}
impl DiffEngine {
    /// Records of `to` at paths that don't appear in `from`.
    pub async fn new_files(&self, from: i64, to: i64) -> Result<Vec<FileRecord>> {
        self.files.records(Statement::NewFiles, &[to, from]).await
    }

    /// Records of `from` at paths that no longer appear in `to`.
    pub async fn deleted_files(&self, from: i64, to: i64) -> Result<Vec<FileRecord>> {
        self.new_files(to, from).await
    }

    /// Records of `to` whose path exists in both scans with different content.
    pub async fn changed_files(&self, from: i64, to: i64) -> Result<Vec<FileRecord>> {
        self.files.records(Statement::ChangedFiles, &[to, from]).await
    }

    /// Groups of identical files in one scan, larger than `min_size` bytes,
    /// largest first.
    pub async fn duplicate_files(&self, scanid: i64, min_size: u64) -> Result<Vec<DuplicateGroup>> {
        // Nothing can be larger than i64::MAX bytes anyway.
        let min_size = i64::try_from(min_size).unwrap_or(i64::MAX);
        let rows = self.files.records(Statement::DuplicateFiles, &[scanid, min_size, scanid]).await?;
        Ok(group_duplicates(rows))
    }

    /// Files whose unique content moved to another path between the scans.
    ///
    /// Only pairwise: a file moved twice across three scans shows up once per
    /// consecutive pair, never as a single chain.
    pub async fn renamed_files(&self, from: i64, to: i64) -> Result<Vec<Rename>> {
        let before = self.files.singletons(from).await?;
        let after = self.files.singletons(to).await?;
        let mut renames = Vec::new();
        for (hashid, from_path, to_path) in match_singletons(&before, &after) {
            renames.push(Rename {
                hashid,
                from: self.path(from_path).await?,
                to: self.path(to_path).await?,
            });
        }
        renames.sort_by_cached_key(Rename::source_path);
        Ok(renames)
    }

    async fn path(&self, pathid: i64) -> Result<PathName> {
        self.paths.lookup(pathid).await?.ok_or_raise(|| ErrorKind::InvalidData("dangling path id"))
    }

    /// Run every comparison between two scans.
    pub async fn report(&self, from: i64, to: i64, min_size: u64) -> Result<Report> {
        let (from_scan, to_scan) = (self.scan(from).await?, self.scan(to).await?);
        tracing::debug!(from, to, min_size, "building scan report");
        let report = Report {
            new_files: self.new_files(from, to).await?,
            deleted_files: self.deleted_files(from, to).await?,
            changed_files: self.changed_files(from, to).await?,
            renamed_files: self.renamed_files(from, to).await?,
            duplicate_files: self.duplicate_files(to, min_size).await?,
            from: from_scan,
            to: to_scan,
        };
        Ok(report)
    }

    async fn scan(&self, scanid: i64) -> Result<Scan> {
        self.scans.get_scan(scanid).await?.ok_or_raise(|| ErrorKind::ScanNotFound(scanid))
    }

    /// Compare the two most recently started scans.
    pub async fn report_latest(&self, min_size: u64) -> Result<Option<Report>> {
        let scans = self.scans.list_scans().await?;
        match scans.as_slice() {
            [.., from, to] => Ok(Some(self.report(from.scanid, to.scanid, min_size).await?)),
            _ => Ok(None),
        }
    }
}
