//! `[ingest]`, `[reports]` and `[s3]` sections.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use fchange_source::ArchiveOptions;
#[cfg(feature = "s3")]
use fchange_source::S3Credentials;
use fchange_store::{Database, DiffEngine, Report};
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Formatter};

/// Commit the running ingest transaction after this many directories.
pub const DEFAULT_COMMIT_EVERY: usize = 10;
/// Duplicate groups smaller than this (per file) aren't worth reporting.
pub const DEFAULT_MIN_DUPLICATE_SIZE: u64 = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub commit_every: usize,
    /// When not empty, only objects with one of these extensions are indexed.
    pub only_ext: Vec<String>,
    /// Objects with one of these extensions are never indexed.
    pub ignore_ext: Vec<String>,
    pub expand_archives: bool,
    pub archive_skip_ext: Vec<String>,
}
impl Default for IngestConfig {
    fn default() -> Self {
        let archives = ArchiveOptions::default();
        Self {
            commit_every: DEFAULT_COMMIT_EVERY,
            only_ext: Vec::new(),
            ignore_ext: Vec::new(),
            expand_archives: archives.expand,
            archive_skip_ext: archives.skip_extensions,
        }
    }
}
impl IngestConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.commit_every == 0 {
            exn::bail!(ErrorKind::invalid("ingest.commit_every"));
        }
        let lists = [
            ("ingest.only_ext", &self.only_ext),
            ("ingest.ignore_ext", &self.ignore_ext),
            ("ingest.archive_skip_ext", &self.archive_skip_ext),
        ];
        for (field, extensions) in lists {
            if extensions.iter().any(|ext| ext.trim_start_matches('.').is_empty() || ext.contains('/')) {
                exn::bail!(ErrorKind::invalid(field));
            }
        }
        Ok(())
    }

    pub fn archive_options(&self) -> ArchiveOptions {
        ArchiveOptions {
            expand: self.expand_archives,
            skip_extensions: self.archive_skip_ext.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportsConfig {
    /// Files of this size or smaller are left out of duplicate groups.
    pub min_duplicate_size: u64,
}
impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            min_duplicate_size: DEFAULT_MIN_DUPLICATE_SIZE,
        }
    }
}

impl ReportsConfig {
    /// Compare two scans with the configured thresholds.
    pub async fn report(&self, db: &Database, from: i64, to: i64) -> Result<Report> {
        DiffEngine::from(db).report(from, to, self.min_duplicate_size).await.or_raise(|| ErrorKind::Report)
    }

    /// Compare the two most recently started scans, if there are two.
    pub async fn latest_report(&self, db: &Database) -> Result<Option<Report>> {
        DiffEngine::from(db).report_latest(self.min_duplicate_size).await.or_raise(|| ErrorKind::Report)
    }
}

/// Credentials for every `s3://` root.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct S3Config {
    pub region: String,
    /// Custom endpoint URL for S3-compatible services
    #[serde(default)]
    pub endpoint: Option<String>,
    pub key_id: String,
    pub key_secret: String,
}
impl Debug for S3Config {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Config")
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}
impl S3Config {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.region.is_empty() {
            exn::bail!(ErrorKind::invalid("s3.region"));
        }
        if self.key_id.is_empty() {
            exn::bail!(ErrorKind::invalid("s3.key_id"));
        }
        if self.key_secret.is_empty() {
            exn::bail!(ErrorKind::invalid("s3.key_secret"));
        }
        Ok(())
    }

    #[cfg(feature = "s3")]
    pub fn credentials(&self) -> S3Credentials {
        S3Credentials {
            region: self.region.clone(),
            endpoint: self.endpoint.clone(),
            key_id: self.key_id.clone(),
            key_secret: self.key_secret.clone(),
        }
    }
}
