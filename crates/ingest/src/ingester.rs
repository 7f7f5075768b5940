use crate::error::{ErrorKind, Result};
use crate::filter::ExtensionFilter;
use crate::record::{Effort, Outcome, Recorder};
use async_stream::stream;
use exn::{OptionExt, ResultExt};
use fchange_config::{Config, DEFAULT_COMMIT_EVERY, IngestConfig};
use fchange_source::{SourceHandle, SourceOptions, Walked};
use fchange_store::{Batch, ContentHashStore, Database, FileRecordStore, PathInterner, ScanStore};
use futures::{Stream, StreamExt, TryStreamExt};
use std::pin::pin;
use std::time::{Duration, Instant};
use time::OffsetDateTime;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestOptions {
    /// Commit the running transaction after this many directories.
    pub commit_every: usize,
    pub filter: ExtensionFilter,
}
impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            commit_every: DEFAULT_COMMIT_EVERY,
            filter: ExtensionFilter::default(),
        }
    }
}
impl From<&IngestConfig> for IngestOptions {
    fn from(config: &IngestConfig) -> Self {
        Self {
            commit_every: config.commit_every,
            filter: ExtensionFilter::new(&config.only_ext, &config.ignore_ext),
        }
    }
}

/// Counters for one completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub scanid: i64,
    /// Records appended.
    pub files: u64,
    pub directories: u64,
    /// Objects whose content had to be read.
    pub hashed: u64,
    pub cached: u64,
    pub supplied: u64,
    pub skipped: u64,
    pub filtered: u64,
    pub elapsed: Duration,
}
impl IngestSummary {
    fn count(&mut self, effort: Effort) {
        self.files += 1;
        match effort {
            Effort::Hashed => self.hashed += 1,
            Effort::Cached => self.cached += 1,
            Effort::Supplied => self.supplied += 1,
        }
    }
}

/// Progress events emitted by [`Ingester::ingest`].
///
/// Events follow a strict ordering:
/// 1. [`Started`](Self::Started), exactly once, after every root has been
///    checked and the scan row has been committed.
/// 2. Per root: [`RootStarted`](Self::RootStarted), then any number of
///    object and commit events, then [`RootComplete`](Self::RootComplete).
/// 3. [`Complete`](Self::Complete), exactly once, after the final commit.
///
/// An `Err` item ends the stream. Before `Started` it means nothing was
/// written; after it, the scan is left incomplete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestEvent {
    Started { scanid: i64 },
    RootStarted { root: String },
    Recorded { location: String, effort: Effort },
    /// An object (or, when `location` is unknown, a directory) could not be
    /// read and wasn't recorded.
    Skipped { location: Option<String>, reason: String },
    /// Excluded by the extension filter.
    Filtered { location: String },
    /// Everything up to here is durable.
    Committed { directories: u64 },
    RootComplete { root: String },
    Complete(IngestSummary),
}

/// A scan that has been started.
struct Run {
    batch: Batch,
    roots: Vec<(SourceHandle, i64)>,
    scanid: i64,
    started: Instant,
}

/// Turns walks of registered roots into scans.
#[derive(Debug, Clone)]
pub struct Ingester {
    db: Database,
    scans: ScanStore,
    paths: PathInterner,
    hashes: ContentHashStore,
    files: FileRecordStore,
    sources: SourceOptions,
    options: IngestOptions,
}
impl Ingester {
    pub fn new(db: &Database, sources: SourceOptions, options: IngestOptions) -> Self {
        Self {
            db: db.clone(),
            scans: ScanStore::from(db),
            paths: PathInterner::from(db),
            hashes: ContentHashStore::from(db),
            files: FileRecordStore::from(db),
            sources,
            options,
        }
    }

    pub fn from_config(db: &Database, config: &Config) -> Self {
        Self::new(db, config.source_options(), IngestOptions::from(&config.ingest))
    }

    /// Scan every location into one new scan.
    ///
    /// Each location must be a registered root; it is opened as a local
    /// directory or an `s3://` prefix with this ingester's source options.
    pub fn ingest<'a>(&'a self, locations: &[String]) -> impl Stream<Item = Result<IngestEvent>> + 'a {
        let opened: Result<Vec<SourceHandle>> = locations
            .iter()
            .map(|location| {
                fchange_source::open(location, &self.sources)
                    .or_raise(|| ErrorKind::Configuration(format!("cannot open root {location}")))
            })
            .collect();
        stream!({
            let sources = match opened {
                Ok(sources) => sources,
                Err(e) => {
                    yield Err(e);
                    return;
                },
            };
            for await event in self.ingest_sources(sources) {
                yield event;
            }
        })
    }

    /// Scan already opened sources into one new scan.
    pub fn ingest_sources(&self, sources: Vec<SourceHandle>) -> impl Stream<Item = Result<IngestEvent>> + '_ {
        stream!({
            let Run { mut batch, roots, scanid, started } = match self.start(sources).await {
                Ok(run) => run,
                Err(e) => {
                    yield Err(e);
                    return;
                },
            };
            yield Ok(IngestEvent::Started { scanid });

            let recorder = Recorder {
                paths: &self.paths,
                hashes: &self.hashes,
                files: &self.files,
                scanid,
            };
            let mut summary = IngestSummary {
                scanid,
                ..Default::default()
            };
            let mut uncommitted = 0;
            for (source, rootid) in &roots {
                let root = source.root().to_string();
                tracing::debug!(scanid, root = %root, "walking root");
                yield Ok(IngestEvent::RootStarted { root: root.clone() });

                let mut walk = source.walk();
                while let Some(step) = walk.next().await {
                    match step {
                        Err(e) => {
                            tracing::warn!(root = %root, error = %*e, "skipping unreadable entry");
                            summary.skipped += 1;
                            yield Ok(IngestEvent::Skipped { location: None, reason: (*e).to_string() });
                        },
                        Ok(Walked::Directory(_)) => {
                            summary.directories += 1;
                            uncommitted += 1;
                            if uncommitted < self.options.commit_every {
                                continue;
                            }
                            uncommitted = 0;
                            if let Err(e) = batch.checkpoint().await.or_raise(|| ErrorKind::Store) {
                                yield Err(e);
                                return;
                            }
                            tracing::debug!(scanid, directories = summary.directories, "committed");
                            yield Ok(IngestEvent::Committed { directories: summary.directories });
                        },
                        Ok(Walked::Object(object)) if !self.options.filter.accepts(&object) => {
                            summary.filtered += 1;
                            yield Ok(IngestEvent::Filtered { location: object.location });
                        },
                        Ok(Walked::Object(object)) => {
                            match recorder.record(&mut batch, source.as_ref(), *rootid, &object).await {
                                Ok(Outcome::Recorded(effort)) => {
                                    summary.count(effort);
                                    yield Ok(IngestEvent::Recorded { location: object.location, effort });
                                },
                                Ok(Outcome::Unreadable(e)) => {
                                    tracing::warn!(location = %object.location, error = %*e, "skipping unreadable object");
                                    summary.skipped += 1;
                                    yield Ok(IngestEvent::Skipped { location: Some(object.location), reason: (*e).to_string() });
                                },
                                Err(e) => {
                                    yield Err(e);
                                    return;
                                },
                            }
                        },
                    }
                }
                yield Ok(IngestEvent::RootComplete { root });
            }

            summary.elapsed = started.elapsed();
            if let Err(e) = self.finish(batch, scanid, summary.elapsed).await {
                yield Err(e);
                return;
            }
            tracing::info!(
                scanid,
                files = summary.files,
                hashed = summary.hashed,
                skipped = summary.skipped,
                elapsed_ms = summary.elapsed.as_millis(),
                "scan complete"
            );
            yield Ok(IngestEvent::Complete(summary));
        })
    }

    /// Check every root, then create and commit the scan row.
    #[tracing::instrument(level = "debug", skip_all, fields(roots = sources.len()))]
    async fn start(&self, sources: Vec<SourceHandle>) -> Result<Run> {
        if sources.is_empty() {
            exn::bail!(ErrorKind::Configuration("no roots to scan".to_string()));
        }
        for source in &sources {
            source
                .check()
                .await
                .or_raise(|| ErrorKind::Configuration(format!("root {} cannot be read", source.root())))?;
        }
        let unusable = || ErrorKind::Configuration("index database is unusable".to_string());
        let mut batch = self.db.begin().await.or_raise(unusable)?;
        let conn = batch.conn().or_raise(unusable)?;
        let mut roots: Vec<(SourceHandle, i64)> = Vec::with_capacity(sources.len());
        for source in sources {
            if roots.iter().any(|(seen, _)| seen.root() == source.root()) {
                tracing::warn!(root = source.root(), "root given twice, scanning it once");
                continue;
            }
            let rootid = self
                .scans
                .root_id(conn, source.root())
                .await
                .or_raise(unusable)?
                .ok_or_raise(|| ErrorKind::Configuration(format!("root {} is not registered", source.root())))?;
            roots.push((source, rootid));
        }
        let scanid = self.scans.begin_scan(conn, OffsetDateTime::now_utc()).await.or_raise(|| ErrorKind::Store)?;
        batch.checkpoint().await.or_raise(|| ErrorKind::Store)?;
        tracing::info!(scanid, roots = roots.len(), "scan started");
        Ok(Run {
            batch,
            roots,
            scanid,
            started: Instant::now(),
        })
    }

    async fn finish(&self, mut batch: Batch, scanid: i64, elapsed: Duration) -> Result<()> {
        let conn = batch.conn().or_raise(|| ErrorKind::Store)?;
        self.scans.complete_scan(conn, scanid, elapsed).await.or_raise(|| ErrorKind::Store)?;
        batch.commit().await.or_raise(|| ErrorKind::Store)
    }

    pub fn options(&self) -> &IngestOptions {
        &self.options
    }

    /// [`ingest()`](Self::ingest) to completion.
    pub async fn run(&self, locations: &[String]) -> Result<IngestSummary> {
        Self::drain(self.ingest(locations)).await
    }

    /// [`ingest_sources()`](Self::ingest_sources) to completion.
    pub async fn run_sources(&self, sources: Vec<SourceHandle>) -> Result<IngestSummary> {
        Self::drain(self.ingest_sources(sources)).await
    }

    /// Scan every enabled root into one new scan.
    pub async fn scan_enabled_roots(&self) -> Result<IngestSummary> {
        let roots: Vec<String> = self
            .scans
            .enabled_roots()
            .await
            .or_raise(|| ErrorKind::Configuration("cannot list roots".to_string()))?
            .into_iter()
            .collect();
        self.run(&roots).await
    }

    async fn drain(events: impl Stream<Item = Result<IngestEvent>>) -> Result<IngestSummary> {
        let mut events = pin!(events);
        while let Some(event) = events.try_next().await? {
            if let IngestEvent::Complete(summary) = event {
                return Ok(summary);
            }
        }
        exn::bail!(ErrorKind::Store)
    }
}
