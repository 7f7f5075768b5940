//! Relational engines the index can be persisted to.
//!
//! Everything that differs between engines lives here as *data*: the
//! connection URL, the DDL, per-connection session statements and the bind
//! placeholder style. Queries and algorithms are written once against
//! [`Database`](crate::Database) and rendered for the configured engine when
//! the connection is opened.

use crate::error::{ErrorKind, Result};
use std::borrow::Cow;
use std::fmt::{Debug, Display, Formatter};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

// We want to make use of that async-goodness, so... 5-ish?
const MAX_CONNECTIONS: u32 = 5;

pub type BackendHandle = Arc<dyn StorageBackend + Send + Sync>;

/// A relational engine capable of holding the scan index.
///
/// Implementations must not contain any query logic of their own; the shared
/// algorithms in this crate only ever ask a backend how to *spell* things.
pub trait StorageBackend: Debug + Send + Sync {
    /// Short engine name, used for logging.
    fn name(&self) -> &'static str;

    /// Connection URL understood by the `sqlx` "any" driver.
    fn url(&self) -> String;

    /// Upper bound for the connection pool.
    fn max_connections(&self) -> u32 {
        MAX_CONNECTIONS
    }

    /// DDL template for every table and index. Table and index names carry a
    /// `{prefix}` token; statements are separated by `;`.
    fn schema(&self) -> &'static str;

    /// Whether several connections can write at the same time. Engines that
    /// can get interned values committed outside of a [`Batch`](crate::Batch),
    /// so concurrent ingest runs never wait on each other's open batches.
    fn concurrent_writers(&self) -> bool {
        false
    }

    /// Statements executed on every new pooled connection.
    fn session(&self) -> &'static [&'static str] {
        &[]
    }

    /// Statements executed (best effort) right before the pool is closed.
    fn on_close(&self) -> &'static [&'static str] {
        &[]
    }

    /// Bind placeholder for the 1-based parameter `index`.
    fn placeholder(&self, index: usize) -> Cow<'static, str>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SqliteLocation {
    File(PathBuf),
    Memory,
}

/// Embedded single-file engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqliteBackend {
    location: SqliteLocation,
}
impl SqliteBackend {
    /// Database file at `path`, created if it doesn't exist.
    pub fn file(path: impl AsRef<Path>) -> Self {
        Self {
            location: SqliteLocation::File(path.as_ref().to_path_buf()),
        }
    }

    /// Private in-memory database, destroyed when the pool closes.
    ///
    /// Do NOT apply `#[cfg(test)]` so that other crates can also use this in
    /// their tests.
    pub fn in_memory() -> Self {
        Self {
            location: SqliteLocation::Memory,
        }
    }
}
impl StorageBackend for SqliteBackend {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn url(&self) -> String {
        match &self.location {
            SqliteLocation::File(path) => format!("sqlite://{}?mode=rwc", path.display()),
            SqliteLocation::Memory => "sqlite::memory:".to_string(),
        }
    }

    fn max_connections(&self) -> u32 {
        match self.location {
            SqliteLocation::File(_) => MAX_CONNECTIONS,
            // In-memory databases must be limited to one connection. Otherwise
            // parallel connections see different databases that contain
            // different data.
            SqliteLocation::Memory => 1,
        }
    }

    fn schema(&self) -> &'static str {
        include_str!("../schema/sqlite.sql")
    }

    fn session(&self) -> &'static [&'static str] {
        &[
            "PRAGMA foreign_keys = ON",
            "PRAGMA journal_mode = WAL",
            "PRAGMA synchronous = NORMAL",
            // A scan of a large tree holds one writer for a long time between
            // commits; readers in WAL mode shouldn't give up too early.
            "PRAGMA busy_timeout = 1500",
            "PRAGMA cache_size = -8192",
            "PRAGMA temp_store = MEMORY",
        ]
    }

    fn on_close(&self) -> &'static [&'static str] {
        // Let SQLite update query planner statistics
        &["PRAGMA optimize"]
    }

    fn placeholder(&self, _index: usize) -> Cow<'static, str> {
        Cow::Borrowed("?")
    }
}

/// Client/server engine.
#[derive(Clone, PartialEq, Eq)]
pub struct PostgresBackend {
    url: String,
    max_connections: u32,
}
impl PostgresBackend {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: MAX_CONNECTIONS,
        }
    }

    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max.max(1);
        self
    }
}
// Connection URLs carry credentials.
impl Debug for PostgresBackend {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresBackend")
            .field("max_connections", &self.max_connections)
            .finish_non_exhaustive()
    }
}
impl StorageBackend for PostgresBackend {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn url(&self) -> String {
        self.url.clone()
    }

    fn max_connections(&self) -> u32 {
        self.max_connections
    }

    fn concurrent_writers(&self) -> bool {
        true
    }

    fn schema(&self) -> &'static str {
        include_str!("../schema/postgres.sql")
    }

    fn session(&self) -> &'static [&'static str] {
        // Silence "relation already exists, skipping" notices on every connect.
        &["SET client_min_messages = WARNING"]
    }

    fn placeholder(&self, index: usize) -> Cow<'static, str> {
        Cow::Owned(format!("${index}"))
    }
}

/// Validated table name prefix.
///
/// Several independent indexes can share one database by giving each its own
/// prefix. Only ASCII letters, digits and underscores are accepted because
/// the prefix is spliced into SQL identifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TablePrefix(String);
impl TablePrefix {
    pub fn new(prefix: impl Into<String>) -> Result<Self> {
        let prefix = prefix.into();
        if !prefix.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            exn::bail!(ErrorKind::Configuration(format!("invalid table prefix `{prefix}`")));
        }
        Ok(Self(prefix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
impl FromStr for TablePrefix {
    type Err = crate::error::Error;
    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}
impl Display for TablePrefix {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Render a query template for a backend: substitute the table prefix and
/// number the `?` placeholders in order of appearance.
///
/// Templates must not contain `?` anywhere except as bind placeholders.
pub(crate) fn render(backend: &dyn StorageBackend, prefix: &TablePrefix, template: &str) -> String {
    let template = template.replace("{prefix}", prefix.as_str());
    let mut rendered = String::with_capacity(template.len() + 16);
    let mut index = 0;
    for c in template.chars() {
        if c == '?' {
            index += 1;
            rendered.push_str(&backend.placeholder(index));
        } else {
            rendered.push(c);
        }
    }
    rendered
}
