//! `[database]` section.

use crate::error::{ErrorKind, Result};
use crate::project_dirs;
use exn::{OptionExt, ResultExt};
use fchange_store::{Database, PostgresBackend, SqliteBackend, TablePrefix};
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Formatter};
use std::path::PathBuf;

const DATABASE_FILE: &str = "fchange.sqlite3";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Embedded, single file.
    #[default]
    Sqlite,
    /// Client/server.
    Postgres,
}

#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub backend: BackendKind,
    /// SQLite database file; defaults to the user's data directory.
    pub path: Option<PathBuf>,
    /// PostgreSQL connection URL, credentials included.
    pub url: Option<String>,
    /// Prepended to every table and index name so several indexes can share
    /// one database.
    pub table_prefix: String,
    pub max_connections: Option<u32>,
}
impl Debug for DatabaseConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("backend", &self.backend)
            .field("path", &self.path)
            .field("url", &self.url.as_ref().map(|_| "<redacted>"))
            .field("table_prefix", &self.table_prefix)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}
impl DatabaseConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        self.table_prefix()?;
        if self.backend == BackendKind::Postgres && self.url.as_deref().is_none_or(str::is_empty) {
            exn::bail!(ErrorKind::invalid("database.url"));
        }
        if self.max_connections == Some(0) {
            exn::bail!(ErrorKind::invalid("database.max_connections"));
        }
        Ok(())
    }

    pub fn table_prefix(&self) -> Result<TablePrefix> {
        TablePrefix::new(self.table_prefix.as_str()).or_raise(|| ErrorKind::invalid("database.table_prefix"))
    }

    /// Where the SQLite database lives: the configured path, or the default
    /// file in the user's data directory.
    pub fn sqlite_path(&self) -> Result<PathBuf> {
        self.path
            .clone()
            .or_else(|| project_dirs().map(|dirs| dirs.data_dir().join(DATABASE_FILE)))
            .ok_or_raise(|| ErrorKind::invalid("database.path"))
    }

    /// Connect to the configured backend, applying the schema.
    #[tracing::instrument(level = "debug", skip(self), fields(backend = ?self.backend))]
    pub async fn connect(&self) -> Result<Database> {
        self.validate()?;
        let prefix = self.table_prefix()?;
        let connected = match self.backend {
            BackendKind::Sqlite => {
                let path = self.sqlite_path()?;
                if let Some(parent) = path.parent()
                    && !parent.as_os_str().is_empty()
                {
                    // Use non-async here; it only happens once per process.
                    std::fs::create_dir_all(parent).or_raise(|| ErrorKind::invalid("database.path"))?;
                }
                Database::connect(SqliteBackend::file(&path), prefix).await
            },
            BackendKind::Postgres => {
                let url = self.url.as_deref().ok_or_raise(|| ErrorKind::invalid("database.url"))?;
                let mut backend = PostgresBackend::new(url);
                if let Some(max) = self.max_connections {
                    backend = backend.with_max_connections(max);
                }
                Database::connect(backend, prefix).await
            },
        };
        connected.or_raise(|| ErrorKind::Database)
    }
}
