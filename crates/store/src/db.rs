//! Database connection and pool management.

use crate::backend::{BackendHandle, SqliteBackend, StorageBackend, TablePrefix, render};
use crate::error::{ErrorKind, Result};
use crate::queries::{Statement, Statements};
use exn::{OptionExt, ResultExt};
use sqlx::any::AnyPoolOptions;
use sqlx::pool::PoolConnection;
use sqlx::{Any, AnyConnection, AnyPool, Transaction};
use std::sync::Arc;
use tracing::instrument;

/// Database connection pool for the scan index.
///
/// This is the main entry point for interacting with the index. It owns the
/// pool, the backend description and the query templates rendered for that
/// backend; the stores are all constructed `From<&Database>`.
#[derive(Debug, Clone)]
pub struct Database {
    pool: AnyPool,
    backend: BackendHandle,
    prefix: TablePrefix,
    statements: Arc<Statements>,
}

impl Database {
    /// Connect to the index on `backend` and make sure the schema exists.
    ///
    /// An unreachable backend is reported as a configuration error: nothing
    /// has been written at that point and retrying with the same settings is
    /// unlikely to help.
    #[instrument(skip_all, fields(backend = backend.name(), prefix = %prefix))]
    pub async fn connect(backend: impl StorageBackend + 'static, prefix: TablePrefix) -> Result<Self> {
        sqlx::any::install_default_drivers();
        let backend: BackendHandle = Arc::new(backend);
        let session = backend.session();
        let pool = AnyPoolOptions::new()
            // Session statements must run on EVERY connection handed out by
            // the pool, not only the first one.
            .after_connect(move |conn, _meta| {
                Box::pin(async move {
                    for &statement in session {
                        sqlx::query(statement).execute(&mut *conn).await?;
                    }
                    Ok(())
                })
            })
            .max_connections(backend.max_connections())
            .connect(&backend.url())
            .await
            .or_raise(|| ErrorKind::Configuration(format!("cannot connect to {} database", backend.name())))?;
        let statements = Arc::new(Statements::render(backend.as_ref(), &prefix));
        let db = Self {
            pool,
            backend,
            prefix,
            statements,
        };
        db.apply_schema().await?;
        Ok(db)
    }

    /// Connect to a private in-memory SQLite index (useful for testing).
    pub async fn connect_in_memory() -> Result<Self> {
        Self::connect(SqliteBackend::in_memory(), TablePrefix::default()).await
    }

    /// Create every table and index that doesn't exist yet.
    ///
    /// This is called automatically by `connect`, and is idempotent.
    #[instrument("applying database schema", skip(self))]
    async fn apply_schema(&self) -> Result<()> {
        let schema = render(self.backend.as_ref(), &self.prefix, self.backend.schema());
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Schema)?;
        for statement in schema.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(statement).execute(&mut *tx).await.or_raise(|| ErrorKind::Schema)?;
        }
        tx.commit().await.or_raise(|| ErrorKind::Schema)
    }

    /// Get a reference to the underlying connection pool.
    ///
    /// This is useful for running custom queries or transactions.
    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    pub fn backend(&self) -> &dyn StorageBackend {
        self.backend.as_ref()
    }

    pub fn prefix(&self) -> &TablePrefix {
        &self.prefix
    }

    pub(crate) fn sql(&self, statement: Statement) -> &str {
        self.statements.get(statement)
    }

    /// Open a [`Batch`] for a long-running series of writes.
    pub async fn begin(&self) -> Result<Batch> {
        let tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        Ok(Batch {
            pool: self.pool.clone(),
            tx: Some(tx),
            autocommit: self.backend.concurrent_writers(),
            side: None,
        })
    }

    /// Close the database connection pool.
    ///
    /// This waits for all connections to be returned to the pool and then
    /// closes them. After calling this, the Database instance should not
    /// be used.
    pub async fn close(&self) {
        for &statement in self.backend.on_close() {
            _ = sqlx::query(statement).execute(&self.pool).await;
        }
        self.pool.close().await;
    }
}

/// One logical transaction that is committed periodically.
///
/// Everything written through [`conn()`](Self::conn) becomes durable at the
/// next [`checkpoint()`](Self::checkpoint) or [`commit()`](Self::commit).
/// Dropping a batch rolls back only what was written since the last
/// checkpoint.
///
/// While a batch is open it holds one pooled connection, two once
/// [`interning()`](Self::interning) has been used on an engine with
/// concurrent writers. With a single-connection pool (in-memory SQLite) the
/// pool must not be used for anything else until the batch is committed or
/// dropped.
#[derive(Debug)]
pub struct Batch {
    pool: AnyPool,
    tx: Option<Transaction<'static, Any>>,
    autocommit: bool,
    side: Option<PoolConnection<Any>>,
}
impl Batch {
    pub fn conn(&mut self) -> Result<&mut AnyConnection> {
        let tx = self.tx.as_mut().ok_or_raise(|| ErrorKind::Database)?;
        Ok(&mut **tx)
    }

    /// Connection to intern values on.
    ///
    /// When the engine has concurrent writers this is a separate connection
    /// outside the transaction: every interned value is committed by its own
    /// statement, and two batches interning the same names in opposite order
    /// never hold row locks the other one waits for. Single-writer engines
    /// get the transaction itself, since a second writer would only block.
    pub async fn interning(&mut self) -> Result<&mut AnyConnection> {
        if !self.autocommit {
            return self.conn();
        }
        if self.side.is_none() {
            self.side = Some(self.pool.acquire().await.or_raise(|| ErrorKind::Database)?);
        }
        let side = self.side.as_mut().ok_or_raise(|| ErrorKind::Database)?;
        Ok(&mut **side)
    }

    /// Commit everything written so far and keep the batch open.
    pub async fn checkpoint(&mut self) -> Result<()> {
        // Commit before beginning again: the old transaction's connection has
        // to go back to the pool first when the pool only has one.
        if let Some(tx) = self.tx.take() {
            tx.commit().await.or_raise(|| ErrorKind::Database)?;
        }
        self.tx = Some(self.pool.begin().await.or_raise(|| ErrorKind::Database)?);
        Ok(())
    }

    pub async fn commit(mut self) -> Result<()> {
        match self.tx.take() {
            Some(tx) => tx.commit().await.or_raise(|| ErrorKind::Database),
            None => Ok(()),
        }
    }
}
