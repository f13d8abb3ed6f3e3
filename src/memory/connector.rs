//! Lifecycle of the connection to one embedded database file.
//!
//! All database access goes through `with_write` / `with_read`: the only
//! place engine errors are classified into storage or query failures, and
//! the only place audit events are written.
//!
//! A connector is meant for one logical owner at a time. It is `Send` but not
//! `Sync`; share it across threads behind your own lock if you must.

use crate::core::broker::AuditLog;
use crate::core::config::MemoryConfig;
use crate::core::db;
use crate::core::error::{MemoryError, MemoryResult};
use crate::core::migration;
use crate::core::time::MonotonicClock;
use crate::memory::experience::Experience;
use crate::memory::query::BuiltQuery;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params_from_iter};
use std::path::Path;

pub struct MemoryConnector {
    config: MemoryConfig,
    conn: Option<Connection>,
    audit: Option<AuditLog>,
    clock: MonotonicClock,
}

impl std::fmt::Debug for MemoryConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryConnector")
            .field("db_path", &self.config.db_path)
            .field("connected", &self.is_connected())
            .field("audit_log", &self.audit.as_ref().map(|a| a.path()))
            .finish()
    }
}

impl MemoryConnector {
    /// A connector for `path` with default settings. Not connected yet.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self::from_config(MemoryConfig::with_db_path(path))
    }

    pub fn from_config(config: MemoryConfig) -> Self {
        let audit = config.audit_log.as_deref().map(AuditLog::new);
        Self {
            config,
            conn: None,
            audit,
            clock: MonotonicClock::new(),
        }
    }

    /// `new` followed by `connect`.
    pub fn open(path: impl AsRef<Path>) -> MemoryResult<Self> {
        let mut connector = Self::new(path);
        connector.connect()?;
        Ok(connector)
    }

    /// Open or create the database file and bring its schema up to date.
    /// Connecting an already connected connector does nothing.
    pub fn connect(&mut self) -> MemoryResult<&mut Self> {
        if self.conn.is_some() {
            return Ok(self);
        }
        let result = self.open_connection();
        self.audit("connect", None, &result);
        let (conn, applied) = result?;
        tracing::debug!(
            path = %self.config.db_path.display(),
            migrations_applied = applied,
            "memory database connected"
        );
        self.conn = Some(conn);
        Ok(self)
    }

    fn open_connection(&self) -> MemoryResult<(Connection, usize)> {
        db::storage_preflight(&self.config.db_path)?;
        let conn = db::db_connect(&self.config.db_path, self.config.busy_timeout_secs)?;
        let applied = migration::check_and_migrate(&conn)?;
        Ok((conn, applied))
    }

    /// Release the connection. Safe to call any number of times.
    pub fn close(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        if let Err((_conn, e)) = conn.close() {
            // The handle is dropped either way; SQLite finalizes it on drop.
            tracing::warn!(path = %self.config.db_path.display(), error = %e, "memory database close reported an error");
        }
        self.audit("close", None, &Ok::<(), MemoryError>(()));
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Health probe: a trivial read. Never returns an error.
    pub fn verify_connectivity(&self) -> bool {
        match &self.conn {
            Some(conn) => conn
                .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                .map(|v| v == 1)
                .unwrap_or(false),
            None => false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.config.db_path
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Raw access for callers running their own SQL. `None` when closed.
    pub fn connection(&self) -> Option<&Connection> {
        self.conn.as_ref()
    }

    /// Open `path`, run `f`, and close on every exit path, including panics.
    pub fn scoped<F, R>(path: impl AsRef<Path>, f: F) -> MemoryResult<R>
    where
        F: FnOnce(&MemoryConnector) -> MemoryResult<R>,
    {
        Self::scoped_with_config(MemoryConfig::with_db_path(path), f)
    }

    pub fn scoped_with_config<F, R>(config: MemoryConfig, f: F) -> MemoryResult<R>
    where
        F: FnOnce(&MemoryConnector) -> MemoryResult<R>,
    {
        let mut connector = Self::from_config(config);
        connector.connect()?;
        let result = f(&connector);
        connector.close();
        result
    }

    /// Run a query produced by `QueryBuilder` and map rows to experiences.
    pub fn query_experiences(&self, query: &BuiltQuery) -> MemoryResult<Vec<Experience>> {
        self.with_read("query", None, |conn| {
            let mut stmt = conn.prepare(&query.sql)?;
            let rows = stmt.query_map(params_from_iter(query.params.iter()), Experience::from_row)?;
            rows.collect()
        })
    }

    /// Execute a write. Engine failures and a closed connection surface as
    /// `StorageError`.
    pub(crate) fn with_write<F, R>(&self, op: &str, agent_id: Option<&str>, f: F) -> MemoryResult<R>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<R>,
    {
        let result = match &self.conn {
            Some(conn) => f(conn).map_err(|e| MemoryError::storage(op, e)),
            None => Err(MemoryError::StorageError(format!(
                "{op}: connector is not connected"
            ))),
        };
        self.audit(op, agent_id, &result);
        result
    }

    /// Execute a read. Engine failures and a closed connection surface as
    /// `QueryError`.
    pub(crate) fn with_read<F, R>(&self, op: &str, agent_id: Option<&str>, f: F) -> MemoryResult<R>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<R>,
    {
        let result = match &self.conn {
            Some(conn) => f(conn).map_err(|e| MemoryError::query(op, e)),
            None => Err(MemoryError::QueryError(format!(
                "{op}: connector is not connected"
            ))),
        };
        self.audit(op, agent_id, &result);
        result
    }

    /// Strictly increasing timestamp for records written through this connector.
    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn audit<R>(&self, op: &str, agent_id: Option<&str>, result: &MemoryResult<R>) {
        let Some(log) = &self.audit else {
            return;
        };
        let db_id = self
            .config
            .db_path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();
        if let Err(e) = log.record(op, &db_id, agent_id, result) {
            tracing::warn!(op, error = %e, "failed to append memory audit event");
        }
    }
}

impl Drop for MemoryConnector {
    fn drop(&mut self) {
        self.close();
    }
}
