use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use duckdb::Connection;
use tokio::sync::Mutex;
use tracing::info;

use hitrollup_core::config::UpsertDialect;

use crate::schema::init_sql;

/// Bind format for `TIMESTAMP` columns.
pub(crate) const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

pub(crate) fn timestamp_param(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// A DuckDB backend for raw hits, aggregates and sites.
///
/// DuckDB is single-writer: concurrent reads are fine, but concurrent writes
/// cause contention. The connection sits behind `Arc<Mutex<_>>` so every
/// aggregation transaction runs to completion (commit or rollback) before the
/// next one starts, while the struct stays cheap to share.
///
/// `dialect` selects the SQL used to resolve unique-key conflicts when
/// aggregate rows are written. Both dialects store identical rows.
pub struct DuckDbBackend {
    pub(crate) conn: Arc<Mutex<Connection>>,
    pub(crate) dialect: UpsertDialect,
}

impl DuckDbBackend {
    /// Open (or create) a DuckDB database file at `path`.
    ///
    /// `memory_limit` is a DuckDB size string such as `"1GB"` or `"512MB"`.
    pub fn open(path: &str, memory_limit: &str, dialect: UpsertDialect) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(&init_sql(memory_limit))?;
        info!(
            path,
            memory_limit,
            dialect = ?dialect,
            "DuckDB opened"
        );
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            dialect,
        })
    }

    /// Open an **in-memory** database using the `ON CONFLICT` dialect.
    ///
    /// Intended for tests: data is discarded when the struct is dropped.
    pub fn open_in_memory() -> Result<Self> {
        Self::open_in_memory_with(UpsertDialect::OnConflict)
    }

    pub fn open_in_memory_with(dialect: UpsertDialect) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(&init_sql("1GB"))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            dialect,
        })
    }

    pub fn dialect(&self) -> UpsertDialect {
        self.dialect
    }

    /// Execute `SELECT 1` as a lightweight liveness check.
    pub async fn ping(&self) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute_batch("SELECT 1")?;
        Ok(())
    }

    /// Acquire the DuckDB connection lock for direct queries.
    ///
    /// Intended for integration tests that need to verify stored data.
    /// Production code should use the typed methods.
    pub async fn conn_for_test(&self) -> tokio::sync::MutexGuard<'_, Connection> {
        self.conn.lock().await
    }
}
