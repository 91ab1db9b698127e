//! Dataset store connection wrapper.
//!
//! [`StoreDb`] owns a DuckDB [`Connection`] behind a mutex so request
//! handlers and the result poller can share one store. Every repository
//! function takes `&Connection`, so callers compose them inside
//! [`StoreDb::transaction`].

use crate::error::{StoreError, StoreResult};
use crate::migration::run_migrations;
use duckdb::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// DELETE statements that clear a project's live dataset.
///
/// Ordered children first: labels before images, split rows before classes.
pub(crate) const LIVE_DATASET_DELETE_STMTS: &[&str] = &[
    "DELETE FROM lf.image_labels WHERE image_id IN (SELECT id FROM lf.images WHERE project_id = ?)",
    "DELETE FROM lf.images WHERE project_id = ?",
    "DELETE FROM lf.project_splits WHERE project_id = ?",
    "DELETE FROM lf.project_tags WHERE project_id = ?",
    "DELETE FROM lf.project_metadata WHERE project_id = ?",
    "DELETE FROM lf.project_classes WHERE project_id = ?",
];

/// Wrapper around the DuckDB connection backing the dataset store.
pub struct StoreDb {
    conn: Mutex<Connection>,
}

impl StoreDb {
    /// Open (or create) the store at `path` and run pending migrations.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)
            .map_err(|e| StoreError::ConnectionError(format!("{e}: {}", path.display())))?;
        run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store with all migrations applied.
    pub fn open_memory() -> StoreResult<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| StoreError::ConnectionError(e.to_string()))?;
        run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open from a path string (handles the `:memory:` special case).
    pub fn new(path: &str) -> StoreResult<Self> {
        if path == ":memory:" {
            Self::open_memory()
        } else {
            Self::open(Path::new(path))
        }
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StoreError::MutexPoisoned(e.to_string()))
    }

    /// Run `body` against the connection without opening a transaction.
    pub fn with_conn<F, T, E>(&self, body: F) -> Result<T, E>
    where
        F: FnOnce(&Connection) -> Result<T, E>,
        E: From<StoreError>,
    {
        let conn = self.lock()?;
        body(&conn)
    }

    /// Execute `body` within a `BEGIN` / `COMMIT` transaction, rolling back on
    /// error.
    ///
    /// The connection lock is held for the whole body, so transactions are
    /// serialized against every other store user.
    pub fn transaction<F, T, E>(&self, body: F) -> Result<T, E>
    where
        F: FnOnce(&Connection) -> Result<T, E>,
        E: From<StoreError>,
    {
        let conn = self.lock()?;
        conn.execute_batch("BEGIN TRANSACTION")
            .map_err(|e| StoreError::TransactionError(format!("BEGIN failed: {e}")))?;

        let result = body(&conn);

        match &result {
            Ok(_) => {
                if let Err(commit_err) = conn.execute_batch("COMMIT") {
                    let _ = conn.execute_batch("ROLLBACK");
                    return Err(StoreError::TransactionError(format!(
                        "COMMIT failed: {commit_err}"
                    ))
                    .into());
                }
            }
            Err(_) => {
                if let Err(rollback_err) = conn.execute_batch("ROLLBACK") {
                    log::error!("ROLLBACK failed: {rollback_err}");
                }
            }
        }
        result
    }
}

/// Delete a project's live images, labels, classes, tags, metadata, and
/// split configuration. Returns the number of rows removed.
pub fn clear_live_dataset(conn: &Connection, project_id: i64) -> StoreResult<usize> {
    let mut removed = 0;
    for stmt in LIVE_DATASET_DELETE_STMTS {
        removed += conn
            .execute(stmt, duckdb::params![project_id])
            .map_err(|e| StoreError::QueryError(format!("clear_live_dataset failed: {e}")))?;
    }
    Ok(removed)
}

#[cfg(test)]
#[path = "connection_test.rs"]
mod tests;
