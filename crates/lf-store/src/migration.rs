//! Schema migration runner for the dataset store.
//!
//! Tracks applied migration versions in `lf.schema_version` and runs any
//! unapplied migrations on each open.

use crate::ddl::MIGRATIONS;
use crate::error::{StoreError, StoreResult};
use duckdb::Connection;

/// Ensure the `lf` schema and `schema_version` table exist.
fn ensure_version_table(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        "CREATE SCHEMA IF NOT EXISTS lf;
         CREATE TABLE IF NOT EXISTS lf.schema_version (
             version    INTEGER NOT NULL,
             applied_at TIMESTAMP NOT NULL DEFAULT current_timestamp
         );",
    )
    .map_err(|e| {
        StoreError::MigrationError(format!("failed to create schema_version table: {e}"))
    })?;
    Ok(())
}

/// Return the highest applied migration version, or 0 if none.
fn current_version(conn: &Connection) -> StoreResult<i32> {
    let version: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM lf.schema_version",
            [],
            |row| row.get(0),
        )
        .map_err(|e| StoreError::MigrationError(format!("failed to read schema version: {e}")))?;
    Ok(version)
}

/// Run all unapplied migrations against `conn`.
///
/// The version number is recorded in `schema_version` after each
/// successful migration.
pub fn run_migrations(conn: &Connection) -> StoreResult<()> {
    ensure_version_table(conn)?;
    let current = current_version(conn)?;

    for &(version, sql) in MIGRATIONS.iter().filter(|(v, _)| *v > current) {
        log::debug!("Applying store migration v{version:03}");
        conn.execute_batch(sql).map_err(|e| {
            StoreError::MigrationError(format!("migration v{version:03} failed: {e}"))
        })?;
        conn.execute(
            "INSERT INTO lf.schema_version (version) VALUES (?)",
            duckdb::params![version],
        )
        .map_err(|e| {
            StoreError::MigrationError(format!("failed to record migration v{version:03}: {e}"))
        })?;
    }
    Ok(())
}
