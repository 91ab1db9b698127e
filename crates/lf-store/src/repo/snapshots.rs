//! Snapshot markers and the bulk copies between live and snapshot tables.

use crate::connection::clear_live_dataset;
use crate::error::{StoreResult, StoreResultExt};
use crate::row_helpers::{next_id, now, query_all, query_opt};
use duckdb::{Connection, Row};
use lf_core::Snapshot;

const SNAPSHOT_COLUMNS: &str =
    "id, project_id, snapshot_name, description, created_at, created_by";

/// Column lists of each live table mirrored into a snapshot table.
///
/// Order matters: parents before children for inserts.
const MIRRORED_TABLES: &[(&str, &str)] = &[
    (
        "project_classes",
        "id, project_id, class_name, color_code, description, created_at, created_by",
    ),
    (
        "project_tags",
        "id, project_id, tag_name, color_code, created_at, created_by",
    ),
    (
        "project_metadata",
        "id, project_id, name, value, created_at, created_by",
    ),
    (
        "project_splits",
        "id, project_id, class_id, train_ratio, dev_ratio, test_ratio",
    ),
    (
        "images",
        "id, project_id, file_name, file_size, width, height, split, is_labeled, is_no_class, created_at, created_by",
    ),
    (
        "image_labels",
        "id, image_id, class_id, position, created_at, created_by",
    ),
];

fn snapshot_from_row(row: &Row<'_>) -> duckdb::Result<Snapshot> {
    Ok(Snapshot {
        id: row.get(0)?,
        project_id: row.get(1)?,
        snapshot_name: row.get(2)?,
        description: row.get(3)?,
        created_at: row.get(4)?,
        created_by: row.get(5)?,
    })
}

pub fn insert_snapshot(
    conn: &Connection,
    project_id: i64,
    snapshot_name: &str,
    description: Option<&str>,
    user: &str,
) -> StoreResult<Snapshot> {
    let id = next_id(conn, "lf.seq_snapshots")?;
    conn.execute(
        &format!("INSERT INTO lf.snapshots ({SNAPSHOT_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?)"),
        duckdb::params![id, project_id, snapshot_name, description, now(), user],
    )
    .context("insert snapshots")?;
    get_snapshot(conn, id)?.ok_or_else(|| {
        crate::StoreError::QueryError(format!("snapshot {id} vanished after insert"))
    })
}

pub fn get_snapshot(conn: &Connection, snapshot_id: i64) -> StoreResult<Option<Snapshot>> {
    query_opt(
        conn,
        &format!("SELECT {SNAPSHOT_COLUMNS} FROM lf.snapshots WHERE id = ?"),
        duckdb::params![snapshot_id],
        snapshot_from_row,
        "select snapshot",
    )
}

/// Exact, case-sensitive name lookup within a project.
pub fn find_snapshot_by_name(
    conn: &Connection,
    project_id: i64,
    snapshot_name: &str,
) -> StoreResult<Option<Snapshot>> {
    query_opt(
        conn,
        &format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM lf.snapshots
             WHERE project_id = ? AND snapshot_name = ?"
        ),
        duckdb::params![project_id, snapshot_name],
        snapshot_from_row,
        "select snapshot by name",
    )
}

/// Snapshots of a project, newest first.
pub fn list_snapshots(conn: &Connection, project_id: i64) -> StoreResult<Vec<Snapshot>> {
    query_all(
        conn,
        &format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM lf.snapshots
             WHERE project_id = ? ORDER BY created_at DESC, id DESC"
        ),
        duckdb::params![project_id],
        snapshot_from_row,
        "list snapshots",
    )
}

/// Copy every live dataset row of `project_id` into snapshot `snapshot_id`.
///
/// Returns the number of rows copied.
pub fn copy_live_into_snapshot(
    conn: &Connection,
    project_id: i64,
    snapshot_id: i64,
) -> StoreResult<usize> {
    let mut copied = 0;
    for (table, columns) in MIRRORED_TABLES {
        let filter = if *table == "image_labels" {
            "image_id IN (SELECT id FROM lf.images WHERE project_id = ?)"
        } else {
            "project_id = ?"
        };
        let sql = format!(
            "INSERT INTO lf.snapshot_{table} (snapshot_id, {columns})
             SELECT ?, {columns} FROM lf.{table} WHERE {filter}"
        );
        copied += conn
            .execute(&sql, duckdb::params![snapshot_id, project_id])
            .context(&format!("copy {table} into snapshot"))?;
    }
    Ok(copied)
}

/// Replace the live dataset of `project_id` with the rows of `snapshot_id`.
///
/// Original ids are preserved, so references held elsewhere (training
/// records, predictions) keep resolving. Callers run this inside a
/// transaction.
pub fn restore_into_live(
    conn: &Connection,
    project_id: i64,
    snapshot_id: i64,
) -> StoreResult<usize> {
    clear_live_dataset(conn, project_id)?;
    let mut restored = 0;
    for (table, columns) in MIRRORED_TABLES {
        let sql = format!(
            "INSERT INTO lf.{table} ({columns})
             SELECT {columns} FROM lf.snapshot_{table} WHERE snapshot_id = ?"
        );
        restored += conn
            .execute(&sql, duckdb::params![snapshot_id])
            .context(&format!("restore {table} from snapshot"))?;
    }
    Ok(restored)
}

/// Delete a snapshot marker and every row it owns.
pub fn delete_snapshot_rows(conn: &Connection, snapshot_id: i64) -> StoreResult<usize> {
    let mut removed = 0;
    for (table, _) in MIRRORED_TABLES.iter().rev() {
        removed += conn
            .execute(
                &format!("DELETE FROM lf.snapshot_{table} WHERE snapshot_id = ?"),
                duckdb::params![snapshot_id],
            )
            .context(&format!("delete snapshot_{table}"))?;
    }
    removed += conn
        .execute(
            "DELETE FROM lf.snapshots WHERE id = ?",
            duckdb::params![snapshot_id],
        )
        .context("delete snapshots")?;
    Ok(removed)
}
