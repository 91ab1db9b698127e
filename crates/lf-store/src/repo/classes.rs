//! Project classes.

use crate::error::{StoreResult, StoreResultExt};
use crate::row_helpers::{next_id, now, query_all, query_opt};
use crate::scope::DatasetScope;
use duckdb::{Connection, Row};
use lf_core::ProjectClass;

const CLASS_COLUMNS: &str =
    "id, project_id, class_name, color_code, description, created_at, created_by";

fn class_from_row(row: &Row<'_>) -> duckdb::Result<ProjectClass> {
    Ok(ProjectClass {
        id: row.get(0)?,
        project_id: row.get(1)?,
        class_name: row.get(2)?,
        color_code: row.get(3)?,
        description: row.get(4)?,
        created_at: row.get(5)?,
        created_by: row.get(6)?,
    })
}

pub fn insert_class(
    conn: &Connection,
    project_id: i64,
    class_name: &str,
    color_code: &str,
    description: Option<&str>,
    user: &str,
) -> StoreResult<i64> {
    let id = next_id(conn, "lf.seq_project_classes")?;
    conn.execute(
        &format!("INSERT INTO lf.project_classes ({CLASS_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?)"),
        duckdb::params![id, project_id, class_name, color_code, description, now(), user],
    )
    .context("insert project_classes")?;
    Ok(id)
}

/// Classes in scope ordered by ascending id.
///
/// The position in this list is the class index used in exports and in
/// prediction payloads.
pub fn list_classes(conn: &Connection, scope: DatasetScope) -> StoreResult<Vec<ProjectClass>> {
    query_all(
        conn,
        &format!(
            "SELECT {CLASS_COLUMNS} FROM {} WHERE {} ORDER BY id",
            scope.table("project_classes"),
            scope.owner_filter()
        ),
        duckdb::params![scope.key()],
        class_from_row,
        "list project_classes",
    )
}

pub fn get_class(conn: &Connection, class_id: i64) -> StoreResult<Option<ProjectClass>> {
    query_opt(
        conn,
        &format!("SELECT {CLASS_COLUMNS} FROM lf.project_classes WHERE id = ?"),
        duckdb::params![class_id],
        class_from_row,
        "select project_class",
    )
}

/// Outcome of [`delete_class`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassDeletion {
    Deleted,
    NotFound,
    /// Labels or split rows still reference the class; nothing was removed.
    InUse { label_count: i64, split_count: i64 },
}

/// Delete a live class that nothing references.
pub fn delete_class(conn: &Connection, class_id: i64) -> StoreResult<ClassDeletion> {
    if get_class(conn, class_id)?.is_none() {
        return Ok(ClassDeletion::NotFound);
    }
    let (label_count, split_count): (i64, i64) = conn
        .query_row(
            "SELECT
                (SELECT count(*) FROM lf.image_labels WHERE class_id = ?),
                (SELECT count(*) FROM lf.project_splits WHERE class_id = ?)",
            duckdb::params![class_id, class_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .context("count class references")?;
    if label_count > 0 || split_count > 0 {
        return Ok(ClassDeletion::InUse {
            label_count,
            split_count,
        });
    }
    conn.execute(
        "DELETE FROM lf.project_classes WHERE id = ?",
        duckdb::params![class_id],
    )
    .context("delete project_classes")?;
    Ok(ClassDeletion::Deleted)
}
