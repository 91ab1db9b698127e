//! Project tags and free-form metadata.

use crate::error::{StoreResult, StoreResultExt};
use crate::row_helpers::{next_id, now, query_all};
use crate::scope::DatasetScope;
use duckdb::Connection;
use lf_core::{ProjectMetadata, ProjectTag};

pub fn insert_tag(
    conn: &Connection,
    project_id: i64,
    tag_name: &str,
    color_code: &str,
    user: &str,
) -> StoreResult<i64> {
    let id = next_id(conn, "lf.seq_project_tags")?;
    conn.execute(
        "INSERT INTO lf.project_tags (id, project_id, tag_name, color_code, created_at, created_by)
         VALUES (?, ?, ?, ?, ?, ?)",
        duckdb::params![id, project_id, tag_name, color_code, now(), user],
    )
    .context("insert project_tags")?;
    Ok(id)
}

pub fn list_tags(conn: &Connection, scope: DatasetScope) -> StoreResult<Vec<ProjectTag>> {
    query_all(
        conn,
        &format!(
            "SELECT id, project_id, tag_name, color_code, created_at, created_by
             FROM {} WHERE {} ORDER BY id",
            scope.table("project_tags"),
            scope.owner_filter()
        ),
        duckdb::params![scope.key()],
        |row| {
            Ok(ProjectTag {
                id: row.get(0)?,
                project_id: row.get(1)?,
                tag_name: row.get(2)?,
                color_code: row.get(3)?,
                created_at: row.get(4)?,
                created_by: row.get(5)?,
            })
        },
        "list project_tags",
    )
}

pub fn insert_metadata(
    conn: &Connection,
    project_id: i64,
    name: &str,
    value: Option<&str>,
    user: &str,
) -> StoreResult<i64> {
    let id = next_id(conn, "lf.seq_project_metadata")?;
    conn.execute(
        "INSERT INTO lf.project_metadata (id, project_id, name, value, created_at, created_by)
         VALUES (?, ?, ?, ?, ?, ?)",
        duckdb::params![id, project_id, name, value, now(), user],
    )
    .context("insert project_metadata")?;
    Ok(id)
}

pub fn list_metadata(conn: &Connection, scope: DatasetScope) -> StoreResult<Vec<ProjectMetadata>> {
    query_all(
        conn,
        &format!(
            "SELECT id, project_id, name, value, created_at, created_by
             FROM {} WHERE {} ORDER BY id",
            scope.table("project_metadata"),
            scope.owner_filter()
        ),
        duckdb::params![scope.key()],
        |row| {
            Ok(ProjectMetadata {
                id: row.get(0)?,
                project_id: row.get(1)?,
                name: row.get(2)?,
                value: row.get(3)?,
                created_at: row.get(4)?,
                created_by: row.get(5)?,
            })
        },
        "list project_metadata",
    )
}
