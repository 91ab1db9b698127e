//! Project rows.

use crate::error::{StoreResult, StoreResultExt};
use crate::row_helpers::{decode, next_id, now, query_opt};
use duckdb::{Connection, Row};
use lf_core::{Project, ProjectType};

const PROJECT_COLUMNS: &str = "id, name, project_type, created_at, created_by";

fn project_from_row(row: &Row<'_>) -> duckdb::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
        project_type: decode(2, ProjectType::parse(&row.get::<_, String>(2)?))?,
        created_at: row.get(3)?,
        created_by: row.get(4)?,
    })
}

/// Insert a project and return it.
pub fn insert_project(
    conn: &Connection,
    name: &str,
    project_type: ProjectType,
    user: &str,
) -> StoreResult<Project> {
    let id = next_id(conn, "lf.seq_projects")?;
    conn.execute(
        "INSERT INTO lf.projects (id, name, project_type, created_at, created_by) VALUES (?, ?, ?, ?, ?)",
        duckdb::params![id, name, project_type.as_str(), now(), user],
    )
    .context("insert projects")?;
    get_project(conn, id)?.ok_or_else(|| {
        crate::StoreError::QueryError(format!("project {id} vanished after insert"))
    })
}

pub fn get_project(conn: &Connection, id: i64) -> StoreResult<Option<Project>> {
    query_opt(
        conn,
        &format!("SELECT {PROJECT_COLUMNS} FROM lf.projects WHERE id = ?"),
        duckdb::params![id],
        project_from_row,
        "select project",
    )
}
