//! Configured split ratios.

use crate::error::{StoreResult, StoreResultExt};
use crate::row_helpers::{next_id, query_all};
use crate::scope::DatasetScope;
use duckdb::Connection;
use lf_core::{ProjectSplit, SplitRatio};

/// Insert or replace the ratio for `(project_id, class_id)`.
///
/// `class_id = None` sets the project-wide default.
pub fn upsert_split(
    conn: &Connection,
    project_id: i64,
    class_id: Option<i64>,
    ratio: SplitRatio,
) -> StoreResult<i64> {
    let existing: Option<i64> = match conn.query_row(
        "SELECT id FROM lf.project_splits WHERE project_id = ? AND class_id IS NOT DISTINCT FROM ?",
        duckdb::params![project_id, class_id],
        |row| row.get(0),
    ) {
        Ok(id) => Some(id),
        Err(duckdb::Error::QueryReturnedNoRows) => None,
        Err(e) => return Err(e).context("select project_splits"),
    };

    if let Some(id) = existing {
        conn.execute(
            "UPDATE lf.project_splits SET train_ratio = ?, dev_ratio = ?, test_ratio = ? WHERE id = ?",
            duckdb::params![ratio.train_ratio, ratio.dev_ratio, ratio.test_ratio, id],
        )
        .context("update project_splits")?;
        return Ok(id);
    }

    let id = next_id(conn, "lf.seq_project_splits")?;
    conn.execute(
        "INSERT INTO lf.project_splits (id, project_id, class_id, train_ratio, dev_ratio, test_ratio)
         VALUES (?, ?, ?, ?, ?, ?)",
        duckdb::params![
            id,
            project_id,
            class_id,
            ratio.train_ratio,
            ratio.dev_ratio,
            ratio.test_ratio
        ],
    )
    .context("insert project_splits")?;
    Ok(id)
}

pub fn list_splits(conn: &Connection, scope: DatasetScope) -> StoreResult<Vec<ProjectSplit>> {
    query_all(
        conn,
        &format!(
            "SELECT id, project_id, class_id, train_ratio, dev_ratio, test_ratio
             FROM {} WHERE {} ORDER BY id",
            scope.table("project_splits"),
            scope.owner_filter()
        ),
        duckdb::params![scope.key()],
        |row| {
            Ok(ProjectSplit {
                id: row.get(0)?,
                project_id: row.get(1)?,
                class_id: row.get(2)?,
                ratio: SplitRatio {
                    train_ratio: row.get(3)?,
                    dev_ratio: row.get(4)?,
                    test_ratio: row.get(5)?,
                },
            })
        },
        "list project_splits",
    )
}
