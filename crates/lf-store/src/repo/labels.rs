//! Ground-truth labels.

use crate::error::{StoreResult, StoreResultExt};
use crate::row_helpers::{next_id, now, query_all};
use crate::scope::DatasetScope;
use duckdb::{Connection, Row};
use lf_core::ImageLabel;

const LABEL_COLUMNS: &str = "id, image_id, class_id, position, created_at, created_by";

fn label_from_row(row: &Row<'_>) -> duckdb::Result<ImageLabel> {
    Ok(ImageLabel {
        id: row.get(0)?,
        image_id: row.get(1)?,
        class_id: row.get(2)?,
        position: row.get(3)?,
        created_at: row.get(4)?,
        created_by: row.get(5)?,
    })
}

/// Attach a label to an image and mark the image labeled.
pub fn insert_label(
    conn: &Connection,
    image_id: i64,
    class_id: i64,
    position: &str,
    user: &str,
) -> StoreResult<i64> {
    let id = next_id(conn, "lf.seq_image_labels")?;
    conn.execute(
        &format!("INSERT INTO lf.image_labels ({LABEL_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?)"),
        duckdb::params![id, image_id, class_id, position, now(), user],
    )
    .context("insert image_labels")?;
    conn.execute(
        "UPDATE lf.images SET is_labeled = true, is_no_class = false WHERE id = ?",
        duckdb::params![image_id],
    )
    .context("update images.is_labeled")?;
    Ok(id)
}

/// All labels in scope, ordered by image then label id.
pub fn list_labels(conn: &Connection, scope: DatasetScope) -> StoreResult<Vec<ImageLabel>> {
    query_all(
        conn,
        &format!(
            "SELECT {LABEL_COLUMNS} FROM {} WHERE {} ORDER BY image_id, id",
            scope.table("image_labels"),
            scope.label_filter()
        ),
        duckdb::params![scope.key()],
        label_from_row,
        "list image_labels",
    )
}

/// `(image_id, class_id)` pairs in scope, one per distinct pair.
pub fn image_class_pairs(conn: &Connection, scope: DatasetScope) -> StoreResult<Vec<(i64, i64)>> {
    query_all(
        conn,
        &format!(
            "SELECT DISTINCT image_id, class_id FROM {} WHERE {} ORDER BY image_id, class_id",
            scope.table("image_labels"),
            scope.label_filter()
        ),
        duckdb::params![scope.key()],
        |row| Ok((row.get(0)?, row.get(1)?)),
        "list image/class pairs",
    )
}
