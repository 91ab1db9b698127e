//! Image rows and dataset-level counts.

use crate::error::{StoreResult, StoreResultExt};
use crate::row_helpers::{decode, next_id, now, query_all, query_opt};
use crate::scope::DatasetScope;
use duckdb::{Connection, Row};
use lf_core::{Image, Split};
use serde::Serialize;

pub(crate) const IMAGE_COLUMNS: &str =
    "id, project_id, file_name, file_size, width, height, split, is_labeled, is_no_class, created_at, created_by";

pub(crate) fn image_from_row(row: &Row<'_>) -> duckdb::Result<Image> {
    Ok(Image {
        id: row.get(0)?,
        project_id: row.get(1)?,
        file_name: row.get(2)?,
        file_size: row.get(3)?,
        width: row.get(4)?,
        height: row.get(5)?,
        split: decode(6, Split::parse(&row.get::<_, String>(6)?))?,
        is_labeled: row.get(7)?,
        is_no_class: row.get(8)?,
        created_at: row.get(9)?,
        created_by: row.get(10)?,
    })
}

/// Fields supplied when an image is uploaded.
#[derive(Debug, Clone)]
pub struct NewImage {
    pub file_name: String,
    pub file_size: i64,
    pub width: i32,
    pub height: i32,
    pub split: Split,
    pub is_labeled: bool,
    pub is_no_class: bool,
}

impl NewImage {
    /// An unlabeled, unassigned image.
    pub fn named(file_name: impl Into<String>, width: i32, height: i32) -> Self {
        Self {
            file_name: file_name.into(),
            file_size: 0,
            width,
            height,
            split: Split::Unassigned,
            is_labeled: false,
            is_no_class: false,
        }
    }
}

pub fn insert_image(
    conn: &Connection,
    project_id: i64,
    image: &NewImage,
    user: &str,
) -> StoreResult<i64> {
    let id = next_id(conn, "lf.seq_images")?;
    conn.execute(
        &format!("INSERT INTO lf.images ({IMAGE_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"),
        duckdb::params![
            id,
            project_id,
            image.file_name,
            image.file_size,
            image.width,
            image.height,
            image.split.as_str(),
            image.is_labeled,
            image.is_no_class,
            now(),
            user,
        ],
    )
    .context("insert images")?;
    Ok(id)
}

pub fn get_image(conn: &Connection, id: i64) -> StoreResult<Option<Image>> {
    query_opt(
        conn,
        &format!("SELECT {IMAGE_COLUMNS} FROM lf.images WHERE id = ?"),
        duckdb::params![id],
        image_from_row,
        "select image",
    )
}

/// All images in scope, ordered by id.
pub fn list_images(conn: &Connection, scope: DatasetScope) -> StoreResult<Vec<Image>> {
    query_all(
        conn,
        &format!(
            "SELECT {IMAGE_COLUMNS} FROM {} WHERE {} ORDER BY id",
            scope.table("images"),
            scope.owner_filter()
        ),
        duckdb::params![scope.key()],
        image_from_row,
        "list images",
    )
}

/// Overwrite the split of one image. Last write wins.
pub fn update_split(conn: &Connection, image_id: i64, split: Split) -> StoreResult<usize> {
    conn.execute(
        "UPDATE lf.images SET split = ? WHERE id = ?",
        duckdb::params![split.as_str(), image_id],
    )
    .context("update images.split")
}

/// Overwrite the splits of many images with one prepared statement.
///
/// Returns the number of rows written.
pub fn update_splits(conn: &Connection, assignments: &[(i64, Split)]) -> StoreResult<usize> {
    let mut stmt = conn
        .prepare("UPDATE lf.images SET split = ? WHERE id = ?")
        .context("prepare update images.split")?;
    let mut updated = 0;
    for (image_id, split) in assignments {
        updated += stmt
            .execute(duckdb::params![split.as_str(), image_id])
            .context("update images.split")?;
    }
    Ok(updated)
}

/// Record the labeling state of an image.
pub fn set_label_state(
    conn: &Connection,
    image_id: i64,
    is_labeled: bool,
    is_no_class: bool,
) -> StoreResult<usize> {
    conn.execute(
        "UPDATE lf.images SET is_labeled = ?, is_no_class = ? WHERE id = ?",
        duckdb::params![is_labeled, is_no_class, image_id],
    )
    .context("update images label state")
}

/// Delete an image together with its ground-truth labels.
pub fn delete_image(conn: &Connection, image_id: i64) -> StoreResult<usize> {
    conn.execute(
        "DELETE FROM lf.image_labels WHERE image_id = ?",
        duckdb::params![image_id],
    )
    .context("delete image_labels")?;
    conn.execute("DELETE FROM lf.images WHERE id = ?", duckdb::params![image_id])
        .context("delete images")
}

/// Labeling-state and split counts over a dataset.
///
/// `labeled`, `unlabeled`, and `no_class` partition the images, as do the
/// four split counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetCounts {
    pub labeled: i64,
    pub unlabeled: i64,
    pub no_class: i64,
    pub train_count: i64,
    pub dev_count: i64,
    pub test_count: i64,
    pub unassigned_count: i64,
}

pub fn dataset_counts(conn: &Connection, scope: DatasetScope) -> StoreResult<DatasetCounts> {
    conn.query_row(
        &format!(
            "SELECT
                count(*) FILTER (WHERE is_labeled AND NOT is_no_class),
                count(*) FILTER (WHERE NOT is_labeled AND NOT is_no_class),
                count(*) FILTER (WHERE is_no_class),
                count(*) FILTER (WHERE split = 'training'),
                count(*) FILTER (WHERE split = 'dev'),
                count(*) FILTER (WHERE split = 'test'),
                count(*) FILTER (WHERE split = '')
             FROM {} WHERE {}",
            scope.table("images"),
            scope.owner_filter()
        ),
        duckdb::params![scope.key()],
        |row| {
            Ok(DatasetCounts {
                labeled: row.get(0)?,
                unlabeled: row.get(1)?,
                no_class: row.get(2)?,
                train_count: row.get(3)?,
                dev_count: row.get(4)?,
                test_count: row.get(5)?,
                unassigned_count: row.get(6)?,
            })
        },
    )
    .context("dataset counts")
}

/// Distinct images per (class, split) over the images carrying that class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassSplitCount {
    pub class_id: i64,
    pub split: Split,
    pub image_count: i64,
}

pub fn class_split_counts(
    conn: &Connection,
    scope: DatasetScope,
) -> StoreResult<Vec<ClassSplitCount>> {
    query_all(
        conn,
        &format!(
            "SELECT l.class_id, i.split, count(DISTINCT i.id)
             FROM {labels} l
             JOIN {images} i ON i.id = l.image_id{snapshot_join}
             WHERE i.{filter}
             GROUP BY l.class_id, i.split
             ORDER BY l.class_id, i.split",
            labels = scope.table("image_labels"),
            images = scope.table("images"),
            snapshot_join = match scope {
                DatasetScope::Live { .. } => "",
                DatasetScope::Snapshot { .. } => " AND i.snapshot_id = l.snapshot_id",
            },
            filter = scope.owner_filter(),
        ),
        duckdb::params![scope.key()],
        |row| {
            Ok(ClassSplitCount {
                class_id: row.get(0)?,
                split: decode(1, Split::parse(&row.get::<_, String>(1)?))?,
                image_count: row.get(2)?,
            })
        },
        "class split counts",
    )
}
